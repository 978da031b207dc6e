//! User registration and management endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{normalize_email, otp, password::hash_password};
use crate::db::{
    CreateUserRequest, ListParams, Meta, RegisterResponse, Role, UpdateUserRequest, User,
    UserResponse, Verification,
};
use crate::AppState;

use super::auth::AuthUser;
use super::error::{ApiError, ValidationErrorBuilder};
use super::response::ApiResponse;
use super::validation::{validate_email, validate_password, validate_phone_number};

fn validate_register_request(req: &CreateUserRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if req.name.trim().is_empty() {
        errors.add("name", "Name is required");
    }
    if let Err(e) = validate_email(&normalize_email(&req.email)) {
        errors.add("email", &e);
    }
    if let Err(e) = validate_password(&req.password) {
        errors.add("password", &e);
    }
    if let Some(ref phone) = req.phone_number {
        if let Err(e) = validate_phone_number(phone) {
            errors.add("phone_number", &e);
        }
    }

    errors.finish()
}

/// Register a new account (or take over an unverified registration) and
/// send the verification OTP.
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<Json<ApiResponse<RegisterResponse>>, ApiError> {
    validate_register_request(&payload)?;

    let email = normalize_email(&payload.email);
    let password_hash = hash_password(&payload.password)
        .map_err(|_| ApiError::internal("Failed to hash password"))?;
    let now = Utc::now().to_rfc3339();

    let existing: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(&state.db)
        .await?;

    let user = match existing {
        Some(existing) => {
            if existing.is_deleted {
                return Err(ApiError::forbidden("This user was deleted"));
            }
            if existing.status == "blocked" {
                return Err(ApiError::forbidden("This user was blocked"));
            }

            let verified: Option<Verification> =
                sqlx::query_as("SELECT * FROM verifications WHERE user_id = ?")
                    .bind(&existing.id)
                    .fetch_optional(&state.db)
                    .await?;
            if verified.map(|v| v.status).unwrap_or(false) {
                return Err(ApiError::conflict("User already exists and is verified"));
            }

            // Unverified registration: the new signup overwrites the pending one
            sqlx::query(
                "UPDATE users SET name = ?, phone_number = ?, password_hash = ?, updated_at = ? \
                 WHERE id = ?",
            )
            .bind(payload.name.trim())
            .bind(&payload.phone_number)
            .bind(&password_hash)
            .bind(&now)
            .bind(&existing.id)
            .execute(&state.db)
            .await?;

            sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
                .bind(&existing.id)
                .fetch_one(&state.db)
                .await?
        }
        None => {
            let id = Uuid::new_v4().to_string();
            sqlx::query(
                "INSERT INTO users \
                 (id, name, email, phone_number, password_hash, role, status, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, 'user', 'active', ?, ?)",
            )
            .bind(&id)
            .bind(payload.name.trim())
            .bind(&email)
            .bind(&payload.phone_number)
            .bind(&password_hash)
            .bind(&now)
            .bind(&now)
            .execute(&state.db)
            .await?;

            // The 1:1 verification record is born unverified at signup
            sqlx::query(
                "INSERT INTO verifications (id, user_id, otp, expires_at, status, created_at, updated_at) \
                 VALUES (?, ?, 0, NULL, 0, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&id)
            .bind(&now)
            .bind(&now)
            .execute(&state.db)
            .await?;

            sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
                .bind(&id)
                .fetch_one(&state.db)
                .await?
        }
    };

    let token = otp::issue(&state.db, &state.email, &state.config.auth, &user).await?;

    Ok(ApiResponse::ok(
        "User registered successfully. A verification code has been sent",
        RegisterResponse {
            user: UserResponse::from(user),
            token,
        },
    ))
}

/// List users (privileged roles only). Admin accounts are excluded.
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(params): Query<ListParams>,
) -> Result<Json<ApiResponse<Vec<UserResponse>>>, ApiError> {
    auth.require_role(&Role::PRIVILEGED)?;

    let order_by = params.order_by(
        &["name", "email", "status", "created_at"],
        "created_at DESC",
    );
    let like = params.like_pattern();

    let mut sql = String::from("SELECT * FROM users WHERE role != 'admin'");
    let mut count_sql = String::from("SELECT COUNT(*) FROM users WHERE role != 'admin'");
    if like.is_some() {
        let clause = " AND (name LIKE ?1 OR email LIKE ?1 OR phone_number LIKE ?1 OR status LIKE ?1)";
        sql.push_str(clause);
        count_sql.push_str(clause);
    }
    sql.push_str(&format!(" ORDER BY {} LIMIT ? OFFSET ?", order_by));

    let mut query = sqlx::query_as::<_, User>(&sql);
    let mut count_query = sqlx::query_as::<_, (i64,)>(&count_sql);
    if let Some(ref pattern) = like {
        query = query.bind(pattern);
        count_query = count_query.bind(pattern);
    }

    let users = query
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(&state.db)
        .await?;
    let (total,) = count_query.fetch_one(&state.db).await?;

    Ok(ApiResponse::paginated(
        "Users fetched successfully",
        users.into_iter().map(UserResponse::from).collect(),
        Meta {
            page: params.page(),
            limit: params.limit(),
            total,
        },
    ))
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ? AND is_deleted = 0")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?;
    let user = user.ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(ApiResponse::ok(
        "User fetched successfully",
        UserResponse::from(user),
    ))
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    if auth.user.id != id && !auth.is_privileged() {
        return Err(ApiError::forbidden("You can only update your own account"));
    }
    // Only privileged roles may flip the account status
    if payload.status.is_some() && !auth.is_privileged() {
        return Err(ApiError::forbidden("You cannot change the account status"));
    }

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ? AND is_deleted = 0")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?;
    let user = user.ok_or_else(|| ApiError::not_found("User not found"))?;

    if let Some(ref phone) = payload.phone_number {
        if let Err(e) = validate_phone_number(phone) {
            return Err(ApiError::validation_field("phone_number", e));
        }
    }
    if let Some(ref status) = payload.status {
        if status.parse::<crate::db::AccountStatus>().is_err() {
            return Err(ApiError::validation_field("status", "Unknown account status"));
        }
    }

    let name = payload.name.unwrap_or(user.name);
    let phone_number = payload.phone_number.or(user.phone_number);
    let status = payload.status.unwrap_or(user.status);

    sqlx::query(
        "UPDATE users SET name = ?, phone_number = ?, status = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&name)
    .bind(&phone_number)
    .bind(&status)
    .bind(Utc::now().to_rfc3339())
    .bind(&id)
    .execute(&state.db)
    .await?;

    let user: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    Ok(ApiResponse::ok(
        "User updated successfully",
        UserResponse::from(user),
    ))
}

/// Soft delete; the account stops authenticating but its history stays.
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    if auth.user.id != id && !auth.is_privileged() {
        return Err(ApiError::forbidden("You can only delete your own account"));
    }

    let result = sqlx::query("UPDATE users SET is_deleted = 1, updated_at = ? WHERE id = ?")
        .bind(Utc::now().to_rfc3339())
        .bind(&id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("User not found"));
    }

    Ok(ApiResponse::ok(
        "User deleted successfully",
        serde_json::Value::Null,
    ))
}
