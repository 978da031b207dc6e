//! Package management endpoints. Reads are public; writes are privileged.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{CreatePackageRequest, ListParams, Meta, Package, Role, UpdatePackageRequest};
use crate::AppState;

use super::auth::AuthUser;
use super::error::{ApiError, ValidationErrorBuilder};
use super::response::ApiResponse;

fn validate_package_fields(
    title: Option<&str>,
    price: Option<i64>,
    duration_days: Option<i64>,
) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Some(title) = title {
        if title.trim().is_empty() {
            errors.add("title", "Title is required");
        }
    }
    if let Some(price) = price {
        if price < 0 {
            errors.add("price", "Price must not be negative");
        }
    }
    if let Some(duration) = duration_days {
        if duration < 0 {
            errors.add("duration_days", "Duration must not be negative");
        }
    }

    errors.finish()
}

pub async fn create_package(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(payload): Json<CreatePackageRequest>,
) -> Result<Json<ApiResponse<Package>>, ApiError> {
    auth.require_role(&Role::PRIVILEGED)?;
    validate_package_fields(
        Some(&payload.title),
        Some(payload.price),
        Some(payload.duration_days),
    )?;

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT INTO packages (id, title, price, duration_days, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(payload.title.trim())
    .bind(payload.price)
    .bind(payload.duration_days)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    let package: Package = sqlx::query_as("SELECT * FROM packages WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    Ok(ApiResponse::ok("Package created successfully", package))
}

pub async fn list_packages(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<ApiResponse<Vec<Package>>>, ApiError> {
    let order_by = params.order_by(
        &["title", "price", "duration_days", "created_at"],
        "created_at DESC",
    );
    let like = params.like_pattern();

    let mut sql = String::from("SELECT * FROM packages WHERE is_deleted = 0");
    let mut count_sql = String::from("SELECT COUNT(*) FROM packages WHERE is_deleted = 0");
    if like.is_some() {
        sql.push_str(" AND title LIKE ?1");
        count_sql.push_str(" AND title LIKE ?1");
    }
    sql.push_str(&format!(" ORDER BY {} LIMIT ? OFFSET ?", order_by));

    let mut query = sqlx::query_as::<_, Package>(&sql);
    let mut count_query = sqlx::query_as::<_, (i64,)>(&count_sql);
    if let Some(ref pattern) = like {
        query = query.bind(pattern);
        count_query = count_query.bind(pattern);
    }

    let packages = query
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(&state.db)
        .await?;
    let (total,) = count_query.fetch_one(&state.db).await?;

    Ok(ApiResponse::paginated(
        "Packages fetched successfully",
        packages,
        Meta {
            page: params.page(),
            limit: params.limit(),
            total,
        },
    ))
}

pub async fn get_package(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Package>>, ApiError> {
    let package: Option<Package> =
        sqlx::query_as("SELECT * FROM packages WHERE id = ? AND is_deleted = 0")
            .bind(&id)
            .fetch_optional(&state.db)
            .await?;
    let package = package.ok_or_else(|| ApiError::not_found("Package not found"))?;

    Ok(ApiResponse::ok("Package fetched successfully", package))
}

pub async fn update_package(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdatePackageRequest>,
) -> Result<Json<ApiResponse<Package>>, ApiError> {
    auth.require_role(&Role::PRIVILEGED)?;
    validate_package_fields(
        payload.title.as_deref(),
        payload.price,
        payload.duration_days,
    )?;

    let package: Option<Package> =
        sqlx::query_as("SELECT * FROM packages WHERE id = ? AND is_deleted = 0")
            .bind(&id)
            .fetch_optional(&state.db)
            .await?;
    let package = package.ok_or_else(|| ApiError::not_found("Package not found"))?;

    let title = payload.title.unwrap_or(package.title);
    let price = payload.price.unwrap_or(package.price);
    let duration_days = payload.duration_days.unwrap_or(package.duration_days);

    sqlx::query(
        "UPDATE packages SET title = ?, price = ?, duration_days = ?, updated_at = ? WHERE id = ?",
    )
    .bind(title.trim())
    .bind(price)
    .bind(duration_days)
    .bind(Utc::now().to_rfc3339())
    .bind(&id)
    .execute(&state.db)
    .await?;

    let package: Package = sqlx::query_as("SELECT * FROM packages WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    Ok(ApiResponse::ok("Package updated successfully", package))
}

pub async fn delete_package(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    auth.require_role(&Role::PRIVILEGED)?;

    let result = sqlx::query("UPDATE packages SET is_deleted = 1, updated_at = ? WHERE id = ?")
        .bind(Utc::now().to_rfc3339())
        .bind(&id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Package not found"));
    }

    Ok(ApiResponse::ok(
        "Package deleted successfully",
        serde_json::Value::Null,
    ))
}
