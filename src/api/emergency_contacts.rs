//! Emergency contact endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{
    CreateEmergencyContactRequest, EmergencyContact, ListParams, Meta, Role,
    UpdateEmergencyContactRequest,
};
use crate::AppState;

use super::auth::AuthUser;
use super::error::{ApiError, ValidationErrorBuilder};
use super::response::ApiResponse;
use super::validation::validate_phone_number;

fn validate_contact_fields(name: Option<&str>, phone: Option<&str>) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Some(name) = name {
        if name.trim().is_empty() {
            errors.add("name", "Name is required");
        }
    }
    if let Some(phone) = phone {
        if let Err(e) = validate_phone_number(phone) {
            errors.add("phone_number", &e);
        }
    }
    errors.finish()
}

pub async fn create_contact(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(payload): Json<CreateEmergencyContactRequest>,
) -> Result<Json<ApiResponse<EmergencyContact>>, ApiError> {
    auth.require_role(&[Role::User])?;
    validate_contact_fields(Some(&payload.name), Some(&payload.phone_number))?;

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT INTO emergency_contacts \
         (id, user_id, name, relation, phone_number, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&auth.user.id)
    .bind(payload.name.trim())
    .bind(&payload.relation)
    .bind(&payload.phone_number)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    let contact: EmergencyContact =
        sqlx::query_as("SELECT * FROM emergency_contacts WHERE id = ?")
            .bind(&id)
            .fetch_one(&state.db)
            .await?;

    Ok(ApiResponse::ok(
        "Emergency contact created successfully",
        contact,
    ))
}

/// List contacts; regular users see their own, privileged roles see all.
pub async fn list_contacts(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(params): Query<ListParams>,
) -> Result<Json<ApiResponse<Vec<EmergencyContact>>>, ApiError> {
    let order_by = params.order_by(&["name", "created_at"], "created_at DESC");
    let like = params.like_pattern();
    let scope_to_user = (!auth.is_privileged()).then_some(auth.user.id.clone());

    let mut sql = String::from("SELECT * FROM emergency_contacts WHERE is_deleted = 0");
    let mut count_sql = String::from("SELECT COUNT(*) FROM emergency_contacts WHERE is_deleted = 0");
    if scope_to_user.is_some() {
        sql.push_str(" AND user_id = ?1");
        count_sql.push_str(" AND user_id = ?1");
    }
    if like.is_some() {
        let clause = if scope_to_user.is_some() {
            " AND (name LIKE ?2 OR relation LIKE ?2 OR phone_number LIKE ?2)"
        } else {
            " AND (name LIKE ?1 OR relation LIKE ?1 OR phone_number LIKE ?1)"
        };
        sql.push_str(clause);
        count_sql.push_str(clause);
    }
    sql.push_str(&format!(" ORDER BY {} LIMIT ? OFFSET ?", order_by));

    let mut query = sqlx::query_as::<_, EmergencyContact>(&sql);
    let mut count_query = sqlx::query_as::<_, (i64,)>(&count_sql);
    if let Some(ref user_id) = scope_to_user {
        query = query.bind(user_id);
        count_query = count_query.bind(user_id);
    }
    if let Some(ref pattern) = like {
        query = query.bind(pattern);
        count_query = count_query.bind(pattern);
    }

    let contacts = query
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(&state.db)
        .await?;
    let (total,) = count_query.fetch_one(&state.db).await?;

    Ok(ApiResponse::paginated(
        "Emergency contacts fetched successfully",
        contacts,
        Meta {
            page: params.page(),
            limit: params.limit(),
            total,
        },
    ))
}

pub async fn get_contact(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<EmergencyContact>>, ApiError> {
    let contact: Option<EmergencyContact> =
        sqlx::query_as("SELECT * FROM emergency_contacts WHERE id = ? AND is_deleted = 0")
            .bind(&id)
            .fetch_optional(&state.db)
            .await?;
    let contact = contact.ok_or_else(|| ApiError::not_found("Emergency contact not found"))?;

    if contact.user_id != auth.user.id && !auth.is_privileged() {
        return Err(ApiError::forbidden(
            "You can only access your own emergency contacts",
        ));
    }

    Ok(ApiResponse::ok(
        "Emergency contact fetched successfully",
        contact,
    ))
}

pub async fn update_contact(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateEmergencyContactRequest>,
) -> Result<Json<ApiResponse<EmergencyContact>>, ApiError> {
    auth.require_role(&[Role::User])?;
    validate_contact_fields(payload.name.as_deref(), payload.phone_number.as_deref())?;

    let contact: Option<EmergencyContact> =
        sqlx::query_as("SELECT * FROM emergency_contacts WHERE id = ? AND is_deleted = 0")
            .bind(&id)
            .fetch_optional(&state.db)
            .await?;
    let contact = contact.ok_or_else(|| ApiError::not_found("Emergency contact not found"))?;

    if contact.user_id != auth.user.id {
        return Err(ApiError::forbidden(
            "You can only update your own emergency contacts",
        ));
    }

    sqlx::query(
        "UPDATE emergency_contacts SET name = ?, relation = ?, phone_number = ?, updated_at = ? \
         WHERE id = ?",
    )
    .bind(payload.name.unwrap_or(contact.name))
    .bind(payload.relation.or(contact.relation))
    .bind(payload.phone_number.unwrap_or(contact.phone_number))
    .bind(Utc::now().to_rfc3339())
    .bind(&id)
    .execute(&state.db)
    .await?;

    let contact: EmergencyContact =
        sqlx::query_as("SELECT * FROM emergency_contacts WHERE id = ?")
            .bind(&id)
            .fetch_one(&state.db)
            .await?;

    Ok(ApiResponse::ok(
        "Emergency contact updated successfully",
        contact,
    ))
}

pub async fn delete_contact(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let contact: Option<EmergencyContact> =
        sqlx::query_as("SELECT * FROM emergency_contacts WHERE id = ? AND is_deleted = 0")
            .bind(&id)
            .fetch_optional(&state.db)
            .await?;
    let contact = contact.ok_or_else(|| ApiError::not_found("Emergency contact not found"))?;

    if contact.user_id != auth.user.id && !auth.is_privileged() {
        return Err(ApiError::forbidden(
            "You can only delete your own emergency contacts",
        ));
    }

    sqlx::query("UPDATE emergency_contacts SET is_deleted = 1, updated_at = ? WHERE id = ?")
        .bind(Utc::now().to_rfc3339())
        .bind(&id)
        .execute(&state.db)
        .await?;

    Ok(ApiResponse::ok(
        "Emergency contact deleted successfully",
        serde_json::Value::Null,
    ))
}
