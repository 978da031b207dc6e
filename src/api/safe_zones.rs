//! Safe zone endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{
    parse_timestamp, CreateSafeZoneRequest, ListParams, Meta, Role, SafeZone,
    UpdateSafeZoneRequest,
};
use crate::AppState;

use super::auth::AuthUser;
use super::error::{ApiError, ValidationErrorBuilder};
use super::response::ApiResponse;
use super::validation::{validate_latitude, validate_longitude};

fn validate_coordinates(
    errors: &mut ValidationErrorBuilder,
    field: &str,
    latitude: Option<f64>,
    longitude: Option<f64>,
) {
    if let Some(lat) = latitude {
        if let Err(e) = validate_latitude(lat) {
            errors.add(format!("{}_latitude", field), &e);
        }
    }
    if let Some(lng) = longitude {
        if let Err(e) = validate_longitude(lng) {
            errors.add(format!("{}_longitude", field), &e);
        }
    }
}

fn validate_create_request(req: &CreateSafeZoneRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    validate_coordinates(
        &mut errors,
        "start",
        Some(req.start_latitude),
        Some(req.start_longitude),
    );
    validate_coordinates(
        &mut errors,
        "end",
        Some(req.end_latitude),
        Some(req.end_longitude),
    );
    if let Some(ref at) = req.expected_return_at {
        if parse_timestamp(at).is_none() {
            errors.add("expected_return_at", "Must be an RFC3339 timestamp");
        }
    }
    errors.finish()
}

pub async fn create_safe_zone(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(payload): Json<CreateSafeZoneRequest>,
) -> Result<Json<ApiResponse<SafeZone>>, ApiError> {
    auth.require_role(&[Role::User])?;
    validate_create_request(&payload)?;

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT INTO safe_zones \
         (id, user_id, description, start_latitude, start_longitude, end_latitude, end_longitude, \
          expected_return_at, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&auth.user.id)
    .bind(&payload.description)
    .bind(payload.start_latitude)
    .bind(payload.start_longitude)
    .bind(payload.end_latitude)
    .bind(payload.end_longitude)
    .bind(&payload.expected_return_at)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    let zone: SafeZone = sqlx::query_as("SELECT * FROM safe_zones WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    Ok(ApiResponse::ok("Safe zone created successfully", zone))
}

/// List the caller's safe zones.
pub async fn list_safe_zones(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(params): Query<ListParams>,
) -> Result<Json<ApiResponse<Vec<SafeZone>>>, ApiError> {
    let order_by = params.order_by(&["created_at", "expected_return_at"], "created_at DESC");
    let like = params.like_pattern();

    let mut sql = String::from("SELECT * FROM safe_zones WHERE is_deleted = 0 AND user_id = ?1");
    let mut count_sql =
        String::from("SELECT COUNT(*) FROM safe_zones WHERE is_deleted = 0 AND user_id = ?1");
    if like.is_some() {
        sql.push_str(" AND description LIKE ?2");
        count_sql.push_str(" AND description LIKE ?2");
    }
    sql.push_str(&format!(" ORDER BY {} LIMIT ? OFFSET ?", order_by));

    let mut query = sqlx::query_as::<_, SafeZone>(&sql).bind(&auth.user.id);
    let mut count_query = sqlx::query_as::<_, (i64,)>(&count_sql).bind(&auth.user.id);
    if let Some(ref pattern) = like {
        query = query.bind(pattern);
        count_query = count_query.bind(pattern);
    }

    let zones = query
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(&state.db)
        .await?;
    let (total,) = count_query.fetch_one(&state.db).await?;

    Ok(ApiResponse::paginated(
        "Safe zones fetched successfully",
        zones,
        Meta {
            page: params.page(),
            limit: params.limit(),
            total,
        },
    ))
}

pub async fn get_safe_zone(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<SafeZone>>, ApiError> {
    let zone: Option<SafeZone> =
        sqlx::query_as("SELECT * FROM safe_zones WHERE id = ? AND is_deleted = 0")
            .bind(&id)
            .fetch_optional(&state.db)
            .await?;
    let zone = zone.ok_or_else(|| ApiError::not_found("Safe zone not found"))?;

    Ok(ApiResponse::ok("Safe zone fetched successfully", zone))
}

pub async fn update_safe_zone(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateSafeZoneRequest>,
) -> Result<Json<ApiResponse<SafeZone>>, ApiError> {
    auth.require_role(&[Role::User])?;

    let mut errors = ValidationErrorBuilder::new();
    validate_coordinates(
        &mut errors,
        "start",
        payload.start_latitude,
        payload.start_longitude,
    );
    validate_coordinates(
        &mut errors,
        "end",
        payload.end_latitude,
        payload.end_longitude,
    );
    if let Some(ref at) = payload.expected_return_at {
        if parse_timestamp(at).is_none() {
            errors.add("expected_return_at", "Must be an RFC3339 timestamp");
        }
    }
    errors.finish()?;

    let zone: Option<SafeZone> =
        sqlx::query_as("SELECT * FROM safe_zones WHERE id = ? AND is_deleted = 0")
            .bind(&id)
            .fetch_optional(&state.db)
            .await?;
    let zone = zone.ok_or_else(|| ApiError::not_found("Safe zone not found"))?;

    if zone.user_id != auth.user.id {
        return Err(ApiError::forbidden("You can only update your own safe zones"));
    }

    sqlx::query(
        "UPDATE safe_zones SET description = ?, start_latitude = ?, start_longitude = ?, \
         end_latitude = ?, end_longitude = ?, expected_return_at = ?, updated_at = ? WHERE id = ?",
    )
    .bind(payload.description.or(zone.description))
    .bind(payload.start_latitude.unwrap_or(zone.start_latitude))
    .bind(payload.start_longitude.unwrap_or(zone.start_longitude))
    .bind(payload.end_latitude.unwrap_or(zone.end_latitude))
    .bind(payload.end_longitude.unwrap_or(zone.end_longitude))
    .bind(payload.expected_return_at.or(zone.expected_return_at))
    .bind(Utc::now().to_rfc3339())
    .bind(&id)
    .execute(&state.db)
    .await?;

    let zone: SafeZone = sqlx::query_as("SELECT * FROM safe_zones WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    Ok(ApiResponse::ok("Safe zone updated successfully", zone))
}

pub async fn delete_safe_zone(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let zone: Option<SafeZone> =
        sqlx::query_as("SELECT * FROM safe_zones WHERE id = ? AND is_deleted = 0")
            .bind(&id)
            .fetch_optional(&state.db)
            .await?;
    let zone = zone.ok_or_else(|| ApiError::not_found("Safe zone not found"))?;

    if zone.user_id != auth.user.id && !auth.is_privileged() {
        return Err(ApiError::forbidden("You can only delete your own safe zones"));
    }

    sqlx::query("UPDATE safe_zones SET is_deleted = 1, updated_at = ? WHERE id = ?")
        .bind(Utc::now().to_rfc3339())
        .bind(&id)
        .execute(&state.db)
        .await?;

    Ok(ApiResponse::ok(
        "Safe zone deleted successfully",
        serde_json::Value::Null,
    ))
}
