//! Distress alert post endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{
    AlertPost, CreateAlertPostRequest, ListParams, Meta, Role, UpdateAlertPostRequest,
};
use crate::AppState;

use super::auth::AuthUser;
use super::error::{ApiError, ValidationErrorBuilder};
use super::response::ApiResponse;
use super::validation::{validate_latitude, validate_longitude};

fn validate_post_fields(
    alert_type: Option<&str>,
    description: Option<&str>,
    latitude: Option<f64>,
    longitude: Option<f64>,
) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Some(alert_type) = alert_type {
        if alert_type.trim().is_empty() {
            errors.add("alert_type", "Alert type is required");
        }
    }
    if let Some(description) = description {
        if description.trim().is_empty() {
            errors.add("description", "Description is required");
        }
    }
    if let Some(lat) = latitude {
        if let Err(e) = validate_latitude(lat) {
            errors.add("latitude", &e);
        }
    }
    if let Some(lng) = longitude {
        if let Err(e) = validate_longitude(lng) {
            errors.add("longitude", &e);
        }
    }
    errors.finish()
}

pub async fn create_post(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(payload): Json<CreateAlertPostRequest>,
) -> Result<Json<ApiResponse<AlertPost>>, ApiError> {
    auth.require_role(&[Role::User])?;
    validate_post_fields(
        Some(&payload.alert_type),
        Some(&payload.description),
        payload.latitude,
        payload.longitude,
    )?;

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT INTO alert_posts \
         (id, user_id, alert_type, description, latitude, longitude, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&auth.user.id)
    .bind(payload.alert_type.trim())
    .bind(payload.description.trim())
    .bind(payload.latitude)
    .bind(payload.longitude)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    let post: AlertPost = sqlx::query_as("SELECT * FROM alert_posts WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    Ok(ApiResponse::ok("Alert post created successfully", post))
}

async fn list_posts_inner(
    state: &AppState,
    params: &ListParams,
    user_id: Option<&str>,
) -> Result<(Vec<AlertPost>, i64), ApiError> {
    let order_by = params.order_by(&["created_at", "alert_type"], "created_at DESC");
    let like = params.like_pattern();

    let mut sql = String::from("SELECT * FROM alert_posts WHERE is_deleted = 0");
    let mut count_sql = String::from("SELECT COUNT(*) FROM alert_posts WHERE is_deleted = 0");
    if user_id.is_some() {
        sql.push_str(" AND user_id = ?1");
        count_sql.push_str(" AND user_id = ?1");
    }
    if like.is_some() {
        let clause = if user_id.is_some() {
            " AND (alert_type LIKE ?2 OR description LIKE ?2)"
        } else {
            " AND (alert_type LIKE ?1 OR description LIKE ?1)"
        };
        sql.push_str(clause);
        count_sql.push_str(clause);
    }
    sql.push_str(&format!(" ORDER BY {} LIMIT ? OFFSET ?", order_by));

    let mut query = sqlx::query_as::<_, AlertPost>(&sql);
    let mut count_query = sqlx::query_as::<_, (i64,)>(&count_sql);
    if let Some(user_id) = user_id {
        query = query.bind(user_id);
        count_query = count_query.bind(user_id);
    }
    if let Some(ref pattern) = like {
        query = query.bind(pattern);
        count_query = count_query.bind(pattern);
    }

    let posts = query
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(&state.db)
        .await?;
    let (total,) = count_query.fetch_one(&state.db).await?;
    Ok((posts, total))
}

/// Public feed of alert posts.
pub async fn list_posts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<ApiResponse<Vec<AlertPost>>>, ApiError> {
    let (posts, total) = list_posts_inner(&state, &params, None).await?;
    Ok(ApiResponse::paginated(
        "Alert posts fetched successfully",
        posts,
        Meta {
            page: params.page(),
            limit: params.limit(),
            total,
        },
    ))
}

/// The caller's own posts.
pub async fn list_my_posts(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(params): Query<ListParams>,
) -> Result<Json<ApiResponse<Vec<AlertPost>>>, ApiError> {
    let (posts, total) = list_posts_inner(&state, &params, Some(&auth.user.id)).await?;
    Ok(ApiResponse::paginated(
        "Alert posts fetched successfully",
        posts,
        Meta {
            page: params.page(),
            limit: params.limit(),
            total,
        },
    ))
}

pub async fn get_post(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<AlertPost>>, ApiError> {
    let post: Option<AlertPost> =
        sqlx::query_as("SELECT * FROM alert_posts WHERE id = ? AND is_deleted = 0")
            .bind(&id)
            .fetch_optional(&state.db)
            .await?;
    let post = post.ok_or_else(|| ApiError::not_found("Alert post not found"))?;

    Ok(ApiResponse::ok("Alert post fetched successfully", post))
}

pub async fn update_post(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateAlertPostRequest>,
) -> Result<Json<ApiResponse<AlertPost>>, ApiError> {
    auth.require_role(&[Role::User])?;
    validate_post_fields(
        payload.alert_type.as_deref(),
        payload.description.as_deref(),
        payload.latitude,
        payload.longitude,
    )?;

    let post: Option<AlertPost> =
        sqlx::query_as("SELECT * FROM alert_posts WHERE id = ? AND is_deleted = 0")
            .bind(&id)
            .fetch_optional(&state.db)
            .await?;
    let post = post.ok_or_else(|| ApiError::not_found("Alert post not found"))?;

    if post.user_id != auth.user.id {
        return Err(ApiError::forbidden("You can only update your own posts"));
    }

    sqlx::query(
        "UPDATE alert_posts SET alert_type = ?, description = ?, latitude = ?, longitude = ?, \
         updated_at = ? WHERE id = ?",
    )
    .bind(payload.alert_type.unwrap_or(post.alert_type))
    .bind(payload.description.unwrap_or(post.description))
    .bind(payload.latitude.or(post.latitude))
    .bind(payload.longitude.or(post.longitude))
    .bind(Utc::now().to_rfc3339())
    .bind(&id)
    .execute(&state.db)
    .await?;

    let post: AlertPost = sqlx::query_as("SELECT * FROM alert_posts WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    Ok(ApiResponse::ok("Alert post updated successfully", post))
}

pub async fn delete_post(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let post: Option<AlertPost> =
        sqlx::query_as("SELECT * FROM alert_posts WHERE id = ? AND is_deleted = 0")
            .bind(&id)
            .fetch_optional(&state.db)
            .await?;
    let post = post.ok_or_else(|| ApiError::not_found("Alert post not found"))?;

    if post.user_id != auth.user.id && !auth.is_privileged() {
        return Err(ApiError::forbidden("You can only delete your own posts"));
    }

    sqlx::query("UPDATE alert_posts SET is_deleted = 1, updated_at = ? WHERE id = ?")
        .bind(Utc::now().to_rfc3339())
        .bind(&id)
        .execute(&state.db)
        .await?;

    Ok(ApiResponse::ok(
        "Alert post deleted successfully",
        serde_json::Value::Null,
    ))
}
