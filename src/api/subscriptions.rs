//! Subscription endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{
    CreateSubscriptionRequest, ListParams, Meta, Package, Role, Subscription,
    UpdateSubscriptionRequest,
};
use crate::AppState;

use super::auth::AuthUser;
use super::error::ApiError;
use super::response::ApiResponse;

async fn load_owned_subscription(
    state: &AppState,
    auth: &AuthUser,
    id: &str,
) -> Result<Subscription, ApiError> {
    let subscription: Option<Subscription> =
        sqlx::query_as("SELECT * FROM subscriptions WHERE id = ? AND is_deleted = 0")
            .bind(id)
            .fetch_optional(&state.db)
            .await?;
    let subscription = subscription.ok_or_else(|| ApiError::not_found("Subscription not found"))?;

    if subscription.user_id != auth.user.id && !auth.is_privileged() {
        return Err(ApiError::forbidden(
            "You can only access your own subscriptions",
        ));
    }
    Ok(subscription)
}

/// Create a subscription request for a package. An existing unpaid, inactive
/// subscription for the same package is re-used instead of duplicated.
pub async fn create_subscription(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(payload): Json<CreateSubscriptionRequest>,
) -> Result<Json<ApiResponse<Subscription>>, ApiError> {
    auth.require_role(&[Role::User])?;

    let package: Option<Package> =
        sqlx::query_as("SELECT * FROM packages WHERE id = ? AND is_deleted = 0")
            .bind(&payload.package_id)
            .fetch_optional(&state.db)
            .await?;
    let package = package.ok_or_else(|| ApiError::bad_request("Package not found"))?;

    let existing: Option<Subscription> = sqlx::query_as(
        "SELECT * FROM subscriptions \
         WHERE user_id = ? AND package_id = ? AND is_active = 0 AND is_paid = 0 AND is_deleted = 0",
    )
    .bind(&auth.user.id)
    .bind(&package.id)
    .fetch_optional(&state.db)
    .await?;

    if let Some(subscription) = existing {
        return Ok(ApiResponse::ok(
            "Subscription created successfully",
            subscription,
        ));
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT INTO subscriptions (id, user_id, package_id, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&auth.user.id)
    .bind(&package.id)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    let subscription: Subscription = sqlx::query_as("SELECT * FROM subscriptions WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    Ok(ApiResponse::ok(
        "Subscription created successfully",
        subscription,
    ))
}

/// List subscriptions; regular users see their own, privileged roles see all.
pub async fn list_subscriptions(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(params): Query<ListParams>,
) -> Result<Json<ApiResponse<Vec<Subscription>>>, ApiError> {
    let order_by = params.order_by(&["created_at", "expires_at"], "created_at DESC");
    let scope_to_user = (!auth.is_privileged()).then_some(auth.user.id.clone());

    let mut sql = String::from("SELECT * FROM subscriptions WHERE is_deleted = 0");
    let mut count_sql = String::from("SELECT COUNT(*) FROM subscriptions WHERE is_deleted = 0");
    if scope_to_user.is_some() {
        sql.push_str(" AND user_id = ?1");
        count_sql.push_str(" AND user_id = ?1");
    }
    sql.push_str(&format!(" ORDER BY {} LIMIT ? OFFSET ?", order_by));

    let mut query = sqlx::query_as::<_, Subscription>(&sql);
    let mut count_query = sqlx::query_as::<_, (i64,)>(&count_sql);
    if let Some(ref user_id) = scope_to_user {
        query = query.bind(user_id);
        count_query = count_query.bind(user_id);
    }

    let subscriptions = query
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(&state.db)
        .await?;
    let (total,) = count_query.fetch_one(&state.db).await?;

    Ok(ApiResponse::paginated(
        "Subscriptions fetched successfully",
        subscriptions,
        Meta {
            page: params.page(),
            limit: params.limit(),
            total,
        },
    ))
}

pub async fn get_subscription(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Subscription>>, ApiError> {
    let subscription = load_owned_subscription(&state, &auth, &id).await?;
    Ok(ApiResponse::ok(
        "Subscription fetched successfully",
        subscription,
    ))
}

/// Re-point an unpaid subscription at another package.
pub async fn update_subscription(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateSubscriptionRequest>,
) -> Result<Json<ApiResponse<Subscription>>, ApiError> {
    let subscription = load_owned_subscription(&state, &auth, &id).await?;

    if let Some(package_id) = payload.package_id {
        if subscription.is_paid {
            return Err(ApiError::bad_request(
                "A paid subscription cannot change its package",
            ));
        }
        let package: Option<Package> =
            sqlx::query_as("SELECT * FROM packages WHERE id = ? AND is_deleted = 0")
                .bind(&package_id)
                .fetch_optional(&state.db)
                .await?;
        let package = package.ok_or_else(|| ApiError::bad_request("Package not found"))?;

        sqlx::query("UPDATE subscriptions SET package_id = ?, updated_at = ? WHERE id = ?")
            .bind(&package.id)
            .bind(Utc::now().to_rfc3339())
            .bind(&subscription.id)
            .execute(&state.db)
            .await?;
    }

    let subscription: Subscription = sqlx::query_as("SELECT * FROM subscriptions WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    Ok(ApiResponse::ok(
        "Subscription updated successfully",
        subscription,
    ))
}

pub async fn delete_subscription(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let subscription = load_owned_subscription(&state, &auth, &id).await?;

    sqlx::query("UPDATE subscriptions SET is_deleted = 1, updated_at = ? WHERE id = ?")
        .bind(Utc::now().to_rfc3339())
        .bind(&subscription.id)
        .execute(&state.db)
        .await?;

    Ok(ApiResponse::ok(
        "Subscription deleted successfully",
        serde_json::Value::Null,
    ))
}
