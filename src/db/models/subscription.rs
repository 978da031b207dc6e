//! Subscription models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A user's claim on a package. At most one subscription per user is active.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    pub id: String,
    pub user_id: String,
    pub package_id: String,
    pub is_paid: bool,
    pub is_active: bool,
    pub expires_at: Option<String>,
    pub is_deleted: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub package_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSubscriptionRequest {
    pub package_id: Option<String>,
}
