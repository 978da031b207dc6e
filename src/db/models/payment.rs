//! Payment models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A checkout attempt against a subscription. At most one unpaid payment
/// exists per (user, subscription) pair; it flips to paid exactly once.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: String,
    pub subscription_id: String,
    pub user_id: String,
    pub price: i64,
    pub is_paid: bool,
    /// External transaction id, set at confirmation
    pub trn_id: Option<String>,
    pub receipt_url: Option<String>,
    pub is_deleted: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub subscription_id: String,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    /// Hosted payment page the client should redirect to
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmPaymentParams {
    pub session_id: String,
    pub payment_id: String,
}
