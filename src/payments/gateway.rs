//! Payment gateway seam.
//!
//! The reconciliation engine only talks to this trait; the production
//! implementation is the Stripe client, tests plug in a mock.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One line item on a hosted checkout page; amount is in minor units
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutItem {
    pub name: String,
    pub amount: i64,
    pub quantity: u32,
}

/// A hosted checkout session as seen through the gateway
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    /// Redirect URL for the hosted payment page; absent on retrieved sessions
    pub url: Option<String>,
    pub payment_status: String,
    /// Charge backing the session once payment completed
    pub latest_charge_id: Option<String>,
}

impl CheckoutSession {
    pub fn is_paid(&self) -> bool {
        self.payment_status == "paid"
    }
}

/// A settled (or refunded) charge
#[derive(Debug, Clone, Deserialize)]
pub struct Charge {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub refunded: bool,
    pub receipt_url: Option<String>,
    /// External transaction reference for receipts
    pub balance_transaction: Option<String>,
    pub card_last4: Option<String>,
    /// Unix timestamp of charge creation
    pub created: i64,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a customer record at the processor. Not idempotent: callers
    /// must persist the returned id and never call this twice per user.
    async fn create_customer(&self, email: &str, name: &str) -> Result<String>;

    async fn create_checkout_session(
        &self,
        item: &CheckoutItem,
        success_url: &str,
        cancel_url: &str,
        customer_id: &str,
    ) -> Result<CheckoutSession>;

    async fn get_session(&self, session_id: &str) -> Result<CheckoutSession>;

    async fn is_session_paid(&self, session_id: &str) -> Result<bool> {
        Ok(self.get_session(session_id).await?.is_paid())
    }

    async fn get_charge(&self, charge_id: &str) -> Result<Charge>;
}
