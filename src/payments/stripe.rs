//! Stripe REST client implementing the payment gateway seam.
//!
//! Talks to the Stripe HTTP API directly with form-encoded requests. The API
//! base is configurable so tests and mock servers never hit the network.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::StripeConfig;

use super::gateway::{Charge, CheckoutItem, CheckoutSession, PaymentGateway};

pub struct StripeGateway {
    config: StripeConfig,
    client: reqwest::Client,
}

impl StripeGateway {
    pub fn new(config: StripeConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Make an authenticated GET request to the Stripe API.
    async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.config.api_base, path);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.config.secret_key)
            .send()
            .await
            .context("Failed to make Stripe API request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Stripe API error: {} - {}", status, body);
        }

        response
            .json()
            .await
            .context("Failed to parse Stripe API response")
    }

    /// Make an authenticated form-encoded POST request to the Stripe API.
    async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<T> {
        let url = format!("{}{}", self.config.api_base, path);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.secret_key)
            .form(params)
            .send()
            .await
            .context("Failed to make Stripe API request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Stripe API error: {} - {}", status, body);
        }

        response
            .json()
            .await
            .context("Failed to parse Stripe API response")
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_customer(&self, email: &str, name: &str) -> Result<String> {
        let params = vec![
            ("email".to_string(), email.to_string()),
            ("name".to_string(), name.to_string()),
        ];
        let customer: CustomerResponse = self.post("/v1/customers", &params).await?;
        Ok(customer.id)
    }

    async fn create_checkout_session(
        &self,
        item: &CheckoutItem,
        success_url: &str,
        cancel_url: &str,
        customer_id: &str,
    ) -> Result<CheckoutSession> {
        let params = vec![
            ("mode".to_string(), "payment".to_string()),
            ("customer".to_string(), customer_id.to_string()),
            ("success_url".to_string(), success_url.to_string()),
            ("cancel_url".to_string(), cancel_url.to_string()),
            (
                "line_items[0][quantity]".to_string(),
                item.quantity.to_string(),
            ),
            (
                "line_items[0][price_data][currency]".to_string(),
                self.config.currency.clone(),
            ),
            (
                "line_items[0][price_data][unit_amount]".to_string(),
                item.amount.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]".to_string(),
                item.name.clone(),
            ),
        ];

        let session: SessionResponse = self.post("/v1/checkout/sessions", &params).await?;
        Ok(session.into())
    }

    async fn get_session(&self, session_id: &str) -> Result<CheckoutSession> {
        // Expand the payment intent so the session resolves to its charge
        let path = format!(
            "/v1/checkout/sessions/{}?expand[]=payment_intent",
            session_id
        );
        let session: SessionResponse = self.get(&path).await?;
        Ok(session.into())
    }

    async fn get_charge(&self, charge_id: &str) -> Result<Charge> {
        let charge: ChargeResponse = self.get(&format!("/v1/charges/{}", charge_id)).await?;
        Ok(charge.into())
    }
}

// -------------------------------------------------------------------------
// Stripe wire types
// -------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CustomerResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
    payment_status: String,
    payment_intent: Option<PaymentIntentField>,
}

/// `payment_intent` is an id string unless expanded into an object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PaymentIntentField {
    Id(String),
    Object(PaymentIntentResponse),
}

#[derive(Debug, Deserialize)]
struct PaymentIntentResponse {
    latest_charge: Option<String>,
}

impl From<SessionResponse> for CheckoutSession {
    fn from(session: SessionResponse) -> Self {
        let latest_charge_id = match session.payment_intent {
            Some(PaymentIntentField::Object(intent)) => intent.latest_charge,
            _ => None,
        };
        Self {
            id: session.id,
            url: session.url,
            payment_status: session.payment_status,
            latest_charge_id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChargeResponse {
    id: String,
    amount: i64,
    currency: String,
    status: String,
    #[serde(default)]
    refunded: bool,
    receipt_url: Option<String>,
    balance_transaction: Option<String>,
    payment_method_details: Option<PaymentMethodDetails>,
    created: i64,
}

#[derive(Debug, Deserialize)]
struct PaymentMethodDetails {
    card: Option<CardDetails>,
}

#[derive(Debug, Deserialize)]
struct CardDetails {
    last4: Option<String>,
}

impl From<ChargeResponse> for Charge {
    fn from(charge: ChargeResponse) -> Self {
        let card_last4 = charge
            .payment_method_details
            .and_then(|d| d.card)
            .and_then(|c| c.last4);
        Self {
            id: charge.id,
            amount: charge.amount,
            currency: charge.currency,
            status: charge.status,
            refunded: charge.refunded,
            receipt_url: charge.receipt_url,
            balance_transaction: charge.balance_transaction,
            card_last4,
            created: charge.created,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expanded_session_resolves_charge() {
        let json = r#"{
            "id": "cs_123",
            "url": null,
            "payment_status": "paid",
            "payment_intent": {"latest_charge": "ch_987"}
        }"#;
        let session: SessionResponse = serde_json::from_str(json).unwrap();
        let session: CheckoutSession = session.into();
        assert!(session.is_paid());
        assert_eq!(session.latest_charge_id.as_deref(), Some("ch_987"));
    }

    #[test]
    fn test_unexpanded_session_has_no_charge() {
        let json = r#"{
            "id": "cs_123",
            "url": "https://checkout.example/pay",
            "payment_status": "unpaid",
            "payment_intent": "pi_555"
        }"#;
        let session: SessionResponse = serde_json::from_str(json).unwrap();
        let session: CheckoutSession = session.into();
        assert!(!session.is_paid());
        assert!(session.latest_charge_id.is_none());
        assert_eq!(session.url.as_deref(), Some("https://checkout.example/pay"));
    }

    #[test]
    fn test_charge_card_details() {
        let json = r#"{
            "id": "ch_987",
            "amount": 4900,
            "currency": "usd",
            "status": "succeeded",
            "refunded": false,
            "receipt_url": "https://receipts.example/r/1",
            "balance_transaction": "txn_42",
            "payment_method_details": {"card": {"last4": "4242"}},
            "created": 1760000000
        }"#;
        let charge: ChargeResponse = serde_json::from_str(json).unwrap();
        let charge: Charge = charge.into();
        assert_eq!(charge.card_last4.as_deref(), Some("4242"));
        assert_eq!(charge.balance_transaction.as_deref(), Some("txn_42"));
        assert!(!charge.refunded);
    }
}
