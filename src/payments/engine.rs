//! Payment reconciliation engine.
//!
//! `checkout` builds (or re-uses) the pending payment for a subscription and
//! returns the hosted-payment redirect URL. `confirm` reconciles the external
//! session against the subscription inside one database transaction, so a
//! payment can never end up marked paid without its subscription activated or
//! vice versa. A conditional update on the paid flag keeps concurrent
//! confirmations from applying the time extension twice.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::api::error::ApiError;
use crate::db::{parse_timestamp, DbPool, Package, Payment, Subscription, User};

use super::gateway::{Charge, CheckoutItem, PaymentGateway};

/// Charge metadata attached to the receipt
#[derive(Debug, Clone, Serialize)]
pub struct ChargeDetails {
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub transaction_id: Option<String>,
    pub card_last4: Option<String>,
    pub receipt_url: Option<String>,
    pub paid_at: String,
}

impl From<&Charge> for ChargeDetails {
    fn from(charge: &Charge) -> Self {
        let paid_at = DateTime::<Utc>::from_timestamp(charge.created, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        Self {
            amount: charge.amount,
            currency: charge.currency.clone(),
            status: charge.status.clone(),
            transaction_id: charge.balance_transaction.clone(),
            card_last4: charge.card_last4.clone(),
            receipt_url: charge.receipt_url.clone(),
            paid_at,
        }
    }
}

/// Everything the receipt page needs
#[derive(Debug, Serialize)]
pub struct ReceiptView {
    pub payment: Payment,
    pub subscription: Subscription,
    pub package: Package,
    pub charge: ChargeDetails,
}

/// Result of a confirmation attempt. The two non-completed variants are
/// report-and-stop outcomes: nothing was mutated and nothing should roll back.
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConfirmOutcome {
    Completed(Box<ReceiptView>),
    /// The external session never finished successfully
    Incomplete,
    /// The payment was already reconciled; replays are safe no-ops
    AlreadyConfirmed,
}

fn gateway_error(context: &str, err: anyhow::Error) -> ApiError {
    tracing::error!("{}: {}", context, err);
    ApiError::external_service("Payment provider request failed")
}

/// Create (or re-use) the pending payment for a subscription and return the
/// redirect URL of a fresh checkout session.
pub async fn checkout(
    db: &DbPool,
    gateway: &dyn PaymentGateway,
    public_url: &str,
    subscription_id: &str,
) -> Result<String, ApiError> {
    let subscription: Option<Subscription> =
        sqlx::query_as("SELECT * FROM subscriptions WHERE id = ? AND is_deleted = 0")
            .bind(subscription_id)
            .fetch_optional(db)
            .await?;
    let subscription =
        subscription.ok_or_else(|| ApiError::bad_request("Subscription not found"))?;

    let package: Option<Package> = sqlx::query_as("SELECT * FROM packages WHERE id = ?")
        .bind(&subscription.package_id)
        .fetch_optional(db)
        .await?;
    let package = package.ok_or_else(|| ApiError::bad_request("Package not found"))?;

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&subscription.user_id)
        .fetch_optional(db)
        .await?;
    let user = user.ok_or_else(|| ApiError::bad_request("User not found"))?;

    // Re-use an abandoned checkout instead of stacking up unpaid payments
    let existing: Option<Payment> = sqlx::query_as(
        "SELECT * FROM payments \
         WHERE subscription_id = ? AND user_id = ? AND is_paid = 0 AND is_deleted = 0",
    )
    .bind(&subscription.id)
    .bind(&user.id)
    .fetch_optional(db)
    .await?;

    let payment = match existing {
        Some(payment) => payment,
        None => {
            let id = uuid::Uuid::new_v4().to_string();
            let now = Utc::now().to_rfc3339();
            sqlx::query(
                "INSERT INTO payments (id, subscription_id, user_id, price, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(&subscription.id)
            .bind(&user.id)
            .bind(package.price)
            .bind(&now)
            .bind(&now)
            .execute(db)
            .await?;

            sqlx::query_as("SELECT * FROM payments WHERE id = ?")
                .bind(&id)
                .fetch_one(db)
                .await?
        }
    };

    // A customer is created at the processor at most once per user; the id
    // is persisted before it is used.
    let customer_id = match &user.customer_id {
        Some(id) => id.clone(),
        None => {
            let id = gateway
                .create_customer(&user.email, &user.name)
                .await
                .map_err(|e| gateway_error("Failed to create payment customer", e))?;
            sqlx::query("UPDATE users SET customer_id = ?, updated_at = ? WHERE id = ?")
                .bind(&id)
                .bind(Utc::now().to_rfc3339())
                .bind(&user.id)
                .execute(db)
                .await?;
            id
        }
    };

    let redirect = format!(
        "{}/api/payments/confirm-payment?session_id={{CHECKOUT_SESSION_ID}}&payment_id={}",
        public_url, payment.id
    );

    let item = CheckoutItem {
        name: package.title.clone(),
        amount: payment.price,
        quantity: 1,
    };

    let session = gateway
        .create_checkout_session(&item, &redirect, &redirect, &customer_id)
        .await
        .map_err(|e| gateway_error("Failed to create checkout session", e))?;

    session
        .url
        .ok_or_else(|| ApiError::external_service("Payment provider did not return a redirect URL"))
}

/// Reconcile a completed checkout session against its payment and
/// subscription. Idempotent at the business level: replays after success
/// report `AlreadyConfirmed` without touching state.
pub async fn confirm(
    db: &DbPool,
    gateway: &dyn PaymentGateway,
    session_id: &str,
    payment_id: &str,
) -> Result<ConfirmOutcome, ApiError> {
    let session = gateway
        .get_session(session_id)
        .await
        .map_err(|e| gateway_error("Failed to retrieve payment session", e))?;

    if !session.is_paid() {
        return Ok(ConfirmOutcome::Incomplete);
    }

    let payment: Option<Payment> =
        sqlx::query_as("SELECT * FROM payments WHERE id = ? AND is_deleted = 0")
            .bind(payment_id)
            .fetch_optional(db)
            .await?;
    let payment = payment.ok_or_else(|| ApiError::not_found("Payment not found"))?;

    if payment.is_paid {
        return Ok(ConfirmOutcome::AlreadyConfirmed);
    }

    let charge_id = session
        .latest_charge_id
        .as_deref()
        .ok_or_else(|| ApiError::external_service("Payment session has no charge"))?;
    let charge = gateway
        .get_charge(charge_id)
        .await
        .map_err(|e| gateway_error("Failed to retrieve charge", e))?;

    if charge.refunded {
        return Err(ApiError::bad_request("Payment has been refunded"));
    }

    // All reads and writes below happen in one transaction. The conditional
    // update on is_paid is the guard against two concurrent confirmations
    // both observing an unpaid payment.
    let mut tx = db.begin().await?;

    let subscription: Option<Subscription> =
        sqlx::query_as("SELECT * FROM subscriptions WHERE id = ?")
            .bind(&payment.subscription_id)
            .fetch_optional(&mut *tx)
            .await?;
    let subscription =
        subscription.ok_or_else(|| ApiError::not_found("Subscription not found"))?;

    let package: Option<Package> = sqlx::query_as("SELECT * FROM packages WHERE id = ?")
        .bind(&subscription.package_id)
        .fetch_optional(&mut *tx)
        .await?;
    let package = package.ok_or_else(|| ApiError::not_found("Package not found"))?;

    let now = Utc::now();

    // Stacking: remaining time on another active paid subscription carries
    // over; otherwise the clock starts now.
    let others: Vec<Subscription> = sqlx::query_as(
        "SELECT * FROM subscriptions \
         WHERE user_id = ? AND id != ? AND is_paid = 1 AND is_active = 1 AND is_deleted = 0",
    )
    .bind(&payment.user_id)
    .bind(&subscription.id)
    .fetch_all(&mut *tx)
    .await?;

    let base = others
        .iter()
        .filter_map(|s| s.expires_at.as_deref().and_then(parse_timestamp))
        .filter(|exp| *exp > now)
        .max()
        .unwrap_or(now);
    let expires_at = base + Duration::days(package.duration_days);

    let now_str = now.to_rfc3339();
    let claimed = sqlx::query(
        "UPDATE payments SET is_paid = 1, trn_id = ?, receipt_url = ?, updated_at = ? \
         WHERE id = ? AND is_paid = 0",
    )
    .bind(&charge.balance_transaction)
    .bind(&charge.receipt_url)
    .bind(&now_str)
    .bind(&payment.id)
    .execute(&mut *tx)
    .await?;
    if claimed.rows_affected() == 0 {
        // A concurrent confirmation won the race
        tx.rollback().await?;
        return Ok(ConfirmOutcome::AlreadyConfirmed);
    }

    sqlx::query(
        "UPDATE subscriptions SET is_paid = 1, is_active = 1, expires_at = ?, updated_at = ? \
         WHERE id = ?",
    )
    .bind(expires_at.to_rfc3339())
    .bind(&now_str)
    .bind(&subscription.id)
    .execute(&mut *tx)
    .await?;

    // Keep the one-active-subscription-per-user invariant inside the same
    // transaction that activates the new one.
    sqlx::query(
        "UPDATE subscriptions SET is_active = 0, updated_at = ? \
         WHERE user_id = ? AND id != ? AND is_active = 1",
    )
    .bind(&now_str)
    .bind(&payment.user_id)
    .bind(&subscription.id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let payment: Payment = sqlx::query_as("SELECT * FROM payments WHERE id = ?")
        .bind(payment_id)
        .fetch_one(db)
        .await?;
    let subscription: Subscription = sqlx::query_as("SELECT * FROM subscriptions WHERE id = ?")
        .bind(&subscription.id)
        .fetch_one(db)
        .await?;

    Ok(ConfirmOutcome::Completed(Box::new(ReceiptView {
        payment,
        subscription,
        package,
        charge: ChargeDetails::from(&charge),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::ErrorCode;
    use crate::payments::gateway::CheckoutSession;
    use crate::testutil;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MockGateway {
        session_paid: bool,
        charge_refunded: bool,
        customer_calls: AtomicUsize,
    }

    impl MockGateway {
        fn paid() -> Self {
            Self {
                session_paid: true,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl PaymentGateway for MockGateway {
        async fn create_customer(&self, _email: &str, _name: &str) -> Result<String> {
            self.customer_calls.fetch_add(1, Ordering::SeqCst);
            Ok("cus_test".to_string())
        }

        async fn create_checkout_session(
            &self,
            _item: &CheckoutItem,
            _success_url: &str,
            _cancel_url: &str,
            _customer_id: &str,
        ) -> Result<CheckoutSession> {
            Ok(CheckoutSession {
                id: "cs_test".to_string(),
                url: Some("https://checkout.test/cs_test".to_string()),
                payment_status: "unpaid".to_string(),
                latest_charge_id: None,
            })
        }

        async fn get_session(&self, session_id: &str) -> Result<CheckoutSession> {
            Ok(CheckoutSession {
                id: session_id.to_string(),
                url: None,
                payment_status: if self.session_paid { "paid" } else { "unpaid" }.to_string(),
                latest_charge_id: Some("ch_test".to_string()),
            })
        }

        async fn get_charge(&self, charge_id: &str) -> Result<Charge> {
            Ok(Charge {
                id: charge_id.to_string(),
                amount: 4900,
                currency: "usd".to_string(),
                status: "succeeded".to_string(),
                refunded: self.charge_refunded,
                receipt_url: Some("https://receipts.test/r/1".to_string()),
                balance_transaction: Some("txn_test".to_string()),
                card_last4: Some("4242".to_string()),
                created: Utc::now().timestamp(),
            })
        }
    }

    async fn subscription_row(db: &DbPool, id: &str) -> Subscription {
        sqlx::query_as("SELECT * FROM subscriptions WHERE id = ?")
            .bind(id)
            .fetch_one(db)
            .await
            .unwrap()
    }

    fn days_from_now(expires_at: &str) -> i64 {
        let exp = parse_timestamp(expires_at).unwrap();
        // Round to the nearest day so sub-second test latency never flakes
        let secs = (exp - Utc::now()).num_seconds();
        (secs + 43_200) / 86_400
    }

    #[tokio::test]
    async fn test_confirm_activates_subscription() {
        let db = testutil::pool().await;
        let gateway = MockGateway::paid();
        let user = testutil::create_user(&db, "anna@example.com", "pw", true).await;
        let package = testutil::create_package(&db, "Monthly", 4900, 30).await;
        let sub = testutil::create_subscription(&db, &user.id, &package.id).await;
        let payment = testutil::create_payment(&db, &sub.id, &user.id, package.price).await;

        let outcome = confirm(&db, &gateway, "cs_test", &payment.id).await.unwrap();
        let receipt = match outcome {
            ConfirmOutcome::Completed(receipt) => receipt,
            other => panic!("Expected completion, got {:?}", other),
        };

        assert!(receipt.payment.is_paid);
        assert_eq!(receipt.payment.trn_id.as_deref(), Some("txn_test"));
        assert!(receipt.subscription.is_paid);
        assert!(receipt.subscription.is_active);
        assert_eq!(
            days_from_now(receipt.subscription.expires_at.as_deref().unwrap()),
            30
        );
        assert_eq!(receipt.charge.card_last4.as_deref(), Some("4242"));
    }

    #[tokio::test]
    async fn test_confirm_is_idempotent() {
        let db = testutil::pool().await;
        let gateway = MockGateway::paid();
        let user = testutil::create_user(&db, "anna@example.com", "pw", true).await;
        let package = testutil::create_package(&db, "Monthly", 4900, 30).await;
        let sub = testutil::create_subscription(&db, &user.id, &package.id).await;
        let payment = testutil::create_payment(&db, &sub.id, &user.id, package.price).await;

        let first = confirm(&db, &gateway, "cs_test", &payment.id).await.unwrap();
        let expires_after_first = match first {
            ConfirmOutcome::Completed(receipt) => receipt.subscription.expires_at.clone(),
            other => panic!("Expected completion, got {:?}", other),
        };

        let second = confirm(&db, &gateway, "cs_test", &payment.id).await.unwrap();
        assert!(matches!(second, ConfirmOutcome::AlreadyConfirmed));

        // No double extension
        let sub = subscription_row(&db, &sub.id).await;
        assert_eq!(sub.expires_at, expires_after_first);
        assert!(sub.is_active);
    }

    #[tokio::test]
    async fn test_confirm_stacks_remaining_time() {
        let db = testutil::pool().await;
        let gateway = MockGateway::paid();
        let user = testutil::create_user(&db, "anna@example.com", "pw", true).await;

        // S1: active, 10 days left on a 30-day package
        let p30 = testutil::create_package(&db, "Monthly", 4900, 30).await;
        let s1 = testutil::create_subscription(&db, &user.id, &p30.id).await;
        let ten_days = (Utc::now() + Duration::days(10)).to_rfc3339();
        sqlx::query(
            "UPDATE subscriptions SET is_paid = 1, is_active = 1, expires_at = ? WHERE id = ?",
        )
        .bind(&ten_days)
        .bind(&s1.id)
        .execute(&db)
        .await
        .unwrap();

        // S2: a 7-day package being purchased
        let p7 = testutil::create_package(&db, "Weekly", 1900, 7).await;
        let s2 = testutil::create_subscription(&db, &user.id, &p7.id).await;
        let payment = testutil::create_payment(&db, &s2.id, &user.id, p7.price).await;

        let outcome = confirm(&db, &gateway, "cs_test", &payment.id).await.unwrap();
        let receipt = match outcome {
            ConfirmOutcome::Completed(receipt) => receipt,
            other => panic!("Expected completion, got {:?}", other),
        };

        // 10 remaining + 7 purchased = 17, not 7
        assert_eq!(
            days_from_now(receipt.subscription.expires_at.as_deref().unwrap()),
            17
        );

        // S1 deactivated, S2 is the only active subscription
        let s1 = subscription_row(&db, &s1.id).await;
        assert!(!s1.is_active);
        let active: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM subscriptions WHERE user_id = ? AND is_active = 1",
        )
        .bind(&user.id)
        .fetch_one(&db)
        .await
        .unwrap();
        assert_eq!(active.0, 1);
    }

    #[tokio::test]
    async fn test_confirm_starts_fresh_when_old_subscription_expired() {
        let db = testutil::pool().await;
        let gateway = MockGateway::paid();
        let user = testutil::create_user(&db, "anna@example.com", "pw", true).await;

        let p30 = testutil::create_package(&db, "Monthly", 4900, 30).await;
        let s1 = testutil::create_subscription(&db, &user.id, &p30.id).await;
        let past = (Utc::now() - Duration::days(3)).to_rfc3339();
        sqlx::query(
            "UPDATE subscriptions SET is_paid = 1, is_active = 1, expires_at = ? WHERE id = ?",
        )
        .bind(&past)
        .bind(&s1.id)
        .execute(&db)
        .await
        .unwrap();

        let p7 = testutil::create_package(&db, "Weekly", 1900, 7).await;
        let s2 = testutil::create_subscription(&db, &user.id, &p7.id).await;
        let payment = testutil::create_payment(&db, &s2.id, &user.id, p7.price).await;

        let outcome = confirm(&db, &gateway, "cs_test", &payment.id).await.unwrap();
        let receipt = match outcome {
            ConfirmOutcome::Completed(receipt) => receipt,
            other => panic!("Expected completion, got {:?}", other),
        };

        // Expired remainder does not stack
        assert_eq!(
            days_from_now(receipt.subscription.expires_at.as_deref().unwrap()),
            7
        );
    }

    #[tokio::test]
    async fn test_confirm_incomplete_session_mutates_nothing() {
        let db = testutil::pool().await;
        let gateway = MockGateway::default(); // session unpaid
        let user = testutil::create_user(&db, "anna@example.com", "pw", true).await;
        let package = testutil::create_package(&db, "Monthly", 4900, 30).await;
        let sub = testutil::create_subscription(&db, &user.id, &package.id).await;
        let payment = testutil::create_payment(&db, &sub.id, &user.id, package.price).await;

        let outcome = confirm(&db, &gateway, "cs_test", &payment.id).await.unwrap();
        assert!(matches!(outcome, ConfirmOutcome::Incomplete));

        let payment: Payment = sqlx::query_as("SELECT * FROM payments WHERE id = ?")
            .bind(&payment.id)
            .fetch_one(&db)
            .await
            .unwrap();
        assert!(!payment.is_paid);
        let sub = subscription_row(&db, &sub.id).await;
        assert!(!sub.is_active);
    }

    #[tokio::test]
    async fn test_confirm_rejects_refunded_charge() {
        let db = testutil::pool().await;
        let gateway = MockGateway {
            session_paid: true,
            charge_refunded: true,
            ..Default::default()
        };
        let user = testutil::create_user(&db, "anna@example.com", "pw", true).await;
        let package = testutil::create_package(&db, "Monthly", 4900, 30).await;
        let sub = testutil::create_subscription(&db, &user.id, &package.id).await;
        let payment = testutil::create_payment(&db, &sub.id, &user.id, package.price).await;

        let err = confirm(&db, &gateway, "cs_test", &payment.id)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadRequest);

        let payment: Payment = sqlx::query_as("SELECT * FROM payments WHERE id = ?")
            .bind(&payment.id)
            .fetch_one(&db)
            .await
            .unwrap();
        assert!(!payment.is_paid);
    }

    #[tokio::test]
    async fn test_confirm_unknown_payment_is_not_found() {
        let db = testutil::pool().await;
        let gateway = MockGateway::paid();

        let err = confirm(&db, &gateway, "cs_test", "missing")
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_checkout_reuses_pending_payment_and_customer() {
        let db = testutil::pool().await;
        let gateway = MockGateway::default();
        let user = testutil::create_user(&db, "anna@example.com", "pw", true).await;
        let package = testutil::create_package(&db, "Monthly", 4900, 30).await;
        let sub = testutil::create_subscription(&db, &user.id, &package.id).await;

        let url = checkout(&db, &gateway, "http://localhost:8080", &sub.id)
            .await
            .unwrap();
        assert_eq!(url, "https://checkout.test/cs_test");

        // Retry of an abandoned checkout re-uses the pending payment
        checkout(&db, &gateway, "http://localhost:8080", &sub.id)
            .await
            .unwrap();

        let payments: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM payments WHERE subscription_id = ?")
                .bind(&sub.id)
                .fetch_one(&db)
                .await
                .unwrap();
        assert_eq!(payments.0, 1);

        // The processor-side customer is only ever created once
        assert_eq!(gateway.customer_calls.load(Ordering::SeqCst), 1);
        let user: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(&user.id)
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(user.customer_id.as_deref(), Some("cus_test"));
    }

    #[tokio::test]
    async fn test_checkout_unknown_subscription_is_bad_request() {
        let db = testutil::pool().await;
        let gateway = MockGateway::default();

        let err = checkout(&db, &gateway, "http://localhost:8080", "missing")
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadRequest);
    }
}
