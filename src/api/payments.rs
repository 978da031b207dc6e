//! Checkout and payment-confirmation endpoints.

use axum::{
    extract::{Query, State},
    Json,
};
use std::sync::Arc;

use crate::db::{CheckoutRequest, CheckoutResponse, ConfirmPaymentParams, Role};
use crate::payments::engine::{self, ConfirmOutcome};
use crate::AppState;

use super::auth::AuthUser;
use super::error::ApiError;
use super::response::ApiResponse;

pub async fn checkout(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(payload): Json<CheckoutRequest>,
) -> Result<Json<ApiResponse<CheckoutResponse>>, ApiError> {
    auth.require_role(&[Role::User])?;

    let url = engine::checkout(
        &state.db,
        state.payments.as_ref(),
        &state.config.server.public_url,
        &payload.subscription_id,
    )
    .await?;

    Ok(ApiResponse::ok(
        "Checkout session created successfully",
        CheckoutResponse { url },
    ))
}

/// Landing endpoint for the hosted-checkout redirect. Unauthenticated: the
/// shopper arrives here from the payment provider, not from the app.
pub async fn confirm_payment(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ConfirmPaymentParams>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let outcome = engine::confirm(
        &state.db,
        state.payments.as_ref(),
        &params.session_id,
        &params.payment_id,
    )
    .await?;

    match outcome {
        ConfirmOutcome::Completed(receipt) => {
            let data = serde_json::to_value(&receipt)
                .map_err(|_| ApiError::internal("Failed to serialize receipt"))?;
            Ok(ApiResponse::ok("Payment confirmed successfully", data))
        }
        ConfirmOutcome::Incomplete => {
            Ok(ApiResponse::failed("Payment session is not completed"))
        }
        ConfirmOutcome::AlreadyConfirmed => {
            Ok(ApiResponse::failed("This payment is already confirmed"))
        }
    }
}
