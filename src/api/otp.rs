//! OTP endpoints: resend and verify.

use axum::{extract::State, http::HeaderMap, Json};
use std::sync::Arc;

use crate::auth::otp;
use crate::db::{OtpChallengeResponse, ResendOtpRequest, VerifiedSessionResponse, VerifyOtpRequest};
use crate::AppState;

use super::auth::extract_token;
use super::error::ApiError;
use super::response::ApiResponse;

pub async fn resend_otp(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ResendOtpRequest>,
) -> Result<Json<ApiResponse<OtpChallengeResponse>>, ApiError> {
    let token = otp::resend(&state.db, &state.email, &state.config.auth, &payload.email).await?;
    Ok(ApiResponse::ok(
        "OTP sent successfully",
        OtpChallengeResponse { token },
    ))
}

pub async fn verify_otp(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<VerifyOtpRequest>,
) -> Result<Json<ApiResponse<VerifiedSessionResponse>>, ApiError> {
    let token = extract_token(&headers);
    let result = otp::verify(
        &state.db,
        &state.config.auth,
        token.as_deref(),
        payload.otp,
    )
    .await?;
    Ok(ApiResponse::ok("OTP verified successfully", result))
}
