//! OTP lifecycle: issue, resend, verify.
//!
//! Each user has exactly one verification record. Arming it writes a fresh
//! six-digit code with a short expiry window; a resend overwrites any pending
//! code, so only the most recent one can succeed. Consumption resets the code
//! to the 0 sentinel and clears the window, which makes replays fail.

use chrono::{Duration, Utc};
use rand::Rng;
use subtle::ConstantTimeEq;

use crate::api::error::ApiError;
use crate::auth::{normalize_email, tokens};
use crate::config::AuthConfig;
use crate::db::{parse_timestamp, DbPool, User, UserResponse, Verification, VerifiedSessionResponse};
use crate::notifications::EmailService;

/// Sentinel stored after a code is consumed
pub const OTP_CONSUMED: i64 = 0;

/// Generate a six-digit numeric code
pub fn generate_otp() -> i64 {
    rand::rng().random_range(100_000..1_000_000)
}

/// Constant-time comparison of the submitted code against the stored one.
/// The consumed sentinel never matches.
fn otp_matches(submitted: i64, stored: i64) -> bool {
    if stored == OTP_CONSUMED {
        return false;
    }
    submitted.to_le_bytes().ct_eq(&stored.to_le_bytes()).into()
}

/// Arm (or re-arm) the verification record with a fresh code and window,
/// clearing the verified flag. Invalidates any previously pending code.
pub async fn arm(db: &DbPool, user_id: &str, ttl_minutes: i64) -> Result<i64, ApiError> {
    let code = generate_otp();
    let now = Utc::now();
    let expires_at = (now + Duration::minutes(ttl_minutes)).to_rfc3339();

    sqlx::query(
        "INSERT INTO verifications (id, user_id, otp, expires_at, status, created_at, updated_at) \
         VALUES (?, ?, ?, ?, 0, ?, ?) \
         ON CONFLICT(user_id) DO UPDATE SET \
             otp = excluded.otp, expires_at = excluded.expires_at, \
             status = 0, updated_at = excluded.updated_at",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(code)
    .bind(&expires_at)
    .bind(now.to_rfc3339())
    .bind(now.to_rfc3339())
    .execute(db)
    .await?;

    Ok(code)
}

/// Re-arm for a password reset: fresh code and window, but the verified flag
/// is left alone because the reset step requires it to remain true.
pub async fn arm_for_reset(db: &DbPool, user_id: &str, ttl_minutes: i64) -> Result<i64, ApiError> {
    let code = generate_otp();
    let now = Utc::now();
    let expires_at = (now + Duration::minutes(ttl_minutes)).to_rfc3339();

    sqlx::query(
        "INSERT INTO verifications (id, user_id, otp, expires_at, status, created_at, updated_at) \
         VALUES (?, ?, ?, ?, 0, ?, ?) \
         ON CONFLICT(user_id) DO UPDATE SET \
             otp = excluded.otp, expires_at = excluded.expires_at, \
             updated_at = excluded.updated_at",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(code)
    .bind(&expires_at)
    .bind(now.to_rfc3339())
    .bind(now.to_rfc3339())
    .execute(db)
    .await?;

    Ok(code)
}

/// Arm the record, email the code, and return the correlation token that
/// binds the upcoming verification to this user.
pub async fn issue(
    db: &DbPool,
    email: &EmailService,
    auth: &AuthConfig,
    user: &User,
) -> Result<String, ApiError> {
    let code = arm(db, &user.id, auth.otp_ttl_minutes).await?;

    email
        .send_otp_email(&user.email, code, auth.otp_ttl_minutes)
        .await
        .map_err(|e| {
            tracing::error!("Failed to send OTP email to {}: {}", user.email, e);
            ApiError::internal("Failed to send OTP email")
        })?;

    tokens::issue(
        &user.id,
        None,
        Some(&user.email),
        &auth.access_secret,
        Duration::minutes(auth.otp_ttl_minutes),
    )
    .map_err(|_| ApiError::internal("Failed to issue verification token"))
}

/// Resend a code to an account that has not completed verification yet.
pub async fn resend(
    db: &DbPool,
    email_svc: &EmailService,
    auth: &AuthConfig,
    email: &str,
) -> Result<String, ApiError> {
    let email = normalize_email(email);

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(db)
        .await?;
    let user = user.ok_or_else(|| ApiError::bad_request("You are not registered with this email"))?;

    if user.status == "blocked" {
        return Err(ApiError::forbidden("This account has been blocked"));
    }
    if user.is_deleted {
        return Err(ApiError::forbidden("This account has been deleted"));
    }

    issue(db, email_svc, auth, &user).await
}

/// Verify a submitted code against the record bound to the correlation token.
/// Flips the verified flag exactly once and returns a long-lived session token.
pub async fn verify(
    db: &DbPool,
    auth: &AuthConfig,
    token: Option<&str>,
    submitted: i64,
) -> Result<VerifiedSessionResponse, ApiError> {
    let token = token.ok_or_else(|| ApiError::unauthorized("You are not authorized"))?;

    let claims = tokens::verify(token, &auth.access_secret)
        .map_err(|_| ApiError::session_expired("Session has expired. Please request a new code"))?;

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&claims.sub)
        .fetch_optional(db)
        .await?;
    let user = user.ok_or_else(|| ApiError::not_found("User not found"))?;

    let verification: Option<Verification> =
        sqlx::query_as("SELECT * FROM verifications WHERE user_id = ?")
            .bind(&user.id)
            .fetch_optional(db)
            .await?;
    let verification =
        verification.ok_or_else(|| ApiError::not_found("Verification record not found"))?;

    let expires_at = verification
        .expires_at
        .as_deref()
        .and_then(parse_timestamp)
        .ok_or_else(|| ApiError::session_expired("OTP has expired. Please request a new one"))?;
    if Utc::now() > expires_at {
        return Err(ApiError::session_expired(
            "OTP has expired. Please request a new one",
        ));
    }

    if !otp_matches(submitted, verification.otp) {
        return Err(ApiError::bad_request("OTP did not match"));
    }

    // Consume the code; the otp guard makes the flip happen at most once
    // even under concurrent submissions.
    let consumed = sqlx::query(
        "UPDATE verifications SET otp = 0, expires_at = NULL, status = 1, updated_at = ? \
         WHERE user_id = ? AND otp = ?",
    )
    .bind(Utc::now().to_rfc3339())
    .bind(&user.id)
    .bind(verification.otp)
    .execute(db)
    .await?;
    if consumed.rows_affected() == 0 {
        return Err(ApiError::bad_request("OTP did not match"));
    }

    let session_token = tokens::issue(
        &user.id,
        Some(&user.role),
        Some(&user.email),
        &auth.access_secret,
        Duration::days(auth.session_ttl_days),
    )
    .map_err(|_| ApiError::internal("Failed to issue session token"))?;

    Ok(VerifiedSessionResponse {
        user: UserResponse::from(user),
        token: session_token,
    })
}
