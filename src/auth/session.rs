//! Login, password management and token refresh.

use chrono::{Duration, Utc};

use crate::api::error::ApiError;
use crate::auth::{normalize_email, password, tokens};
use crate::config::AuthConfig;
use crate::db::{
    parse_timestamp, ChangePasswordRequest, DbPool, LoginRequest, LoginResponse,
    ResetPasswordRequest, User, UserResponse, Verification,
};

/// Request metadata recorded in the login device history
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Best-effort User-Agent classification for the device history. Coarse on
/// purpose; unknown agents land as a bare desktop entry.
pub fn classify_user_agent(ua: &str) -> (Option<String>, Option<String>, String) {
    let browser = if ua.contains("Edg/") {
        Some("Edge")
    } else if ua.contains("OPR/") || ua.contains("Opera") {
        Some("Opera")
    } else if ua.contains("Chrome/") {
        Some("Chrome")
    } else if ua.contains("Firefox/") {
        Some("Firefox")
    } else if ua.contains("Safari/") {
        Some("Safari")
    } else {
        None
    };

    let os = if ua.contains("Windows") {
        Some("Windows")
    } else if ua.contains("Android") {
        Some("Android")
    } else if ua.contains("iPhone") || ua.contains("iPad") {
        Some("iOS")
    } else if ua.contains("Mac OS X") {
        Some("macOS")
    } else if ua.contains("Linux") {
        Some("Linux")
    } else {
        None
    };

    let device = if ua.contains("Mobile") || ua.contains("Android") || ua.contains("iPhone") {
        "Mobile"
    } else if ua.contains("iPad") || ua.contains("Tablet") {
        "Tablet"
    } else {
        "Desktop"
    };

    (
        browser.map(str::to_string),
        os.map(str::to_string),
        device.to_string(),
    )
}

async fn append_device_history(
    db: &DbPool,
    user_id: &str,
    client: &ClientInfo,
) -> Result<(), ApiError> {
    let (browser, os, device) = client
        .user_agent
        .as_deref()
        .map(classify_user_agent)
        .unwrap_or((None, None, "Desktop".to_string()));

    sqlx::query(
        "INSERT INTO device_history (id, user_id, ip, browser, os, device, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(&client.ip)
    .bind(&browser)
    .bind(&os)
    .bind(&device)
    .bind(Utc::now().to_rfc3339())
    .execute(db)
    .await?;

    Ok(())
}

async fn load_verification(db: &DbPool, user_id: &str) -> Result<Option<Verification>, ApiError> {
    let row = sqlx::query_as("SELECT * FROM verifications WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(db)
        .await?;
    Ok(row)
}

/// Authenticate by email and password. The gates run in a fixed order:
/// existence, soft-delete, password, verification.
pub async fn login(
    db: &DbPool,
    auth: &AuthConfig,
    payload: &LoginRequest,
    client: &ClientInfo,
) -> Result<LoginResponse, ApiError> {
    let email = normalize_email(&payload.email);

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(db)
        .await?;
    let user = user.ok_or_else(|| ApiError::not_found("User not found"))?;

    if user.is_deleted {
        return Err(ApiError::forbidden("This account has been deleted"));
    }

    if !password::verify_password(&payload.password, &user.password_hash) {
        return Err(ApiError::bad_request("Password does not match"));
    }

    let verified = load_verification(db, &user.id)
        .await?
        .map(|v| v.status)
        .unwrap_or(false);
    if !verified {
        return Err(ApiError::forbidden("User account is not verified"));
    }

    let access_token = tokens::issue(
        &user.id,
        Some(&user.role),
        None,
        &auth.access_secret,
        Duration::hours(auth.access_ttl_hours),
    )
    .map_err(|_| ApiError::internal("Failed to issue access token"))?;

    let refresh_token = tokens::issue(
        &user.id,
        Some(&user.role),
        None,
        &auth.refresh_secret,
        Duration::days(auth.refresh_ttl_days),
    )
    .map_err(|_| ApiError::internal("Failed to issue refresh token"))?;

    append_device_history(db, &user.id, client).await?;

    Ok(LoginResponse {
        user: UserResponse::from(user),
        access_token,
        refresh_token,
    })
}

pub async fn change_password(
    db: &DbPool,
    user_id: &str,
    payload: &ChangePasswordRequest,
) -> Result<UserResponse, ApiError> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(db)
        .await?;
    let user = user.ok_or_else(|| ApiError::not_found("User not found"))?;

    if !password::verify_password(&payload.old_password, &user.password_hash) {
        return Err(ApiError::forbidden("Old password does not match"));
    }
    if payload.new_password != payload.confirm_password {
        return Err(ApiError::bad_request(
            "New password and confirm password do not match",
        ));
    }

    let hash = password::hash_password(&payload.new_password)
        .map_err(|_| ApiError::internal("Failed to hash password"))?;

    sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(&hash)
        .bind(Utc::now().to_rfc3339())
        .bind(user_id)
        .execute(db)
        .await?;

    Ok(UserResponse::from(user))
}

/// Start a password reset: re-arm the OTP record and hand back a short-lived
/// correlation token. The error response reveals account existence; accepted
/// for now, see the design notes.
pub async fn forgot_password(
    db: &DbPool,
    email_svc: &crate::notifications::EmailService,
    auth: &AuthConfig,
    email: &str,
) -> Result<(String, String), ApiError> {
    let email = normalize_email(email);

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(db)
        .await?;
    let user = user.ok_or_else(|| ApiError::not_found("User not found"))?;

    if user.is_deleted {
        return Err(ApiError::not_found("User not found"));
    }

    let token = tokens::issue(
        &user.id,
        None,
        Some(&user.email),
        &auth.access_secret,
        Duration::minutes(auth.otp_ttl_minutes),
    )
    .map_err(|_| ApiError::internal("Failed to issue reset token"))?;

    let code = crate::auth::otp::arm_for_reset(db, &user.id, auth.otp_ttl_minutes).await?;

    email_svc
        .send_reset_email(&user.email, code, auth.otp_ttl_minutes)
        .await
        .map_err(|e| {
            tracing::error!("Failed to send reset email to {}: {}", user.email, e);
            ApiError::internal("Failed to send reset email")
        })?;

    Ok((email, token))
}

/// Complete a password reset. Requires the correlation token from
/// `forgot_password`, a verified account, and the reset window to still be
/// open.
pub async fn reset_password(
    db: &DbPool,
    auth: &AuthConfig,
    token: &str,
    payload: &ResetPasswordRequest,
) -> Result<UserResponse, ApiError> {
    let claims = tokens::verify(token, &auth.access_secret)
        .map_err(|_| ApiError::session_expired("Session has expired. Please try again"))?;

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&claims.sub)
        .fetch_optional(db)
        .await?;
    let user = user.ok_or_else(|| ApiError::not_found("User not found"))?;

    let verification = load_verification(db, &user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Verification record not found"))?;

    let window_open = verification
        .expires_at
        .as_deref()
        .and_then(parse_timestamp)
        .map(|exp| Utc::now() <= exp)
        .unwrap_or(false);
    if !window_open {
        return Err(ApiError::forbidden("Session has expired"));
    }

    if !verification.status {
        return Err(ApiError::forbidden("OTP is not verified yet"));
    }

    if payload.new_password != payload.confirm_password {
        return Err(ApiError::bad_request(
            "New password and confirm password do not match",
        ));
    }

    let hash = password::hash_password(&payload.new_password)
        .map_err(|_| ApiError::internal("Failed to hash password"))?;

    let now = Utc::now().to_rfc3339();
    sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(&hash)
        .bind(&now)
        .bind(&user.id)
        .execute(db)
        .await?;
    sqlx::query(
        "UPDATE verifications SET otp = 0, status = 1, updated_at = ? WHERE user_id = ?",
    )
    .bind(&now)
    .bind(&user.id)
    .execute(db)
    .await?;

    Ok(UserResponse::from(user))
}

/// Exchange a refresh token for a fresh access token. The refresh token
/// itself is deliberately not rotated.
pub async fn refresh(db: &DbPool, auth: &AuthConfig, token: &str) -> Result<String, ApiError> {
    let claims = tokens::verify(token, &auth.refresh_secret)
        .map_err(|_| ApiError::unauthorized("Invalid refresh token"))?;

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&claims.sub)
        .fetch_optional(db)
        .await?;
    let user = user.ok_or_else(|| ApiError::not_found("User not found"))?;

    if user.is_deleted {
        return Err(ApiError::forbidden("This account has been deleted"));
    }

    tokens::issue(
        &user.id,
        Some(&user.role),
        None,
        &auth.access_secret,
        Duration::hours(auth.access_ttl_hours),
    )
    .map_err(|_| ApiError::internal("Failed to issue access token"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::ErrorCode;
    use crate::notifications::EmailService;
    use crate::testutil;

    fn login_request(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_login_returns_decodable_token_pair() {
        let db = testutil::pool().await;
        let auth = testutil::auth_config();
        let user = testutil::create_user(&db, "anna@example.com", "hunter2!", true).await;

        let result = login(
            &db,
            &auth,
            &login_request("  Anna@Example.com ", "hunter2!"),
            &ClientInfo::default(),
        )
        .await
        .unwrap();

        let access = tokens::verify(&result.access_token, &auth.access_secret).unwrap();
        assert_eq!(access.sub, user.id);
        assert_eq!(access.role.as_deref(), Some("user"));

        let refresh_claims = tokens::verify(&result.refresh_token, &auth.refresh_secret).unwrap();
        assert_eq!(refresh_claims.sub, user.id);

        // Refresh token must not validate against the access secret
        assert!(tokens::verify(&result.refresh_token, &auth.access_secret).is_err());
    }

    #[tokio::test]
    async fn test_login_gate_order() {
        let db = testutil::pool().await;
        let auth = testutil::auth_config();

        // Unknown user
        let err = login(
            &db,
            &auth,
            &login_request("ghost@example.com", "pw"),
            &ClientInfo::default(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);

        // Unverified account with the correct password is rejected
        let user = testutil::create_user(&db, "new@example.com", "pw", false).await;
        let err = login(
            &db,
            &auth,
            &login_request("new@example.com", "pw"),
            &ClientInfo::default(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);

        // Wrong password on a verified account
        sqlx::query("UPDATE verifications SET status = 1 WHERE user_id = ?")
            .bind(&user.id)
            .execute(&db)
            .await
            .unwrap();
        let err = login(
            &db,
            &auth,
            &login_request("new@example.com", "wrong"),
            &ClientInfo::default(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadRequest);

        // Soft-deleted account wins over the password check
        sqlx::query("UPDATE users SET is_deleted = 1 WHERE id = ?")
            .bind(&user.id)
            .execute(&db)
            .await
            .unwrap();
        let err = login(
            &db,
            &auth,
            &login_request("new@example.com", "wrong"),
            &ClientInfo::default(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn test_login_appends_device_history() {
        let db = testutil::pool().await;
        let auth = testutil::auth_config();
        let user = testutil::create_user(&db, "anna@example.com", "pw", true).await;

        let client = ClientInfo {
            ip: Some("203.0.113.7".to_string()),
            user_agent: Some(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/120.0".to_string(),
            ),
        };

        login(&db, &auth, &login_request("anna@example.com", "pw"), &client)
            .await
            .unwrap();
        login(&db, &auth, &login_request("anna@example.com", "pw"), &client)
            .await
            .unwrap();

        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM device_history WHERE user_id = ?")
                .bind(&user.id)
                .fetch_one(&db)
                .await
                .unwrap();
        assert_eq!(count.0, 2);
    }

    #[tokio::test]
    async fn test_change_password() {
        let db = testutil::pool().await;
        let user = testutil::create_user(&db, "anna@example.com", "old-pw", true).await;

        let err = change_password(
            &db,
            &user.id,
            &ChangePasswordRequest {
                old_password: "wrong".to_string(),
                new_password: "new-pw".to_string(),
                confirm_password: "new-pw".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);

        let err = change_password(
            &db,
            &user.id,
            &ChangePasswordRequest {
                old_password: "old-pw".to_string(),
                new_password: "new-pw".to_string(),
                confirm_password: "other".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadRequest);

        change_password(
            &db,
            &user.id,
            &ChangePasswordRequest {
                old_password: "old-pw".to_string(),
                new_password: "new-pw".to_string(),
                confirm_password: "new-pw".to_string(),
            },
        )
        .await
        .unwrap();

        let updated: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(&user.id)
            .fetch_one(&db)
            .await
            .unwrap();
        assert!(password::verify_password("new-pw", &updated.password_hash));
    }

    #[tokio::test]
    async fn test_forgot_then_reset_password() {
        let db = testutil::pool().await;
        let auth = testutil::auth_config();
        let email_svc = EmailService::unconfigured();
        let user = testutil::create_user(&db, "anna@example.com", "old-pw", true).await;

        let (_, token) = forgot_password(&db, &email_svc, &auth, "anna@example.com")
            .await
            .unwrap();

        reset_password(
            &db,
            &auth,
            &token,
            &ResetPasswordRequest {
                new_password: "fresh-pw".to_string(),
                confirm_password: "fresh-pw".to_string(),
            },
        )
        .await
        .unwrap();

        let updated: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(&user.id)
            .fetch_one(&db)
            .await
            .unwrap();
        assert!(password::verify_password("fresh-pw", &updated.password_hash));
    }

    #[tokio::test]
    async fn test_reset_rejects_closed_window() {
        let db = testutil::pool().await;
        let auth = testutil::auth_config();
        let email_svc = EmailService::unconfigured();
        let user = testutil::create_user(&db, "anna@example.com", "pw", true).await;

        let (_, token) = forgot_password(&db, &email_svc, &auth, "anna@example.com")
            .await
            .unwrap();

        sqlx::query("UPDATE verifications SET expires_at = NULL WHERE user_id = ?")
            .bind(&user.id)
            .execute(&db)
            .await
            .unwrap();

        let err = reset_password(
            &db,
            &auth,
            &token,
            &ResetPasswordRequest {
                new_password: "x".to_string(),
                confirm_password: "x".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn test_refresh_rejects_wrong_secret() {
        let db = testutil::pool().await;
        let auth = testutil::auth_config();
        let user = testutil::create_user(&db, "anna@example.com", "pw", true).await;

        // A token signed with the access secret is not a refresh token
        let forged = tokens::issue(
            &user.id,
            Some("user"),
            None,
            &auth.access_secret,
            chrono::Duration::days(1),
        )
        .unwrap();

        let err = refresh(&db, &auth, &forged).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unauthorized);
    }

    #[tokio::test]
    async fn test_refresh_issues_access_token() {
        let db = testutil::pool().await;
        let auth = testutil::auth_config();
        let user = testutil::create_user(&db, "anna@example.com", "pw", true).await;

        let refresh_token = tokens::issue(
            &user.id,
            Some("user"),
            None,
            &auth.refresh_secret,
            chrono::Duration::days(30),
        )
        .unwrap();

        let access = refresh(&db, &auth, &refresh_token).await.unwrap();
        let claims = tokens::verify(&access, &auth.access_secret).unwrap();
        assert_eq!(claims.sub, user.id);
    }

    #[test]
    fn test_classify_user_agent() {
        let (browser, os, device) =
            classify_user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/120.0");
        assert_eq!(browser.as_deref(), Some("Chrome"));
        assert_eq!(os.as_deref(), Some("Windows"));
        assert_eq!(device, "Desktop");

        let (browser, os, device) = classify_user_agent(
            "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) Safari/604.1 Mobile",
        );
        assert_eq!(browser.as_deref(), Some("Safari"));
        assert_eq!(os.as_deref(), Some("iOS"));
        assert_eq!(device, "Mobile");

        let (browser, os, device) = classify_user_agent("curl/8.0");
        assert!(browser.is_none());
        assert!(os.is_none());
        assert_eq!(device, "Desktop");
    }
}
