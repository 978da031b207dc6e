//! Session endpoints and the authenticated-user extractor.

use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{request::Parts, HeaderMap},
    Json,
};
use std::sync::Arc;

use crate::auth::session::{self, ClientInfo};
use crate::auth::tokens::{self, Claims};
use crate::db::{
    ChangePasswordRequest, ForgotPasswordRequest, ForgotPasswordResponse, LoginRequest,
    LoginResponse, RefreshTokenRequest, RefreshTokenResponse, ResetPasswordRequest, Role, User,
    UserResponse, Verification,
};
use crate::AppState;

use super::error::ApiError;
use super::response::ApiResponse;

/// Extract the bearer token from request headers
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Client metadata recorded in the login device history
pub fn client_info(headers: &HeaderMap) -> ClientInfo {
    // X-Forwarded-For is a comma-separated list; the first entry is the client
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .map(|ip| ip.trim().to_string())
                .filter(|ip| !ip.is_empty())
        });

    let user_agent = headers
        .get("user-agent")
        .and_then(|h| h.to_str().ok())
        .map(str::to_string);

    ClientInfo { ip, user_agent }
}

/// The authenticated caller. Extracting it verifies the access token and
/// rejects deleted, blocked and unverified accounts.
pub struct AuthUser {
    pub user: User,
    pub claims: Claims,
}

impl AuthUser {
    pub fn role(&self) -> Role {
        self.user.role.parse().unwrap_or(Role::User)
    }

    pub fn is_privileged(&self) -> bool {
        Role::PRIVILEGED.contains(&self.role())
    }

    pub fn require_role(&self, allowed: &[Role]) -> Result<(), ApiError> {
        if allowed.contains(&self.role()) {
            Ok(())
        } else {
            Err(ApiError::forbidden(
                "You do not have permission to perform this action",
            ))
        }
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("You are not authorized"))?;

        let claims = tokens::verify(&token, &state.config.auth.access_secret)
            .map_err(|_| ApiError::unauthorized("Invalid or expired token"))?;

        let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(&claims.sub)
            .fetch_optional(&state.db)
            .await?;
        let user = user.ok_or_else(|| ApiError::not_found("User not found"))?;

        if user.is_deleted {
            return Err(ApiError::forbidden("This account has been deleted"));
        }
        if user.status == "blocked" {
            return Err(ApiError::forbidden("This account has been blocked"));
        }

        let verification: Option<Verification> =
            sqlx::query_as("SELECT * FROM verifications WHERE user_id = ?")
                .bind(&user.id)
                .fetch_optional(&state.db)
                .await?;
        if !verification.map(|v| v.status).unwrap_or(false) {
            return Err(ApiError::forbidden("Your account is not verified"));
        }

        Ok(AuthUser { user, claims })
    }
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, ApiError> {
    let client = client_info(&headers);
    let result = session::login(&state.db, &state.config.auth, &payload, &client).await?;
    Ok(ApiResponse::ok("Logged in successfully", result))
}

pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RefreshTokenRequest>,
) -> Result<Json<ApiResponse<RefreshTokenResponse>>, ApiError> {
    let access_token =
        session::refresh(&state.db, &state.config.auth, &payload.refresh_token).await?;
    Ok(ApiResponse::ok(
        "Access token refreshed successfully",
        RefreshTokenResponse { access_token },
    ))
}

pub async fn change_password(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    let user = session::change_password(&state.db, &auth.user.id, &payload).await?;
    Ok(ApiResponse::ok("Password changed successfully", user))
}

pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<ApiResponse<ForgotPasswordResponse>>, ApiError> {
    let (email, token) =
        session::forgot_password(&state.db, &state.email, &state.config.auth, &payload.email)
            .await?;
    Ok(ApiResponse::ok(
        "A reset code has been sent to your email",
        ForgotPasswordResponse { email, token },
    ))
}

pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    let token = extract_token(&headers)
        .ok_or_else(|| ApiError::unauthorized("You are not authorized"))?;
    let user = session::reset_password(&state.db, &state.config.auth, &token, &payload).await?;
    Ok(ApiResponse::ok("Password reset successfully", user))
}
