mod alert_posts;
pub mod auth;
mod emergency_contacts;
pub mod error;
mod otp;
mod packages;
mod payments;
pub mod response;
mod safe_zones;
mod subscriptions;
mod users;
mod validation;

use axum::{
    routing::{delete, get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Session routes; change-password authenticates via the extractor
    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/refresh-token", post(auth::refresh_token))
        .route("/change-password", patch(auth::change_password))
        .route("/forgot-password", patch(auth::forgot_password))
        .route("/reset-password", patch(auth::reset_password));

    let otp_routes = Router::new()
        .route("/resend-otp", post(otp::resend_otp))
        .route("/verify-otp", post(otp::verify_otp));

    let user_routes = Router::new()
        .route("/", post(users::register))
        .route("/", get(users::list_users))
        .route("/:id", get(users::get_user))
        .route("/:id", patch(users::update_user))
        .route("/:id", delete(users::delete_user));

    let package_routes = Router::new()
        .route("/", post(packages::create_package))
        .route("/", get(packages::list_packages))
        .route("/:id", get(packages::get_package))
        .route("/:id", patch(packages::update_package))
        .route("/:id", delete(packages::delete_package));

    let subscription_routes = Router::new()
        .route("/", post(subscriptions::create_subscription))
        .route("/", get(subscriptions::list_subscriptions))
        .route("/:id", get(subscriptions::get_subscription))
        .route("/:id", patch(subscriptions::update_subscription))
        .route("/:id", delete(subscriptions::delete_subscription));

    // confirm-payment is the unauthenticated redirect landing from the
    // hosted checkout page
    let payment_routes = Router::new()
        .route("/checkout", post(payments::checkout))
        .route("/confirm-payment", get(payments::confirm_payment));

    let safe_zone_routes = Router::new()
        .route("/", post(safe_zones::create_safe_zone))
        .route("/", get(safe_zones::list_safe_zones))
        .route("/:id", get(safe_zones::get_safe_zone))
        .route("/:id", patch(safe_zones::update_safe_zone))
        .route("/:id", delete(safe_zones::delete_safe_zone));

    let emergency_contact_routes = Router::new()
        .route("/", post(emergency_contacts::create_contact))
        .route("/", get(emergency_contacts::list_contacts))
        .route("/:id", get(emergency_contacts::get_contact))
        .route("/:id", patch(emergency_contacts::update_contact))
        .route("/:id", delete(emergency_contacts::delete_contact));

    let alert_post_routes = Router::new()
        .route("/", post(alert_posts::create_post))
        .route("/", get(alert_posts::list_posts))
        .route("/my-posts", get(alert_posts::list_my_posts))
        .route("/:id", get(alert_posts::get_post))
        .route("/:id", patch(alert_posts::update_post))
        .route("/:id", delete(alert_posts::delete_post));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/auth", auth_routes)
        .nest("/api/otp", otp_routes)
        .nest("/api/users", user_routes)
        .nest("/api/packages", package_routes)
        .nest("/api/subscriptions", subscription_routes)
        .nest("/api/payments", payment_routes)
        .nest("/api/safe-zones", safe_zone_routes)
        .nest("/api/emergency-contacts", emergency_contact_routes)
        .nest("/api/alert-posts", alert_post_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
