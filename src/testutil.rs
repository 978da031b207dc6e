//! Shared fixtures for module tests.

use chrono::Utc;

use crate::auth::password::hash_password;
use crate::config::AuthConfig;
use crate::db::{self, DbPool, Package, Payment, Subscription, User};

pub async fn pool() -> DbPool {
    db::init_memory().await.expect("in-memory database")
}

pub fn auth_config() -> AuthConfig {
    AuthConfig {
        access_secret: "test-access-secret".to_string(),
        refresh_secret: "test-refresh-secret".to_string(),
        ..AuthConfig::default()
    }
}

pub async fn create_user(db: &DbPool, email: &str, password: &str, verified: bool) -> User {
    let id = uuid::Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    let hash = hash_password(password).unwrap();

    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash, role, status, created_at, updated_at) \
         VALUES (?, 'Test User', ?, ?, 'user', 'active', ?, ?)",
    )
    .bind(&id)
    .bind(email)
    .bind(&hash)
    .bind(&now)
    .bind(&now)
    .execute(db)
    .await
    .unwrap();

    sqlx::query(
        "INSERT INTO verifications (id, user_id, otp, expires_at, status, created_at, updated_at) \
         VALUES (?, ?, 0, NULL, ?, ?, ?)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(&id)
    .bind(verified)
    .bind(&now)
    .bind(&now)
    .execute(db)
    .await
    .unwrap();

    sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&id)
        .fetch_one(db)
        .await
        .unwrap()
}

pub async fn stored_otp(db: &DbPool, user_id: &str) -> i64 {
    let row: (i64,) = sqlx::query_as("SELECT otp FROM verifications WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(db)
        .await
        .unwrap();
    row.0
}

pub async fn is_verified(db: &DbPool, user_id: &str) -> bool {
    let row: (bool,) = sqlx::query_as("SELECT status FROM verifications WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(db)
        .await
        .unwrap();
    row.0
}

pub async fn create_package(db: &DbPool, title: &str, price: i64, duration_days: i64) -> Package {
    let id = uuid::Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO packages (id, title, price, duration_days, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(title)
    .bind(price)
    .bind(duration_days)
    .bind(&now)
    .bind(&now)
    .execute(db)
    .await
    .unwrap();

    sqlx::query_as("SELECT * FROM packages WHERE id = ?")
        .bind(&id)
        .fetch_one(db)
        .await
        .unwrap()
}

pub async fn create_subscription(db: &DbPool, user_id: &str, package_id: &str) -> Subscription {
    let id = uuid::Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO subscriptions (id, user_id, package_id, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(user_id)
    .bind(package_id)
    .bind(&now)
    .bind(&now)
    .execute(db)
    .await
    .unwrap();

    sqlx::query_as("SELECT * FROM subscriptions WHERE id = ?")
        .bind(&id)
        .fetch_one(db)
        .await
        .unwrap()
}

pub async fn create_payment(
    db: &DbPool,
    subscription_id: &str,
    user_id: &str,
    price: i64,
) -> Payment {
    let id = uuid::Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO payments (id, subscription_id, user_id, price, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(subscription_id)
    .bind(user_id)
    .bind(price)
    .bind(&now)
    .bind(&now)
    .execute(db)
    .await
    .unwrap();

    sqlx::query_as("SELECT * FROM payments WHERE id = ?")
        .bind(&id)
        .fetch_one(db)
        .await
        .unwrap()
}
