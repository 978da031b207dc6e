//! Subscription package models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A purchasable plan; price is in minor units (cents)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Package {
    pub id: String,
    pub title: String,
    pub price: i64,
    pub duration_days: i64,
    pub is_deleted: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreatePackageRequest {
    pub title: String,
    pub price: i64,
    pub duration_days: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePackageRequest {
    pub title: Option<String>,
    pub price: Option<i64>,
    pub duration_days: Option<i64>,
}
