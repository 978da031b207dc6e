//! Safe zone models: a geofenced expected-return route.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SafeZone {
    pub id: String,
    pub user_id: String,
    pub description: Option<String>,
    pub start_latitude: f64,
    pub start_longitude: f64,
    pub end_latitude: f64,
    pub end_longitude: f64,
    pub expected_return_at: Option<String>,
    pub is_deleted: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateSafeZoneRequest {
    pub description: Option<String>,
    pub start_latitude: f64,
    pub start_longitude: f64,
    pub end_latitude: f64,
    pub end_longitude: f64,
    pub expected_return_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSafeZoneRequest {
    pub description: Option<String>,
    pub start_latitude: Option<f64>,
    pub start_longitude: Option<f64>,
    pub end_latitude: Option<f64>,
    pub end_longitude: Option<f64>,
    pub expected_return_at: Option<String>,
}
