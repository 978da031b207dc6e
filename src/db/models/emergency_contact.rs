//! Emergency contact models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EmergencyContact {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub relation: Option<String>,
    pub phone_number: String,
    pub is_deleted: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateEmergencyContactRequest {
    pub name: String,
    pub relation: Option<String>,
    pub phone_number: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateEmergencyContactRequest {
    pub name: Option<String>,
    pub relation: Option<String>,
    pub phone_number: Option<String>,
}
