//! Success envelope shared by all API endpoints.

use axum::Json;
use serde::Serialize;

use crate::db::Meta;

/// Uniform `{success, message, data, meta?}` body
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
            data,
            meta: None,
        })
    }

    pub fn paginated(message: impl Into<String>, data: T, meta: Meta) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
            data,
            meta: Some(meta),
        })
    }
}

impl ApiResponse<serde_json::Value> {
    /// Report-and-stop outcome: a 200 body that carries a failure message,
    /// used where a redirect landing must render rather than error
    pub fn failed(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: false,
            message: message.into(),
            data: serde_json::Value::Null,
            meta: None,
        })
    }
}
