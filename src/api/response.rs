//! Response envelope shared by the HTTP surface and the CLI.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// `{success, data?, error?, details?}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ApiResponse {
    /// Successful response carrying `data`.
    pub fn ok<T: Serialize>(data: T) -> Self {
        match serde_json::to_value(data) {
            Ok(value) => Self {
                success: true,
                data: Some(value),
                error: None,
                details: None,
            },
            Err(e) => Self::from_error(&Error::Internal(format!("serialize response: {}", e))),
        }
    }

    /// Failed response; `details` carries the machine-readable error kind and
    /// any structured detail the error provides.
    pub fn from_error(err: &Error) -> Self {
        let mut details = serde_json::json!({ "kind": err.kind() });
        if let (Some(extra), Some(map)) = (err.details(), details.as_object_mut()) {
            map.insert("info".to_string(), extra);
        }
        Self {
            success: false,
            data: None,
            error: Some(err.to_string()),
            details: Some(details),
        }
    }
}

/// HTTP status for a failed operation.
pub fn status_for(err: &Error) -> u16 {
    match err {
        Error::NotFound(_) => 404,
        Error::InvalidCid(_) | Error::BadRequest(_) | Error::Config(_) => 400,
        Error::ShutDown => 503,
        _ => 500,
    }
}
