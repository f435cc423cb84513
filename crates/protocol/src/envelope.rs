use serde::{Deserialize, Serialize};

/// Common response envelope returned by the upload endpoints.
///
/// `data` is absent for endpoints that only report success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T = ()> {
    pub success: bool,
    #[serde(default)]
    pub code: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Creates a successful response carrying `data`.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            code: 200,
            message: String::new(),
            data: Some(data),
        }
    }

    /// Creates a failed response.
    pub fn failure(code: i32, message: impl Into<String>) -> Self {
        Self {
            success: false,
            code,
            message: message.into(),
            data: None,
        }
    }
}

impl ApiResponse<()> {
    /// Creates a successful response with no payload.
    pub fn success() -> Self {
        Self {
            success: true,
            code: 200,
            message: String::new(),
            data: None,
        }
    }
}
