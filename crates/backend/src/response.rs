//! Structured responses handed back to the host

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Response body of a backend operation
///
/// `error` is set when the operation completed its writes but still has to
/// report a failure to the caller (scheduler registration problems).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn with_data(data: Map<String, Value>) -> Self {
        Self { data, error: None }
    }

    /// Error response carrying only a message
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            data: Map::new(),
            error: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Field of the response body
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}
