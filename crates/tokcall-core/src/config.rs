use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::CallError;

/// Façade configuration.
///
/// `session_id` and `token` are overwritten by a successful `connect`.
/// Any other key is kept as-is in `extra` for the SDK binding.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct CallConfig {
    #[serde(default, rename = "sessionId")]
    pub session_id: String,
    #[serde(default)]
    pub token: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CallConfig {
    pub fn new(session_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            token: token.into(),
            extra: Map::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, CallError> {
        serde_json::from_str(json).map_err(|e| CallError::Config(format!("invalid config: {e}")))
    }

    /// Load from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CallError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CallError::Config(format!("read {}: {e}", path.display())))?;
        let config = Self::from_json(&contents)?;
        tracing::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    /// SDK-specific pass-through value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.extra.insert(key.into(), value);
    }
}
