use serde::{Deserialize, Serialize};

use crate::error::{PipeError, Result};

/// Sizing limits for a named pipe: how many concurrent server
/// instances it may have and how many bytes each direction buffers.
///
/// Deployments tune these through configuration rather than code, so
/// the type round-trips through JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipeLimits {
    /// Maximum number of simultaneous server instances.
    pub max_instances: u32,
    /// Per-direction queue capacity in bytes.
    pub buffer_size: usize,
}

impl Default for PipeLimits {
    fn default() -> Self {
        PipeLimits {
            max_instances: 1,
            buffer_size: 4096,
        }
    }
}

impl PipeLimits {
    pub fn from_json(json: &str) -> Result<PipeLimits> {
        serde_json::from_str(json)
            .map_err(|e| PipeError::generic(format!("invalid pipe limits: {}", e)))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| PipeError::generic(format!("failed to serialize pipe limits: {}", e)))
    }
}
