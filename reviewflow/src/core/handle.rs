//! Execution handles.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{Result, ReviewflowError};

/// Opaque identifier of one pipeline run.
///
/// Never empty. Issued once per run and never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionHandle(String);

impl ExecutionHandle {
    /// Wraps an identifier returned by the trigger endpoint.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ReviewflowError::invalid_input("execution handle is empty"));
        }
        Ok(Self(id))
    }

    /// Issues a fresh handle for a locally orchestrated run.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ExecutionHandle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
