use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{BlockId, BlockType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    ConfigNotFound,
    BlockNotFound,
    Validation,
    SaveFailed,
}

/// Flattened error for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorReport {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no configuration registered for block type '{0}'")]
    ConfigNotFound(BlockType),
    #[error("block {0} not found")]
    BlockNotFound(BlockId),
    #[error("default payload for block type '{block_type}' failed validation: {reason}")]
    InvalidDefault { block_type: BlockType, reason: String },
    #[error("block {id} failed validation: {reason}")]
    ValidationFailed { id: BlockId, reason: String },
    #[error("save handler failed for block {id}: {source}")]
    SaveFailed {
        id: BlockId,
        #[source]
        source: anyhow::Error,
    },
}

impl StoreError {
    pub fn code(&self) -> ErrorCode {
        match self {
            StoreError::ConfigNotFound(_) => ErrorCode::ConfigNotFound,
            StoreError::BlockNotFound(_) => ErrorCode::BlockNotFound,
            StoreError::InvalidDefault { .. } | StoreError::ValidationFailed { .. } => {
                ErrorCode::Validation
            }
            StoreError::SaveFailed { .. } => ErrorCode::SaveFailed,
        }
    }
}

impl From<&StoreError> for ErrorReport {
    fn from(value: &StoreError) -> Self {
        Self {
            code: value.code(),
            message: value.to_string(),
        }
    }
}

impl From<StoreError> for ErrorReport {
    fn from(value: StoreError) -> Self {
        ErrorReport::from(&value)
    }
}
