use thiserror::Error;

/// All errors produced by samd-core.
#[derive(Debug, Error)]
pub enum AmdError {
    #[error("invalid configuration: {field} {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("channel count must be at least 1")]
    InvalidChannelCount,

    #[error("detector has been released")]
    Released,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AmdError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AmdError>;
