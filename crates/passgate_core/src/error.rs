use thiserror::Error;

#[derive(Debug, Error)]
pub enum PassGateError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("policy violation: {0}")]
    PolicyViolation(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("global settings unavailable")]
    SettingsUnavailable,

    #[error("internal: {0}")]
    Internal(#[from] anyhow::Error),
}

impl PassGateError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::PolicyViolation(_) => 400,
            Self::Forbidden(_) => 403,
            Self::InvalidInput(_) => 400,
            Self::Conflict(_) => 409,
            Self::SettingsUnavailable => 500,
            Self::Internal(_) => 500,
        }
    }

    /// Message safe to hand back to a caller. Internal detail stays in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::NotFound(what) => format!("{what} not found"),
            Self::PolicyViolation(msg)
            | Self::Forbidden(msg)
            | Self::InvalidInput(msg)
            | Self::Conflict(msg) => msg.clone(),
            Self::SettingsUnavailable => "Settings not found".to_string(),
            Self::Internal(_) => "Internal server error".to_string(),
        }
    }
}
