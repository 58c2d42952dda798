use serde_json::Value;
use thiserror::Error;

/// Errors raised by engine operations. Validation and format errors are raised
/// before any write is issued.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{message}")]
    Validation {
        message: String,
        details: Option<Value>,
    },

    /// CSV interchange text is not recognisable as a marks sheet.
    #[error("{0}")]
    Format(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error(transparent)]
    Store(#[from] rusqlite::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            details: None,
        }
    }

    pub fn validation_with(message: impl Into<String>, details: Value) -> Self {
        Self::Validation {
            message: message.into(),
            details: Some(details),
        }
    }

    /// Stable wire code for the IPC error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "bad_params",
            Self::Format(_) => "format_error",
            Self::NotFound(_) => "not_found",
            Self::Store(_) => "db_query_failed",
            Self::Csv(_) => "csv_failed",
            Self::Json(_) => "bad_json",
        }
    }

    pub fn details(&self) -> Option<Value> {
        match self {
            Self::Validation { details, .. } => details.clone(),
            _ => None,
        }
    }
}
