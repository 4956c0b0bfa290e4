//! Error types for the runtime

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TraxError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid runtime config: {0}")]
    InvalidConfig(String),
}

pub type TraxResult<T> = Result<T, TraxError>;
