//! Error types for keeper-pyth.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PythError {
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Price service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed price-service response: {0}")]
    Malformed(String),
}

pub type PythResult<T> = Result<T, PythError>;
