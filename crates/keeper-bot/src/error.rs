//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error(transparent)]
    Chain(#[from] keeper_chain::ChainError),

    #[error(transparent)]
    Signer(#[from] keeper_signer::SignerError),

    #[error(transparent)]
    Engine(#[from] keeper_engine::EngineError),

    #[error(transparent)]
    Pyth(#[from] keeper_pyth::PythError),

    #[error(transparent)]
    Telemetry(#[from] keeper_telemetry::TelemetryError),
}

pub type AppResult<T> = Result<T, AppError>;
