//! Error handling for the application

use thiserror::Error;

/// Read-path errors. These are always recovered locally by the refresh
/// orchestrator via default/last-known substitution and never surface as
/// hard failures to consumers.
#[derive(Error, Debug, Clone)]
pub enum ReadError {
    #[error("entity unreachable: {0}")]
    EntityUnreachable(String),

    #[error("price unavailable: {0}")]
    PriceUnavailable(String),
}

/// Mutation-path errors, surfaced to the caller as a rejected action result
#[derive(Error, Debug, Clone)]
pub enum ActionError {
    #[error("no connected account")]
    NoAccount,

    #[error("transaction rejected: {0}")]
    TransactionRejected(String),

    #[error("allowance insufficient for token {0}")]
    AllowanceInsufficient(String),

    #[error("unknown entity: {0}")]
    UnknownEntity(String),
}

/// General application error
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Chain error: {0}")]
    ChainError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<ReadError> for AppError {
    fn from(err: ReadError) -> Self {
        AppError::ChainError(err.to_string())
    }
}

impl From<ActionError> for AppError {
    fn from(err: ActionError) -> Self {
        AppError::Unknown(err.to_string())
    }
}
