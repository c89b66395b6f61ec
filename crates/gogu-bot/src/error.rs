//! Bot error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BotError {
    /// Startup cannot continue, e.g. no Discord token from any source.
    #[error("fatal init error: {0}")]
    FatalInit(#[from] lab_secrets::SecretError),

    #[error("failed to send reply: {0}")]
    Reply(String),

    #[error("discord error: {0}")]
    Discord(String),

    #[error("health error: {0}")]
    Health(#[from] lab_health::HealthError),
}

pub type BotResult<T> = Result<T, BotError>;
