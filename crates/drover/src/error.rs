use thiserror::Error;

pub type Result<T> = std::result::Result<T, DroverError>;

/// Errors raised while wiring Drover components together.
#[derive(Debug, Error)]
pub enum DroverError {
    #[error("Configuration error: {0}")]
    Config(#[from] drover_config::ConfigError),

    #[error("Session store error: {0}")]
    Store(#[from] drover_session::StoreError),

    #[error("Guard error: {0}")]
    Guard(#[from] drover_guard::GuardError),

    #[error("Secret error: {0}")]
    Secret(#[from] drover_secrets::SecretError),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
