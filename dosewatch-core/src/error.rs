use thiserror::Error;

#[derive(Error, Debug)]
pub enum DosewatchError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid time format: {0:?} (expected HH:MM, 24-hour)")]
    InvalidTimeFormat(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Startup config error: {0}")]
    StartupConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
