use thiserror::Error;

#[derive(Error, Debug)]
pub enum CpucapError {
    #[error("Platform error: {0}")]
    Platform(String),
    #[error("Process not found: PID {0}")]
    ProcessNotFound(u32),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Invalid limit: {0}")]
    InvalidLimit(String),
    #[error("Invalid PID: {0}")]
    InvalidPid(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Signal handler error: {0}")]
    Signal(String),
}

pub type Result<T> = std::result::Result<T, CpucapError>;
