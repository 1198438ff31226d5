use thiserror::Error;

/// Errors that can occur while crafting, sending, or correlating probes.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("header would exceed field width: {0}")]
    Encode(String),

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("address error: {0}")]
    Addr(#[from] crate::addr::AddrError),
}

pub type Result<T> = std::result::Result<T, ProbeError>;
