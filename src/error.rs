use thiserror::Error;

/// Faults that abort a scan before any port is dispatched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("unknown scan profile: {0}")]
    InvalidProfile(String),

    #[error("invalid scan profile {name}: {reason}")]
    InvalidProfileSpec { name: String, reason: String },

    #[error("a scan is already running")]
    AlreadyRunning,
}
