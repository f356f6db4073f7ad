//! Error types shared across the runtime.

use std::fmt::{Display, Formatter};

/// Shared runtime result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Runtime error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Persistence failure when interacting with `SQLite`.
    Db(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// JSON encoding or decoding failure outside of schema validation.
    Serialization(String),
    /// Malformed or invariant-violating state, checkpoint, or event.
    Validation(String),
    /// Requested checkpoint or pause point does not exist.
    NotFound(String),
    /// An intervention wait exceeded its deadline.
    Timeout(String),
    /// A step-loop phase failed.
    Execution(String),
    /// An operator explicitly rejected an intervention.
    Rejected(String),
    /// A pause point's single wait or resolution has already been taken.
    AlreadyConsumed(String),
}

impl AppError {
    /// Stable machine-readable code for this error kind.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG",
            Self::Db(_) => "DB",
            Self::Io(_) => "IO",
            Self::Serialization(_) => "SERIALIZATION",
            Self::Validation(_) => "VALIDATION",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Timeout(_) => "TIMEOUT",
            Self::Execution(_) => "EXECUTION",
            Self::Rejected(_) => "REJECTED",
            Self::AlreadyConsumed(_) => "ALREADY_CONSUMED",
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Db(msg) => write!(f, "db: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Serialization(msg) => write!(f, "serialization: {msg}"),
            Self::Validation(msg) => write!(f, "validation: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::Execution(msg) => write!(f, "execution: {msg}"),
            Self::Rejected(msg) => write!(f, "rejected: {msg}"),
            Self::AlreadyConsumed(msg) => write!(f, "already consumed: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
