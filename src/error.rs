//! Error types for the ledger.

use std::fmt;
use thiserror::Error;

/// Main error type for ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("This asset already exists: {0}")]
    DuplicateKey(String),

    #[error("Asset not found")]
    NotFound(String),

    #[error("Invalid function name")]
    UnknownFunction(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Invalid ledger format: {0}")]
    InvalidFormat(String),

    #[error("Ledger is locked by another process")]
    Locked,

    #[error("Ledger not initialized")]
    NotInitialized,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl LedgerError {
    /// Caller-visible classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            LedgerError::DuplicateKey(_) => ErrorKind::DuplicateKey,
            LedgerError::NotFound(_) => ErrorKind::NotFound,
            LedgerError::UnknownFunction(_) => ErrorKind::UnknownFunction,
            LedgerError::Io(_)
            | LedgerError::Serialization(_)
            | LedgerError::Deserialization(_)
            | LedgerError::Corruption(_)
            | LedgerError::ChecksumMismatch { .. }
            | LedgerError::InvalidFormat(_)
            | LedgerError::Locked
            | LedgerError::NotInitialized
            | LedgerError::Config(_) => ErrorKind::StorageFailure,
        }
    }

    /// Shorthand for the reference arity message.
    pub fn arity(expected: usize) -> Self {
        LedgerError::InvalidArgument(format!(
            "Incorrect number of arguments. Expecting {}",
            expected
        ))
    }
}

/// The five failure classes reported across the invocation boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    DuplicateKey,
    NotFound,
    StorageFailure,
    UnknownFunction,
}

impl ErrorKind {
    /// Status code an HTTP front end would relay for this kind.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::InvalidArgument | ErrorKind::UnknownFunction => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::DuplicateKey => 409,
            ErrorKind::StorageFailure => 500,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::DuplicateKey => "DuplicateKey",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::StorageFailure => "StorageFailure",
            ErrorKind::UnknownFunction => "UnknownFunction",
        };
        f.write_str(name)
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        LedgerError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for LedgerError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        LedgerError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for LedgerError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        LedgerError::Deserialization(e.to_string())
    }
}

impl From<toml::de::Error> for LedgerError {
    fn from(e: toml::de::Error) -> Self {
        LedgerError::Config(e.to_string())
    }
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
