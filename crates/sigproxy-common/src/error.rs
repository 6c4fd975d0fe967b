//! Error types for the signing core
//!
//! We use `thiserror` for structured error types that can be matched on,
//! and `anyhow` for error propagation in application code.

use thiserror::Error;

/// Central error type for signing operations
#[derive(Error, Debug)]
pub enum SigningError {
    // === Structured-field parsing ===
    #[error("wrong value symbol in {0:?}")]
    WrongValueSymbol(String),

    #[error("imbalanced quotes in {0:?}")]
    ImbalancedQuotes(String),

    #[error("wrong key symbol in {0:?}")]
    WrongKeySymbol(String),

    #[error("unknown material value in {0:?}")]
    UnknownMaterialValue(String),

    // === Key loading ===
    #[error("wrong private key: {0}")]
    WrongPrivateKey(String),

    #[error("unsupported private key type: {0}")]
    UnsupportedKeyType(String),

    // === Signing ===
    #[error("crypto error: {0}")]
    Crypto(#[from] openssl::error::ErrorStack),

    #[error("signature headers are not valid header values: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    // === I/O ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using SigningError
pub type Result<T> = std::result::Result<T, SigningError>;
