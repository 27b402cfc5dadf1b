use thiserror::Error;

/// Failures of the secret codec. `Authentication` is deliberately opaque:
/// a tag mismatch must not reveal whether the key or the payload was wrong.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("KEY_INVALID: {0}")]
    Key(String),
    #[error("FORMAT_INVALID: {0}")]
    Format(String),
    #[error("AUTHENTICATION_FAILED: payload could not be authenticated")]
    Authentication,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("VALIDATION: {0}")]
    Validation(String),
    #[error("PERMISSION_DENIED: {0}")]
    Permission(String),
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl From<std::io::Error> for RegistryError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<rusqlite::Error> for RegistryError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(value: serde_json::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;
