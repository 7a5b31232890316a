//! Error taxonomy for the attachment transfer core.
//!
//! Component boundaries (encryption, stash, uploaders, facade) return
//! [`AttachmentError`]; glue code outside the core uses `anyhow`.

use thiserror::Error;

/// The error kinds produced by this crate's core components.
#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("failed to generate encryption keys: {0}")]
    KeyGenerationFailed(String),

    #[error("expected {expected} bytes, read {actual}")]
    ShortRead { expected: u64, actual: u64 },

    #[error("failed to read plaintext source: {0}")]
    PlaintextReadFailed(anyhow::Error),

    #[error("transient store error (attempt {attempt}): {source}")]
    StoreTransient {
        attempt: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("store error did not succeed after {attempts} attempts: {source}")]
    StoreFatal {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("could not initiate multipart upload: {0}")]
    InitMultiFailed(anyhow::Error),

    #[error("asset is missing encryption metadata and cannot be downloaded")]
    UnencryptedAssetRejected,

    #[error("ciphertext integrity check failed")]
    IntegrityFailure,

    #[error("stash error (non-fatal): {0}")]
    StashError(anyhow::Error),

    #[error("config file not found at {path}", path = path.display())]
    ConfigNotFound { path: std::path::PathBuf },

    #[error("config file is invalid: {source}")]
    ConfigInvalid {
        #[source]
        source: anyhow::Error,
    },

    #[error("no host named {name} in config")]
    HostNotFound { name: String },
}

impl AttachmentError {
    /// Whether this error kind is safe to retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StoreTransient { .. })
    }
}

pub type Result<T> = std::result::Result<T, AttachmentError>;
