//! Data model: the records that flow between the chat layer and this core.

use serde::{Deserialize, Serialize};

/// The persisted result of a successful upload, opaque to the object
/// store. Serialized by the outer chat layer — the shape is part of the
/// external contract (§6).
#[derive(Clone, Serialize, Deserialize)]
pub struct Asset {
    /// Original basename of the local file, for display only.
    pub filename: String,
    pub region: String,
    pub endpoint: String,
    pub bucket: String,
    pub path: String,
    /// Ciphertext byte length.
    pub size: u64,
    /// Raw bytes of the symmetric key used for this upload.
    pub enc_key: Option<Vec<u8>>,
    /// Raw bytes of the signing key's public half.
    pub verify_key: Option<Vec<u8>>,
    /// Digest (256-bit) of the complete ciphertext stream.
    pub enc_hash: Option<[u8; 32]>,
}

impl Asset {
    /// Valid only if `enc_key`, `verify_key`, and `enc_hash` are all
    /// present; unencrypted assets are rejected at download (see
    /// `UnencryptedAssetRejected`).
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.enc_key.is_some() && self.verify_key.is_some() && self.enc_hash.is_some()
    }
}

impl std::fmt::Debug for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Asset")
            .field("filename", &self.filename)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("bucket", &self.bucket)
            .field("path", &self.path)
            .field("size", &self.size)
            .field("enc_key", &self.enc_key.as_ref().map(|_| "<redacted>"))
            .field("verify_key", &self.verify_key.as_ref().map(|_| "<redacted>"))
            .field("enc_hash", &self.enc_hash.map(hex_prefix))
            .finish()
    }
}

fn hex_prefix(hash: [u8; 32]) -> String {
    hash.iter().take(4).map(|b| format!("{b:02x}")).collect()
}

/// Addressing coordinates and credentials for an upload, mutable so
/// resumption can overwrite `object_key` with a previously-stashed one.
#[derive(Clone, Debug)]
pub struct S3Params {
    pub region: String,
    pub region_endpoint: String,
    pub bucket_endpoint: String,
    pub access_key: String,
    pub bucket: String,
    pub object_key: String,
    pub acl: Option<String>,
}

/// A transient description of a single upload, as handed to
/// [`crate::transfer::AssetTransfer::upload`].
pub struct UploadTask<R> {
    pub params: S3Params,
    pub local_filename: String,
    pub plaintext_size: u64,
    pub plaintext: R,
}
