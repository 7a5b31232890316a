//! Encrypted attachment transfer core: a sign-then-encrypt streaming
//! codec, size-routed S3 upload (single PUT vs. resumable multipart),
//! and integrity-verified download, for use by a surrounding chat
//! application (§1-§2).

pub mod asset;
pub mod backoff;
pub mod cancel;
pub mod config;
pub mod crypto;
pub mod error;
pub mod progress;
pub mod stash;
pub mod store;
pub mod transfer;
pub mod upload;

pub use asset::{Asset, S3Params, UploadTask};
pub use backoff::{Backoff, ExponentialBackoff, NoBackoff, MAX_ATTEMPTS};
pub use cancel::CancellationToken;
pub use config::{Config, HostConfig};
pub use crypto::{DecryptOutput, EncryptKeys, EncryptOutput, SignDecrypter, SignEncrypter};
pub use error::{AttachmentError, Result};
pub use progress::{ProgressCallback, ProgressMeter};
pub use stash::{MemoryStash, SledStash, Stash};
pub use store::s3::credentials::Credentials;
pub use store::s3::region::Region;
pub use store::s3::S3Store;
pub use store::{MultipartSession, ObjectReader, ObjectStore, PartInfo};
pub use transfer::AssetTransfer;
pub use upload::{MultipartUploader, SingleUploader, MULTIPART_THRESHOLD, PART_SIZE};
