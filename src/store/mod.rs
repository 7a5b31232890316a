//! Object-store client contract (§6) consumed by the uploaders, plus a
//! concrete S3-compatible implementation.

pub mod s3;

use async_trait::async_trait;
use tokio::io::AsyncRead;

/// A single completed (or resumed) part of a multipart upload (§3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartInfo {
    pub part_number: u16,
    pub size: u64,
    /// Quoted lowercase-hex MD5, exactly as returned by the store (§6).
    pub etag: String,
}

/// A reader over an object's bytes, boxed so trait objects can be used
/// across the async boundary.
pub type ObjectReader = std::pin::Pin<Box<dyn AsyncRead + Send + Unpin>>;

/// The bucket-level operations this core consumes (§6).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Uploads `body` (exactly `size` bytes) as `object_key` in a single
    /// request.
    async fn put(
        &self,
        object_key: &str,
        body: Vec<u8>,
        content_type: &str,
        acl: Option<&str>,
    ) -> anyhow::Result<()>;

    /// Begins a multipart upload and returns a session handle.
    async fn init_multi(
        &self,
        object_key: &str,
        content_type: &str,
        acl: Option<&str>,
    ) -> anyhow::Result<Box<dyn MultipartSession>>;

    /// Resumes a previously-initiated multipart upload given its upload
    /// id (the object key adopted from the stash, see §4.4.1).
    fn resume_multi(&self, object_key: &str, upload_id: &str) -> Box<dyn MultipartSession>;

    /// Opens a readable stream over a stored object.
    async fn get_reader(&self, object_key: &str) -> anyhow::Result<ObjectReader>;
}

/// The multipart-upload-session operations this core consumes (§6).
#[async_trait]
pub trait MultipartSession: Send + Sync {
    /// The object key this session is uploading to.
    fn object_key(&self) -> &str;

    /// The store-assigned upload id for this session.
    fn upload_id(&self) -> &str;

    /// Fetches the list of parts the store already holds for this
    /// session (the resume table, §4.4.1).
    async fn list_parts(&self) -> anyhow::Result<Vec<PartInfo>>;

    /// Uploads a single part and returns its resulting descriptor.
    async fn put_part(&self, part_number: u16, body: Vec<u8>) -> anyhow::Result<PartInfo>;

    /// Finalizes the upload given the complete, ordered set of parts.
    async fn complete(&self, parts: Vec<PartInfo>) -> anyhow::Result<()>;
}
