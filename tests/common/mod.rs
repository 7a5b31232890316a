//! Shared in-memory `ObjectStore` used by the facade-level integration
//! tests. There is no live S3 in this environment (see DESIGN.md), so
//! this stub stands in for it, with enough fidelity (arrival order,
//! per-part failure injection, real ETags) to exercise the multipart
//! pipeline honestly.

use async_trait::async_trait;
use attachment_transfer::{MultipartSession, ObjectReader, ObjectStore, PartInfo, S3Params};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

struct UploadState {
    object_key: String,
    parts: HashMap<u16, (Vec<u8>, PartInfo)>,
}

#[derive(Default)]
struct Inner {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    uploads: Mutex<HashMap<String, UploadState>>,
    next_upload_id: AtomicU64,
    /// Remaining forced-failure count per part number, decremented on
    /// every `put_part` attempt that hits it.
    fail_first_n_for_part: Mutex<HashMap<u16, u32>>,
    arrival_order: Mutex<Vec<u16>>,
}

/// A store backed by plain in-process maps instead of a network.
#[derive(Clone, Default)]
pub struct InMemoryStore(Arc<Inner>);

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forces the next `n` `put_part` attempts for `part_number` to fail.
    pub fn fail_part_n_times(&self, part_number: u16, n: u32) {
        self.0.fail_first_n_for_part.lock().unwrap().insert(part_number, n);
    }

    /// Current bytes stored under `object_key`, for corruption tests.
    pub fn object_bytes(&self, object_key: &str) -> Vec<u8> {
        self.0.objects.lock().unwrap().get(object_key).cloned().unwrap_or_default()
    }

    /// Overwrites the stored bytes under `object_key` (used to simulate
    /// bit-rot / tampering for the hash-commitment tests).
    pub fn corrupt_object(&self, object_key: &str, byte_index: usize) {
        let mut objects = self.0.objects.lock().unwrap();
        if let Some(bytes) = objects.get_mut(object_key) {
            if let Some(b) = bytes.get_mut(byte_index) {
                *b ^= 0xFF;
            }
        }
    }

    /// Part numbers in the order `put_part` actually observed them
    /// arrive, across every session this store has ever opened.
    pub fn arrival_order(&self) -> Vec<u16> {
        self.0.arrival_order.lock().unwrap().clone()
    }

    fn etag_of(body: &[u8]) -> String {
        format!("\"{:x}\"", md5::compute(body))
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn put(
        &self,
        object_key: &str,
        body: Vec<u8>,
        _content_type: &str,
        _acl: Option<&str>,
    ) -> anyhow::Result<()> {
        self.0.objects.lock().unwrap().insert(object_key.to_string(), body);
        Ok(())
    }

    async fn init_multi(
        &self,
        object_key: &str,
        _content_type: &str,
        _acl: Option<&str>,
    ) -> anyhow::Result<Box<dyn MultipartSession>> {
        let upload_id = format!("upload-{}", self.0.next_upload_id.fetch_add(1, Ordering::SeqCst));
        self.0.uploads.lock().unwrap().insert(
            upload_id.clone(),
            UploadState {
                object_key: object_key.to_string(),
                parts: HashMap::new(),
            },
        );
        Ok(Box::new(InMemorySession {
            inner: Arc::clone(&self.0),
            object_key: object_key.to_string(),
            upload_id,
        }))
    }

    fn resume_multi(&self, object_key: &str, upload_id: &str) -> Box<dyn MultipartSession> {
        Box::new(InMemorySession {
            inner: Arc::clone(&self.0),
            object_key: object_key.to_string(),
            upload_id: upload_id.to_string(),
        })
    }

    async fn get_reader(&self, object_key: &str) -> anyhow::Result<ObjectReader> {
        let objects = self.0.objects.lock().unwrap();
        let bytes = objects
            .get(object_key)
            .ok_or_else(|| anyhow::anyhow!("no such object: {object_key}"))?
            .clone();
        Ok(Box::pin(Cursor::new(bytes)))
    }
}

struct InMemorySession {
    inner: Arc<Inner>,
    object_key: String,
    upload_id: String,
}

#[async_trait]
impl MultipartSession for InMemorySession {
    fn object_key(&self) -> &str {
        &self.object_key
    }

    fn upload_id(&self) -> &str {
        &self.upload_id
    }

    async fn list_parts(&self) -> anyhow::Result<Vec<PartInfo>> {
        let uploads = self.inner.uploads.lock().unwrap();
        let state = uploads
            .get(&self.upload_id)
            .ok_or_else(|| anyhow::anyhow!("no such upload: {}", self.upload_id))?;
        let mut parts: Vec<PartInfo> = state.parts.values().map(|(_, info)| info.clone()).collect();
        parts.sort_by_key(|p| p.part_number);
        Ok(parts)
    }

    async fn put_part(&self, part_number: u16, body: Vec<u8>) -> anyhow::Result<PartInfo> {
        {
            let mut fail_table = self.inner.fail_first_n_for_part.lock().unwrap();
            if let Some(remaining) = fail_table.get_mut(&part_number) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(anyhow::anyhow!("injected failure for part {part_number}"));
                }
            }
        }

        self.inner.arrival_order.lock().unwrap().push(part_number);

        let info = PartInfo {
            part_number,
            size: body.len() as u64,
            etag: InMemoryStore::etag_of(&body),
        };
        let mut uploads = self.inner.uploads.lock().unwrap();
        let state = uploads
            .get_mut(&self.upload_id)
            .ok_or_else(|| anyhow::anyhow!("no such upload: {}", self.upload_id))?;
        state.parts.insert(part_number, (body, info.clone()));
        Ok(info)
    }

    async fn complete(&self, parts: Vec<PartInfo>) -> anyhow::Result<()> {
        let mut uploads = self.inner.uploads.lock().unwrap();
        let state = uploads
            .remove(&self.upload_id)
            .ok_or_else(|| anyhow::anyhow!("no such upload: {}", self.upload_id))?;

        let mut assembled = Vec::new();
        for part in &parts {
            let (body, _) = state
                .parts
                .get(&part.part_number)
                .ok_or_else(|| anyhow::anyhow!("complete referenced unknown part {}", part.part_number))?;
            assembled.extend_from_slice(body);
        }

        self.inner.objects.lock().unwrap().insert(state.object_key, assembled);
        Ok(())
    }
}

#[must_use]
pub fn params(object_key: &str) -> S3Params {
    S3Params {
        region: "us-east-1".to_string(),
        region_endpoint: "s3.us-east-1.amazonaws.com".to_string(),
        bucket_endpoint: "bucket.s3.us-east-1.amazonaws.com".to_string(),
        access_key: "access".to_string(),
        bucket: "bucket".to_string(),
        object_key: object_key.to_string(),
        acl: None,
    }
}
