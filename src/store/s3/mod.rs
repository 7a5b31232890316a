//! A concrete S3-compatible [`ObjectStore`](crate::store::ObjectStore),
//! grounded in the teacher's `s3` module but consolidated into one
//! internally-consistent client (see `actions` and `signature` for what
//! that consolidation fixed).

pub mod actions;
pub mod credentials;
pub mod region;
pub mod responses;
pub mod signature;

use crate::store::{MultipartSession, ObjectReader, ObjectStore, PartInfo};
use actions::Endpoint;
use async_trait::async_trait;
use credentials::Credentials;
use region::Region;
use reqwest::Client;
use std::sync::Arc;

/// Connection details for one bucket.
pub struct S3Store {
    client: Client,
    bucket: String,
    region: Region,
    credentials: Credentials,
    /// Overrides the region's default endpoint host, for MinIO-style
    /// deployments.
    host: Option<String>,
}

impl S3Store {
    #[must_use]
    pub fn new(bucket: impl Into<String>, region: Region, credentials: Credentials) -> Self {
        Self {
            client: Client::new(),
            bucket: bucket.into(),
            region,
            credentials,
            host: None,
        }
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    fn endpoint(&self) -> Endpoint<'_> {
        Endpoint {
            bucket: &self.bucket,
            region: &self.region,
            credentials: &self.credentials,
            host: self.host.as_deref(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(
        &self,
        object_key: &str,
        body: Vec<u8>,
        content_type: &str,
        acl: Option<&str>,
    ) -> anyhow::Result<()> {
        actions::put_object(&self.client, &self.endpoint(), object_key, body, content_type, acl)
            .await
    }

    async fn init_multi(
        &self,
        object_key: &str,
        content_type: &str,
        acl: Option<&str>,
    ) -> anyhow::Result<Box<dyn MultipartSession>> {
        let upload_id =
            actions::create_multipart_upload(&self.client, &self.endpoint(), object_key, content_type, acl)
                .await?;
        Ok(Box::new(S3MultipartSession {
            client: self.client.clone(),
            bucket: self.bucket.clone(),
            region: self.region.clone(),
            credentials: self.credentials.clone(),
            host: self.host.clone(),
            object_key: object_key.to_string(),
            upload_id,
        }))
    }

    fn resume_multi(&self, object_key: &str, upload_id: &str) -> Box<dyn MultipartSession> {
        Box::new(S3MultipartSession {
            client: self.client.clone(),
            bucket: self.bucket.clone(),
            region: self.region.clone(),
            credentials: self.credentials.clone(),
            host: self.host.clone(),
            object_key: object_key.to_string(),
            upload_id: upload_id.to_string(),
        })
    }

    async fn get_reader(&self, object_key: &str) -> anyhow::Result<ObjectReader> {
        actions::get_object(&self.client, &self.endpoint(), object_key).await
    }
}

/// A single in-progress multipart upload, addressable by its upload id
/// so it can be reconstructed from the stash on resume (§4.4.1).
struct S3MultipartSession {
    client: Client,
    bucket: String,
    region: Region,
    credentials: Credentials,
    host: Option<String>,
    object_key: String,
    upload_id: String,
}

impl S3MultipartSession {
    fn endpoint(&self) -> Endpoint<'_> {
        Endpoint {
            bucket: &self.bucket,
            region: &self.region,
            credentials: &self.credentials,
            host: self.host.as_deref(),
        }
    }
}

#[async_trait]
impl MultipartSession for S3MultipartSession {
    fn object_key(&self) -> &str {
        &self.object_key
    }

    fn upload_id(&self) -> &str {
        &self.upload_id
    }

    async fn list_parts(&self) -> anyhow::Result<Vec<PartInfo>> {
        actions::list_parts(&self.client, &self.endpoint(), &self.object_key, &self.upload_id).await
    }

    async fn put_part(&self, part_number: u16, body: Vec<u8>) -> anyhow::Result<PartInfo> {
        actions::upload_part(
            &self.client,
            &self.endpoint(),
            &self.object_key,
            &self.upload_id,
            part_number,
            body,
        )
        .await
    }

    async fn complete(&self, parts: Vec<PartInfo>) -> anyhow::Result<()> {
        actions::complete_multipart_upload(
            &self.client,
            &self.endpoint(),
            &self.object_key,
            &self.upload_id,
            &parts,
        )
        .await
    }
}

/// A shared handle to an [`S3Store`], cheap to clone across the
/// producer/worker/collector pipeline (§4.4).
pub type SharedS3Store = Arc<S3Store>;
