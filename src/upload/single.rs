//! Bounded-memory single-PUT uploader (§4.3), used for ciphertexts of at
//! most 5 MiB.

use super::{with_retry, CONTENT_TYPE};
use crate::backoff::{Backoff, ExponentialBackoff};
use crate::cancel::CancellationToken;
use crate::error::{AttachmentError, Result};
use crate::progress::{ProgressCallback, ProgressMeter};
use crate::store::ObjectStore;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Uploads a ciphertext that fits in memory in a single request, with
/// exponential-backoff retry across the whole body.
pub struct SingleUploader<'a> {
    store: &'a dyn ObjectStore,
    backoff: Arc<dyn Backoff>,
}

impl<'a> SingleUploader<'a> {
    #[must_use]
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self {
            store,
            backoff: Arc::new(ExponentialBackoff),
        }
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: Arc<dyn Backoff>) -> Self {
        self.backoff = backoff;
        self
    }

    /// Drains `ciphertext` (must yield exactly `size` bytes) and uploads
    /// it to `object_key`, retrying the whole PUT up to 10 times.
    ///
    /// # Errors
    /// Returns [`AttachmentError::ShortRead`] if fewer than `size` bytes
    /// are available, or [`AttachmentError::StoreFatal`] /
    /// [`AttachmentError::Cancelled`] per the retry policy.
    pub async fn upload<R>(
        &self,
        mut ciphertext: R,
        size: u64,
        object_key: &str,
        acl: Option<&str>,
        cancel: &CancellationToken,
        on_progress: Option<Arc<ProgressCallback>>,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut body = Vec::with_capacity(size as usize);
        let _ = ciphertext.read_to_end(&mut body).await;
        if body.len() as u64 != size {
            return Err(AttachmentError::ShortRead {
                expected: size,
                actual: body.len() as u64,
            });
        }

        with_retry(self.backoff.as_ref(), cancel, object_key, |_attempt| {
            let body = body.clone();
            let meter = ProgressMeter::new(size, on_progress.as_ref().map(arc_callback));
            async move {
                self.store
                    .put(object_key, body, CONTENT_TYPE, acl)
                    .await?;
                meter.advance(size);
                Ok(())
            }
        })
        .await
    }
}

fn arc_callback(cb: &Arc<ProgressCallback>) -> ProgressCallback {
    let cb = Arc::clone(cb);
    Box::new(move |p| cb(p))
}
