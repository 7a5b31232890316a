//! Size-routed upload engines (§4.3, §4.4) and the retry helper shared
//! by both.

pub mod multipart;
pub mod single;

pub use multipart::MultipartUploader;
pub use single::SingleUploader;

use crate::backoff::{Backoff, MAX_ATTEMPTS};
use crate::cancel::CancellationToken;
use crate::error::{AttachmentError, Result};
use std::future::Future;

/// Single-vs-multipart boundary and multipart block size (§6), both
/// 5 MiB.
pub const MULTIPART_THRESHOLD: u64 = 5 * 1024 * 1024;
pub const PART_SIZE: u64 = 5 * 1024 * 1024;

pub const CONTENT_TYPE: &str = "application/octet-stream";
pub(crate) const WORKER_COUNT: usize = 10;

/// Runs `attempt_fn` up to [`MAX_ATTEMPTS`] times, waiting `backoff`'s
/// schedule (cancellation-aware) before every attempt including the
/// first. `label` identifies the operation in the warning log (§9).
pub async fn with_retry<F, Fut, T>(
    backoff: &dyn Backoff,
    cancel: &CancellationToken,
    label: &str,
    mut attempt_fn: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut last_err: Option<anyhow::Error> = None;
    for attempt in 0..MAX_ATTEMPTS {
        tokio::select! {
            () = cancel.cancelled() => return Err(AttachmentError::Cancelled),
            () = tokio::time::sleep(backoff.delay(attempt)) => {}
        }
        if cancel.is_cancelled() {
            return Err(AttachmentError::Cancelled);
        }

        match attempt_fn(attempt).await {
            Ok(value) => return Ok(value),
            Err(source) => {
                let transient = AttachmentError::StoreTransient {
                    attempt: attempt + 1,
                    source,
                };
                log::warn!("uploading {label}: {transient}");
                last_err = Some(transient.into());
            }
        }
    }

    Err(AttachmentError::StoreFatal {
        attempts: MAX_ATTEMPTS,
        source: last_err.unwrap_or_else(|| anyhow::anyhow!("no attempts recorded")),
    })
}
