//! Concurrent chunked uploader with resumption (§4.4), used for
//! ciphertexts larger than 5 MiB.

use super::{with_retry, CONTENT_TYPE, PART_SIZE, WORKER_COUNT};
use crate::backoff::{Backoff, ExponentialBackoff};
use crate::cancel::CancellationToken;
use crate::error::{AttachmentError, Result};
use crate::progress::{ProgressCallback, ProgressMeter};
use crate::stash::Stash;
use crate::store::{MultipartSession, ObjectStore, PartInfo};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, Mutex};

/// Runs the producer/worker/collector pipeline described in §4.4.2.
pub struct MultipartUploader<'a> {
    store: &'a dyn ObjectStore,
    backoff: Arc<dyn Backoff>,
}

impl<'a> MultipartUploader<'a> {
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

    /// Uploads `ciphertext` (`size` bytes) as `object_key`, resuming a
    /// previously-interrupted upload of the same `local_filename` if the
    /// stash has one. Returns the effective object key, which may differ
    /// from `object_key` if an in-progress upload was resumed.
    ///
    /// # Errors
    /// Returns [`AttachmentError::InitMultiFailed`] if a fresh upload
    /// cannot be initiated, or the first fatal error/cancellation
    /// observed by the pipeline.
    #[allow(clippy::too_many_arguments)]
    pub async fn upload<R>(
        &self,
        ciphertext: R,
        size: u64,
        local_filename: &str,
        object_key: &str,
        acl: Option<&str>,
        stash: &dyn Stash,
        cancel: &CancellationToken,
        on_progress: Option<Arc<ProgressCallback>>,
    ) -> Result<String>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (effective_key, session, resume_parts) = self
            .resolve_object_key(local_filename, object_key, acl, stash)
            .await?;
        let session: Arc<dyn MultipartSession> = Arc::from(session);
        let resume_table: Arc<HashMap<u16, PartInfo>> = Arc::new(
            resume_parts
                .into_iter()
                .map(|part| (part.part_number, part))
                .collect(),
        );

        let (job_tx, job_rx) = mpsc::channel::<(u16, Vec<u8>)>(WORKER_COUNT);
        let (part_tx, mut part_rx) = mpsc::channel::<Result<PartInfo>>(WORKER_COUNT);
        let job_rx = Arc::new(Mutex::new(job_rx));

        let producer_cancel = cancel.clone();
        let producer_errors = part_tx.clone();
        let producer_handle =
            tokio::spawn(run_producer(ciphertext, job_tx, producer_errors, producer_cancel));

        let mut worker_handles = Vec::with_capacity(WORKER_COUNT);
        for _ in 0..WORKER_COUNT {
            let job_rx = Arc::clone(&job_rx);
            let part_tx = part_tx.clone();
            let session = Arc::clone(&session);
            let resume_table = Arc::clone(&resume_table);
            let backoff = Arc::clone(&self.backoff);
            let cancel = cancel.clone();
            worker_handles.push(tokio::spawn(run_worker(
                job_rx,
                part_tx,
                session,
                resume_table,
                backoff,
                cancel,
            )));
        }
        drop(part_tx);

        let progress = ProgressMeter::new(size, on_progress.map(|cb| arc_callback(&cb)));
        let mut parts = Vec::new();
        let mut first_error: Option<AttachmentError> = None;
        while let Some(result) = part_rx.recv().await {
            match result {
                Ok(part) => {
                    progress.advance(part.size);
                    parts.push(part);
                }
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                    cancel.cancel();
                }
            }
        }

        let total_read = producer_handle.await.unwrap_or(0);
        for handle in worker_handles {
            let _ = handle.await;
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        if cancel.is_cancelled() {
            return Err(AttachmentError::Cancelled);
        }
        if total_read < size {
            return Err(AttachmentError::ShortRead {
                expected: size,
                actual: total_read,
            });
        }

        parts.sort_by_key(|part| part.part_number);

        with_retry(self.backoff.as_ref(), cancel, "complete multipart upload", |_attempt| {
            let parts = parts.clone();
            let session = Arc::clone(&session);
            async move { session.complete(parts).await }
        })
        .await?;

        if let Err(e) = stash.stop(local_filename) {
            log::warn!("failed to clear stash entry for {local_filename}: {e}");
        }

        Ok(effective_key)
    }

    /// Expressed as a pure step per the facade's design notes: never
    /// mutates caller-supplied parameters, only returns the effective
    /// key and resume table. A stashed value is a `local_key\0upload_id`
    /// pair; the upload id can't be recovered from the object key alone,
    /// so the stash carries both.
    async fn resolve_object_key(
        &self,
        local_filename: &str,
        object_key: &str,
        acl: Option<&str>,
        stash: &dyn Stash,
    ) -> Result<(String, Box<dyn MultipartSession>, Vec<PartInfo>)> {
        if let Ok(Some(stashed)) = stash.lookup(local_filename) {
            if let Some((stashed_key, upload_id)) = stashed.split_once('\0') {
                let session = self.store.resume_multi(stashed_key, upload_id);
                match session.list_parts().await {
                    Ok(parts) => {
                        log::debug!(
                            "resumed multipart upload for {local_filename} at {stashed_key} ({} parts already stored)",
                            parts.len()
                        );
                        return Ok((stashed_key.to_string(), session, parts));
                    }
                    Err(e) => {
                        log::warn!(
                            "could not resume multipart upload for {local_filename}: {e}; starting fresh"
                        );
                    }
                }
            }
        }

        let session = self
            .store
            .init_multi(object_key, CONTENT_TYPE, acl)
            .await
            .map_err(AttachmentError::InitMultiFailed)?;
        let stash_value = format!("{object_key}\0{}", session.upload_id());
        if let Err(e) = stash.start(local_filename, &stash_value) {
            log::warn!("could not record stash entry for {local_filename}: {e}");
        }
        Ok((object_key.to_string(), session, Vec::new()))
    }
}

fn arc_callback(cb: &Arc<ProgressCallback>) -> ProgressCallback {
    let cb = Arc::clone(cb);
    Box::new(move |p| cb(p))
}

/// Reads `source` into fixed-size blocks and hands them to the workers,
/// returning the total number of bytes actually read. A genuine read
/// error is reported through `part_tx` (the same channel the workers
/// report failed parts on) rather than treated as a clean EOF, so
/// `upload` can tell a truncated source from a complete one.
async fn run_producer<R>(
    mut source: R,
    job_tx: mpsc::Sender<(u16, Vec<u8>)>,
    part_tx: mpsc::Sender<Result<PartInfo>>,
    cancel: CancellationToken,
) -> u64
where
    R: AsyncRead + Unpin,
{
    let mut part_number: u16 = 1;
    let mut total_read: u64 = 0;
    loop {
        if cancel.is_cancelled() {
            return total_read;
        }

        let mut buf = vec![0u8; PART_SIZE as usize];
        let (n, eof) = match read_block(&mut source, &mut buf).await {
            Ok(v) => v,
            Err(e) => {
                let _ = part_tx
                    .send(Err(AttachmentError::PlaintextReadFailed(anyhow::anyhow!(e))))
                    .await;
                cancel.cancel();
                return total_read;
            }
        };
        total_read += n as u64;

        if n > 0 {
            buf.truncate(n);
            if job_tx.send((part_number, buf)).await.is_err() {
                return total_read;
            }
            part_number += 1;
        }

        if eof {
            return total_read;
        }
    }
}

/// Reads up to `buf.len()` bytes, short only at end-of-stream. Returns
/// `(n, is_last)` — identical shape to the codec's own chunk reader.
async fn read_block<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
) -> std::io::Result<(usize, bool)> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Ok((filled, true));
        }
        filled += n;
    }
    Ok((filled, false))
}

async fn run_worker(
    job_rx: Arc<Mutex<mpsc::Receiver<(u16, Vec<u8>)>>>,
    part_tx: mpsc::Sender<Result<PartInfo>>,
    session: Arc<dyn MultipartSession>,
    resume_table: Arc<HashMap<u16, PartInfo>>,
    backoff: Arc<dyn Backoff>,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            return;
        }

        let job = {
            let mut rx = job_rx.lock().await;
            rx.recv().await
        };
        let Some((part_number, block)) = job else {
            return;
        };

        if let Some(existing) = resume_table.get(&part_number) {
            if existing.size == block.len() as u64 && existing.etag == etag_of(&block) {
                log::debug!("part {part_number} already stored, skipping re-upload");
                if part_tx.send(Ok(existing.clone())).await.is_err() {
                    return;
                }
                continue;
            }
        }

        let label = format!("part {part_number}");
        let result = with_retry(backoff.as_ref(), &cancel, &label, |_attempt| {
            let block = block.clone();
            let session = Arc::clone(&session);
            async move { session.put_part(part_number, block).await }
        })
        .await;

        let failed = result.is_err();
        if part_tx.send(result).await.is_err() {
            return;
        }
        if failed {
            cancel.cancel();
            return;
        }
    }
}

fn etag_of(block: &[u8]) -> String {
    format!("\"{:x}\"", md5::compute(block))
}
