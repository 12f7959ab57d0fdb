//! In-memory blob storage with progress-reporting uploads.
//!
//! Uploads run in their own tokio task and report a progress stream
//! (fractional percentages, then a terminal download URL or failure) over
//! an mpsc channel. An in-flight upload is the only cancellable operation
//! in the system; cancellation aborts the task.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use devchat_shared::paths::RemotePath;

use crate::error::BackendError;

/// Metadata supplied with an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobMetadata {
    pub content_type: String,
}

impl BlobMetadata {
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
        }
    }
}

/// Events on an upload's progress stream.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    /// Fraction completed, 0.0..=100.0.
    Progress(f32),
    /// Terminal success: the resolved download URL.
    Complete { url: String },
    /// Terminal failure. The caller may re-initiate the upload.
    Failed { message: String },
}

/// Handle to an in-flight upload.
#[derive(Debug)]
pub struct UploadTask {
    events: mpsc::Receiver<UploadEvent>,
    handle: JoinHandle<()>,
}

impl UploadTask {
    /// Next progress event, or `None` once the stream is finished or the
    /// upload was aborted.
    pub async fn next_event(&mut self) -> Option<UploadEvent> {
        self.events.recv().await
    }

    /// Cancel the upload. Triggered solely by adapter teardown.
    pub fn abort(&self) {
        self.handle.abort();
    }
}

struct StoredBlob {
    data: Bytes,
    #[allow(dead_code)]
    metadata: BlobMetadata,
}

/// Shared in-memory blob store. Cloning shares the underlying storage, so
/// upload tasks can write into the store the backend reads from.
#[derive(Clone)]
pub struct BlobStore {
    inner: Arc<Mutex<HashMap<String, StoredBlob>>>,
    max_size: usize,
    progress_steps: u32,
}

impl BlobStore {
    pub fn new(max_size: usize, progress_steps: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            max_size,
            progress_steps: progress_steps.max(1),
        }
    }

    /// The download URL a stored blob resolves to.
    pub fn download_url(path: &RemotePath) -> String {
        format!("devchat-storage:///{path}")
    }

    /// Fetch a stored blob's bytes.
    pub fn get(&self, path: &RemotePath) -> Option<Bytes> {
        let inner = self.inner.lock().ok()?;
        inner.get(&path.to_string()).map(|b| b.data.clone())
    }

    /// Spawn the upload task for `data` destined for `path`.
    ///
    /// Validation failures surface on the progress stream as
    /// [`UploadEvent::Failed`], not as an error from this call, so the
    /// caller's state machine has a single place to observe outcomes.
    pub fn begin_upload(&self, path: RemotePath, data: Bytes, metadata: BlobMetadata) -> UploadTask {
        let (tx, rx) = mpsc::channel(self.progress_steps as usize + 2);
        let store = self.clone();
        let steps = self.progress_steps;

        let handle = tokio::spawn(async move {
            if let Err(e) = store.validate(&data) {
                warn!(path = %path, error = %e, "Upload rejected");
                let _ = tx
                    .send(UploadEvent::Failed {
                        message: e.to_string(),
                    })
                    .await;
                return;
            }

            for step in 1..=steps {
                let percent = step as f32 / steps as f32 * 100.0;
                if tx.send(UploadEvent::Progress(percent)).await.is_err() {
                    // Receiver dropped; nobody is watching this upload.
                    return;
                }
                // Yield between chunks so an abort lands mid-transfer.
                tokio::task::yield_now().await;
            }

            let url = Self::download_url(&path);
            if let Ok(mut inner) = store.inner.lock() {
                inner.insert(path.to_string(), StoredBlob { data, metadata });
            }
            debug!(path = %path, url = %url, "Blob stored");
            let _ = tx.send(UploadEvent::Complete { url }).await;
        });

        UploadTask { events: rx, handle }
    }

    fn validate(&self, data: &Bytes) -> Result<(), BackendError> {
        if data.is_empty() {
            return Err(BackendError::EmptyBlob);
        }
        if data.len() > self.max_size {
            return Err(BackendError::BlobTooLarge {
                size: data.len(),
                max: self.max_size,
            });
        }
        Ok(())
    }
}
