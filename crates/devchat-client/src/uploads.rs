//! File-upload state machine for the message form.
//!
//! One upload at a time: pick a file, start it, watch progress, and on
//! completion post the resolved URL as an image message. Teardown while
//! an upload is in flight aborts it; an aborted or failed upload returns
//! the machine to idle so the user can retry.

use bytes::Bytes;
use tracing::{debug, warn};
use uuid::Uuid;

use devchat_backend::{BackendHandle, BlobMetadata, UploadEvent, UploadTask};
use devchat_shared::paths;
use devchat_shared::types::UserId;

use crate::Result;

/// Where the upload currently stands.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadStatus {
    Idle,
    /// Percent completed, 0.0..=100.0.
    Uploading(f32),
    /// Terminal success: the download URL to post as an image message.
    Done { url: String },
    Error { message: String },
}

pub struct MediaUpload {
    backend: BackendHandle,
    uid: UserId,
    status: UploadStatus,
    task: Option<UploadTask>,
}

impl MediaUpload {
    pub fn new(backend: BackendHandle, uid: UserId) -> Self {
        Self {
            backend,
            uid,
            status: UploadStatus::Idle,
            task: None,
        }
    }

    /// Begin uploading a picked file. The stored name gets a fresh uuid
    /// prefix so repeated uploads of `cat.png` never collide.
    pub async fn start(
        &mut self,
        file_name: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<()> {
        let stored_name = format!("{}-{file_name}", Uuid::new_v4());
        let path = paths::chat_media(&self.uid, &stored_name);
        let task = self
            .backend
            .upload_blob(path, data, BlobMetadata::new(content_type))
            .await?;
        self.task = Some(task);
        self.status = UploadStatus::Uploading(0.0);
        debug!(name = %stored_name, "Upload started");
        Ok(())
    }

    /// Drive the in-flight upload to its terminal state, returning the
    /// download URL on success. Progress updates land in [`status`] as
    /// they arrive.
    ///
    /// [`status`]: Self::status
    pub async fn drive(&mut self) -> Result<Option<String>> {
        let Some(task) = self.task.as_mut() else {
            return Ok(None);
        };

        while let Some(event) = task.next_event().await {
            match event {
                UploadEvent::Progress(percent) => {
                    self.status = UploadStatus::Uploading(percent);
                }
                UploadEvent::Complete { url } => {
                    self.task = None;
                    self.status = UploadStatus::Done { url: url.clone() };
                    return Ok(Some(url));
                }
                UploadEvent::Failed { message } => {
                    warn!(error = %message, "Upload failed");
                    self.task = None;
                    self.status = UploadStatus::Error { message };
                    return Ok(None);
                }
            }
        }

        // Stream ended without a terminal event: the task was aborted.
        self.task = None;
        self.status = UploadStatus::Idle;
        Ok(None)
    }

    /// Acknowledge a terminal state and return to idle.
    pub fn reset(&mut self) {
        if self.task.is_none() {
            self.status = UploadStatus::Idle;
        }
    }

    pub fn status(&self) -> &UploadStatus {
        &self.status
    }

    pub fn is_uploading(&self) -> bool {
        matches!(self.status, UploadStatus::Uploading(_))
    }

    /// Abort whatever is in flight. Part of adapter teardown.
    pub fn teardown(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            self.status = UploadStatus::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devchat_backend::{spawn_backend, BackendConfig};

    fn upload(backend: &BackendHandle) -> MediaUpload {
        MediaUpload::new(backend.clone(), UserId::new("u-alice"))
    }

    #[tokio::test]
    async fn test_upload_completes_with_url() {
        let (backend, _events) = spawn_backend(BackendConfig::default());
        let mut media = upload(&backend);

        media
            .start("cat.png", Bytes::from_static(b"png-bytes"), "image/png")
            .await
            .unwrap();
        assert!(media.is_uploading());

        let url = media.drive().await.unwrap().unwrap();
        assert!(url.starts_with("devchat-storage:///chat_media/u-alice/"));
        assert!(url.ends_with("-cat.png"));
        assert_eq!(media.status(), &UploadStatus::Done { url });
    }

    #[tokio::test]
    async fn test_failed_upload_allows_retry() {
        let config = BackendConfig {
            max_blob_size: 4,
            ..BackendConfig::default()
        };
        let (backend, _events) = spawn_backend(config);
        let mut media = upload(&backend);

        media
            .start("cat.png", Bytes::from_static(b"way too many bytes"), "image/png")
            .await
            .unwrap();
        assert!(media.drive().await.unwrap().is_none());
        assert!(matches!(media.status(), UploadStatus::Error { .. }));

        // Back to idle, then a small file goes through.
        media.reset();
        assert_eq!(media.status(), &UploadStatus::Idle);
        media
            .start("ok.png", Bytes::from_static(b"ok"), "image/png")
            .await
            .unwrap();
        assert!(media.drive().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_teardown_aborts_in_flight_upload() {
        let (backend, _events) = spawn_backend(BackendConfig::default());
        let mut media = upload(&backend);

        media
            .start("cat.png", Bytes::from_static(b"png-bytes"), "image/png")
            .await
            .unwrap();
        media.teardown();

        assert_eq!(media.status(), &UploadStatus::Idle);
        assert!(media.drive().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_distinct_names_for_same_file() {
        let (backend, _events) = spawn_backend(BackendConfig::default());
        let mut media = upload(&backend);

        media
            .start("cat.png", Bytes::from_static(b"one"), "image/png")
            .await
            .unwrap();
        let first = media.drive().await.unwrap().unwrap();

        media
            .start("cat.png", Bytes::from_static(b"two"), "image/png")
            .await
            .unwrap();
        let second = media.drive().await.unwrap().unwrap();

        assert_ne!(first, second);
    }
}
