//! Backend task with tokio mpsc command/event pattern.
//!
//! The backend runs in a dedicated tokio task. The client communicates
//! with it through a typed command channel and drains a single event
//! channel, keeping all view-state mutation on one logical thread.

use bytes::Bytes;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use devchat_shared::paths::RemotePath;
use devchat_shared::types::{server_timestamp, EventKind, PushKey};

use crate::blobs::{BlobMetadata, BlobStore, UploadTask};
use crate::config::BackendConfig;
use crate::error::BackendError;
use crate::keys::KeyAllocator;
use crate::tree::TreeStore;
use crate::Result;

// ---------------------------------------------------------------------------
// Command / event types
// ---------------------------------------------------------------------------

/// Commands sent *into* the backend task.
#[derive(Debug)]
pub enum BackendCommand {
    /// Write `value` at a caller-supplied path (idempotent for equal input).
    Write {
        path: RemotePath,
        value: Value,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Append `value` under a freshly allocated, order-preserving key.
    PushAndWrite {
        path: RemotePath,
        value: Value,
        reply: oneshot::Sender<Result<PushKey>>,
    },
    /// Single snapshot read, no ongoing subscription.
    ReadOnce {
        path: RemotePath,
        reply: oneshot::Sender<Option<Value>>,
    },
    /// Delete the subtree at `path`.
    Remove {
        path: RemotePath,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Start delivering `kind` events for `path`: ordered backlog first,
    /// then live events. Duplicate subscriptions are a no-op.
    Subscribe {
        path: RemotePath,
        kind: EventKind,
        reply: oneshot::Sender<()>,
    },
    /// Stop delivering exactly the `(path, kind)` pair.
    Unsubscribe {
        path: RemotePath,
        kind: EventKind,
        reply: oneshot::Sender<()>,
    },
    /// Remove `path` if this client's connection drops uncleanly.
    RegisterDisconnectCleanup {
        path: RemotePath,
        reply: oneshot::Sender<()>,
    },
    /// Store a blob, reporting progress on the returned task's stream.
    UploadBlob {
        path: RemotePath,
        data: Bytes,
        metadata: BlobMetadata,
        reply: oneshot::Sender<UploadTask>,
    },
    /// Number of active `(path, kind)` subscriptions.
    ActiveSubscriptionCount {
        reply: oneshot::Sender<usize>,
    },
    /// Simulate an unclean connection drop: fire registered cleanups and
    /// signal `Connection(false)`.
    DropConnection {
        reply: oneshot::Sender<()>,
    },
    /// Re-establish the connection signal after a drop.
    Reconnect {
        reply: oneshot::Sender<()>,
    },
    /// Gracefully shut down the backend task.
    Shutdown,
}

/// Events delivered *from* the backend to the client, in backend commit
/// order per `(path, kind)`. No ordering holds across different pairs.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// Live connectivity signal. `true` is emitted when the connection is
    /// first established and after every reconnect.
    Connection(bool),
    /// An element appeared under a subscribed path.
    ChildAdded {
        path: RemotePath,
        key: String,
        value: Value,
    },
    /// An element disappeared from under a subscribed path.
    ChildRemoved {
        path: RemotePath,
        key: String,
        value: Value,
    },
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cloneable handle for issuing commands to a spawned backend.
#[derive(Clone)]
pub struct BackendHandle {
    cmd_tx: mpsc::Sender<BackendCommand>,
}

impl BackendHandle {
    pub async fn write(&self, path: RemotePath, value: Value) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(BackendCommand::Write { path, value, reply }).await?;
        rx.await.map_err(|_| BackendError::Closed)?
    }

    pub async fn push_and_write(&self, path: RemotePath, value: Value) -> Result<PushKey> {
        let (reply, rx) = oneshot::channel();
        self.send(BackendCommand::PushAndWrite { path, value, reply })
            .await?;
        rx.await.map_err(|_| BackendError::Closed)?
    }

    pub async fn read_once(&self, path: RemotePath) -> Result<Option<Value>> {
        let (reply, rx) = oneshot::channel();
        self.send(BackendCommand::ReadOnce { path, reply }).await?;
        rx.await.map_err(|_| BackendError::Closed)
    }

    pub async fn remove(&self, path: RemotePath) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(BackendCommand::Remove { path, reply }).await?;
        rx.await.map_err(|_| BackendError::Closed)?
    }

    pub async fn subscribe(&self, path: RemotePath, kind: EventKind) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(BackendCommand::Subscribe { path, kind, reply })
            .await?;
        rx.await.map_err(|_| BackendError::Closed)
    }

    pub async fn unsubscribe(&self, path: RemotePath, kind: EventKind) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(BackendCommand::Unsubscribe { path, kind, reply })
            .await?;
        rx.await.map_err(|_| BackendError::Closed)
    }

    pub async fn register_disconnect_cleanup(&self, path: RemotePath) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(BackendCommand::RegisterDisconnectCleanup { path, reply })
            .await?;
        rx.await.map_err(|_| BackendError::Closed)
    }

    pub async fn upload_blob(
        &self,
        path: RemotePath,
        data: Bytes,
        metadata: BlobMetadata,
    ) -> Result<UploadTask> {
        let (reply, rx) = oneshot::channel();
        self.send(BackendCommand::UploadBlob {
            path,
            data,
            metadata,
            reply,
        })
        .await?;
        rx.await.map_err(|_| BackendError::Closed)
    }

    pub async fn active_subscription_count(&self) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.send(BackendCommand::ActiveSubscriptionCount { reply })
            .await?;
        rx.await.map_err(|_| BackendError::Closed)
    }

    pub async fn drop_connection(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(BackendCommand::DropConnection { reply }).await?;
        rx.await.map_err(|_| BackendError::Closed)
    }

    pub async fn reconnect(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(BackendCommand::Reconnect { reply }).await?;
        rx.await.map_err(|_| BackendError::Closed)
    }

    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(BackendCommand::Shutdown).await;
    }

    async fn send(&self, cmd: BackendCommand) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| BackendError::Closed)
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

struct Backend {
    tree: TreeStore,
    keys: KeyAllocator,
    blobs: BlobStore,
    subscriptions: std::collections::HashSet<(RemotePath, EventKind)>,
    disconnect_cleanups: Vec<RemotePath>,
    event_tx: mpsc::Sender<BackendEvent>,
}

/// Spawn the backend in a background tokio task.
///
/// Returns the command handle and the event stream. A `Connection(true)`
/// event is the first thing the stream delivers.
pub fn spawn_backend(config: BackendConfig) -> (BackendHandle, mpsc::Receiver<BackendEvent>) {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<BackendCommand>(config.command_capacity);
    let (event_tx, event_rx) = mpsc::channel::<BackendEvent>(config.event_capacity);

    let mut backend = Backend {
        tree: TreeStore::new(),
        keys: KeyAllocator::new(),
        blobs: BlobStore::new(config.max_blob_size, config.upload_progress_steps),
        subscriptions: std::collections::HashSet::new(),
        disconnect_cleanups: Vec::new(),
        event_tx,
    };

    tokio::spawn(async move {
        info!("Backend task started");
        backend.emit(BackendEvent::Connection(true)).await;

        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                BackendCommand::Write { path, value, reply } => {
                    let result = backend.handle_write(&path, value).await;
                    let _ = reply.send(result);
                }
                BackendCommand::PushAndWrite { path, value, reply } => {
                    let now = Utc::now().timestamp_millis();
                    let key = backend.keys.next_key(now);
                    let result = backend
                        .handle_write(&path.child(key.as_str()), value)
                        .await
                        .map(|_| key.clone());
                    debug!(path = %path, key = %key, "Push write");
                    let _ = reply.send(result);
                }
                BackendCommand::ReadOnce { path, reply } => {
                    let _ = reply.send(backend.tree.read(&path));
                }
                BackendCommand::Remove { path, reply } => {
                    backend.handle_remove(&path).await;
                    let _ = reply.send(Ok(()));
                }
                BackendCommand::Subscribe { path, kind, reply } => {
                    backend.handle_subscribe(path, kind).await;
                    let _ = reply.send(());
                }
                BackendCommand::Unsubscribe { path, kind, reply } => {
                    if backend.subscriptions.remove(&(path.clone(), kind)) {
                        debug!(path = %path, kind = ?kind, "Unsubscribed");
                    }
                    let _ = reply.send(());
                }
                BackendCommand::RegisterDisconnectCleanup { path, reply } => {
                    if !backend.disconnect_cleanups.contains(&path) {
                        debug!(path = %path, "Disconnect cleanup registered");
                        backend.disconnect_cleanups.push(path);
                    }
                    let _ = reply.send(());
                }
                BackendCommand::UploadBlob {
                    path,
                    data,
                    metadata,
                    reply,
                } => {
                    let task = backend.blobs.begin_upload(path, data, metadata);
                    let _ = reply.send(task);
                }
                BackendCommand::ActiveSubscriptionCount { reply } => {
                    let _ = reply.send(backend.subscriptions.len());
                }
                BackendCommand::DropConnection { reply } => {
                    backend.handle_drop_connection().await;
                    let _ = reply.send(());
                }
                BackendCommand::Reconnect { reply } => {
                    info!("Connection re-established");
                    backend.emit(BackendEvent::Connection(true)).await;
                    let _ = reply.send(());
                }
                BackendCommand::Shutdown => {
                    info!("Backend shutdown requested");
                    break;
                }
            }
        }

        info!("Backend task terminated");
    });

    (BackendHandle { cmd_tx }, event_rx)
}

impl Backend {
    async fn handle_write(&mut self, path: &RemotePath, mut value: Value) -> Result<()> {
        if path.is_root() {
            return Err(BackendError::WriteRejected(
                "Cannot write at the tree root".to_string(),
            ));
        }
        if value.is_null() {
            // Writing null deletes, with the same event fan-out as a remove.
            self.handle_remove(path).await;
            return Ok(());
        }
        self.resolve_server_values(&mut value);

        let created = self.tree.write(path, value);
        for child in created {
            if !self.subscriptions.contains(&(child.parent.clone(), EventKind::ChildAdded)) {
                continue;
            }
            let child_path = child.parent.child(&child.key);
            if let Some(snapshot) = self.tree.read(&child_path) {
                self.emit(BackendEvent::ChildAdded {
                    path: child.parent,
                    key: child.key,
                    value: snapshot,
                })
                .await;
            }
        }
        Ok(())
    }

    async fn handle_remove(&mut self, path: &RemotePath) {
        if let Some(removed) = self.tree.remove(path) {
            debug!(path = %path, "Removed");
            if self
                .subscriptions
                .contains(&(removed.parent.clone(), EventKind::ChildRemoved))
            {
                self.emit(BackendEvent::ChildRemoved {
                    path: removed.parent,
                    key: removed.key,
                    value: removed.value,
                })
                .await;
            }
        }
    }

    async fn handle_subscribe(&mut self, path: RemotePath, kind: EventKind) {
        if !self.subscriptions.insert((path.clone(), kind)) {
            // Already live; a second backlog replay would duplicate the mirror.
            return;
        }
        debug!(path = %path, kind = ?kind, "Subscribed");

        if kind == EventKind::ChildAdded {
            for (key, value) in self.tree.children(&path) {
                self.emit(BackendEvent::ChildAdded {
                    path: path.clone(),
                    key,
                    value,
                })
                .await;
            }
        }
    }

    async fn handle_drop_connection(&mut self) {
        warn!(
            cleanups = self.disconnect_cleanups.len(),
            "Connection dropped uncleanly"
        );
        let cleanups = std::mem::take(&mut self.disconnect_cleanups);
        for path in cleanups {
            self.handle_remove(&path).await;
        }
        self.emit(BackendEvent::Connection(false)).await;
    }

    /// Replace every server-timestamp sentinel in `value` with the
    /// backend's clock for this write.
    fn resolve_server_values(&mut self, value: &mut Value) {
        let sentinel = server_timestamp();
        let now = Utc::now().timestamp_millis();
        resolve_in_place(value, &sentinel, || self.keys.next_timestamp(now));
    }

    async fn emit(&self, event: BackendEvent) {
        if self.event_tx.send(event).await.is_err() {
            debug!("Event receiver dropped");
        }
    }
}

fn resolve_in_place<F: FnMut() -> i64>(value: &mut Value, sentinel: &Value, mut clock: F) {
    fn walk(value: &mut Value, sentinel: &Value, clock: &mut dyn FnMut() -> i64) {
        if value == sentinel {
            *value = Value::from(clock());
            return;
        }
        if let Value::Object(map) = value {
            for (_, v) in map.iter_mut() {
                walk(v, sentinel, clock);
            }
        }
    }
    walk(value, sentinel, &mut clock);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn p(s: &str) -> RemotePath {
        RemotePath::parse(s)
    }

    async fn expect_connection(events: &mut mpsc::Receiver<BackendEvent>, up: bool) {
        assert_eq!(events.recv().await.unwrap(), BackendEvent::Connection(up));
    }

    #[tokio::test]
    async fn test_backlog_replayed_in_write_order() {
        let (backend, mut events) = spawn_backend(BackendConfig::default());
        expect_connection(&mut events, true).await;

        for content in ["one", "two", "three"] {
            backend
                .push_and_write(p("messages/general"), json!({ "content": content }))
                .await
                .unwrap();
        }

        backend
            .subscribe(p("messages/general"), EventKind::ChildAdded)
            .await
            .unwrap();

        for expected in ["one", "two", "three"] {
            match events.recv().await.unwrap() {
                BackendEvent::ChildAdded { value, .. } => {
                    assert_eq!(value["content"], expected);
                }
                other => panic!("expected ChildAdded, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_live_events_follow_backlog() {
        let (backend, mut events) = spawn_backend(BackendConfig::default());
        expect_connection(&mut events, true).await;

        backend
            .push_and_write(p("messages/general"), json!({ "content": "old" }))
            .await
            .unwrap();
        backend
            .subscribe(p("messages/general"), EventKind::ChildAdded)
            .await
            .unwrap();
        backend
            .push_and_write(p("messages/general"), json!({ "content": "new" }))
            .await
            .unwrap();

        let contents: Vec<String> = {
            let mut out = Vec::new();
            for _ in 0..2 {
                if let BackendEvent::ChildAdded { value, .. } = events.recv().await.unwrap() {
                    out.push(value["content"].as_str().unwrap().to_string());
                }
            }
            out
        };
        assert_eq!(contents, vec!["old", "new"]);
    }

    #[tokio::test]
    async fn test_duplicate_subscribe_does_not_replay() {
        let (backend, mut events) = spawn_backend(BackendConfig::default());
        expect_connection(&mut events, true).await;

        backend
            .push_and_write(p("channels"), json!({ "name": "general" }))
            .await
            .unwrap();
        backend
            .subscribe(p("channels"), EventKind::ChildAdded)
            .await
            .unwrap();
        backend
            .subscribe(p("channels"), EventKind::ChildAdded)
            .await
            .unwrap();

        assert!(matches!(
            events.recv().await.unwrap(),
            BackendEvent::ChildAdded { .. }
        ));
        assert_eq!(backend.active_subscription_count().await.unwrap(), 1);
        // Only one backlog entry must have been delivered.
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let (backend, mut events) = spawn_backend(BackendConfig::default());
        expect_connection(&mut events, true).await;

        backend
            .subscribe(p("presence"), EventKind::ChildAdded)
            .await
            .unwrap();
        backend
            .unsubscribe(p("presence"), EventKind::ChildAdded)
            .await
            .unwrap();
        backend.write(p("presence/u1"), json!(true)).await.unwrap();

        assert_eq!(backend.active_subscription_count().await.unwrap(), 0);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_remove_fires_child_removed() {
        let (backend, mut events) = spawn_backend(BackendConfig::default());
        expect_connection(&mut events, true).await;

        backend.write(p("presence/u1"), json!(true)).await.unwrap();
        backend
            .subscribe(p("presence"), EventKind::ChildRemoved)
            .await
            .unwrap();
        backend.remove(p("presence/u1")).await.unwrap();

        match events.recv().await.unwrap() {
            BackendEvent::ChildRemoved { path, key, value } => {
                assert_eq!(path, p("presence"));
                assert_eq!(key, "u1");
                assert_eq!(value, json!(true));
            }
            other => panic!("expected ChildRemoved, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_disconnect_fires_registered_cleanups() {
        let (backend, mut events) = spawn_backend(BackendConfig::default());
        expect_connection(&mut events, true).await;

        backend
            .write(p("typing/general/u1"), json!("Alice"))
            .await
            .unwrap();
        backend
            .subscribe(p("typing/general"), EventKind::ChildRemoved)
            .await
            .unwrap();
        backend
            .register_disconnect_cleanup(p("typing/general/u1"))
            .await
            .unwrap();

        backend.drop_connection().await.unwrap();

        match events.recv().await.unwrap() {
            BackendEvent::ChildRemoved { key, .. } => assert_eq!(key, "u1"),
            other => panic!("expected ChildRemoved, got {other:?}"),
        }
        expect_connection(&mut events, false).await;
        assert_eq!(backend.read_once(p("typing/general/u1")).await.unwrap(), None);

        // Cleanups fire once; a reconnect + second drop removes nothing.
        backend.reconnect().await.unwrap();
        expect_connection(&mut events, true).await;
        backend.drop_connection().await.unwrap();
        expect_connection(&mut events, false).await;
    }

    #[tokio::test]
    async fn test_server_timestamp_resolution_is_monotonic() {
        let (backend, mut events) = spawn_backend(BackendConfig::default());
        expect_connection(&mut events, true).await;

        let path = p("messages/general");
        for _ in 0..3 {
            backend
                .push_and_write(
                    path.clone(),
                    json!({ "timestamp": server_timestamp(), "content": "x" }),
                )
                .await
                .unwrap();
        }

        let snapshot = backend.read_once(path).await.unwrap().unwrap();
        let mut timestamps: Vec<i64> = snapshot
            .as_object()
            .unwrap()
            .values()
            .map(|m| m["timestamp"].as_i64().unwrap())
            .collect();
        let unsorted = timestamps.clone();
        timestamps.sort_unstable();
        timestamps.dedup();
        assert_eq!(timestamps.len(), 3, "timestamps must be distinct: {unsorted:?}");
    }

    #[tokio::test]
    async fn test_read_once_missing_path() {
        let (backend, mut events) = spawn_backend(BackendConfig::default());
        expect_connection(&mut events, true).await;
        assert_eq!(backend.read_once(p("nope")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_push_keys_returned_in_order() {
        let (backend, mut events) = spawn_backend(BackendConfig::default());
        expect_connection(&mut events, true).await;

        let mut keys = Vec::new();
        for i in 0..10 {
            keys.push(
                backend
                    .push_and_write(p("messages/general"), json!({ "content": i }))
                    .await
                    .unwrap(),
            );
        }
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[tokio::test]
    async fn test_shutdown_closes_handle() {
        let (backend, mut events) = spawn_backend(BackendConfig::default());
        expect_connection(&mut events, true).await;
        backend.shutdown().await;

        // The task drains already-queued commands before exiting, so a
        // subsequent request must fail once the channel closes.
        let mut saw_closed = false;
        for _ in 0..10 {
            if backend.read_once(p("x")).await.is_err() {
                saw_closed = true;
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(saw_closed);
    }
}
