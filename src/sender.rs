//! Wraps a [`Connection`] with a JSON-array queue file: direct send with
//! fallback queueing, and a drain operation that snapshots, clears, then
//! replays the queue (§4.6).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::cancel::CancelToken;
use crate::connection::{Connection, ConnectionError};
use crate::types::Payload;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("queue: failed to write queued file {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("queue: failed to rename temp file into place at {path}: {source}")]
    Rename {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[allow(dead_code)]
impl QueueError {
    pub fn kind(&self) -> &str {
        match *self {
            QueueError::Write { .. } => "Write",
            QueueError::Rename { .. } => "Rename",
        }
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error("Metrics data could neither be sent nor queued: {send_error}; {queue_error}")]
    Unrecoverable {
        send_error: ConnectionError,
        queue_error: QueueError,
    },
    #[error("drain: could not clear queue file before replay: {0}")]
    ClearFailed(#[from] QueueError),
    #[error("cancelled")]
    Cancelled,
}

#[allow(dead_code)]
impl SendError {
    pub fn kind(&self) -> &str {
        match *self {
            SendError::Connection(_) => "Connection",
            SendError::Unrecoverable { .. } => "Unrecoverable",
            SendError::ClearFailed(_) => "ClearFailed",
            SendError::Cancelled => "Cancelled",
        }
    }
}

/// Read the queue file's JSON array. Per §3, any content that is not a
/// syntactically valid JSON array (missing file, empty file, garbage) is
/// silently treated as an empty queue, with a warning for the genuinely
/// malformed case.
fn read_queue(path: &Path) -> Vec<Payload> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return Vec::new(),
    };
    if contents.trim().is_empty() {
        return Vec::new();
    }
    match serde_json::from_str(&contents) {
        Ok(items) => items,
        Err(e) => {
            log::warn!("queue: {} did not contain a valid JSON array ({e}); treating as empty", path.display());
            Vec::new()
        }
    }
}

/// Overwrite `path` with `items` as a JSON array, via write-to-temp then
/// rename so a reader never observes a partially-written file.
fn write_queue_atomic(path: &Path, items: &[Payload]) -> Result<(), QueueError> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let tmp_path = path.with_extension("tmp");
    let serialized = serde_json::to_string(items).expect("queue items always serialize");
    fs::write(&tmp_path, serialized).map_err(|source| QueueError::Write {
        path: tmp_path.display().to_string(),
        source,
    })?;
    fs::rename(&tmp_path, path).map_err(|source| QueueError::Rename {
        path: path.display().to_string(),
        source,
    })
}

pub struct Sender {
    connection: Connection,
    queue_path: PathBuf,
}

impl Sender {
    pub fn new(connection: Connection, queue_path: impl Into<PathBuf>) -> Self {
        Sender {
            connection,
            queue_path: queue_path.into(),
        }
    }

    fn enqueue(&self, payload: &Payload) -> Result<(), QueueError> {
        let mut items = read_queue(&self.queue_path);
        items.push(payload.clone());
        write_queue_atomic(&self.queue_path, &items)
    }

    /// Try a direct send; on failure, queue the payload for later replay.
    /// Returns `Ok(())` if either the send or the fallback enqueue
    /// succeeded; only fails if both do.
    pub fn send_data_sync(&self, payload: &Payload, cancel: &CancelToken) -> Result<(), SendError> {
        if cancel.is_cancelled() {
            return Err(SendError::Cancelled);
        }
        match self.connection.send_sync(payload, cancel) {
            Ok(()) => Ok(()),
            Err(send_error) => {
                log::debug!("sender: direct send failed ({send_error}), queueing");
                match self.enqueue(payload) {
                    Ok(()) => Ok(()),
                    Err(queue_error) => Err(SendError::Unrecoverable {
                        send_error,
                        queue_error,
                    }),
                }
            }
        }
    }

    /// Async form of [`Sender::send_data_sync`]: the network attempt is
    /// non-blocking; the fallback enqueue (filesystem I/O) runs on a
    /// blocking worker thread only when it's actually needed.
    pub async fn send_data_async(&self, payload: Payload, cancel: CancelToken) -> Result<(), SendError> {
        if cancel.is_cancelled() {
            return Err(SendError::Cancelled);
        }
        match self.connection.send_async(&payload, &cancel).await {
            Ok(()) => Ok(()),
            Err(send_error) => {
                log::debug!("sender: direct send failed ({send_error}), queueing");
                let queue_path = self.queue_path.clone();
                let queue_result =
                    tokio::task::spawn_blocking(move || {
                        let mut items = read_queue(&queue_path);
                        items.push(payload);
                        write_queue_atomic(&queue_path, &items)
                    })
                    .await
                    .expect("enqueue task panicked");
                match queue_result {
                    Ok(()) => Ok(()),
                    Err(queue_error) => Err(SendError::Unrecoverable {
                        send_error,
                        queue_error,
                    }),
                }
            }
        }
    }

    /// Snapshot-and-clear the queue, then replay each entry through
    /// `send_data_sync`. Stops at the first failure; entries not yet
    /// replayed (and, per the documented trade-off in §9, entries already
    /// replayed successfully before the failure) are lost because the
    /// queue file was cleared up front.
    pub fn drain_queue_sync(&self, cancel: &CancelToken) -> Result<(), SendError> {
        if cancel.is_cancelled() {
            return Err(SendError::Cancelled);
        }
        let snapshot = read_queue(&self.queue_path);
        write_queue_atomic(&self.queue_path, &[])?;

        for payload in snapshot {
            self.send_data_sync(&payload, cancel)?;
        }
        Ok(())
    }

    /// Runs [`Sender::drain_queue_sync`] on a blocking worker thread, per
    /// the "use a thread because the body is many blocking I/O ops"
    /// strategy endorsed in §9.
    pub async fn drain_queue_async(self: Arc<Self>, cancel: CancelToken) -> Result<(), SendError> {
        tokio::task::spawn_blocking(move || self.drain_queue_sync(&cancel))
            .await
            .expect("drain task panicked")
    }
}
