//! Downstream media collaborators: the recording/snapshot controller and the
//! file catalog, specified only by the interfaces the gateway consumes.
//!
//! Real deployments plug a process-external controller in at `AppState`
//! construction; [`backend::InProcessMedia`] is the in-memory implementation
//! the binary and the tests run against.

pub mod backend;

use async_trait::async_trait;
use cam_protocol::{FileListResult, RecordingInfo, SnapshotInfo, StorageInfo};
use thiserror::Error;

/// Typed failures a media collaborator can report.
///
/// Each variant maps onto one stable wire code in the dispatcher's reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    #[error("camera {0} not found or disconnected")]
    CameraNotFound(String),
    #[error("recording already in progress on {0}")]
    AlreadyRecording(String),
    #[error("no active recording on {0}")]
    NotRecording(String),
    #[error("file {0} not found")]
    FileNotFound(String),
    #[error("media backend unavailable: {0}")]
    Unavailable(String),
    #[error("insufficient storage: {0}")]
    InsufficientStorage(String),
    #[error("capability not supported: {0}")]
    Unsupported(String),
}

/// Recording, snapshot and stream control for a single media backend.
#[async_trait]
pub trait MediaController: Send + Sync {
    async fn start_recording(
        &self,
        device: &str,
        format: &str,
        duration_secs: Option<u64>,
    ) -> Result<RecordingInfo, MediaError>;

    async fn stop_recording(&self, device: &str) -> Result<RecordingInfo, MediaError>;

    async fn take_snapshot(
        &self,
        device: &str,
        filename: &str,
    ) -> Result<SnapshotInfo, MediaError>;
}

/// Stored-media queries over recordings and snapshots.
#[async_trait]
pub trait FileCatalog: Send + Sync {
    async fn list_recordings(&self, limit: usize, offset: usize)
    -> Result<FileListResult, MediaError>;

    async fn list_snapshots(&self, limit: usize, offset: usize)
    -> Result<FileListResult, MediaError>;

    async fn delete_recording(&self, filename: &str) -> Result<(), MediaError>;

    async fn delete_snapshot(&self, filename: &str) -> Result<(), MediaError>;

    async fn storage_info(&self) -> Result<StorageInfo, MediaError>;
}
