//! In-process media backend.
//!
//! Tracks recording sessions and a media catalog entirely in memory with
//! synthetic file sizes, so the gateway runs end-to-end without a capture
//! stack.  Storage accounting is real enough to exercise the insufficient
//! storage and already-recording error paths.

use super::{FileCatalog, MediaController, MediaError};
use async_trait::async_trait;
use cam_protocol::{FileListResult, MediaFileInfo, RecordingInfo, SnapshotInfo, StorageInfo};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

const SUPPORTED_FORMATS: [&str; 3] = ["mp4", "mkv", "avi"];

/// Synthetic recording bitrate used for file-size accounting.
const BYTES_PER_SECOND: u64 = 2_500_000;
const SNAPSHOT_SIZE: u64 = 256 * 1024;

/// Usage ratio above which `low_space_warning` trips.
const LOW_SPACE_RATIO: f64 = 0.9;

struct ActiveRecording {
    filename: String,
    format: String,
    started_at: DateTime<Utc>,
    started: Instant,
}

#[derive(Default)]
struct CatalogState {
    active: HashMap<String, ActiveRecording>,
    recordings: Vec<MediaFileInfo>,
    snapshots: Vec<MediaFileInfo>,
    used_space: u64,
}

pub struct InProcessMedia {
    state: Mutex<CatalogState>,
    total_space: u64,
}

impl InProcessMedia {
    pub fn new() -> Self {
        Self::with_capacity(64 * 1024 * 1024 * 1024)
    }

    /// Backend with an explicit storage capacity in bytes.
    pub fn with_capacity(total_space: u64) -> Self {
        Self {
            state: Mutex::new(CatalogState::default()),
            total_space,
        }
    }

    fn page(files: &[MediaFileInfo], limit: usize, offset: usize) -> FileListResult {
        let total = files.len();
        let slice: Vec<MediaFileInfo> = files.iter().skip(offset).take(limit).cloned().collect();
        FileListResult {
            files: slice,
            total,
            limit,
            offset,
        }
    }
}

impl Default for InProcessMedia {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaController for InProcessMedia {
    async fn start_recording(
        &self,
        device: &str,
        format: &str,
        duration_secs: Option<u64>,
    ) -> Result<RecordingInfo, MediaError> {
        if !SUPPORTED_FORMATS.contains(&format) {
            return Err(MediaError::Unsupported(format!(
                "recording format '{format}'"
            )));
        }
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.used_space >= self.total_space {
            return Err(MediaError::InsufficientStorage(
                "storage capacity exhausted".to_owned(),
            ));
        }
        if state.active.contains_key(device) {
            return Err(MediaError::AlreadyRecording(device.to_owned()));
        }

        let started_at = Utc::now();
        let filename = format!(
            "{device}_{}.{format}",
            started_at.format("%Y-%m-%d_%H-%M-%S")
        );
        state.active.insert(
            device.to_owned(),
            ActiveRecording {
                filename: filename.clone(),
                format: format.to_owned(),
                started_at,
                started: Instant::now(),
            },
        );
        Ok(RecordingInfo {
            device: device.to_owned(),
            filename,
            status: "recording".to_owned(),
            format: format.to_owned(),
            started_at: started_at.to_rfc3339(),
            stopped_at: None,
            duration_secs,
            file_size: None,
        })
    }

    async fn stop_recording(&self, device: &str) -> Result<RecordingInfo, MediaError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let active = state
            .active
            .remove(device)
            .ok_or_else(|| MediaError::NotRecording(device.to_owned()))?;

        let stopped_at = Utc::now();
        let duration = active.started.elapsed().as_secs();
        let file_size = duration.max(1) * BYTES_PER_SECOND;
        state.recordings.push(MediaFileInfo {
            filename: active.filename.clone(),
            file_size,
            created_at: active.started_at.to_rfc3339(),
            duration_secs: Some(duration),
            device: Some(device.to_owned()),
        });
        state.used_space += file_size;

        Ok(RecordingInfo {
            device: device.to_owned(),
            filename: active.filename,
            status: "stopped".to_owned(),
            format: active.format,
            started_at: active.started_at.to_rfc3339(),
            stopped_at: Some(stopped_at.to_rfc3339()),
            duration_secs: Some(duration),
            file_size: Some(file_size),
        })
    }

    async fn take_snapshot(
        &self,
        device: &str,
        filename: &str,
    ) -> Result<SnapshotInfo, MediaError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.used_space + SNAPSHOT_SIZE > self.total_space {
            return Err(MediaError::InsufficientStorage(
                "storage capacity exhausted".to_owned(),
            ));
        }
        let timestamp = Utc::now();
        state.snapshots.push(MediaFileInfo {
            filename: filename.to_owned(),
            file_size: SNAPSHOT_SIZE,
            created_at: timestamp.to_rfc3339(),
            duration_secs: None,
            device: Some(device.to_owned()),
        });
        state.used_space += SNAPSHOT_SIZE;
        Ok(SnapshotInfo {
            device: device.to_owned(),
            filename: filename.to_owned(),
            status: "completed".to_owned(),
            timestamp: timestamp.to_rfc3339(),
            file_size: Some(SNAPSHOT_SIZE),
        })
    }
}

#[async_trait]
impl FileCatalog for InProcessMedia {
    async fn list_recordings(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<FileListResult, MediaError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(Self::page(&state.recordings, limit, offset))
    }

    async fn list_snapshots(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<FileListResult, MediaError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(Self::page(&state.snapshots, limit, offset))
    }

    async fn delete_recording(&self, filename: &str) -> Result<(), MediaError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let index = state
            .recordings
            .iter()
            .position(|f| f.filename == filename)
            .ok_or_else(|| MediaError::FileNotFound(filename.to_owned()))?;
        let removed = state.recordings.remove(index);
        state.used_space = state.used_space.saturating_sub(removed.file_size);
        Ok(())
    }

    async fn delete_snapshot(&self, filename: &str) -> Result<(), MediaError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let index = state
            .snapshots
            .iter()
            .position(|f| f.filename == filename)
            .ok_or_else(|| MediaError::FileNotFound(filename.to_owned()))?;
        let removed = state.snapshots.remove(index);
        state.used_space = state.used_space.saturating_sub(removed.file_size);
        Ok(())
    }

    async fn storage_info(&self) -> Result<StorageInfo, MediaError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let used = state.used_space.min(self.total_space);
        let usage = used as f64 / self.total_space as f64;
        Ok(StorageInfo {
            total_space: self.total_space,
            used_space: used,
            available_space: self.total_space - used,
            usage_percent: usage * 100.0,
            low_space_warning: usage >= LOW_SPACE_RATIO,
        })
    }
}
