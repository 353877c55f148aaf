//! Notifier adapters: translate collaborator domain events into bus
//! publications, remapping identifiers at the boundary.
//!
//! Adapter methods are total.  An event that cannot be published correctly
//! (unmapped device) is dropped with a warning instead of propagating an
//! error into the producing subsystem, and internal device paths never
//! become the primary identifier of an outbound payload.

use crate::events::EventBus;
use crate::mapper::CameraIdMapper;
use cam_protocol::{CameraCapabilities, EventTopic, RecordingInfo, SnapshotInfo};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::{info, warn};

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        // json!({...}) below always builds objects.
        _ => Map::new(),
    }
}

// ---------------------------------------------------------------------------
// Camera adapter (input: device paths)
// ---------------------------------------------------------------------------

/// Bridges the camera monitor to the bus.  Maintains the identifier mapper
/// and rewrites device paths to external ids before anything is published.
pub struct CameraNotifier {
    bus: Arc<EventBus>,
    mapper: Arc<CameraIdMapper>,
}

impl CameraNotifier {
    pub fn new(bus: Arc<EventBus>, mapper: Arc<CameraIdMapper>) -> Self {
        Self { bus, mapper }
    }

    /// Map a path to its external id, or drop the event with a warning.
    fn external_id(&self, device_path: &str, topic: EventTopic) -> Option<String> {
        match self.mapper.external_for(device_path) {
            Some(id) => Some(id),
            None => {
                warn!(
                    device_path,
                    topic = %topic,
                    "dropping event for unmapped device"
                );
                None
            }
        }
    }

    /// A device appeared.  Registers the mapping, then publishes.
    pub fn camera_connected(
        &self,
        device_path: &str,
        name: &str,
        resolution: Option<&str>,
        fps: Option<u32>,
    ) {
        let device = self.mapper.device_added(device_path);
        info!(device = %device, device_path, "camera connected");
        let mut payload = object(json!({
            "device": device,
            "device_path": device_path,
            "name": name,
            "status": "connected",
        }));
        if let Some(res) = resolution {
            payload.insert("resolution".to_owned(), Value::from(res));
        }
        if let Some(fps) = fps {
            payload.insert("fps".to_owned(), Value::from(fps));
        }
        self.bus.publish(EventTopic::CameraConnected, payload);
    }

    /// A device disappeared.  Publishes first, then frees the mapping so the
    /// outbound payload still carries the id clients knew.
    pub fn camera_disconnected(&self, device_path: &str) {
        let Some(device) = self.external_id(device_path, EventTopic::CameraDisconnected) else {
            return;
        };
        info!(device = %device, device_path, "camera disconnected");
        self.bus.publish(
            EventTopic::CameraDisconnected,
            object(json!({
                "device": device,
                "device_path": device_path,
                "status": "disconnected",
            })),
        );
        self.mapper.device_removed(device_path);
    }

    pub fn camera_status_change(&self, device_path: &str, status: &str) {
        let Some(device) = self.external_id(device_path, EventTopic::CameraStatusChange) else {
            return;
        };
        self.bus.publish(
            EventTopic::CameraStatusChange,
            object(json!({
                "device": device,
                "device_path": device_path,
                "status": status,
            })),
        );
    }

    pub fn capability_detected(&self, device_path: &str, capabilities: &CameraCapabilities) {
        let Some(device) = self.external_id(device_path, EventTopic::CameraCapabilityDetected)
        else {
            return;
        };
        self.bus.publish(
            EventTopic::CameraCapabilityDetected,
            object(json!({
                "device": device,
                "device_path": device_path,
                "capabilities": capabilities,
            })),
        );
    }

    /// Capability probe failed.  The external id stays the primary field
    /// here too; the path rides only in the documented metadata slot.
    pub fn capability_error(&self, device_path: &str, error: &str) {
        let Some(device) = self.external_id(device_path, EventTopic::CameraCapabilityError) else {
            return;
        };
        self.bus.publish(
            EventTopic::CameraCapabilityError,
            object(json!({
                "device": device,
                "device_path": device_path,
                "error": error,
            })),
        );
    }
}

// ---------------------------------------------------------------------------
// Media adapter (input: external ids)
// ---------------------------------------------------------------------------

/// Bridges the media controller to the bus.  Inputs already carry external
/// ids; unknown ids are dropped rather than republished.
pub struct MediaNotifier {
    bus: Arc<EventBus>,
    mapper: Arc<CameraIdMapper>,
}

impl MediaNotifier {
    pub fn new(bus: Arc<EventBus>, mapper: Arc<CameraIdMapper>) -> Self {
        Self { bus, mapper }
    }

    fn known(&self, device: &str, topic: EventTopic) -> bool {
        if self.mapper.contains_external(device) {
            true
        } else {
            warn!(device, topic = %topic, "dropping event for unknown camera id");
            false
        }
    }

    pub fn recording_started(&self, recording: &RecordingInfo) {
        if !self.known(&recording.device, EventTopic::RecordingStarted) {
            return;
        }
        self.bus.publish(
            EventTopic::RecordingStarted,
            object(json!({
                "device": recording.device,
                "filename": recording.filename,
                "format": recording.format,
                "started_at": recording.started_at,
            })),
        );
    }

    pub fn recording_stopped(&self, recording: &RecordingInfo) {
        if !self.known(&recording.device, EventTopic::RecordingStopped) {
            return;
        }
        let mut payload = object(json!({
            "device": recording.device,
            "filename": recording.filename,
        }));
        if let Some(duration) = recording.duration_secs {
            payload.insert("duration_secs".to_owned(), Value::from(duration));
        }
        if let Some(size) = recording.file_size {
            payload.insert("file_size".to_owned(), Value::from(size));
        }
        self.bus.publish(EventTopic::RecordingStopped, payload);
    }

    pub fn recording_failed(&self, device: &str, error: &str) {
        if !self.known(device, EventTopic::RecordingFailed) {
            return;
        }
        self.bus.publish(
            EventTopic::RecordingFailed,
            object(json!({"device": device, "error": error})),
        );
    }

    pub fn snapshot_taken(&self, snapshot: &SnapshotInfo) {
        if !self.known(&snapshot.device, EventTopic::SnapshotTaken) {
            return;
        }
        self.bus.publish(
            EventTopic::SnapshotTaken,
            object(json!({
                "device": snapshot.device,
                "filename": snapshot.filename,
            })),
        );
    }

    pub fn snapshot_failed(&self, device: &str, filename: &str, error: &str) {
        if !self.known(device, EventTopic::SnapshotFailed) {
            return;
        }
        self.bus.publish(
            EventTopic::SnapshotFailed,
            object(json!({
                "device": device,
                "filename": filename,
                "error": error,
            })),
        );
    }

    pub fn stream_started(&self, device: &str, url: &str) {
        if !self.known(device, EventTopic::StreamStarted) {
            return;
        }
        self.bus.publish(
            EventTopic::StreamStarted,
            object(json!({"device": device, "url": url})),
        );
    }

    pub fn stream_stopped(&self, device: &str) {
        if !self.known(device, EventTopic::StreamStopped) {
            return;
        }
        self.bus.publish(
            EventTopic::StreamStopped,
            object(json!({"device": device})),
        );
    }
}

// ---------------------------------------------------------------------------
// System adapter (no remapping)
// ---------------------------------------------------------------------------

/// Deployment-level lifecycle events.
pub struct SystemNotifier {
    bus: Arc<EventBus>,
}

impl SystemNotifier {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }

    pub fn startup(&self, version: &str) {
        self.bus.publish(
            EventTopic::SystemStartup,
            object(json!({"service": "camgate", "version": version})),
        );
    }

    pub fn shutdown(&self, reason: &str) {
        self.bus.publish(
            EventTopic::SystemShutdown,
            object(json!({"service": "camgate", "reason": reason})),
        );
    }

    pub fn health(&self, status: &str, active_connections: usize) {
        self.bus.publish(
            EventTopic::SystemHealth,
            object(json!({
                "status": status,
                "active_connections": active_connections,
            })),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cam_protocol::EventMessage;
    use tokio::sync::mpsc;

    fn subscribed_bus() -> (Arc<EventBus>, mpsc::Receiver<EventMessage>) {
        let bus = Arc::new(EventBus::new());
        let (tx, rx) = mpsc::channel(16);
        bus.register_sender(1, tx);
        bus.subscribe(1, &EventTopic::ALL, None);
        (bus, rx)
    }

    #[test]
    fn connected_event_carries_external_id_as_primary_field() {
        let (bus, mut rx) = subscribed_bus();
        let mapper = Arc::new(CameraIdMapper::new());
        let notifier = CameraNotifier::new(bus, Arc::clone(&mapper));

        notifier.camera_connected("/dev/video0", "USB Camera", Some("1920x1080"), Some(30));

        let event = rx.try_recv().expect("event published");
        assert_eq!(event.topic, EventTopic::CameraConnected);
        assert_eq!(event.payload["device"], "camera0");
        assert_eq!(event.payload["device_path"], "/dev/video0");
        assert_eq!(event.payload["resolution"], "1920x1080");
        assert!(event.payload.contains_key("timestamp"));
        assert_eq!(mapper.external_for("/dev/video0").as_deref(), Some("camera0"));
    }

    #[test]
    fn unmapped_path_is_dropped_not_published() {
        let (bus, mut rx) = subscribed_bus();
        let mapper = Arc::new(CameraIdMapper::new());
        let notifier = CameraNotifier::new(Arc::clone(&bus), mapper);

        notifier.camera_status_change("/dev/video42", "error");
        notifier.capability_error("/dev/video42", "probe failed");
        notifier.camera_disconnected("/dev/video42");

        assert!(rx.try_recv().is_err(), "nothing may be published");
        assert_eq!(bus.subscriber_count(EventTopic::CameraStatusChange), 1);
    }

    #[test]
    fn disconnect_publishes_before_freeing_the_mapping() {
        let (bus, mut rx) = subscribed_bus();
        let mapper = Arc::new(CameraIdMapper::new());
        let notifier = CameraNotifier::new(bus, Arc::clone(&mapper));

        notifier.camera_connected("/dev/video0", "cam", None, None);
        rx.try_recv().expect("connected event");

        notifier.camera_disconnected("/dev/video0");
        let event = rx.try_recv().expect("disconnected event");
        assert_eq!(event.payload["device"], "camera0");
        assert_eq!(mapper.external_for("/dev/video0"), None, "mapping freed");
    }

    #[test]
    fn capability_error_uses_the_external_id() {
        let (bus, mut rx) = subscribed_bus();
        let mapper = Arc::new(CameraIdMapper::new());
        mapper.device_added("/dev/video0");
        let notifier = CameraNotifier::new(bus, mapper);

        notifier.capability_error("/dev/video0", "unsupported ioctl");
        let event = rx.try_recv().expect("event published");
        assert_eq!(event.payload["device"], "camera0");
        assert_eq!(event.payload["error"], "unsupported ioctl");
    }

    #[test]
    fn media_events_for_unknown_ids_are_dropped() {
        let (bus, mut rx) = subscribed_bus();
        let mapper = Arc::new(CameraIdMapper::new());
        let notifier = MediaNotifier::new(bus, mapper);

        notifier.recording_failed("camera5", "boom");
        notifier.stream_stopped("camera5");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn system_events_need_no_mapping() {
        let (bus, mut rx) = subscribed_bus();
        let notifier = SystemNotifier::new(bus);

        notifier.startup("1.0.0");
        notifier.health("healthy", 3);
        notifier.shutdown("signal");

        assert_eq!(rx.try_recv().unwrap().topic, EventTopic::SystemStartup);
        let health = rx.try_recv().unwrap();
        assert_eq!(health.topic, EventTopic::SystemHealth);
        assert_eq!(health.payload["active_connections"], 3);
        assert_eq!(rx.try_recv().unwrap().topic, EventTopic::SystemShutdown);
    }
}
