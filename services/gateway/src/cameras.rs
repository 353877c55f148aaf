//! Derived camera state, maintained from bus publications.
//!
//! The store is the read model behind `get_camera_list` / `get_camera_status`
//! / `get_camera_capabilities`.  It is kept current by topic handlers
//! registered on the event bus (`register_handlers`), so it reflects exactly
//! what has been published -- the sanctioned use of in-process handlers.

use crate::events::EventBus;
use cam_protocol::{CameraCapabilities, CameraStatus, EventMessage, EventTopic};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Everything the gateway knows about one camera, keyed by external id.
#[derive(Debug, Clone)]
pub struct CameraRecord {
    pub device: String,
    pub device_path: Option<String>,
    pub name: String,
    pub status: CameraStatus,
    pub resolution: Option<String>,
    pub fps: Option<u32>,
    pub capabilities: Option<CameraCapabilities>,
    pub last_error: Option<String>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Default)]
pub struct CameraStore {
    records: RwLock<HashMap<String, CameraRecord>>,
}

impl CameraStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, device: &str) -> Option<CameraRecord> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        records.get(device).cloned()
    }

    /// All known cameras ordered by external id number.
    pub fn list(&self) -> Vec<CameraRecord> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        let mut list: Vec<CameraRecord> = records.values().cloned().collect();
        list.sort_by_key(|r| crate::mapper::parse_external_id(&r.device).unwrap_or(u32::MAX));
        list
    }

    pub fn connected_count(&self) -> usize {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        records
            .values()
            .filter(|r| r.status == CameraStatus::Connected)
            .count()
    }

    /// Fold one published camera event into the store.
    pub fn apply(&self, message: &EventMessage) {
        let Some(device) = message.payload.get("device").and_then(Value::as_str) else {
            return;
        };
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        let record = records.entry(device.to_owned()).or_insert_with(|| CameraRecord {
            device: device.to_owned(),
            device_path: None,
            name: device.to_owned(),
            status: CameraStatus::Disconnected,
            resolution: None,
            fps: None,
            capabilities: None,
            last_error: None,
            last_seen: message.timestamp,
        });
        record.last_seen = message.timestamp;

        match message.topic {
            EventTopic::CameraConnected => {
                record.status = CameraStatus::Connected;
                record.last_error = None;
                if let Some(path) = message.payload.get("device_path").and_then(Value::as_str) {
                    record.device_path = Some(path.to_owned());
                }
                if let Some(name) = message.payload.get("name").and_then(Value::as_str) {
                    record.name = name.to_owned();
                }
                if let Some(res) = message.payload.get("resolution").and_then(Value::as_str) {
                    record.resolution = Some(res.to_owned());
                }
                if let Some(fps) = message.payload.get("fps").and_then(Value::as_u64) {
                    record.fps = u32::try_from(fps).ok();
                }
            }
            EventTopic::CameraDisconnected => {
                record.status = CameraStatus::Disconnected;
            }
            EventTopic::CameraStatusChange => {
                if let Some(status) = message.payload.get("status").and_then(Value::as_str) {
                    record.status = match status {
                        "connected" => CameraStatus::Connected,
                        "error" => CameraStatus::Error,
                        _ => CameraStatus::Disconnected,
                    };
                }
            }
            EventTopic::CameraCapabilityDetected => {
                if let Some(caps) = message.payload.get("capabilities") {
                    if let Ok(parsed) = serde_json::from_value(caps.clone()) {
                        record.capabilities = Some(parsed);
                    }
                }
            }
            EventTopic::CameraCapabilityError => {
                record.status = CameraStatus::Error;
                record.last_error = message
                    .payload
                    .get("error")
                    .and_then(Value::as_str)
                    .map(ToOwned::to_owned);
            }
            _ => {}
        }
    }
}

/// Wire the store to the bus so camera publications keep it current.
pub fn register_handlers(bus: &EventBus, store: &Arc<CameraStore>) {
    for topic in [
        EventTopic::CameraConnected,
        EventTopic::CameraDisconnected,
        EventTopic::CameraStatusChange,
        EventTopic::CameraCapabilityDetected,
        EventTopic::CameraCapabilityError,
    ] {
        let store = Arc::clone(store);
        bus.add_handler(
            topic,
            Arc::new(move |message| {
                store.apply(message);
                Ok(())
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};
    use uuid::Uuid;

    fn event(topic: EventTopic, payload: Value) -> EventMessage {
        EventMessage {
            topic,
            payload: payload.as_object().expect("object payload").clone(),
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn connected_event_creates_a_record() {
        let store = CameraStore::new();
        store.apply(&event(
            EventTopic::CameraConnected,
            json!({
                "device": "camera0",
                "device_path": "/dev/video0",
                "name": "USB Camera",
                "resolution": "1920x1080",
                "fps": 30,
            }),
        ));

        let record = store.get("camera0").expect("record exists");
        assert_eq!(record.status, CameraStatus::Connected);
        assert_eq!(record.name, "USB Camera");
        assert_eq!(record.device_path.as_deref(), Some("/dev/video0"));
        assert_eq!(record.fps, Some(30));
        assert_eq!(store.connected_count(), 1);
    }

    #[test]
    fn disconnect_keeps_the_record_but_flips_status() {
        let store = CameraStore::new();
        store.apply(&event(
            EventTopic::CameraConnected,
            json!({"device": "camera0"}),
        ));
        store.apply(&event(
            EventTopic::CameraDisconnected,
            json!({"device": "camera0"}),
        ));

        let record = store.get("camera0").expect("record survives");
        assert_eq!(record.status, CameraStatus::Disconnected);
        assert_eq!(store.connected_count(), 0);
    }

    #[test]
    fn capability_events_update_and_flag_errors() {
        let store = CameraStore::new();
        store.apply(&event(
            EventTopic::CameraCapabilityDetected,
            json!({
                "device": "camera0",
                "capabilities": {
                    "formats": ["YUYV", "MJPG"],
                    "resolutions": ["1280x720"],
                    "fps_options": [30, 60],
                    "validation_status": "confirmed",
                },
            }),
        ));
        let caps = store.get("camera0").unwrap().capabilities.expect("caps stored");
        assert_eq!(caps.formats, vec!["YUYV", "MJPG"]);
        assert_eq!(caps.validation_status, "confirmed");

        store.apply(&event(
            EventTopic::CameraCapabilityError,
            json!({"device": "camera0", "error": "probe failed"}),
        ));
        let record = store.get("camera0").unwrap();
        assert_eq!(record.status, CameraStatus::Error);
        assert_eq!(record.last_error.as_deref(), Some("probe failed"));
    }

    #[test]
    fn list_orders_by_external_id_number() {
        let store = CameraStore::new();
        for device in ["camera10", "camera2", "camera0"] {
            store.apply(&event(
                EventTopic::CameraConnected,
                json!({"device": device}),
            ));
        }
        let devices: Vec<String> = store.list().into_iter().map(|r| r.device).collect();
        assert_eq!(devices, vec!["camera0", "camera2", "camera10"]);
    }

    #[test]
    fn payload_without_device_is_ignored() {
        let store = CameraStore::new();
        store.apply(&event(EventTopic::CameraConnected, json!({"name": "x"})));
        assert!(store.list().is_empty());
    }

    #[test]
    fn bus_handlers_keep_the_store_current() {
        let bus = EventBus::new();
        let store = Arc::new(CameraStore::new());
        register_handlers(&bus, &store);

        bus.publish(
            EventTopic::CameraConnected,
            json!({"device": "camera0", "name": "Front Door"})
                .as_object()
                .unwrap()
                .clone(),
        );
        assert_eq!(store.get("camera0").unwrap().name, "Front Door");
    }
}
