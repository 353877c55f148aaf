// cam-protocol: JSON-RPC 2.0 wire types for the camera gateway.
//
// Every WebSocket frame carries exactly one JSON value: a request, a
// response, or a server-initiated notification.  The shapes below are a
// frozen wire contract; renaming a field is a breaking protocol change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Protocol version accepted in the request envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// Method name used for server-initiated event notifications.
pub const NOTIFICATION_METHOD: &str = "event";

// ---------------------------------------------------------------------------
// Error codes (frozen)
// ---------------------------------------------------------------------------

/// JSON-RPC error codes used by the gateway.
///
/// The -32xxx range below -32603 follows the JSON-RPC 2.0 reserved space;
/// the -3200x range is the gateway's application-defined taxonomy.
pub mod error_codes {
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const AUTHENTICATION_REQUIRED: i64 = -32001;
    pub const RATE_LIMIT_EXCEEDED: i64 = -32002;
    pub const INSUFFICIENT_PERMISSIONS: i64 = -32003;
    pub const CAMERA_NOT_FOUND: i64 = -32004;
    pub const RECORDING_IN_PROGRESS: i64 = -32005;
    pub const MEDIA_BACKEND_UNAVAILABLE: i64 = -32006;
    pub const INSUFFICIENT_STORAGE: i64 = -32007;
    pub const CAPABILITY_NOT_SUPPORTED: i64 = -32008;
}

/// Stable `error.data.reason` values.
///
/// Clients may branch on these; the human-readable `details` string may not.
pub mod error_reasons {
    pub const PARSE_ERROR: &str = "parse_error";
    pub const INVALID_VERSION: &str = "invalid_version";
    pub const EMPTY_METHOD: &str = "empty_method";
    pub const OVERSIZED_FRAME: &str = "oversized_frame";
    pub const METHOD_NOT_FOUND: &str = "method_not_found";
    pub const INVALID_PARAMETER: &str = "invalid_parameter";
    pub const INVALID_TOPIC: &str = "invalid_topic";
    pub const AUTH_REQUIRED: &str = "auth_required";
    pub const TOKEN_MALFORMED: &str = "token_malformed";
    pub const TOKEN_EXPIRED: &str = "token_expired";
    pub const SIGNATURE_INVALID: &str = "signature_invalid";
    pub const UNKNOWN_SUBJECT: &str = "unknown_subject";
    pub const RATE_LIMITED: &str = "rate_limited";
    pub const INSUFFICIENT_ROLE: &str = "insufficient_role";
    pub const CAMERA_NOT_FOUND: &str = "camera_not_found";
    pub const RECORDING_IN_PROGRESS: &str = "recording_in_progress";
    pub const BACKEND_UNAVAILABLE: &str = "backend_unavailable";
    pub const INSUFFICIENT_STORAGE: &str = "insufficient_storage";
    pub const CAPABILITY_NOT_SUPPORTED: &str = "capability_not_supported";
    pub const TIMEOUT: &str = "timeout";
    pub const HANDLER_PANIC: &str = "handler_panic";
    pub const INTERNAL: &str = "internal";
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// An incoming JSON-RPC request.
///
/// `id` is echoed verbatim in the reply.  Requests without an `id` would be
/// client notifications; the gateway does not accept those, so `id` is
/// required at parse time by the dispatcher (missing ids reply with null).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub id: Option<Value>,
    /// Absent params are treated as an empty object.
    #[serde(default)]
    pub params: Option<Map<String, Value>>,
}

/// Structured error payload carried in `error.data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorData {
    /// One of the [`error_reasons`] constants.
    pub reason: String,
    /// Human-readable description; not stable, not for branching.
    pub details: String,
    /// Actionable hint for the caller.
    pub suggestion: String,
}

/// The `error` member of an error reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ErrorData>,
}

/// An outgoing JSON-RPC reply: exactly one of `result` / `error` is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    /// Null when the request id could not be extracted.
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

// ---------------------------------------------------------------------------
// Event topics (closed enumeration)
// ---------------------------------------------------------------------------

/// All event topics a client may subscribe to.
///
/// The set is closed: subscribe requests naming anything else are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    #[serde(rename = "camera.connected")]
    CameraConnected,
    #[serde(rename = "camera.disconnected")]
    CameraDisconnected,
    #[serde(rename = "camera.status_change")]
    CameraStatusChange,
    #[serde(rename = "camera.capability_detected")]
    CameraCapabilityDetected,
    #[serde(rename = "camera.capability_error")]
    CameraCapabilityError,
    #[serde(rename = "recording.started")]
    RecordingStarted,
    #[serde(rename = "recording.stopped")]
    RecordingStopped,
    #[serde(rename = "recording.failed")]
    RecordingFailed,
    #[serde(rename = "snapshot.taken")]
    SnapshotTaken,
    #[serde(rename = "snapshot.failed")]
    SnapshotFailed,
    #[serde(rename = "stream.started")]
    StreamStarted,
    #[serde(rename = "stream.stopped")]
    StreamStopped,
    #[serde(rename = "system.startup")]
    SystemStartup,
    #[serde(rename = "system.shutdown")]
    SystemShutdown,
    #[serde(rename = "system.health")]
    SystemHealth,
}

impl EventTopic {
    /// Every topic, in documentation order.
    pub const ALL: [EventTopic; 15] = [
        EventTopic::CameraConnected,
        EventTopic::CameraDisconnected,
        EventTopic::CameraStatusChange,
        EventTopic::CameraCapabilityDetected,
        EventTopic::CameraCapabilityError,
        EventTopic::RecordingStarted,
        EventTopic::RecordingStopped,
        EventTopic::RecordingFailed,
        EventTopic::SnapshotTaken,
        EventTopic::SnapshotFailed,
        EventTopic::StreamStarted,
        EventTopic::StreamStopped,
        EventTopic::SystemStartup,
        EventTopic::SystemShutdown,
        EventTopic::SystemHealth,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventTopic::CameraConnected => "camera.connected",
            EventTopic::CameraDisconnected => "camera.disconnected",
            EventTopic::CameraStatusChange => "camera.status_change",
            EventTopic::CameraCapabilityDetected => "camera.capability_detected",
            EventTopic::CameraCapabilityError => "camera.capability_error",
            EventTopic::RecordingStarted => "recording.started",
            EventTopic::RecordingStopped => "recording.stopped",
            EventTopic::RecordingFailed => "recording.failed",
            EventTopic::SnapshotTaken => "snapshot.taken",
            EventTopic::SnapshotFailed => "snapshot.failed",
            EventTopic::StreamStarted => "stream.started",
            EventTopic::StreamStopped => "stream.stopped",
            EventTopic::SystemStartup => "system.startup",
            EventTopic::SystemShutdown => "system.shutdown",
            EventTopic::SystemHealth => "system.health",
        }
    }
}

impl fmt::Display for EventTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a topic string is outside the closed enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTopic(pub String);

impl fmt::Display for UnknownTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event topic: {}", self.0)
    }
}

impl std::error::Error for UnknownTopic {}

impl FromStr for EventTopic {
    type Err = UnknownTopic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventTopic::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownTopic(s.to_owned()))
    }
}

// ---------------------------------------------------------------------------
// Event messages
// ---------------------------------------------------------------------------

/// A single published event, immutable after construction.
///
/// `payload` keys are documented per topic; the primary camera identifier
/// field is always the external `cameraN` id.  The `device_path` key is the
/// one sanctioned internal-tooling field and is explicitly non-stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    pub topic: EventTopic,
    pub payload: Map<String, Value>,
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

impl EventMessage {
    /// Render as the server->client notification frame (a request without id).
    pub fn to_notification(&self) -> Value {
        serde_json::json!({
            "jsonrpc": JSONRPC_VERSION,
            "method": NOTIFICATION_METHOD,
            "params": {
                "topic": self.topic.as_str(),
                "payload": Value::Object(self.payload.clone()),
                "event_id": self.event_id,
                "timestamp": self.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
            },
        })
    }
}

// ---------------------------------------------------------------------------
// Method result payloads (frozen schema definitions)
// ---------------------------------------------------------------------------

/// Camera availability as reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraStatus {
    Connected,
    Disconnected,
    Error,
}

/// Per-protocol stream endpoints for a camera.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEndpoints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtsp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webrtc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hls: Option<String>,
}

/// One entry in the `get_camera_list` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraInfo {
    /// External id, `cameraN`.
    pub device: String,
    pub name: String,
    pub status: CameraStatus,
    /// Internal device path; non-stable, for tooling only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<u32>,
    #[serde(default)]
    pub streams: StreamEndpoints,
}

/// Response for `get_camera_list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraListResult {
    pub cameras: Vec<CameraInfo>,
    pub total: usize,
    pub connected: usize,
}

/// Detected capability set for one camera.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraCapabilities {
    pub formats: Vec<String>,
    pub resolutions: Vec<String>,
    pub fps_options: Vec<u32>,
    /// "none" | "disconnected" | "confirmed" — probe outcome for the device.
    pub validation_status: String,
}

/// Response for `get_camera_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraStatusResult {
    pub device: String,
    pub name: String,
    pub status: CameraStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<CameraCapabilities>,
}

/// Response for `authenticate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticateResult {
    pub authenticated: bool,
    pub user: String,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

/// A recording session record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingInfo {
    pub device: String,
    pub filename: String,
    /// "recording" | "stopped" | "failed".
    pub status: String,
    pub format: String,
    pub started_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
}

/// A snapshot record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub device: String,
    pub filename: String,
    pub status: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
}

/// One file entry in a catalog listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFileInfo {
    pub filename: String,
    pub file_size: u64,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

/// Paged response for `list_recordings` / `list_snapshots`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileListResult {
    pub files: Vec<MediaFileInfo>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// Response for `get_storage_info`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageInfo {
    pub total_space: u64,
    pub used_space: u64,
    pub available_space: u64,
    pub usage_percent: f64,
    pub low_space_warning: bool,
}

/// Response for `get_server_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    pub capabilities: Vec<String>,
    pub supported_methods: Vec<String>,
}

/// Response for `get_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResult {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub active_connections: usize,
}

/// Response for `subscribe_events`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeResult {
    pub subscribed: bool,
    pub topics: Vec<String>,
}

/// Response for `unsubscribe_events`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsubscribeResult {
    pub unsubscribed: bool,
}

/// Response for `get_subscription_stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionStats {
    pub total_clients: usize,
    pub active_subscriptions: usize,
    pub topic_counts: HashMap<String, usize>,
}

/// Per-method timing aggregates in `get_metrics`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodStats {
    pub count: u64,
    pub avg_ms: f64,
    pub max_ms: f64,
}

/// Response for `get_metrics`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub total_errors: u64,
    pub active_connections: usize,
    pub uptime_secs: u64,
    pub methods: HashMap<String, MethodStats>,
}
