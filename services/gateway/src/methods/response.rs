//! Error-reply constructors shared by the dispatcher and the handlers.
//!
//! Every error carries the stable wire code, a short message, and a
//! structured `data` object (`reason` / `details` / `suggestion`).

use crate::media::MediaError;
use crate::permissions::Role;
use cam_protocol::{ErrorData, RpcError, error_codes, error_reasons};

fn rpc_error(
    code: i64,
    message: &str,
    reason: &str,
    details: impl Into<String>,
    suggestion: impl Into<String>,
) -> RpcError {
    RpcError {
        code,
        message: message.to_owned(),
        data: Some(ErrorData {
            reason: reason.to_owned(),
            details: details.into(),
            suggestion: suggestion.into(),
        }),
    }
}

pub fn invalid_request(reason: &str, details: impl Into<String>) -> RpcError {
    rpc_error(
        error_codes::INVALID_REQUEST,
        "Invalid Request",
        reason,
        details,
        "send a JSON-RPC 2.0 request object with a non-empty method",
    )
}

pub fn invalid_version(got: &str) -> RpcError {
    rpc_error(
        error_codes::INVALID_PARAMS,
        "Invalid parameters",
        error_reasons::INVALID_VERSION,
        format!("unsupported protocol version '{got}'"),
        "set jsonrpc to \"2.0\"",
    )
}

pub fn oversized_frame(size: usize, max: usize) -> RpcError {
    rpc_error(
        error_codes::INVALID_REQUEST,
        "Invalid Request",
        error_reasons::OVERSIZED_FRAME,
        format!("frame of {size} bytes exceeds the {max} byte limit"),
        "split the request or raise max_message_size",
    )
}

pub fn method_not_found(method: &str) -> RpcError {
    rpc_error(
        error_codes::METHOD_NOT_FOUND,
        "Method not found",
        error_reasons::METHOD_NOT_FOUND,
        format!("no method named '{method}'"),
        "call get_server_info for the supported method list",
    )
}

pub fn invalid_params(
    field: &str,
    details: impl Into<String>,
    suggestion: impl Into<String>,
) -> RpcError {
    let details = details.into();
    rpc_error(
        error_codes::INVALID_PARAMS,
        "Invalid parameters",
        error_reasons::INVALID_PARAMETER,
        format!("{field}: {details}"),
        suggestion,
    )
}

pub fn invalid_topic(topic: &str) -> RpcError {
    rpc_error(
        error_codes::INVALID_PARAMS,
        "Invalid parameters",
        error_reasons::INVALID_TOPIC,
        format!("'{topic}' is not a known event topic"),
        "subscribe only to documented topics such as camera.connected",
    )
}

pub fn auth_required(reason: &str, details: impl Into<String>) -> RpcError {
    rpc_error(
        error_codes::AUTHENTICATION_REQUIRED,
        "Authentication required",
        reason,
        details,
        "call authenticate with a valid bearer token",
    )
}

pub fn rate_limited() -> RpcError {
    rpc_error(
        error_codes::RATE_LIMIT_EXCEEDED,
        "Rate limit exceeded",
        error_reasons::RATE_LIMITED,
        "per-client request budget exhausted",
        "slow down and retry after the refill window",
    )
}

pub fn insufficient_permissions(method: &str, required: Role) -> RpcError {
    rpc_error(
        error_codes::INSUFFICIENT_PERMISSIONS,
        "Insufficient permissions",
        error_reasons::INSUFFICIENT_ROLE,
        format!("{method} requires the {required} role"),
        "authenticate with a token holding a stronger role",
    )
}

pub fn camera_not_found(device: &str) -> RpcError {
    rpc_error(
        error_codes::CAMERA_NOT_FOUND,
        "Camera not found or disconnected",
        error_reasons::CAMERA_NOT_FOUND,
        format!("no camera is mapped to '{device}'"),
        "call get_camera_list for currently available cameras",
    )
}

pub fn internal(reason: &str, details: impl Into<String>) -> RpcError {
    rpc_error(
        error_codes::INTERNAL_ERROR,
        "Internal error",
        reason,
        details,
        "retry; contact the operator if the error persists",
    )
}

/// Map a collaborator failure onto the most specific wire code.
pub fn from_media_error(err: &MediaError) -> RpcError {
    match err {
        MediaError::CameraNotFound(device) => camera_not_found(device),
        MediaError::AlreadyRecording(device) => rpc_error(
            error_codes::RECORDING_IN_PROGRESS,
            "Recording already in progress",
            error_reasons::RECORDING_IN_PROGRESS,
            format!("a recording is already running on {device}"),
            "stop the active recording first",
        ),
        MediaError::NotRecording(device) => invalid_params(
            "device",
            format!("no active recording on {device}"),
            "start a recording before stopping one",
        ),
        MediaError::FileNotFound(filename) => invalid_params(
            "filename",
            format!("'{filename}' does not exist"),
            "list the catalog for available files",
        ),
        MediaError::Unavailable(details) => rpc_error(
            error_codes::MEDIA_BACKEND_UNAVAILABLE,
            "Media backend unavailable",
            error_reasons::BACKEND_UNAVAILABLE,
            details.clone(),
            "retry once the media backend is reachable",
        ),
        MediaError::InsufficientStorage(details) => rpc_error(
            error_codes::INSUFFICIENT_STORAGE,
            "Insufficient storage",
            error_reasons::INSUFFICIENT_STORAGE,
            details.clone(),
            "delete old recordings or extend storage",
        ),
        MediaError::Unsupported(details) => rpc_error(
            error_codes::CAPABILITY_NOT_SUPPORTED,
            "Capability not supported",
            error_reasons::CAPABILITY_NOT_SUPPORTED,
            details.clone(),
            "call get_camera_capabilities for supported options",
        ),
    }
}
