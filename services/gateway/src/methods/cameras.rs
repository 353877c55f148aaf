//! Camera query methods.
//!
//! Replies are built from the derived camera store and always carry the
//! external `cameraN` id as the primary identifier; the internal path only
//! appears in the documented `device_path` metadata field.

use super::{HandlerContext, RpcResult, response};
use crate::cameras::CameraRecord;
use crate::validation::validate_device;
use cam_protocol::{
    CameraCapabilities, CameraInfo, CameraListResult, CameraStatus, CameraStatusResult,
    StreamEndpoints, error_reasons,
};
use serde_json::json;

fn to_camera_info(record: &CameraRecord) -> CameraInfo {
    CameraInfo {
        device: record.device.clone(),
        name: record.name.clone(),
        status: record.status,
        device_path: record.device_path.clone(),
        resolution: record.resolution.clone(),
        fps: record.fps,
        streams: StreamEndpoints::default(),
    }
}

pub async fn get_camera_list(ctx: HandlerContext) -> RpcResult {
    let records = ctx.state.cameras.list();
    let result = CameraListResult {
        connected: records
            .iter()
            .filter(|r| r.status == CameraStatus::Connected)
            .count(),
        total: records.len(),
        cameras: records.iter().map(to_camera_info).collect(),
    };
    serde_json::to_value(result)
        .map_err(|e| response::internal(error_reasons::INTERNAL, e.to_string()))
}

pub async fn get_camera_status(ctx: HandlerContext) -> RpcResult {
    let device = validate_device(&ctx.params, "device", &ctx.state.mapper)?;
    let record = ctx
        .state
        .cameras
        .get(&device.external_id)
        .ok_or_else(|| response::camera_not_found(&device.external_id))?;

    let result = CameraStatusResult {
        device: record.device.clone(),
        name: record.name.clone(),
        status: record.status,
        device_path: record.device_path.clone().or(Some(device.device_path)),
        resolution: record.resolution.clone(),
        fps: record.fps,
        capabilities: record.capabilities.clone(),
    };
    serde_json::to_value(result)
        .map_err(|e| response::internal(error_reasons::INTERNAL, e.to_string()))
}

pub async fn get_camera_capabilities(ctx: HandlerContext) -> RpcResult {
    let device = validate_device(&ctx.params, "device", &ctx.state.mapper)?;
    let record = ctx.state.cameras.get(&device.external_id);
    let capabilities = record
        .and_then(|r| r.capabilities)
        .unwrap_or_else(|| CameraCapabilities {
            formats: Vec::new(),
            resolutions: Vec::new(),
            fps_options: Vec::new(),
            validation_status: "none".to_owned(),
        });

    Ok(json!({
        "device": device.external_id,
        "formats": capabilities.formats,
        "resolutions": capabilities.resolutions,
        "fps_options": capabilities.fps_options,
        "validation_status": capabilities.validation_status,
    }))
}
