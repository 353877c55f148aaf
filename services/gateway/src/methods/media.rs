//! Recording and snapshot control methods.
//!
//! Device identifiers are validated and resolved at the boundary; the media
//! controller is called without holding any gateway lock, and outcomes are
//! announced on the bus through the media notifier.

use super::{HandlerContext, RpcResult, response};
use crate::validation::{optional_str, optional_u64, validate_device, validate_filename};
use cam_protocol::error_reasons;
use chrono::Utc;

const DEFAULT_RECORDING_FORMAT: &str = "mp4";

pub async fn take_snapshot(ctx: HandlerContext) -> RpcResult {
    let device = validate_device(&ctx.params, "device", &ctx.state.mapper)?;
    let filename = match optional_str(&ctx.params, "filename")? {
        Some(_) => validate_filename(&ctx.params, "filename")?,
        None => format!(
            "{}_{}.jpg",
            device.external_id,
            Utc::now().format("%Y-%m-%d_%H-%M-%S")
        ),
    };

    let notifier = ctx.state.media_notifier();
    match ctx
        .state
        .media
        .take_snapshot(&device.external_id, &filename)
        .await
    {
        Ok(snapshot) => {
            notifier.snapshot_taken(&snapshot);
            serde_json::to_value(snapshot)
                .map_err(|e| response::internal(error_reasons::INTERNAL, e.to_string()))
        }
        Err(err) => {
            notifier.snapshot_failed(&device.external_id, &filename, &err.to_string());
            Err(response::from_media_error(&err))
        }
    }
}

pub async fn start_recording(ctx: HandlerContext) -> RpcResult {
    let device = validate_device(&ctx.params, "device", &ctx.state.mapper)?;
    let format = optional_str(&ctx.params, "format")?.unwrap_or(DEFAULT_RECORDING_FORMAT);
    let duration = optional_u64(&ctx.params, "duration")?;

    let notifier = ctx.state.media_notifier();
    match ctx
        .state
        .media
        .start_recording(&device.external_id, format, duration)
        .await
    {
        Ok(recording) => {
            notifier.recording_started(&recording);
            serde_json::to_value(recording)
                .map_err(|e| response::internal(error_reasons::INTERNAL, e.to_string()))
        }
        Err(err) => {
            notifier.recording_failed(&device.external_id, &err.to_string());
            Err(response::from_media_error(&err))
        }
    }
}

pub async fn stop_recording(ctx: HandlerContext) -> RpcResult {
    let device = validate_device(&ctx.params, "device", &ctx.state.mapper)?;

    let notifier = ctx.state.media_notifier();
    match ctx.state.media.stop_recording(&device.external_id).await {
        Ok(recording) => {
            notifier.recording_stopped(&recording);
            serde_json::to_value(recording)
                .map_err(|e| response::internal(error_reasons::INTERNAL, e.to_string()))
        }
        Err(err) => Err(response::from_media_error(&err)),
    }
}
