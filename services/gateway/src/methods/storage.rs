//! Stored-media catalog methods: listings, deletion, storage totals.

use super::{HandlerContext, RpcResult, response};
use crate::validation::{validate_filename, validate_pagination};
use cam_protocol::error_reasons;
use serde_json::json;
use tracing::info;

pub async fn list_recordings(ctx: HandlerContext) -> RpcResult {
    let (limit, offset) = validate_pagination(&ctx.params)?;
    let listing = ctx
        .state
        .catalog
        .list_recordings(limit, offset)
        .await
        .map_err(|e| response::from_media_error(&e))?;
    serde_json::to_value(listing)
        .map_err(|e| response::internal(error_reasons::INTERNAL, e.to_string()))
}

pub async fn list_snapshots(ctx: HandlerContext) -> RpcResult {
    let (limit, offset) = validate_pagination(&ctx.params)?;
    let listing = ctx
        .state
        .catalog
        .list_snapshots(limit, offset)
        .await
        .map_err(|e| response::from_media_error(&e))?;
    serde_json::to_value(listing)
        .map_err(|e| response::internal(error_reasons::INTERNAL, e.to_string()))
}

pub async fn delete_recording(ctx: HandlerContext) -> RpcResult {
    let filename = validate_filename(&ctx.params, "filename")?;
    ctx.state
        .catalog
        .delete_recording(&filename)
        .await
        .map_err(|e| response::from_media_error(&e))?;
    info!(client_id = ctx.client_id, filename = %filename, "recording deleted");
    Ok(json!({"filename": filename, "deleted": true}))
}

pub async fn delete_snapshot(ctx: HandlerContext) -> RpcResult {
    let filename = validate_filename(&ctx.params, "filename")?;
    ctx.state
        .catalog
        .delete_snapshot(&filename)
        .await
        .map_err(|e| response::from_media_error(&e))?;
    info!(client_id = ctx.client_id, filename = %filename, "snapshot deleted");
    Ok(json!({"filename": filename, "deleted": true}))
}

pub async fn get_storage_info(ctx: HandlerContext) -> RpcResult {
    let info = ctx
        .state
        .catalog
        .storage_info()
        .await
        .map_err(|e| response::from_media_error(&e))?;
    serde_json::to_value(info)
        .map_err(|e| response::internal(error_reasons::INTERNAL, e.to_string()))
}
