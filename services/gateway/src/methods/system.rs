//! System-level methods: liveness, authentication, status, metrics.

use super::{HandlerContext, RpcResult, response};
use crate::auth::CredentialError;
use crate::validation::require_str;
use cam_protocol::{AuthenticateResult, ServerInfo, StatusResult, error_reasons};
use serde_json::{Value, json};
use tracing::info;

pub async fn ping(_ctx: HandlerContext) -> RpcResult {
    Ok(Value::from("pong"))
}

/// Validate the bearer token and attach the resulting principal to the
/// calling session.  The one method that bypasses the permission gate by
/// design.
pub async fn authenticate(ctx: HandlerContext) -> RpcResult {
    let token = require_str(&ctx.params, "auth_token")?;
    let principal = ctx.state.tokens.validate(token).map_err(|e| {
        let reason = match e {
            CredentialError::Malformed => error_reasons::TOKEN_MALFORMED,
            CredentialError::UnknownSubject => error_reasons::UNKNOWN_SUBJECT,
            CredentialError::SignatureInvalid => error_reasons::SIGNATURE_INVALID,
            CredentialError::Expired => error_reasons::TOKEN_EXPIRED,
        };
        response::auth_required(reason, e.to_string())
    })?;

    info!(
        client_id = ctx.client_id,
        user = %principal.user,
        role = %principal.role,
        "client authenticated"
    );
    let result = AuthenticateResult {
        authenticated: true,
        user: principal.user.clone(),
        role: principal.role.as_str().to_owned(),
        expires_at: principal.expires_at.map(|t| t.to_rfc3339()),
    };
    ctx.state.sessions.set_principal(ctx.client_id, principal);

    serde_json::to_value(result)
        .map_err(|e| response::internal(error_reasons::INTERNAL, e.to_string()))
}

pub async fn get_status(ctx: HandlerContext) -> RpcResult {
    let result = StatusResult {
        status: "healthy".to_owned(),
        version: env!("CARGO_PKG_VERSION").to_owned(),
        uptime_secs: ctx.state.metrics.uptime().as_secs(),
        active_connections: ctx.state.metrics.active_connections(),
    };
    serde_json::to_value(result)
        .map_err(|e| response::internal(error_reasons::INTERNAL, e.to_string()))
}

pub async fn get_server_info(ctx: HandlerContext) -> RpcResult {
    let result = ServerInfo {
        name: "camgate".to_owned(),
        version: env!("CARGO_PKG_VERSION").to_owned(),
        capabilities: vec![
            "cameras".to_owned(),
            "recordings".to_owned(),
            "snapshots".to_owned(),
            "events".to_owned(),
            "storage".to_owned(),
        ],
        supported_methods: ctx
            .state
            .registry
            .method_names()
            .into_iter()
            .map(ToOwned::to_owned)
            .collect(),
    };
    serde_json::to_value(result)
        .map_err(|e| response::internal(error_reasons::INTERNAL, e.to_string()))
}

pub async fn get_metrics(ctx: HandlerContext) -> RpcResult {
    let mut snapshot = serde_json::to_value(ctx.state.metrics.snapshot())
        .map_err(|e| response::internal(error_reasons::INTERNAL, e.to_string()))?;
    // Bus counters ride along so one call covers the whole hot path.
    if let Some(obj) = snapshot.as_object_mut() {
        obj.insert("event_bus".to_owned(), json!(ctx.state.bus.stats()));
    }
    Ok(snapshot)
}
