//! The request pipeline: parse -> rate-limit -> authorize -> invoke -> reply.
//!
//! ```text
//! PARSED -(rate ok)-> AUTHORIZED -(perm ok)-> VALIDATED -(handler ok)-> REPLIED
//!   |                     |                      |                |
//!   +- rate exceeded      +- perm denied         +- invalid       +- handler error
//!            -> typed error reply, session remains open
//! ```
//!
//! Every terminal state bumps the request counter; every non-success bumps
//! the error counter; known methods record a duration sample.  The reply
//! always carries the request id verbatim; parse-level failures reply with a
//! null id.  Handlers run in their own task under a deadline, so a panic or
//! an overrun becomes a typed internal error instead of taking the
//! connection down.

use crate::methods::{HandlerContext, response};
use crate::state::AppState;
use cam_protocol::{JSONRPC_VERSION, RpcError, RpcResponse, error_reasons};
use serde_json::{Map, Value};
use std::time::Instant;
use tracing::{debug, warn};

struct ParsedRequest {
    id: Value,
    method: String,
    params: Map<String, Value>,
}

fn is_scalar_id(id: &Value) -> bool {
    matches!(id, Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_))
}

/// Envelope validation.  On failure the error already names the id to echo
/// (null when the id itself was unextractable).
fn parse_envelope(text: &str) -> Result<ParsedRequest, (Value, RpcError)> {
    let value: Value = serde_json::from_str(text).map_err(|e| {
        (
            Value::Null,
            response::invalid_request(error_reasons::PARSE_ERROR, format!("invalid JSON: {e}")),
        )
    })?;
    let Some(obj) = value.as_object() else {
        return Err((
            Value::Null,
            response::invalid_request(
                error_reasons::PARSE_ERROR,
                "request must be a JSON object",
            ),
        ));
    };

    let id = obj.get("id").cloned().unwrap_or(Value::Null);
    if !is_scalar_id(&id) {
        return Err((
            Value::Null,
            response::invalid_request(error_reasons::PARSE_ERROR, "id must be a scalar"),
        ));
    }

    match obj.get("jsonrpc") {
        Some(Value::String(version)) if version == JSONRPC_VERSION => {}
        Some(Value::String(version)) => return Err((id, response::invalid_version(version))),
        Some(other) => return Err((id, response::invalid_version(&other.to_string()))),
        None => return Err((id, response::invalid_version("<missing>"))),
    }

    let method = match obj.get("method") {
        Some(Value::String(name)) if !name.is_empty() => name.clone(),
        _ => {
            return Err((
                id,
                response::invalid_request(
                    error_reasons::EMPTY_METHOD,
                    "method must be a non-empty string",
                ),
            ));
        }
    };

    let params = match obj.get("params") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => {
            return Err((
                id,
                response::invalid_params(
                    "params",
                    "must be an object",
                    "pass params as a JSON object or omit it",
                ),
            ));
        }
    };

    Ok(ParsedRequest { id, method, params })
}

/// Run one inbound frame through the pipeline and produce the reply.
pub async fn dispatch_text(state: &AppState, client_id: u64, text: &str) -> RpcResponse {
    let started = Instant::now();
    let (response, method) = run_pipeline(state, client_id, text).await;

    state.metrics.record_request();
    if response.error.is_some() {
        state.metrics.record_error();
    }
    if let Some(method) = method {
        state.metrics.observe(&method, started.elapsed());
    }
    response
}

/// The pipeline body.  Returns the reply plus the method name when it
/// resolved to a registered method (for the duration sample).
async fn run_pipeline(
    state: &AppState,
    client_id: u64,
    text: &str,
) -> (RpcResponse, Option<String>) {
    let request = match parse_envelope(text) {
        Ok(request) => request,
        Err((id, error)) => return (RpcResponse::failure(id, error), None),
    };

    // Rate limiting comes before authorization so unauthenticated floods
    // are rejected without touching the credential path.
    if !state.rate_limiter.try_acquire(client_id) {
        debug!(client_id, method = %request.method, "request rate-limited");
        return (
            RpcResponse::failure(request.id, response::rate_limited()),
            None,
        );
    }

    let Some(spec) = state.registry.get(&request.method) else {
        return (
            RpcResponse::failure(request.id, response::method_not_found(&request.method)),
            None,
        );
    };

    if let Some(required) = spec.required_role {
        let session = state.sessions.get(client_id);
        let principal = session.as_ref().and_then(|s| s.principal.as_ref());
        match principal {
            None => {
                return (
                    RpcResponse::failure(
                        request.id,
                        response::auth_required(
                            error_reasons::AUTH_REQUIRED,
                            "this method requires an authenticated session",
                        ),
                    ),
                    Some(request.method),
                );
            }
            Some(principal) if !principal.is_valid_at(chrono::Utc::now()) => {
                return (
                    RpcResponse::failure(
                        request.id,
                        response::auth_required(
                            error_reasons::TOKEN_EXPIRED,
                            "the session token has expired",
                        ),
                    ),
                    Some(request.method),
                );
            }
            Some(principal) if !principal.role.satisfies(Some(required)) => {
                return (
                    RpcResponse::failure(
                        request.id,
                        response::insufficient_permissions(&request.method, required),
                    ),
                    Some(request.method),
                );
            }
            Some(_) => {}
        }
    }

    let handler = spec.handler.clone();
    let ctx = HandlerContext {
        state: state.clone(),
        client_id,
        params: request.params,
    };

    // During drain, in-flight deadlines shrink to the shutdown grace bound.
    let mut deadline = state.config.server.write_timeout;
    if state.shutdown.is_fired() {
        deadline = deadline.min(state.config.server.shutdown_timeout);
    }

    // The handler gets its own task so a panic surfaces as a join error
    // instead of unwinding the read loop.
    let mut invocation = tokio::spawn(handler(ctx));
    let result = match tokio::time::timeout(deadline, &mut invocation).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) if join_err.is_panic() => {
            warn!(client_id, method = %request.method, "handler panicked");
            Err(response::internal(
                error_reasons::HANDLER_PANIC,
                format!("{} aborted abnormally", request.method),
            ))
        }
        Ok(Err(_)) => Err(response::internal(
            error_reasons::INTERNAL,
            format!("{} was cancelled", request.method),
        )),
        Err(_) => {
            warn!(client_id, method = %request.method, "handler deadline exceeded");
            invocation.abort();
            Err(response::internal(
                error_reasons::TIMEOUT,
                format!(
                    "{} exceeded the {}ms deadline",
                    request.method,
                    deadline.as_millis()
                ),
            ))
        }
    };

    let reply = match result {
        Ok(value) => RpcResponse::success(request.id, value),
        Err(error) => RpcResponse::failure(request.id, error),
    };
    (reply, Some(request.method))
}
