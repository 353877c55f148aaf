//! Event subscription methods.
//!
//! Topic strings are validated against the closed enumeration before the bus
//! is touched, so a request naming one bad topic changes nothing.

use super::{HandlerContext, RpcResult, response};
use cam_protocol::{EventTopic, SubscribeResult, UnsubscribeResult, error_reasons};
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::debug;

/// Parse a `topics` array into typed topics; the first unknown string fails
/// the whole request.
fn parse_topics(params: &Map<String, Value>, required: bool) -> Result<Vec<EventTopic>, cam_protocol::RpcError> {
    let raw = match params.get("topics") {
        Some(Value::Array(list)) => list,
        Some(Value::Null) | None if !required => return Ok(Vec::new()),
        Some(_) => {
            return Err(response::invalid_params(
                "topics",
                "must be an array of topic strings",
                "pass topics as a JSON array",
            ));
        }
        None => {
            return Err(response::invalid_params(
                "topics",
                "is required",
                "pass at least one topic to subscribe to",
            ));
        }
    };

    let mut topics = Vec::with_capacity(raw.len());
    for entry in raw {
        let Some(name) = entry.as_str() else {
            return Err(response::invalid_params(
                "topics",
                "entries must be strings",
                "pass topic names such as camera.connected",
            ));
        };
        let topic: EventTopic = name
            .parse()
            .map_err(|_| response::invalid_topic(name))?;
        topics.push(topic);
    }
    Ok(topics)
}

fn parse_filters(
    params: &Map<String, Value>,
) -> Result<Option<Map<String, Value>>, cam_protocol::RpcError> {
    match params.get("filters") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) if map.is_empty() => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map.clone())),
        Some(_) => Err(response::invalid_params(
            "filters",
            "must be an object",
            "pass filters as a key/value map",
        )),
    }
}

pub async fn subscribe_events(ctx: HandlerContext) -> RpcResult {
    let topics = parse_topics(&ctx.params, true)?;
    if topics.is_empty() {
        return Err(response::invalid_params(
            "topics",
            "must not be empty",
            "pass at least one topic to subscribe to",
        ));
    }
    let filters = parse_filters(&ctx.params)?;

    ctx.state.bus.subscribe(ctx.client_id, &topics, filters);
    let topic_set: HashSet<EventTopic> = topics.iter().copied().collect();
    ctx.state.sessions.set_topics(ctx.client_id, topic_set);
    debug!(client_id = ctx.client_id, topics = topics.len(), "client subscribed");

    let result = SubscribeResult {
        subscribed: true,
        topics: topics.iter().map(|t| t.as_str().to_owned()).collect(),
    };
    serde_json::to_value(result)
        .map_err(|e| response::internal(error_reasons::INTERNAL, e.to_string()))
}

pub async fn unsubscribe_events(ctx: HandlerContext) -> RpcResult {
    let topics = parse_topics(&ctx.params, false)?;

    ctx.state.bus.unsubscribe(ctx.client_id, &topics);
    let remaining: HashSet<EventTopic> = ctx
        .state
        .bus
        .subscription_for(ctx.client_id)
        .map(|sub| sub.topics.clone())
        .unwrap_or_default();
    ctx.state.sessions.set_topics(ctx.client_id, remaining);
    debug!(client_id = ctx.client_id, "client unsubscribed");

    serde_json::to_value(UnsubscribeResult { unsubscribed: true })
        .map_err(|e| response::internal(error_reasons::INTERNAL, e.to_string()))
}

pub async fn get_subscription_stats(ctx: HandlerContext) -> RpcResult {
    serde_json::to_value(ctx.state.bus.stats())
        .map_err(|e| response::internal(error_reasons::INTERNAL, e.to_string()))
}
