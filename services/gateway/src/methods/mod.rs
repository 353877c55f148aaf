//! RPC method registry and handlers.
//!
//! All methods are registered at startup by [`build_registry`]; the registry
//! is wrapped in an `Arc` before the listener binds and never changes
//! afterwards.  Each entry carries the minimum role the method requires
//! (`None` bypasses both the authentication and the permission gates).

pub mod cameras;
pub mod media;
pub mod response;
pub mod storage;
pub mod subscriptions;
pub mod system;

use crate::permissions::Role;
use crate::state::AppState;
use cam_protocol::RpcError;
use futures_util::future::BoxFuture;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Everything a handler gets to see for one request.
pub struct HandlerContext {
    pub state: AppState,
    pub client_id: u64,
    pub params: Map<String, Value>,
}

pub type RpcResult = Result<Value, RpcError>;

pub type MethodHandler =
    Arc<dyn Fn(HandlerContext) -> BoxFuture<'static, RpcResult> + Send + Sync>;

pub struct MethodSpec {
    pub required_role: Option<Role>,
    pub handler: MethodHandler,
}

/// Name -> handler index, immutable once built.
#[derive(Default)]
pub struct MethodRegistry {
    methods: HashMap<&'static str, MethodSpec>,
}

impl MethodRegistry {
    pub(crate) fn register<F, Fut>(&mut self, name: &'static str, required_role: Option<Role>, f: F)
    where
        F: Fn(HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RpcResult> + Send + 'static,
    {
        let handler: MethodHandler = Arc::new(move |ctx| Box::pin(f(ctx)));
        self.methods.insert(
            name,
            MethodSpec {
                required_role,
                handler,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&MethodSpec> {
        self.methods.get(name)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Sorted method names, for `get_server_info`.
    pub fn method_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.methods.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

/// Build the complete method table.  Runs during startup, before the
/// connection listener accepts traffic.
pub fn build_registry() -> MethodRegistry {
    let mut registry = MethodRegistry::default();

    // Open methods: no authentication, no permission gate.
    registry.register("ping", None, system::ping);
    registry.register("authenticate", None, system::authenticate);

    // Viewer tier.
    registry.register("get_camera_list", Some(Role::Viewer), cameras::get_camera_list);
    registry.register("get_camera_status", Some(Role::Viewer), cameras::get_camera_status);
    registry.register(
        "get_camera_capabilities",
        Some(Role::Viewer),
        cameras::get_camera_capabilities,
    );
    registry.register("list_recordings", Some(Role::Viewer), storage::list_recordings);
    registry.register("list_snapshots", Some(Role::Viewer), storage::list_snapshots);
    registry.register("get_storage_info", Some(Role::Viewer), storage::get_storage_info);
    registry.register(
        "subscribe_events",
        Some(Role::Viewer),
        subscriptions::subscribe_events,
    );
    registry.register(
        "unsubscribe_events",
        Some(Role::Viewer),
        subscriptions::unsubscribe_events,
    );
    registry.register(
        "get_subscription_stats",
        Some(Role::Viewer),
        subscriptions::get_subscription_stats,
    );
    registry.register("get_status", Some(Role::Viewer), system::get_status);
    registry.register("get_server_info", Some(Role::Viewer), system::get_server_info);

    // Operator tier.
    registry.register("take_snapshot", Some(Role::Operator), media::take_snapshot);
    registry.register("start_recording", Some(Role::Operator), media::start_recording);
    registry.register("stop_recording", Some(Role::Operator), media::stop_recording);
    registry.register("delete_recording", Some(Role::Operator), storage::delete_recording);
    registry.register("delete_snapshot", Some(Role::Operator), storage::delete_snapshot);

    // Admin tier.
    registry.register("get_metrics", Some(Role::Admin), system::get_metrics);

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_contains_the_full_method_surface() {
        let registry = build_registry();
        assert_eq!(registry.len(), 19);
        for name in [
            "ping",
            "authenticate",
            "get_camera_list",
            "take_snapshot",
            "start_recording",
            "stop_recording",
            "list_recordings",
            "delete_snapshot",
            "get_storage_info",
            "subscribe_events",
            "unsubscribe_events",
            "get_subscription_stats",
            "get_metrics",
            "get_status",
            "get_server_info",
        ] {
            assert!(registry.get(name).is_some(), "missing {name}");
        }
        assert!(registry.get("restart_gateway").is_none());
    }

    #[test]
    fn open_methods_bypass_the_role_gate() {
        let registry = build_registry();
        assert_eq!(registry.get("ping").unwrap().required_role, None);
        assert_eq!(registry.get("authenticate").unwrap().required_role, None);
        assert_eq!(
            registry.get("get_camera_list").unwrap().required_role,
            Some(Role::Viewer)
        );
        assert_eq!(
            registry.get("start_recording").unwrap().required_role,
            Some(Role::Operator)
        );
        assert_eq!(
            registry.get("get_metrics").unwrap().required_role,
            Some(Role::Admin)
        );
    }

    #[test]
    fn method_names_are_sorted() {
        let names = build_registry().method_names();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }
}
