//! Root context shared by every subsystem.
//!
//! Everything singleton-shaped (session table, bus, registry, mapper,
//! metrics, collaborators) is constructed once here and passed explicitly --
//! no globals.  `AppState` is cheap to clone; all fields are shared handles.

use crate::auth::TokenStore;
use crate::cameras::{self, CameraStore};
use crate::config::GatewayConfig;
use crate::events::EventBus;
use crate::mapper::CameraIdMapper;
use crate::media::{FileCatalog, MediaController};
use crate::methods::{self, MethodRegistry};
use crate::metrics::PerformanceMetrics;
use crate::notifiers::{CameraNotifier, MediaNotifier, SystemNotifier};
use crate::rate_limit::RateLimiter;
use crate::session::SessionTable;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

/// Single-fire shutdown signal shared by the listener and every read loop.
#[derive(Clone)]
pub struct ShutdownSignal {
    fired: Arc<AtomicBool>,
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            fired: Arc::new(AtomicBool::new(false)),
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Fire the signal.  Safe under concurrent invocation; only the first
    /// call has any effect.
    pub fn fire(&self) {
        if !self.fired.swap(true, Ordering::SeqCst) {
            let _ = self.tx.send(true);
        }
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.rx.clone()
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub sessions: Arc<SessionTable>,
    pub bus: Arc<EventBus>,
    pub registry: Arc<MethodRegistry>,
    pub mapper: Arc<CameraIdMapper>,
    pub cameras: Arc<CameraStore>,
    pub tokens: Arc<TokenStore>,
    pub rate_limiter: Arc<RateLimiter>,
    pub metrics: Arc<PerformanceMetrics>,
    pub media: Arc<dyn MediaController>,
    pub catalog: Arc<dyn FileCatalog>,
    pub shutdown: ShutdownSignal,
}

impl AppState {
    /// Construct the full gateway state.  The method registry and the
    /// camera-store bus handlers are wired before this returns, so the
    /// listener can bind immediately afterwards.
    pub fn new(
        config: GatewayConfig,
        media: Arc<dyn MediaController>,
        catalog: Arc<dyn FileCatalog>,
    ) -> Self {
        let bus = Arc::new(EventBus::new());
        let camera_store = Arc::new(CameraStore::new());
        cameras::register_handlers(&bus, &camera_store);

        let rate_limiter = Arc::new(RateLimiter::new(
            config.rate_limit.requests_per_second,
            config.rate_limit.burst,
        ));

        Self {
            config: Arc::new(config),
            sessions: Arc::new(SessionTable::new()),
            bus,
            registry: Arc::new(methods::build_registry()),
            mapper: Arc::new(CameraIdMapper::new()),
            cameras: camera_store,
            tokens: Arc::new(TokenStore::new()),
            rate_limiter,
            metrics: Arc::new(PerformanceMetrics::new()),
            media,
            catalog,
            shutdown: ShutdownSignal::new(),
        }
    }

    pub fn camera_notifier(&self) -> CameraNotifier {
        CameraNotifier::new(Arc::clone(&self.bus), Arc::clone(&self.mapper))
    }

    pub fn media_notifier(&self) -> MediaNotifier {
        MediaNotifier::new(Arc::clone(&self.bus), Arc::clone(&self.mapper))
    }

    pub fn system_notifier(&self) -> SystemNotifier {
        SystemNotifier::new(Arc::clone(&self.bus))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::backend::InProcessMedia;

    #[test]
    fn shutdown_signal_fires_once() {
        let signal = ShutdownSignal::new();
        let mut rx = signal.subscribe();
        assert!(!signal.is_fired());
        assert!(!*rx.borrow());

        signal.fire();
        signal.fire();
        assert!(signal.is_fired());
        assert!(rx.has_changed().unwrap());
        assert!(*rx.borrow_and_update());
    }

    #[test]
    fn state_wires_camera_handlers_to_the_bus() {
        let media = Arc::new(InProcessMedia::new());
        let media_controller: Arc<dyn MediaController> = media.clone();
        let state = AppState::new(
            GatewayConfig::default(),
            media_controller,
            media,
        );

        state.camera_notifier().camera_connected("/dev/video0", "cam", None, None);
        assert!(state.cameras.get("camera0").is_some());
        assert_eq!(state.mapper.path_for("camera0").as_deref(), Some("/dev/video0"));
        assert_eq!(state.registry.len(), 19);
    }
}
