//! Shared application state for the collabhub gateway.
//!
//! The registry is created once at startup and injected here, so tests can
//! run several independent hubs side by side.

use std::sync::Arc;
use std::time::Duration;

use crate::config::GatewayConfig;
use crate::obs::HubMetrics;
use crate::realtime::{Broadcaster, ConnectionRegistry};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
    registry: Arc<ConnectionRegistry>,
    broadcaster: Arc<Broadcaster>,
    metrics: Arc<HubMetrics>,
}

struct AppStateInner {
    cfg: GatewayConfig,
}

impl AppState {
    pub fn new(cfg: GatewayConfig) -> Self {
        Self::with_registry(cfg, Arc::new(ConnectionRegistry::new()))
    }

    pub fn with_registry(cfg: GatewayConfig, registry: Arc<ConnectionRegistry>) -> Self {
        let metrics = Arc::new(HubMetrics::default());
        let broadcaster = Arc::new(Broadcaster::new(
            Arc::clone(&registry),
            Arc::clone(&metrics),
            Duration::from_millis(cfg.gateway.write_timeout_ms),
        ));

        Self {
            inner: Arc::new(AppStateInner { cfg }),
            registry,
            broadcaster,
            metrics,
        }
    }

    pub fn cfg(&self) -> &GatewayConfig {
        &self.inner.cfg
    }

    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn broadcaster(&self) -> Arc<Broadcaster> {
        Arc::clone(&self.broadcaster)
    }

    pub fn metrics(&self) -> Arc<HubMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn is_draining(&self) -> bool {
        self.metrics.is_draining()
    }

    /// Enter draining and ask every open session to close. Returns how many
    /// connections were signalled.
    pub fn close_all(&self) -> usize {
        self.metrics.set_draining();
        let conns = self.registry.snapshot();
        for conn in &conns {
            conn.close();
        }
        conns.len()
    }

    /// Wait until every session has deregistered, at most `limit`.
    pub async fn wait_drained(&self, limit: Duration) -> bool {
        let poll = async {
            while !self.registry.is_empty() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        };
        tokio::time::timeout(limit, poll).await.is_ok()
    }

    /// Gauges read at scrape time.
    pub fn metrics_extra(&self) -> Vec<(&'static str, u64)> {
        vec![("collabhub_connections_active", self.registry.len() as u64)]
    }
}
