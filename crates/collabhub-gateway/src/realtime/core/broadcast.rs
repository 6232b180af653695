use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;

use collabhub_core::error::Result;
use collabhub_core::protocol::ChatMessage;

use crate::obs::HubMetrics;
use crate::realtime::core::{Connection, ConnectionRegistry, DeliveryFailure};
use crate::realtime::types::PreparedMsg;

/// Outcome of one broadcast pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections in the snapshot.
    pub attempted: usize,
    pub delivered: usize,
    /// Failed connections this pass removed from the registry.
    pub pruned: usize,
}

/// Broadcaster: fans one message out to every registered connection.
///
/// Delivery enqueues into each connection's bounded outbound queue, all
/// recipients concurrently. A full queue is waited on for at most
/// `delivery_wait`, so a burst only slows the sender down while a client that
/// stopped reading is deregistered and told to close.
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
    metrics: Arc<HubMetrics>,
    delivery_wait: Duration,
}

impl Broadcaster {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        metrics: Arc<HubMetrics>,
        delivery_wait: Duration,
    ) -> Self {
        Self {
            registry,
            metrics,
            delivery_wait,
        }
    }

    pub async fn broadcast(&self, msg: &ChatMessage) -> Result<BroadcastReport> {
        let started = Instant::now();
        let prepared = PreparedMsg::prepare(msg)?;

        // pass 1: deliver over a snapshot, collect failures
        let targets = self.registry.snapshot();
        let mut report = BroadcastReport {
            attempted: targets.len(),
            ..Default::default()
        };

        let wait = self.delivery_wait;
        let mut futs = FuturesUnordered::new();
        for conn in targets {
            let msg = prepared.clone();
            futs.push(async move {
                let res = conn.deliver(msg, wait).await;
                (conn, res)
            });
        }

        let mut failed: Vec<(Connection, DeliveryFailure)> = Vec::new();
        while let Some((conn, res)) = futs.next().await {
            match res {
                Ok(()) => {
                    report.delivered += 1;
                    self.metrics.deliveries.inc(&[("outcome", "ok")]);
                }
                Err(reason) => {
                    self.metrics.deliveries.inc(&[("outcome", reason.as_str())]);
                    failed.push((conn, reason));
                }
            }
        }

        // pass 2: prune
        for (conn, reason) in failed {
            if self.registry.deregister(conn.id()).is_some() {
                report.pruned += 1;
                self.metrics.connections_pruned.inc(&[("reason", reason.as_str())]);
                tracing::warn!(conn_id = %conn.id(), reason = reason.as_str(), "delivery failed, connection pruned");
            }
            conn.close();
        }

        self.metrics.broadcast_duration.observe(&[], started.elapsed());
        tracing::debug!(
            attempted = report.attempted,
            delivered = report.delivered,
            pruned = report.pruned,
            "broadcast done"
        );
        Ok(report)
    }
}
