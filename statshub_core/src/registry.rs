use dashmap::DashMap;
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::aggregator::{RequestOutcome, RequestStatAggregator, RouteKey, Snapshot};
use crate::TICK_INTERVAL;

/// Receives every flushed snapshot, once per route per tick.
pub trait SnapshotSink: Send + Sync {
    fn export(&self, key: &RouteKey, snapshot: &Snapshot);
}

impl<F> SnapshotSink for F
where
    F: Fn(&RouteKey, &Snapshot) + Send + Sync,
{
    fn export(&self, key: &RouteKey, snapshot: &Snapshot) {
        self(key, snapshot)
    }
}

/// Route key to aggregator map.
///
/// Aggregators are created on first sight of a key and live as long as the
/// registry. There is no eviction: services with unbounded path cardinality
/// grow this map without limit, so adapters must pass route templates, not
/// raw paths.
#[derive(Default)]
pub struct AggregatorRegistry {
    routes: DashMap<RouteKey, Arc<RequestStatAggregator>>,
}

impl AggregatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self, key: &RouteKey, outcome: &RequestOutcome) {
        self.get_or_create(key).observe(outcome);
    }

    /// Racing callers for the same new key all get the one installed instance.
    pub fn get_or_create(&self, key: &RouteKey) -> Arc<RequestStatAggregator> {
        if let Some(agg) = self.routes.get(key) {
            return Arc::clone(agg.value());
        }
        let entry = self
            .routes
            .entry(key.clone())
            .or_insert_with(|| Arc::new(RequestStatAggregator::new()));
        Arc::clone(entry.value())
    }

    pub fn get(&self, key: &RouteKey) -> Option<Arc<RequestStatAggregator>> {
        self.routes.get(key).map(|r| Arc::clone(r.value()))
    }

    pub fn route_keys(&self) -> Vec<RouteKey> {
        self.routes.iter().map(|r| r.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Snapshot every route and hand the results to `sink`. One tick's work.
    pub fn flush(&self, sink: &dyn SnapshotSink) -> usize {
        // Clone out first so no shard lock is held while snapshotting.
        let routes: Vec<(RouteKey, Arc<RequestStatAggregator>)> = self
            .routes
            .iter()
            .map(|r| (r.key().clone(), Arc::clone(r.value())))
            .collect();

        for (key, agg) in &routes {
            let snapshot = agg.snapshot();
            sink.export(key, &snapshot);
        }
        routes.len()
    }

    /// Run `flush` every [`TICK_INTERVAL`] until `cancel` fires or `sink` is
    /// dropped.
    ///
    /// Ticks are sequential: a slow flush delays the next tick instead of
    /// overlapping it.
    pub fn spawn_ticker(
        self: Arc<Self>,
        sink: Weak<dyn SnapshotSink>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; skip it so the first
            // flush covers a full interval.
            interval.tick().await;

            info!("Aggregator ticker started (interval: {:?})", TICK_INTERVAL);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let sink = match sink.upgrade() {
                            Some(sink) => sink,
                            None => {
                                debug!("Snapshot sink dropped");
                                break;
                            }
                        };
                        let routes = self.flush(sink.as_ref());
                        debug!("Flushed {} route snapshots", routes);
                    }
                }
            }
            info!("Aggregator ticker stopped");
        })
    }
}
