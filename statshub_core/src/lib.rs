pub mod aggregator;
pub mod error;
pub mod ewma;
pub mod naming;
pub mod registry;
pub mod sampler;
pub mod status;

pub use aggregator::{RequestOutcome, RequestStatAggregator, RouteKey, Snapshot};
pub use error::{HubError, Result};
pub use ewma::{Ewma, RateTracker, Rates};
pub use registry::{AggregatorRegistry, SnapshotSink};
pub use sampler::{DurationSampler, Percentiles};
pub use status::StatusCounter;

use std::time::Duration;

/// Fixed flush/decay cadence. The EWMA constants assume exactly this interval.
pub const TICK_INTERVAL: Duration = Duration::from_secs(5);
