use parking_lot::RwLock;
use prometheus::core::Collector;
use prometheus::proto::MetricFamily;
use prometheus::{CounterVec, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry};
use statshub_core::{naming, HubError, Result};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// A registered metric vector, tagged by type.
#[derive(Clone)]
pub enum MetricKind {
    Counter(CounterVec),
    Gauge(GaugeVec),
    Histogram(HistogramVec),
}

impl MetricKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            MetricKind::Counter(_) => "counter",
            MetricKind::Gauge(_) => "gauge",
            MetricKind::Histogram(_) => "histogram",
        }
    }

    fn boxed(&self) -> Box<dyn Collector> {
        match self {
            MetricKind::Counter(c) => Box::new(c.clone()),
            MetricKind::Gauge(g) => Box::new(g.clone()),
            MetricKind::Histogram(h) => Box::new(h.clone()),
        }
    }

    fn variable_labels(&self) -> Vec<String> {
        let descs = match self {
            MetricKind::Counter(c) => c.desc(),
            MetricKind::Gauge(g) => g.desc(),
            MetricKind::Histogram(h) => h.desc(),
        };
        descs
            .first()
            .map(|d| d.variable_labels.clone())
            .unwrap_or_default()
    }
}

/// Name-indexed wrapper around a `prometheus::Registry`.
///
/// Every metric the hub knows about lives here: the built-in HTTP families and
/// anything callers register at runtime.
pub struct MetricsRegistry {
    registry: Registry,
    metrics: RwLock<BTreeMap<String, MetricKind>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            metrics: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Register `kind` under `name`. Registering a known name is a no-op.
    pub fn register_metric(&self, name: &str, kind: MetricKind) -> Result<()> {
        if !naming::is_valid_metric_name(name) {
            return Err(HubError::InvalidMetricName(name.to_string()));
        }

        let mut metrics = self.metrics.write();
        if metrics.contains_key(name) {
            return Ok(());
        }

        self.registry
            .register(kind.boxed())
            .map_err(|e| HubError::RegistrationFailed(format!("{}: {}", name, e)))?;
        debug!("Registered {} '{}'", kind.type_name(), name);
        metrics.insert(name.to_string(), kind);
        Ok(())
    }

    pub fn new_counter(&self, name: &str, help: &str, labels: &[&str]) -> Result<CounterVec> {
        self.counter_vec(Opts::new(name, help), labels)
    }

    pub fn new_gauge(&self, name: &str, help: &str, labels: &[&str]) -> Result<GaugeVec> {
        self.gauge_vec(Opts::new(name, help), labels)
    }

    pub fn new_histogram(
        &self,
        name: &str,
        help: &str,
        labels: &[&str],
        buckets: Vec<f64>,
    ) -> Result<HistogramVec> {
        self.histogram_vec(HistogramOpts::new(name, help).buckets(buckets), labels)
    }

    /// Counter vector from full options. A second call for the same name
    /// returns the vector created by the first.
    pub fn counter_vec(&self, opts: Opts, labels: &[&str]) -> Result<CounterVec> {
        let name = opts.name.clone();
        naming::validate(&name, labels)?;
        match self.get_or_register(&name, || {
            CounterVec::new(opts, labels).map(MetricKind::Counter)
        })? {
            MetricKind::Counter(c) => Ok(c),
            other => Err(already_registered(&name, &other)),
        }
    }

    pub fn gauge_vec(&self, opts: Opts, labels: &[&str]) -> Result<GaugeVec> {
        let name = opts.name.clone();
        naming::validate(&name, labels)?;
        match self.get_or_register(&name, || GaugeVec::new(opts, labels).map(MetricKind::Gauge))? {
            MetricKind::Gauge(g) => Ok(g),
            other => Err(already_registered(&name, &other)),
        }
    }

    pub fn histogram_vec(&self, opts: HistogramOpts, labels: &[&str]) -> Result<HistogramVec> {
        let name = opts.common_opts.name.clone();
        naming::validate(&name, labels)?;
        match self.get_or_register(&name, || {
            HistogramVec::new(opts, labels).map(MetricKind::Histogram)
        })? {
            MetricKind::Histogram(h) => Ok(h),
            other => Err(already_registered(&name, &other)),
        }
    }

    fn get_or_register<F>(&self, name: &str, create: F) -> Result<MetricKind>
    where
        F: FnOnce() -> prometheus::Result<MetricKind>,
    {
        let mut metrics = self.metrics.write();
        if let Some(existing) = metrics.get(name) {
            return Ok(existing.clone());
        }

        let kind = create().map_err(|e| HubError::RegistrationFailed(format!("{}: {}", name, e)))?;
        self.registry
            .register(kind.boxed())
            .map_err(|e| HubError::RegistrationFailed(format!("{}: {}", name, e)))?;
        metrics.insert(name.to_string(), kind.clone());
        Ok(kind)
    }

    /// Apply `value` to the named metric: gauges are set, counters add
    /// `value` when it is above 1 and increment otherwise, histograms observe.
    /// Unknown names are ignored.
    pub fn update_metrics(&self, name: &str, value: f64, labels: &HashMap<&str, &str>) -> Result<()> {
        let metrics = self.metrics.read();
        let Some(kind) = metrics.get(name) else {
            return Ok(());
        };

        let invalid = |e: prometheus::Error| HubError::InvalidLabels {
            metric: name.to_string(),
            reason: e.to_string(),
        };

        match kind {
            MetricKind::Gauge(g) => g.get_metric_with(labels).map_err(invalid)?.set(value),
            MetricKind::Counter(c) => {
                let counter = c.get_metric_with(labels).map_err(invalid)?;
                if value > 1.0 {
                    counter.inc_by(value);
                } else {
                    counter.inc();
                }
            }
            MetricKind::Histogram(h) => h.get_metric_with(labels).map_err(invalid)?.observe(value),
        }
        Ok(())
    }

    /// Names of every registered metric, sorted.
    pub fn current_metrics(&self) -> Vec<String> {
        self.metrics.read().keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<MetricKind> {
        self.metrics.read().get(name).cloned()
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Sum the series of gauge `name` grouped by the `keep` labels and store
    /// each sum in the series whose `drop` labels are all empty strings.
    ///
    /// Series that are already aggregates are left out of the sums, so
    /// repeated merges give the same result. `keep` and `drop` must together
    /// cover every variable label of the gauge.
    pub fn merge_gauge(&self, name: &str, keep: &[&str], drop: &[&str]) -> Result<()> {
        let gauge = match self.get(name) {
            Some(MetricKind::Gauge(g)) => g,
            Some(_) | None => return Err(HubError::NotAGauge(name.to_string())),
        };

        let variable = MetricKind::Gauge(gauge.clone()).variable_labels();
        let covered = variable
            .iter()
            .all(|l| keep.contains(&l.as_str()) || drop.contains(&l.as_str()));
        let known = keep
            .iter()
            .chain(drop.iter())
            .all(|l| variable.iter().any(|v| v == l));
        if !covered || !known || keep.iter().any(|l| drop.contains(l)) {
            return Err(HubError::InvalidLabels {
                metric: name.to_string(),
                reason: format!(
                    "keep {:?} and drop {:?} must partition {:?}",
                    keep, drop, variable
                ),
            });
        }

        let mut sums: BTreeMap<Vec<String>, f64> = BTreeMap::new();
        for family in gauge.collect() {
            for metric in family.get_metric() {
                let pairs: HashMap<&str, &str> = metric
                    .get_label()
                    .iter()
                    .map(|p| (p.get_name(), p.get_value()))
                    .collect();

                let is_aggregate = drop
                    .iter()
                    .all(|l| pairs.get(l).map_or(true, |v| v.is_empty()));
                if is_aggregate {
                    continue;
                }

                let group: Vec<String> = keep
                    .iter()
                    .map(|l| pairs.get(l).copied().unwrap_or_default().to_string())
                    .collect();
                *sums.entry(group).or_insert(0.0) += metric.get_gauge().get_value();
            }
        }

        for (group, sum) in sums {
            let mut labels: HashMap<&str, &str> = HashMap::new();
            for (label, value) in keep.iter().zip(group.iter()) {
                labels.insert(*label, value.as_str());
            }
            for label in drop {
                labels.insert(*label, "");
            }
            gauge
                .get_metric_with(&labels)
                .map_err(|e| HubError::InvalidLabels {
                    metric: name.to_string(),
                    reason: e.to_string(),
                })?
                .set(sum);
        }
        Ok(())
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn already_registered(name: &str, existing: &MetricKind) -> HubError {
    HubError::RegistrationFailed(format!(
        "'{}' is already registered as a {}",
        name,
        existing.type_name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels<'a>(pairs: &[(&'a str, &'a str)]) -> HashMap<&'a str, &'a str> {
        pairs.iter().copied().collect()
    }

    fn gauge_value(gauge: &GaugeVec, values: &[&str]) -> f64 {
        gauge.with_label_values(values).get()
    }

    #[test]
    fn test_new_metrics_are_idempotent() {
        let registry = MetricsRegistry::new();
        let first = registry.new_counter("jobs_total", "Jobs", &["queue"]).unwrap();
        let second = registry.new_counter("jobs_total", "Jobs", &["queue"]).unwrap();

        first.with_label_values(&["a"]).inc();
        assert_eq!(second.with_label_values(&["a"]).get(), 1.0);
        assert_eq!(registry.current_metrics(), vec!["jobs_total".to_string()]);
    }

    #[test]
    fn test_kind_conflict_and_invalid_names() {
        let registry = MetricsRegistry::new();
        registry.new_gauge("depth", "Depth", &[]).unwrap();

        assert!(matches!(
            registry.new_counter("depth", "Depth", &[]),
            Err(HubError::RegistrationFailed(_))
        ));
        assert!(matches!(
            registry.new_gauge("bad-name", "x", &[]),
            Err(HubError::InvalidMetricName(_))
        ));
        assert!(matches!(
            registry.new_gauge("ok_name", "x", &["bad-label"]),
            Err(HubError::InvalidLabelName(_))
        ));
    }

    #[test]
    fn test_register_metric_twice_is_noop() {
        let registry = MetricsRegistry::new();
        let gauge = GaugeVec::new(Opts::new("temperature", "Temperature"), &["room"]).unwrap();

        registry
            .register_metric("temperature", MetricKind::Gauge(gauge.clone()))
            .unwrap();
        registry
            .register_metric("temperature", MetricKind::Gauge(gauge))
            .unwrap();
        assert_eq!(registry.current_metrics().len(), 1);
    }

    #[test]
    fn test_update_rules() {
        let registry = MetricsRegistry::new();
        let counter = registry.new_counter("hits", "Hits", &["route"]).unwrap();
        let gauge = registry.new_gauge("queue_depth", "Depth", &["route"]).unwrap();
        let histogram = registry
            .new_histogram("latency_ms", "Latency", &["route"], vec![10.0, 100.0])
            .unwrap();
        let route = labels(&[("route", "/a")]);

        registry.update_metrics("hits", 0.5, &route).unwrap();
        registry.update_metrics("hits", 1.0, &route).unwrap();
        registry.update_metrics("hits", 5.0, &route).unwrap();
        assert_eq!(counter.with_label_values(&["/a"]).get(), 7.0);

        registry.update_metrics("queue_depth", 3.0, &route).unwrap();
        registry.update_metrics("queue_depth", 2.0, &route).unwrap();
        assert_eq!(gauge.with_label_values(&["/a"]).get(), 2.0);

        registry.update_metrics("latency_ms", 42.0, &route).unwrap();
        let observed = histogram.with_label_values(&["/a"]);
        assert_eq!(observed.get_sample_count(), 1);
        assert_eq!(observed.get_sample_sum(), 42.0);

        registry.update_metrics("missing", 1.0, &route).unwrap();
    }

    #[test]
    fn test_label_mismatch_is_an_error() {
        let registry = MetricsRegistry::new();
        registry.new_gauge("queue_depth", "Depth", &["route"]).unwrap();

        let result = registry.update_metrics("queue_depth", 1.0, &labels(&[("other", "x")]));
        assert!(matches!(result, Err(HubError::InvalidLabels { .. })));
    }

    #[test]
    fn test_merge_gauge_adds_aggregate_series() {
        let registry = MetricsRegistry::new();
        let gauge = registry
            .new_gauge("service_m1", "Rate", &["method", "path"])
            .unwrap();
        gauge.with_label_values(&["GET", "/a"]).set(1.0);
        gauge.with_label_values(&["GET", "/b"]).set(2.0);
        gauge.with_label_values(&["POST", "/a"]).set(3.0);

        registry.merge_gauge("service_m1", &["method"], &["path"]).unwrap();
        assert_eq!(gauge_value(&gauge, &["GET", ""]), 3.0);
        assert_eq!(gauge_value(&gauge, &["POST", ""]), 3.0);

        registry.merge_gauge("service_m1", &["method"], &["path"]).unwrap();
        assert_eq!(gauge_value(&gauge, &["GET", ""]), 3.0);
        assert_eq!(gauge_value(&gauge, &["GET", "/a"]), 1.0);
    }

    #[test]
    fn test_merge_gauge_rejects_bad_input() {
        let registry = MetricsRegistry::new();
        registry.new_counter("hits", "Hits", &["path"]).unwrap();
        registry
            .new_gauge("service_m1", "Rate", &["method", "path"])
            .unwrap();

        assert!(matches!(
            registry.merge_gauge("hits", &[], &["path"]),
            Err(HubError::NotAGauge(_))
        ));
        assert!(matches!(
            registry.merge_gauge("service_m1", &["method"], &[]),
            Err(HubError::InvalidLabels { .. })
        ));
        assert!(matches!(
            registry.merge_gauge("service_m1", &["method"], &["path", "zone"]),
            Err(HubError::InvalidLabels { .. })
        ));
    }
}
