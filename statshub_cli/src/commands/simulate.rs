use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use statshub_config::{parse_config_from_file, HubConfig};
use statshub_core::{RequestOutcome, RouteKey, Snapshot};
use statshub_metrics::{JsonExporter, MetricsHub};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use tracing::info;

use crate::ui;
use crate::OutputFormat;

const SUCCESS_CODES: [u16; 3] = [200, 201, 204];
const ERROR_CODES: [u16; 4] = [404, 500, 502, 503];

pub struct SimulateOptions {
    pub requests: u64,
    pub routes: Vec<String>,
    pub error_rate: f64,
    pub max_latency: Duration,
    pub ticks: u32,
    pub seed: Option<u64>,
}

#[derive(Tabled)]
struct SnapshotRow {
    #[tabled(rename = "Route")]
    route: String,
    #[tabled(rename = "Count")]
    count: u64,
    #[tabled(rename = "Errors")]
    errors: u64,
    #[tabled(rename = "M1/s")]
    m1: String,
    #[tabled(rename = "Err% (m1)")]
    err_percent: String,
    #[tabled(rename = "Min ms")]
    min: u64,
    #[tabled(rename = "Mean ms")]
    mean: String,
    #[tabled(rename = "Max ms")]
    max: u64,
    #[tabled(rename = "P50")]
    p50: String,
    #[tabled(rename = "P99")]
    p99: String,
}

impl SnapshotRow {
    fn new(key: &RouteKey, s: &Snapshot) -> Self {
        Self {
            route: key.to_string(),
            count: s.count,
            errors: s.err_count,
            m1: format!("{:.2}", s.m1),
            err_percent: format!("{:.2}", s.m1_err_percent * 100.0),
            min: s.min,
            mean: format!("{:.1}", s.mean),
            max: s.max,
            p50: format!("{:.1}", s.percentiles.p50),
            p99: format!("{:.1}", s.percentiles.p99),
        }
    }
}

pub async fn execute(
    config: Option<PathBuf>,
    options: SimulateOptions,
    format: OutputFormat,
    output: Option<PathBuf>,
) -> Result<()> {
    let config = match config {
        Some(path) => parse_config_from_file(&path).await?,
        None => HubConfig::builder().service_name("simulated").build(),
    };
    let routes = parse_routes(&options.routes)?;
    if !(0.0..=1.0).contains(&options.error_rate) {
        anyhow::bail!("error rate {} must be within 0..=1", options.error_rate);
    }

    let table_output = format == OutputFormat::Table && output.is_none();
    if table_output {
        ui::print_header("=== Traffic Simulation ===");
        println!(
            "Service: {}  Requests: {}  Routes: {}  Ticks: {}",
            config.service_name,
            options.requests,
            routes.len(),
            options.ticks.max(1)
        );
    }

    let hub = MetricsHub::new(config)?;
    let snapshots = run(&hub, &routes, &options, table_output);

    let rendered = match format {
        OutputFormat::Table => render_table(&snapshots),
        OutputFormat::Json => JsonExporter::to_string(&snapshots)?,
        OutputFormat::Prometheus => hub.render()?,
    };

    match output {
        Some(path) => {
            tokio::fs::write(&path, rendered)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            info!("Wrote {} route snapshots to {}", snapshots.len(), path.display());
        }
        None => println!("{}", rendered),
    }

    Ok(())
}

fn parse_routes(routes: &[String]) -> Result<Vec<RouteKey>> {
    if routes.is_empty() {
        anyhow::bail!("at least one route is required");
    }
    routes
        .iter()
        .map(|r| {
            let (method, path) = r
                .trim()
                .split_once(' ')
                .with_context(|| format!("route '{}' must look like \"GET /path\"", r))?;
            Ok(RouteKey::new(method.to_uppercase(), path.trim()))
        })
        .collect()
}

/// Generate traffic tick by tick and return the last tick's snapshots.
fn run(
    hub: &MetricsHub,
    routes: &[RouteKey],
    options: &SimulateOptions,
    show_progress: bool,
) -> BTreeMap<RouteKey, Snapshot> {
    let mut rng = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let pb = if show_progress {
        ProgressBar::new(options.requests)
    } else {
        ProgressBar::hidden()
    };
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({msg})")
    {
        pb.set_style(style.progress_chars("=>-"));
    }

    let ticks = u64::from(options.ticks.max(1));
    let max_ms = options.max_latency.as_millis().max(1) as u64;
    let mut sent = 0;

    for tick in 0..ticks {
        let batch_end = options.requests * (tick + 1) / ticks;
        pb.set_message(format!("tick {}/{}", tick + 1, ticks));
        while sent < batch_end {
            let key = &routes[rng.gen_range(0..routes.len())];
            let status = if rng.gen_bool(options.error_rate) {
                ERROR_CODES[rng.gen_range(0..ERROR_CODES.len())]
            } else {
                SUCCESS_CODES[rng.gen_range(0..SUCCESS_CODES.len())]
            };
            let outcome = RequestOutcome::new(status, Duration::from_millis(rng.gen_range(1..=max_ms)))
                .with_sizes(rng.gen_range(0..2_000), rng.gen_range(100..20_000));

            hub.update_http_request_metrics(&key.method, &key.path, &outcome);
            sent += 1;
            pb.inc(1);
        }
        hub.tick();
    }
    pb.finish_and_clear();

    hub.snapshots()
}

fn render_table(snapshots: &BTreeMap<RouteKey, Snapshot>) -> String {
    let rows: Vec<SnapshotRow> = snapshots
        .iter()
        .map(|(key, snapshot)| SnapshotRow::new(key, snapshot))
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}
