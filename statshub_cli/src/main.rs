mod commands;
mod ui;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(name = "statshub")]
#[command(about = "In-process HTTP request statistics with Prometheus export", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the metrics endpoint for a hub configuration
    Serve {
        /// Path to config file (YAML, TOML, or JSON)
        config_file: PathBuf,

        /// Override server.listen
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Validate a config file
    Validate {
        /// Path to config file
        config_file: PathBuf,
    },

    /// Feed synthetic traffic through a hub and print the resulting snapshots
    Simulate {
        /// Optional config file; a default "simulated" service is used otherwise
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of requests to generate
        #[arg(short = 'n', long, default_value_t = 1000)]
        requests: u64,

        /// Routes as "METHOD /path"
        #[arg(short, long, default_values = ["GET /orders", "POST /orders", "GET /orders/:id"])]
        route: Vec<String>,

        /// Fraction of requests answered with an error status
        #[arg(short, long, default_value_t = 0.05)]
        error_rate: f64,

        /// Upper bound for generated request durations
        #[arg(long, default_value = "800ms", value_parser = humantime::parse_duration)]
        max_latency: Duration,

        /// Number of ticks to spread the requests over
        #[arg(short, long, default_value_t = 1)]
        ticks: u32,

        /// RNG seed for reproducible traffic
        #[arg(long)]
        seed: Option<u64>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,

        /// Write the output to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Send a notification to the configured Slack webhook
    Notify {
        /// Path to config file
        config_file: PathBuf,

        /// Message title
        #[arg(short, long)]
        title: String,

        /// Message body
        #[arg(short, long)]
        message: String,

        /// Result status shown as an emoji
        #[arg(short, long, value_enum, default_value_t = StatusArg::Unknown)]
        status: StatusArg,

        /// Checked URL or command
        #[arg(short, long)]
        endpoint: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Prometheus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StatusArg {
    Unknown,
    Success,
    Failure,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    let (file_layer, _guard) = match &cli.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "statshub.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(LevelFilter::from_level(log_level))
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    match cli.command {
        Commands::Serve {
            config_file,
            listen,
        } => {
            commands::serve::execute(config_file, listen).await?;
        }

        Commands::Validate { config_file } => {
            commands::validate::execute(config_file).await?;
        }

        Commands::Simulate {
            config,
            requests,
            route,
            error_rate,
            max_latency,
            ticks,
            seed,
            format,
            output,
        } => {
            let options = commands::simulate::SimulateOptions {
                requests,
                routes: route,
                error_rate,
                max_latency,
                ticks,
                seed,
            };
            commands::simulate::execute(config, options, format, output).await?;
        }

        Commands::Notify {
            config_file,
            title,
            message,
            status,
            endpoint,
        } => {
            commands::notify::execute(config_file, title, message, status, endpoint).await?;
        }
    }

    Ok(())
}
