use anyhow::Result;
use colored::Colorize;
use statshub_config::parse_config_from_file;
use std::path::PathBuf;

use crate::ui;

pub async fn execute(config_file: PathBuf) -> Result<()> {
    ui::print_header("=== Validating Config ===");
    println!("File: {}", config_file.display());

    match parse_config_from_file(&config_file).await {
        Ok(config) => {
            println!();
            ui::print_success("Config is valid!");
            println!("\nHub Details:");
            println!("  Service: {}", config.service_name.green());
            if config.enable_host_name_label {
                println!("  Host label: {}", config.resolved_host_name());
            }
            println!("  Listen: {}", config.server.listen);
            println!("  Metrics path: {}", config.server.metrics_path);

            if !config.labels.is_empty() {
                println!("  Labels:");
                for (name, value) in &config.labels {
                    println!("    {}={}", name, value);
                }
            }
            for path in &config.excluded_paths {
                println!("  Excluded: {}", path);
            }

            if config.slack_webhook_url.as_deref().unwrap_or("").is_empty() {
                println!();
                ui::print_warning("No slack_webhook_url set; notifications are disabled");
            }

            Ok(())
        }
        Err(e) => {
            println!();
            ui::print_error("Config is invalid!");
            println!("\nError: {}", e);
            Err(e)
        }
    }
}
