use log::{error, info, warn};
use std::sync::Arc;
use userstream_gateway::HttpRequestProducer;
use userstream_runner::{UserStreamApp, load_config, load_default_config, logging_registry};

fn print_help() {
    eprintln!(
        r#"userstream - user stream client

USAGE:
    userstream [OPTIONS]

OPTIONS:
    --config <PATH>     Load configuration from JSON file
    --help              Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG            Log level filter
    USERSTREAM_TOKEN    Bearer token used by the default configuration
"#
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--config" | "-c" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
                config_path = Some(args[i].clone());
            }
            other => {
                eprintln!("Error: unknown argument {}", other);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let config = match &config_path {
        Some(path) => {
            info!("Loading configuration from {}", path);
            load_config(path)?
        }
        None => load_default_config()?,
    };

    let producer = Arc::new(HttpRequestProducer::new(config.endpoint.url.clone()));
    let registry = Arc::new(logging_registry()?);
    registry.on_exception(|e| warn!("Unparseable line ({}): {}", e, e.raw))?;

    let app = UserStreamApp::new(config, registry, producer)?;
    let report = match app.start().await {
        Ok(report) => report,
        Err(e) => {
            error!("Startup failed: {}", e);
            app.shutdown().await;
            return Err(e.into());
        }
    };
    if !report.is_clean() {
        warn!(
            "{} dangling, {} oversized keywords",
            report.dangling.len(),
            report.oversized.len()
        );
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    app.shutdown().await;
    Ok(())
}
