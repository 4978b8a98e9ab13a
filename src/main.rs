use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use estimate_pilot::{EstimateEngine, EstimateRequest};

#[derive(Parser)]
#[command(
    name = "estimate-pilot",
    about = "Drives the cloud pricing calculator to a shareable estimate link"
)]
struct Cli {
    /// Path to a JSON estimate request.
    request: PathBuf,

    /// Run the browser with a visible window.
    #[arg(long)]
    headful: bool,

    /// Also extract the CSV export link from the share dialog.
    #[arg(long)]
    csv: bool,

    /// Capture screenshots and page console output alongside the result.
    #[arg(long)]
    artifacts: bool,

    /// Pretty-print the result JSON.
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let raw = match std::fs::read_to_string(&cli.request) {
        Ok(raw) => raw,
        Err(err) => {
            error!(path = %cli.request.display(), error = %err, "cannot read request file");
            return ExitCode::from(2);
        }
    };
    let mut request: EstimateRequest = match serde_json::from_str(&raw) {
        Ok(request) => request,
        Err(err) => {
            error!(path = %cli.request.display(), error = %err, "request file is not a valid estimate request");
            return ExitCode::from(2);
        }
    };
    if cli.headful {
        request.headless = false;
    }
    if cli.csv {
        request.want_csv_link = true;
    }
    if cli.artifacts {
        request.collect_artifacts = true;
    }

    info!(instances = request.instances.len(), service = %request.service, "running estimate");
    let result = EstimateEngine::with_defaults().run_estimate(request).await;

    let rendered = if cli.pretty {
        serde_json::to_string_pretty(&result)
    } else {
        serde_json::to_string(&result)
    };
    match rendered {
        Ok(json) => println!("{json}"),
        Err(err) => {
            error!(error = %err, "cannot serialize result");
            return ExitCode::from(2);
        }
    }

    if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
