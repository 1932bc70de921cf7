//! `beacon-agent` -- ship newline-delimited JSON events to a collector.
//!
//! Reads one JSON event per line from stdin, runs it through the
//! telemetry pipeline (sanitize, spool, batch, retry), and delivers to
//! the configured collector endpoint. Undelivered events survive
//! restarts in the spool directory.
//!
//! # Environment variables
//!
//! | Variable               | Required | Default          | Description                        |
//! |------------------------|----------|------------------|------------------------------------|
//! | `COLLECTOR_URL`        | yes      | --               | HTTP endpoint, e.g. `https://host/v1/events` |
//! | `SPOOL_DIR`            | no       | `./beacon-spool` | Directory for undelivered events   |
//! | `FLUSH_INTERVAL_SECS`  | no       | `30`             | Seconds between automatic flushes  |
//! | `BATCH_SIZE`           | no       | `50`             | Maximum events per batch           |
//! | `REQUEST_TIMEOUT_SECS` | no       | `10`             | Seconds per delivery attempt       |
//! | `EVENT_TTL_SECS`       | no       | `86400`          | Event expiry age                   |

use std::sync::Arc;
use std::time::Duration;

use beacon_agent::config::AgentConfig;
use beacon_agent::input;
use beacon_core::{KeyDenySanitizer, SystemClock};
use beacon_pipeline::{HttpTransport, TelemetryPipeline};
use beacon_store::FileStore;
use tokio::io::AsyncBufReadExt;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "beacon_agent=info,beacon_pipeline=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let collector_url = std::env::var("COLLECTOR_URL").unwrap_or_else(|_| {
        tracing::error!("COLLECTOR_URL environment variable is required");
        std::process::exit(1);
    });

    let config = AgentConfig::from_env();

    tracing::info!(
        collector_url = %collector_url,
        spool_dir = %config.spool_dir.display(),
        flush_interval_secs = config.flush_interval_secs,
        "Starting beacon-agent",
    );

    let transport = Arc::new(HttpTransport::new(
        &collector_url,
        Duration::from_secs(config.request_timeout_secs),
    ));
    let store = match FileStore::open(&config.spool_dir).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!(error = %e, "Failed to open spool directory");
            std::process::exit(1);
        }
    };

    let pipeline = match TelemetryPipeline::start(
        config.pipeline_config(),
        transport,
        store,
        Arc::new(KeyDenySanitizer::new()),
        Arc::new(SystemClock),
    )
    .await
    {
        Ok(pipeline) => pipeline,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start telemetry pipeline");
            std::process::exit(1);
        }
    };

    run(&pipeline).await;

    // Final flush before exit so nothing is left solely in the spool.
    pipeline.shutdown().await;
}

/// Pump stdin lines into the pipeline until EOF or Ctrl-C.
async fn run(pipeline: &TelemetryPipeline) {
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("Interrupt received, shutting down");
                break;
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => track_line(pipeline, &line).await,
                    Ok(None) => {
                        tracing::info!("Input exhausted");
                        break;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to read stdin");
                        break;
                    }
                }
            }
        }
    }
}

/// Parse and enqueue a single input line.
async fn track_line(pipeline: &TelemetryPipeline, line: &str) {
    match input::parse_line(line) {
        Some(Ok(event)) => {
            if let Err(e) = pipeline.track(event.name, event.metadata).await {
                tracing::error!(error = %e, "Failed to track event");
            }
        }
        Some(Err(e)) => {
            tracing::warn!(error = %e, raw = %line, "Skipping malformed event line");
        }
        None => {}
    }
}
