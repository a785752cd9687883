use std::sync::Arc;

use anyhow::{Context, Result};
use console::style;
use rotator_core::{
    Consumer, ConsumerConfig, Credentials, GcsObjectStore, HttpImageProcessor, ProcessorConfig,
    PubSubSubscription, RotateImageConfig, RotateImageWorker,
};
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::config::AppConfig;

mod config;
mod telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env_and_args()?;
    telemetry::init_tracing(&config.log_level, config.json_logs)?;

    println!(
        "\n{}  {}\n",
        style("rotator").cyan().bold(),
        style("Storage notification relay").dim()
    );

    info!(
        project = %config.project,
        subscription = %config.subscription,
        service_url = %config.service_url,
        output_dir = %config.output_dir.display(),
        "Starting"
    );

    // One HTTP client and one credential source shared by every API handle.
    let http = reqwest::Client::builder()
        .user_agent(concat!("rotator/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("building HTTP client")?;
    let credentials = Arc::new(Credentials::from_env(http.clone()));

    let store = GcsObjectStore::from_env(http.clone(), Arc::clone(&credentials))
        .context("configuring Cloud Storage client")?;
    let processor = HttpImageProcessor::new(
        http.clone(),
        ProcessorConfig {
            service_url: config.service_url.clone(),
            request_timeout: config.request_timeout,
        },
    )
    .context("configuring rotation service client")?;
    let subscription = PubSubSubscription::from_env(
        http,
        &config.project,
        &config.subscription,
        credentials,
    )
    .context("configuring Pub/Sub client")?;

    let worker = RotateImageWorker::new(
        Arc::new(store),
        Arc::new(processor),
        RotateImageConfig {
            scratch_root: config.scratch_dir.clone(),
            output_dir: config.output_dir.clone(),
        },
    );
    let consumer = Consumer::new(
        Arc::new(subscription),
        Arc::new(worker),
        ConsumerConfig {
            max_messages: config.max_messages,
            ..Default::default()
        },
    );

    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, finishing in-flight messages");
                let _ = signal_tx.send(());
            }
            Err(e) => error!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });

    consumer.run(shutdown_rx).await;
    drop(shutdown_tx);

    println!("{}", style("Stopped").dim());
    Ok(())
}
