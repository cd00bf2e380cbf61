//! jobwatch: reads job lifecycle events as JSON lines on stdin and notifies
//! the configured subscribers when a job fails.

mod feed;
mod logging;
mod reload;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use jobwatch_bus_memory::MemoryTransport;
use jobwatch_notifier::{Notifier, NotifierConfig, SubscriberRegistry};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "jobwatch", version, about = "Notify subscribers when batch jobs fail")]
struct Cli {
    /// TOML config file
    #[arg(long, short)]
    config: PathBuf,
    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
    /// Validate the config and subscriber registry, then exit
    #[arg(long)]
    check: bool,
    /// Re-read the config every N seconds and apply changed topics
    #[arg(long, value_name = "N")]
    reload_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = NotifierConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    logging::init(&config.log_level, cli.log_json)?;

    if cli.check {
        return check(&config);
    }

    let transport = Arc::new(MemoryTransport::default());
    let notifier = Arc::new(
        Notifier::from_config(&config, transport.clone())
            .await
            .context("building notifier")?,
    );
    let events = notifier
        .source()
        .receive()
        .await
        .context("subscribing to job events")?;
    let shutdown = CancellationToken::new();

    let feeder = {
        let source = config.source.clone();
        let closer = events.closer();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = feed::stdin_to_bus(transport, source, closer, shutdown).await {
                tracing::error!(error = %e, "stdin feeder stopped");
            }
        })
    };

    if let Some(secs) = cli.reload_secs {
        tokio::spawn(reload::watch(
            cli.config.clone(),
            Duration::from_secs(secs.max(1)),
            notifier.clone(),
            config.topics.clone(),
            shutdown.clone(),
        ));
    }

    tokio::spawn(shutdown_on_interrupt(shutdown.clone()));

    tracing::info!(
        subject = %config.source.subject,
        topic = config.dispatch_topic().unwrap_or_default(),
        "jobwatch running"
    );
    let report = notifier.pipeline().run(events, shutdown.clone()).await;
    shutdown.cancel();
    feeder.abort();

    tracing::info!(
        received = report.received,
        dispatched = report.dispatched,
        deduplicated = report.deduplicated,
        failed_deliveries = report.failed_deliveries,
        errors = report.errors,
        "jobwatch stopped"
    );
    Ok(())
}

async fn shutdown_on_interrupt(shutdown: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("interrupt received, shutting down");
            shutdown.cancel();
        }
        Err(e) => tracing::error!(error = %e, "cannot listen for interrupt"),
    }
}

fn check(config: &NotifierConfig) -> anyhow::Result<()> {
    let registry =
        SubscriberRegistry::load(&config.topics).context("invalid subscriber registry")?;
    let snapshot = registry.snapshot();
    for topic in snapshot.topics() {
        println!(
            "topic {}: {} subscribers, {} active",
            topic.name(),
            topic.subscribers().len(),
            topic.active_subscribers().count()
        );
    }
    println!(
        "dispatch topic: {}",
        config.dispatch_topic().unwrap_or_default()
    );
    println!("config OK");
    Ok(())
}
