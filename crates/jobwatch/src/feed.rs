use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use jobwatch_bus::Transport;
use jobwatch_bus_memory::MemoryTransport;
use jobwatch_notifier::StreamCloser;
use jobwatch_notifier::config::SourceSection;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const DRAIN_POLL: Duration = Duration::from_millis(20);

/// Read stdin on a plain thread so a pending read never holds up runtime
/// shutdown.
fn spawn_stdin_reader() -> Result<mpsc::Receiver<std::io::Result<String>>> {
    let (tx, rx) = mpsc::channel(1024);
    std::thread::Builder::new()
        .name("stdin-reader".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
        })
        .context("spawning stdin reader")?;
    Ok(rx)
}

/// Publish each non-blank stdin line on the source subject. At EOF, wait
/// for the consumer group to settle everything, then end the event stream.
pub async fn stdin_to_bus(
    transport: Arc<MemoryTransport>,
    source: SourceSection,
    closer: StreamCloser,
    shutdown: CancellationToken,
) -> Result<()> {
    let mut lines = spawn_stdin_reader()?;
    let mut published = 0u64;

    loop {
        let line = tokio::select! {
            () = shutdown.cancelled() => return Ok(()),
            line = lines.recv() => line,
        };
        let Some(line) = line else { break };
        let line = line.context("reading stdin")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match transport
            .publish(&source.subject, Bytes::copy_from_slice(line.as_bytes()), None)
            .await
        {
            Ok(_) => published += 1,
            Err(e) => tracing::warn!(error = %e, "failed to publish stdin line"),
        }
    }

    tracing::info!(published, "stdin closed, waiting for pending events");
    while transport.backlog(&source.subject, &source.group).await > 0 {
        tokio::select! {
            () = shutdown.cancelled() => return Ok(()),
            () = tokio::time::sleep(DRAIN_POLL) => {}
        }
    }
    closer.close().await?;
    Ok(())
}
