use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use jobwatch_bus::{Envelope, Message, MessageHandler, SubscribeOpts};

use crate::message::MemoryMessage;
use crate::store::SharedStore;

pub(crate) struct ConsumerParams {
    pub store: SharedStore,
    pub subject: String,
    pub group: String,
    pub handler: Box<dyn MessageHandler>,
    pub opts: SubscribeOpts,
    pub token: CancellationToken,
    pub active: Arc<AtomicBool>,
    pub notify: Arc<tokio::sync::Notify>,
}

pub(crate) async fn run_consumer_loop(params: ConsumerParams) {
    let ConsumerParams {
        store,
        subject,
        group,
        handler,
        opts,
        token,
        active,
        notify,
    } = params;

    while !token.is_cancelled() {
        // Register interest before reading so a publish between the read
        // and the wait is not missed.
        let notified = notify.notified();

        let batch = next_batch(&store, &subject, &group, &opts).await;

        if batch.is_empty() {
            tokio::select! {
                () = notified => {}
                () = token.cancelled() => break,
                () = tokio::time::sleep(Duration::from_millis(100)) => {}
            }
            continue;
        }

        for envelope in batch {
            if token.is_cancelled() {
                break;
            }

            let msg = MemoryMessage {
                envelope,
                group: group.clone(),
                store: store.clone(),
                settled: Arc::new(AtomicBool::new(false)),
            };

            if let Err(e) = handler.handle(&msg).await {
                tracing::warn!(%subject, %group, error = %e, "handler error, auto-nak");
                if !msg.is_settled() {
                    let _ = msg.nak(None).await;
                }
            }
        }
    }

    active.store(false, Ordering::Release);
}

async fn next_batch(
    store: &SharedStore,
    subject: &str,
    group: &str,
    opts: &SubscribeOpts,
) -> Vec<Envelope> {
    let mut store = store.lock().await;

    let Some(log) = store.subjects.get_mut(subject) else {
        return Vec::new();
    };
    let Some(consumer) = log.groups.get_mut(group) else {
        return Vec::new();
    };

    let max_inflight = opts.max_inflight as usize;
    if consumer.pending.len() >= max_inflight {
        return Vec::new();
    }
    let take = (opts.batch_size as usize).min(max_inflight - consumer.pending.len());

    let mut batch = Vec::with_capacity(take);

    // Nak'd messages go out before anything new.
    while batch.len() < take {
        let Some(msg_id) = consumer.redeliver.pop_front() else {
            break;
        };
        if let Some(&idx) = log.id_index.get(&msg_id) {
            batch.push(log.messages[idx].clone());
        }
    }

    let start = consumer.cursor.map_or(0, |c| c + 1);
    let end = (start + take - batch.len()).min(log.messages.len());
    for (idx, envelope) in log.messages.iter().enumerate().take(end).skip(start) {
        if consumer.pending.insert(envelope.message_id.clone()) {
            consumer.cursor = Some(idx);
            batch.push(envelope.clone());
        }
    }

    batch
}
