use std::{sync::Arc, time::Duration};

use tokio::{
    sync::broadcast,
    task::JoinSet,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::{
    events::StorageEvent,
    format::summarize,
    pubsub::{Delivery, Subscription},
    workers::{Outcome, Worker},
};

pub const DEFAULT_MAX_MESSAGES: usize = 10;
/// Upper bound the broker accepts for an ack deadline.
const MAX_ACK_DEADLINE_SECS: u64 = 600;

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub max_messages: usize,
    /// Pause after a failed pull before trying again.
    pub retry_delay: Duration,
    /// Deadline requested for messages still being processed.
    pub ack_extension: Duration,
    /// How often the leases of an unfinished batch are renewed.
    pub lease_interval: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            max_messages: DEFAULT_MAX_MESSAGES,
            retry_delay: Duration::from_secs(1),
            ack_extension: Duration::from_secs(60),
            lease_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub acked: usize,
    pub nacked: usize,
}

/// Pulls notifications from a subscription and feeds them to a worker,
/// acknowledging or rejecting each according to its [`Outcome`].
pub struct Consumer<W: Worker> {
    subscription: Arc<dyn Subscription>,
    worker: Arc<W>,
    config: ConsumerConfig,
}

impl<W: Worker> Consumer<W> {
    pub fn new(subscription: Arc<dyn Subscription>, worker: Arc<W>, config: ConsumerConfig) -> Self {
        Self {
            subscription,
            worker,
            config,
        }
    }

    /// Runs until `shutdown` fires. An in-flight batch is always finished, acks included.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            subscription = %self.subscription.path(),
            worker = W::WORKER_ID,
            max_messages = self.config.max_messages,
            "Listening for messages"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("Received shutdown signal, stopping consumer");
                    break;
                }
                pulled = self.subscription.pull(self.config.max_messages) => match pulled {
                    Ok(deliveries) if deliveries.is_empty() => debug!("No messages in batch"),
                    Ok(deliveries) => {
                        self.process_batch(deliveries).await;
                    }
                    Err(e) => {
                        error!(error = %e, "Error pulling messages");
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                },
            }
        }

        info!("Consumer stopped");
    }

    pub async fn process_batch(&self, deliveries: Vec<Delivery>) -> BatchReport {
        debug!(message_count = deliveries.len(), "Received message batch");

        let mut pending: Vec<String> = deliveries.iter().map(|d| d.ack_id.clone()).collect();
        let mut tasks = JoinSet::new();
        for delivery in deliveries {
            let worker = Arc::clone(&self.worker);
            let span = info_span!(
                "delivery",
                message_id = %delivery.message_id,
                attempt = delivery.delivery_attempt
            );
            tasks.spawn(
                async move {
                    let outcome = handle_delivery(worker.as_ref(), &delivery).await;
                    (delivery.ack_id, outcome)
                }
                .instrument(span),
            );
        }

        let mut lease = time::interval_at(
            Instant::now() + self.config.lease_interval,
            self.config.lease_interval,
        );
        lease.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut ack_ids = Vec::new();
        let mut nack_ids = Vec::new();
        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok((ack_id, outcome))) => {
                        pending.retain(|id| *id != ack_id);
                        if outcome.should_ack() {
                            ack_ids.push(ack_id);
                        } else {
                            nack_ids.push(ack_id);
                        }
                    }
                    // The message stays unacknowledged and comes back after its deadline.
                    Some(Err(e)) => error!(error = %e, "Worker task failed"),
                },
                _ = lease.tick() => self.extend_leases(&pending).await,
            }
        }

        let report = BatchReport {
            acked: ack_ids.len(),
            nacked: nack_ids.len(),
        };

        if !ack_ids.is_empty()
            && let Err(e) = self.subscription.acknowledge(&ack_ids).await
        {
            error!(error = %e, count = ack_ids.len(), "Failed to acknowledge messages");
        }
        if !nack_ids.is_empty()
            && let Err(e) = self.subscription.modify_ack_deadline(&nack_ids, 0).await
        {
            error!(error = %e, count = nack_ids.len(), "Failed to reject messages");
        }

        debug!(acked = report.acked, nacked = report.nacked, "Batch settled");
        report
    }

    async fn extend_leases(&self, ack_ids: &[String]) {
        if ack_ids.is_empty() {
            return;
        }
        let seconds = self.config.ack_extension.as_secs().min(MAX_ACK_DEADLINE_SECS) as u32;
        debug!(count = ack_ids.len(), seconds, "Extending ack deadlines");
        if let Err(e) = self.subscription.modify_ack_deadline(ack_ids, seconds).await {
            warn!(error = %e, count = ack_ids.len(), "Failed to extend ack deadlines");
        }
    }
}

async fn handle_delivery<W: Worker>(worker: &W, delivery: &Delivery) -> Outcome {
    let event = match StorageEvent::from_delivery(&delivery.attributes, delivery.data.clone()) {
        Ok(event) => event,
        Err(e) => {
            error!(error = %e, "Discarding malformed notification");
            return Outcome::from_error(&e);
        }
    };

    match summarize(&event) {
        Ok(summary) => info!("Received message:\n{}", summary),
        Err(e) => warn!(error = %e, object = %event.object_id, "Failed to summarize notification"),
    }

    let outcome = worker.handle(&event).await;
    debug!(worker = W::WORKER_ID, ?outcome, "Notification handled");
    outcome
}
