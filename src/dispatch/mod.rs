use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{Semaphore, mpsc};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::models::event::Event;
use crate::models::subscription::WebhookSubscription;
use crate::observability::metrics::Metrics;
use crate::store::SubscriptionStore;

/// Write side of the dispatch queue. State transitions only enqueue here;
/// a queue failure is logged and never surfaced to the transition.
#[derive(Clone)]
pub struct DispatchHandle {
    tx: mpsc::Sender<Event>,
    metrics: Metrics,
}

impl DispatchHandle {
    pub async fn enqueue(&self, event: Event) {
        match self.tx.send(event).await {
            Ok(()) => self.metrics.events_in_queue.inc(),
            Err(err) => warn!(error = %err, "event dropped: dispatch queue closed"),
        }
    }
}

pub fn channel(queue_size: usize, metrics: Metrics) -> (DispatchHandle, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(queue_size);
    (DispatchHandle { tx, metrics }, rx)
}

/// Fans domain events out to matching webhook subscriptions. Outbound
/// concurrency is capped by a semaphore so a burst of transitions cannot
/// open unbounded connections; retries within one subscription stay
/// sequential.
#[derive(Clone)]
pub struct Dispatcher {
    subscriptions: Arc<dyn SubscriptionStore>,
    client: reqwest::Client,
    limiter: Arc<Semaphore>,
    retry_base: Duration,
    retry_cap: Duration,
    metrics: Metrics,
}

impl Dispatcher {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        config: &Config,
        metrics: Metrics,
    ) -> Self {
        Self {
            subscriptions,
            client: reqwest::Client::new(),
            limiter: Arc::new(Semaphore::new(config.dispatch_concurrency.max(1))),
            retry_base: Duration::from_millis(config.dispatch_retry_base_ms),
            retry_cap: Duration::from_millis(config.dispatch_retry_cap_ms),
            metrics,
        }
    }

    /// Deliver one event to one subscription: initial attempt plus up to
    /// `max_retries` more, capped exponential backoff in between. The
    /// outcome is recorded on the subscription either way; at-least-once,
    /// so a subscriber may see duplicates.
    async fn deliver(&self, subscription: WebhookSubscription, event: Event) {
        let start = Instant::now();
        let mut final_status: Option<u16> = None;

        for attempt in 0..=subscription.max_retries {
            if attempt > 0 {
                sleep(self.backoff(attempt)).await;
            }

            match self.attempt(&subscription, &event).await {
                Ok(status) if status.is_success() => {
                    final_status = Some(status.as_u16());
                    break;
                }
                Ok(status) => {
                    debug!(
                        subscription = %subscription.id,
                        attempt,
                        status = status.as_u16(),
                        "webhook attempt rejected"
                    );
                    final_status = Some(status.as_u16());
                }
                Err(err) => {
                    debug!(
                        subscription = %subscription.id,
                        attempt,
                        error = %err,
                        "webhook attempt failed"
                    );
                    final_status = None;
                }
            }
        }

        let succeeded = final_status.is_some_and(|code| (200..300).contains(&code));
        let outcome = if succeeded { "success" } else { "error" };

        self.metrics
            .webhook_deliveries_total
            .with_label_values(&[outcome])
            .inc();
        self.metrics
            .webhook_delivery_seconds
            .with_label_values(&[outcome])
            .observe(start.elapsed().as_secs_f64());

        if !succeeded {
            warn!(
                subscription = %subscription.id,
                target = %subscription.target_url,
                status = ?final_status,
                "webhook delivery exhausted retries"
            );
        }

        if let Err(err) = self
            .subscriptions
            .record_result(subscription.id, final_status, Utc::now())
            .await
        {
            error!(subscription = %subscription.id, error = %err, "failed to record webhook result");
        }
    }

    async fn attempt(
        &self,
        subscription: &WebhookSubscription,
        event: &Event,
    ) -> Result<reqwest::StatusCode, reqwest::Error> {
        let response = self
            .client
            .post(&subscription.target_url)
            .timeout(Duration::from_millis(subscription.timeout_ms))
            .json(event)
            .send()
            .await?;

        Ok(response.status())
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let doubled = self
            .retry_base
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        doubled.min(self.retry_cap)
    }
}

/// Drains the dispatch queue. One task per matching subscription, gated by
/// the concurrency limiter; failures on one subscription never touch the
/// others.
pub async fn run_dispatcher(dispatcher: Dispatcher, mut event_rx: mpsc::Receiver<Event>) {
    info!("event dispatcher started");

    while let Some(event) = event_rx.recv().await {
        dispatcher.metrics.events_in_queue.dec();

        let matching = match dispatcher
            .subscriptions
            .list_active_by_event(event.event_type)
            .await
        {
            Ok(subs) => subs,
            Err(err) => {
                error!(error = %err, "failed to load subscriptions for event");
                continue;
            }
        };

        debug!(
            event = ?event.event_type,
            subscriptions = matching.len(),
            "dispatching event"
        );

        for subscription in matching {
            let permit = match dispatcher.limiter.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };

            let worker = dispatcher.clone();
            let event = event.clone();
            tokio::spawn(async move {
                let _permit = permit;
                worker.deliver(subscription, event).await;
            });
        }
    }

    warn!("event dispatcher stopped: queue channel closed");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::Dispatcher;
    use crate::config::Config;
    use crate::observability::metrics::Metrics;
    use crate::store::memory::MemoryStore;

    fn dispatcher(base_ms: u64, cap_ms: u64) -> Dispatcher {
        let config = Config {
            http_port: 0,
            log_level: "info".to_string(),
            dispatch_queue_size: 16,
            dispatch_concurrency: 2,
            dispatch_retry_base_ms: base_ms,
            dispatch_retry_cap_ms: cap_ms,
        };
        Dispatcher::new(Arc::new(MemoryStore::new()), &config, Metrics::new())
    }

    #[test]
    fn backoff_doubles_until_the_cap() {
        let d = dispatcher(250, 5_000);

        assert_eq!(d.backoff(1), Duration::from_millis(250));
        assert_eq!(d.backoff(2), Duration::from_millis(500));
        assert_eq!(d.backoff(3), Duration::from_millis(1_000));
        assert_eq!(d.backoff(10), Duration::from_millis(5_000));
    }

    #[test]
    fn backoff_respects_a_tight_cap() {
        let d = dispatcher(400, 600);

        assert_eq!(d.backoff(1), Duration::from_millis(400));
        assert_eq!(d.backoff(2), Duration::from_millis(600));
    }
}
