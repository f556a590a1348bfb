use std::time;

use link_common::liveness::Liveness;
use link_common::retry::RetryPolicy;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::ConsumerError;
use crate::events::{Event, Fetcher, Processor};

/// Drives the fetch → dispatch loop.
///
/// Events are handled one at a time in arrival order. A failing event is logged and
/// skipped, it never aborts its batch or the loop.
pub struct Consumer<F, P> {
    /// Where events come from. Owned, so nothing else can move its offset.
    fetcher: F,
    processor: P,
    /// Maximum number of events requested per fetch.
    batch_size: usize,
    /// How long to wait before fetching again after an empty batch.
    idle_interval: time::Duration,
    /// Spaces out fetches while they keep failing.
    retry_policy: RetryPolicy,
    /// Reported on every iteration so a stuck loop fails the liveness probe.
    liveness: Liveness,
}

impl<F: Fetcher, P: Processor> Consumer<F, P> {
    pub fn new(
        fetcher: F,
        processor: P,
        batch_size: usize,
        idle_interval: time::Duration,
        retry_policy: RetryPolicy,
        liveness: Liveness,
    ) -> Self {
        Self {
            fetcher,
            processor,
            batch_size,
            idle_interval,
            retry_policy,
            liveness,
        }
    }

    /// Run until `shutdown` is cancelled, or fetching fails in a way retrying cannot fix.
    ///
    /// Fetches and waits are abandoned as soon as shutdown is requested. An event already
    /// being processed is allowed to finish, the rest of its batch is left unprocessed.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<(), ConsumerError> {
        let mut consecutive_failures: u32 = 0;

        loop {
            self.liveness.report_healthy();

            let fetched = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                fetched = self.fetcher.fetch(self.batch_size) => fetched,
            };
            metrics::counter!("link_worker_fetches_total").increment(1);

            let events = match fetched {
                Ok(events) => {
                    consecutive_failures = 0;
                    events
                }
                Err(e) if e.is_fatal() => {
                    error!("consumer cannot fetch events: {}", e);
                    return Err(ConsumerError::FatalFetchError(e));
                }
                Err(e) => {
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    metrics::counter!("link_worker_fetch_errors_total").increment(1);

                    let backoff = self.retry_policy.time_until_next_retry(consecutive_failures);
                    error!(
                        consecutive_failures,
                        ?backoff,
                        "consumer error: {}",
                        e
                    );

                    if !self.wait(backoff, &shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            if events.is_empty() {
                if !self.wait(self.idle_interval, &shutdown).await {
                    break;
                }
                continue;
            }

            self.handle_events(events, &shutdown).await;
        }

        info!("consumer shut down");

        Ok(())
    }

    async fn handle_events(&self, events: Vec<Event>, shutdown: &CancellationToken) {
        metrics::histogram!("link_worker_batch_size").record(events.len() as f64);

        for event in events {
            if shutdown.is_cancelled() {
                warn!("shutdown requested, dropping the rest of the batch");
                return;
            }

            info!(text = %event.text, "got new event");

            let now = tokio::time::Instant::now();
            let result = self.processor.process(event).await;
            let elapsed = now.elapsed().as_secs_f64();

            let outcome = match result {
                Ok(()) => "processed",
                Err(e) => {
                    error!("failed to process event: {}", e);
                    "failed"
                }
            };

            let labels = [("outcome", outcome)];
            metrics::counter!("link_worker_events_total", &labels).increment(1);
            metrics::histogram!("link_worker_event_processing_duration_seconds", &labels)
                .record(elapsed);

            self.liveness.report_healthy();
        }
    }

    /// Sleep for `duration` unless shutdown comes first. Returns false on shutdown.
    async fn wait(&self, duration: time::Duration, shutdown: &CancellationToken) -> bool {
        if duration.is_zero() {
            return !shutdown.is_cancelled();
        }

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}
