//! Recurring worker loop.
//!
//! Runs a cycle every poll interval until the shutdown flag flips. Each cycle
//! is bounded by a timeout; consecutive failures back off exponentially and
//! the worker gives up once the retry budget is spent.

use std::sync::Arc;
use std::time::Duration;

use chron_config::PipelineConfig;
use chron_core::source::CaptureSource;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::error::PipelineError;
use crate::pipeline::Pipeline;
use crate::retry::RetryConfig;

pub struct Worker<S> {
    pipeline: Arc<Pipeline<S>>,
    poll_interval: Duration,
    cycle_timeout: Duration,
    retry: RetryConfig,
}

impl<S: CaptureSource> Worker<S> {
    #[must_use]
    pub const fn new(
        pipeline: Arc<Pipeline<S>>,
        poll_interval: Duration,
        cycle_timeout: Duration,
        retry: RetryConfig,
    ) -> Self {
        Self {
            pipeline,
            poll_interval,
            cycle_timeout,
            retry,
        }
    }

    #[must_use]
    pub const fn from_config(pipeline: Arc<Pipeline<S>>, config: &PipelineConfig) -> Self {
        Self::new(
            pipeline,
            config.poll_interval(),
            config.cycle_timeout(),
            RetryConfig::from_config(config),
        )
    }

    #[must_use]
    pub fn pipeline(&self) -> &Arc<Pipeline<S>> {
        &self.pipeline
    }

    /// Run until `shutdown` becomes `true` or its sender is dropped.
    ///
    /// A cycle in progress when shutdown is requested runs to completion (or
    /// its timeout) first.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::RetriesExhausted` after `max_attempts`
    /// consecutive failed cycles.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), PipelineError> {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut failures = 0_u32;

        tracing::info!(
            source = %self.pipeline.source_name(),
            poll_interval = ?self.poll_interval,
            "worker started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            let cycle = tokio::time::timeout(self.cycle_timeout, self.pipeline.run_cycle()).await;
            let error = match cycle {
                Ok(Ok(_)) => {
                    failures = 0;
                    continue;
                }
                Ok(Err(e)) => e,
                Err(_) => PipelineError::Timeout(self.cycle_timeout),
            };

            failures += 1;
            if self.retry.exhausted(failures) {
                tracing::error!(
                    source = %self.pipeline.source_name(),
                    attempts = failures,
                    error = %error,
                    "pipeline stopped: retry budget exhausted"
                );
                return Err(PipelineError::RetriesExhausted {
                    attempts: failures,
                    last: Box::new(error),
                });
            }

            let delay = self.retry.delay_for(failures);
            tracing::warn!(attempt = failures, ?delay, error = %error, "cycle failed; retrying");
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                () = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!(source = %self.pipeline.source_name(), "worker stopped");
        Ok(())
    }
}
