//! One processing cycle: capture source to change history.

use std::time::Instant;

use chron_config::ChronConfig;
use chron_core::capture::{CaptureGap, LogPosition};
use chron_core::entities::ChangeSet;
use chron_core::enums::GapReason;
use chron_core::ids;
use chron_core::responses::CycleReport;
use chron_core::source::CaptureSource;
use chron_db::repos::{ChangeSetBatch, FlushOutcome};
use chron_db::store::ChangeStore;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard};

use crate::assembler::{Assembly, ChangeSetAssembler, CompletionPolicy};
use crate::error::PipelineError;
use crate::recorder::Recorder;

/// Connects a capture source to the change store.
///
/// Cycles are serialized: [`Pipeline::run_cycle`] holds an internal lock for
/// its whole duration, and administrative callers take the same lock through
/// [`Pipeline::exclusive`] so they never interleave with a cycle.
pub struct Pipeline<S> {
    source: S,
    store: ChangeStore,
    recorder: Recorder,
    policy: CompletionPolicy,
    source_name: String,
    page_size: u32,
    lock: Mutex<()>,
}

impl<S: CaptureSource> Pipeline<S> {
    #[must_use]
    pub fn new(source: S, store: ChangeStore, config: &ChronConfig) -> Self {
        Self {
            source,
            store,
            recorder: Recorder::new(config.pipeline.strict_validation),
            policy: CompletionPolicy::from_config(&config.pipeline),
            source_name: config.capture.source_name.clone(),
            page_size: config.capture.page_size.max(1),
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub const fn source(&self) -> &S {
        &self.source
    }

    #[must_use]
    pub const fn store(&self) -> &ChangeStore {
        &self.store
    }

    #[must_use]
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Wait for any running cycle to finish and keep others from starting
    /// while the guard is held.
    pub async fn exclusive(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }

    /// Run one cycle, judging quiescence against the current time.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::run_cycle_at`].
    pub async fn run_cycle(&self) -> Result<CycleReport, PipelineError> {
        self.run_cycle_at(Utc::now()).await
    }

    /// Run one cycle with `now` as the quiescence reference time.
    ///
    /// Every complete transaction is recorded before anything is written, so
    /// a recording error leaves the store and the checkpoint untouched.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Record` for unknown source tables or malformed
    /// events, `PipelineError::Capture` if the source fails, and
    /// `PipelineError::Database` if the store fails. Change sets flushed
    /// before a store failure stay flushed; the rest is retried next cycle.
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<CycleReport, PipelineError> {
        let _guard = self.lock.lock().await;
        let started = Instant::now();

        let checkpoint_before = self.store.checkpoint(&self.source_name).await?;
        let assembly = self.assemble(checkpoint_before, now).await?;

        let mut batches = Vec::with_capacity(assembly.ready.len());
        for txn in &assembly.ready {
            if txn.events.is_empty() {
                tracing::debug!(
                    transaction = %txn.transaction_id,
                    "skipping transaction without changes"
                );
                continue;
            }
            let change_set = ChangeSet {
                id: ids::change_set_id(txn.commit_position),
                transaction_id: txn.transaction_id.clone(),
                commit_position: txn.commit_position,
                created_at: txn.committed_at,
            };
            let records = txn
                .events
                .iter()
                .map(|event| self.recorder.record(&change_set, event))
                .collect::<Result<Vec<_>, _>>()?;
            let positions = txn.events.iter().map(|event| event.log_position).collect();
            batches.push(PendingFlush {
                batch: ChangeSetBatch { change_set, records },
                positions,
                checkpoint: txn.checkpoint,
            });
        }

        let mut report = CycleReport {
            checkpoint_before,
            items_read: assembly.items_read,
            pending_transactions: assembly.pending,
            ..CycleReport::default()
        };

        for gap in &assembly.gaps {
            if self.store.record_gap(&self.source_name, gap, checkpoint_before).await? {
                report.gaps_recorded += 1;
                tracing::error!(
                    source = %self.source_name,
                    after = %gap.after,
                    through = %gap.through,
                    reason = %gap.reason,
                    detail = %gap.detail,
                    "capture gap: change events were lost before they could be recorded"
                );
            }
        }

        for pending in &batches {
            let batch = &pending.batch;
            match self
                .store
                .flush(batch, &self.source_name, pending.checkpoint)
                .await?
            {
                FlushOutcome::Flushed { records } => {
                    report.change_sets_flushed += 1;
                    report.records_written += u32::try_from(records).unwrap_or(u32::MAX);
                    tracing::info!(
                        change_set = %batch.change_set.id,
                        transaction = %batch.change_set.transaction_id,
                        records,
                        "flushed change set"
                    );
                }
                FlushOutcome::AlreadyFlushed { missing } => {
                    report.change_sets_skipped += 1;
                    let Some(gap) = pending.late_events_gap(&missing) else {
                        continue;
                    };
                    if self
                        .store
                        .record_gap(&self.source_name, &gap, pending.checkpoint)
                        .await?
                    {
                        report.gaps_recorded += 1;
                        tracing::error!(
                            source = %self.source_name,
                            transaction = %batch.change_set.transaction_id,
                            after = %gap.after,
                            through = %gap.through,
                            records = missing.len(),
                            "late events: transaction changed after its change set was flushed"
                        );
                    }
                }
            }
        }

        self.store
            .advance_checkpoint(&self.source_name, assembly.checkpoint)
            .await?;
        self.source.advance_checkpoint(assembly.checkpoint).await?;

        report.checkpoint_after = assembly.checkpoint;
        report.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(
            checkpoint = %report.checkpoint_after,
            items = report.items_read,
            flushed = report.change_sets_flushed,
            skipped = report.change_sets_skipped,
            pending = report.pending_transactions,
            gaps = report.gaps_recorded,
            duration_ms = report.duration_ms,
            "cycle complete"
        );
        Ok(report)
    }

    /// Drain the source from `checkpoint`, one page at a time.
    async fn assemble(
        &self,
        checkpoint: LogPosition,
        now: DateTime<Utc>,
    ) -> Result<Assembly, PipelineError> {
        let mut assembler = ChangeSetAssembler::new(self.policy, checkpoint);
        let mut since = checkpoint;
        loop {
            let page = self.source.poll_changes(since, self.page_size).await?;
            let drained = page.len() < self.page_size as usize;
            for item in page {
                since = since.max(item.position());
                assembler.push(item);
            }
            if drained {
                break;
            }
        }
        Ok(assembler.finish(now)?)
    }
}

/// A recorded batch waiting to be written, with the capture positions of its
/// records in record order.
struct PendingFlush {
    batch: ChangeSetBatch,
    positions: Vec<LogPosition>,
    checkpoint: LogPosition,
}

impl PendingFlush {
    /// Gap spanning the positions of `missing` records, or `None` when every
    /// record is already stored.
    fn late_events_gap(&self, missing: &[String]) -> Option<CaptureGap> {
        let late = self
            .batch
            .records
            .iter()
            .zip(&self.positions)
            .filter(|(record, _)| missing.contains(&record.id))
            .map(|(_, position)| *position);
        let first = late.clone().min()?;
        let through = late.max()?;
        Some(CaptureGap {
            after: LogPosition::new(first.get() - 1),
            through,
            reason: GapReason::LateEvents,
            detail: format!(
                "{} event(s) of transaction {} arrived after change set {} was flushed",
                missing.len(),
                self.batch.change_set.transaction_id,
                self.batch.change_set.id
            ),
        })
    }
}
