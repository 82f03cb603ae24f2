//! Change set assembler.
//!
//! Buffers capture items by transaction and decides which transactions are
//! complete. Complete transactions come out in commit order with their events
//! in upstream application order; everything else stays pending and is read
//! again next cycle.
//!
//! The assembler also computes the low-water checkpoint: the highest position
//! at or below which every item belongs to a released transaction or a
//! reported gap. Reading resumes after it, so a pending transaction is always
//! redelivered in full.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use chron_config::PipelineConfig;
use chron_core::capture::{CaptureGap, CaptureItem, LogPosition, RawChangeEvent, TransactionCommit};
use chron_core::enums::CompletionMode;
use chrono::{DateTime, Utc};

use crate::error::RecordError;

/// How the assembler decides a transaction will receive no more events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionPolicy {
    /// Complete once the source delivers the commit marker.
    CommitMarker,
    /// Complete once the commit marker arrives or the newest event is older
    /// than `window`, for sources that do not emit markers.
    Quiescence { window: Duration },
}

impl CompletionPolicy {
    #[must_use]
    pub const fn from_config(config: &PipelineConfig) -> Self {
        match config.completion {
            CompletionMode::CommitMarker => Self::CommitMarker,
            CompletionMode::Quiescence => Self::Quiescence {
                window: config.quiescence(),
            },
        }
    }
}

/// A complete transaction, ready to become a change set.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadyTransaction {
    pub transaction_id: String,
    /// Position of the commit marker, or of the newest event for
    /// transactions completed by quiescence.
    pub commit_position: LogPosition,
    pub committed_at: DateTime<Utc>,
    /// Events ordered by `(sequence, log_position)`.
    pub events: Vec<RawChangeEvent>,
    /// Checkpoint that is safe to store once this transaction is flushed.
    pub checkpoint: LogPosition,
}

/// Outcome of one assembly pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assembly {
    /// Complete transactions in commit order.
    pub ready: Vec<ReadyTransaction>,
    /// Gaps reported by the source, in position order.
    pub gaps: Vec<CaptureGap>,
    /// Transactions left open; read again next cycle.
    pub pending: u32,
    /// Low-water checkpoint once every ready transaction and gap is stored.
    pub checkpoint: LogPosition,
    pub items_read: u32,
}

#[derive(Debug)]
struct OpenTransaction {
    first_position: LogPosition,
    last_position: LogPosition,
    newest_event_at: Option<DateTime<Utc>>,
    events: Vec<RawChangeEvent>,
    commit: Option<TransactionCommit>,
}

impl OpenTransaction {
    const fn new(position: LogPosition) -> Self {
        Self {
            first_position: position,
            last_position: position,
            newest_event_at: None,
            events: Vec::new(),
            commit: None,
        }
    }

    fn touch(&mut self, position: LogPosition) {
        self.first_position = self.first_position.min(position);
        self.last_position = self.last_position.max(position);
    }
}

/// Buffers one cycle's capture items.
#[derive(Debug)]
pub struct ChangeSetAssembler {
    policy: CompletionPolicy,
    start: LogPosition,
    last_seen: LogPosition,
    items_read: u32,
    transactions: HashMap<String, OpenTransaction>,
    gaps: Vec<CaptureGap>,
}

impl ChangeSetAssembler {
    /// Start assembling items read after `checkpoint`.
    #[must_use]
    pub fn new(policy: CompletionPolicy, checkpoint: LogPosition) -> Self {
        Self {
            policy,
            start: checkpoint,
            last_seen: checkpoint,
            items_read: 0,
            transactions: HashMap::new(),
            gaps: Vec::new(),
        }
    }

    /// Buffer one item. Items may arrive in any order.
    pub fn push(&mut self, item: CaptureItem) {
        let position = item.position();
        self.last_seen = self.last_seen.max(position);
        self.items_read += 1;
        match item {
            CaptureItem::Event(event) => {
                let txn = self
                    .transactions
                    .entry(event.transaction_id.clone())
                    .or_insert_with(|| OpenTransaction::new(position));
                txn.touch(position);
                txn.newest_event_at = txn.newest_event_at.max(Some(event.captured_at));
                txn.events.push(event);
            }
            CaptureItem::Commit(commit) => {
                let txn = self
                    .transactions
                    .entry(commit.transaction_id.clone())
                    .or_insert_with(|| OpenTransaction::new(position));
                txn.touch(position);
                txn.commit = Some(commit);
            }
            CaptureItem::Gap(gap) => self.gaps.push(gap),
        }
    }

    /// Decide completeness as of `now` and release complete transactions.
    ///
    /// # Errors
    ///
    /// Returns `RecordError::MalformedEvent` when a complete transaction holds
    /// two events with the same sequence number.
    pub fn finish(self, now: DateTime<Utc>) -> Result<Assembly, RecordError> {
        let mut marked = Vec::new();
        let mut quiet = Vec::new();
        let mut open: Vec<(String, OpenTransaction)> = Vec::new();

        for (id, txn) in self.transactions {
            if txn.commit.is_some() {
                marked.push((id, txn));
            } else if self.policy.is_quiet(&txn, now) {
                quiet.push((id, txn));
            } else {
                open.push((id, txn));
            }
        }

        // A quiet transaction is held back while an older one is still open
        // below its last position.
        quiet.sort_by_key(|(_, txn)| txn.last_position);
        let mut lowest_open = open.iter().map(|(_, txn)| txn.first_position).min();
        let mut released = marked;
        for (id, txn) in quiet {
            if lowest_open.is_some_and(|low| low < txn.last_position) {
                lowest_open = lowest_open.min(Some(txn.first_position));
                open.push((id, txn));
            } else {
                released.push((id, txn));
            }
        }

        let mut ready = released
            .into_iter()
            .map(|(id, txn)| ready_transaction(id, txn))
            .collect::<Result<Vec<_>, _>>()?;
        ready.sort_by_key(|txn| txn.commit_position);

        let checkpoint = match lowest_open {
            Some(low) => LogPosition::new(low.get() - 1).min(self.last_seen),
            None => self.last_seen,
        }
        .max(self.start);

        // Flushing in commit order: after the k-th flush, everything not yet
        // flushed still needs to be read again.
        let mut remaining: BTreeSet<LogPosition> =
            ready.iter().map(|t| t.first_position()).collect();
        for txn in &mut ready {
            remaining.remove(&txn.first_position());
            let below_rest = remaining
                .first()
                .map_or(checkpoint, |first| LogPosition::new(first.get() - 1).min(checkpoint));
            txn.checkpoint = below_rest.max(self.start);
        }

        let mut gaps = self.gaps;
        gaps.sort_by_key(|g| g.through);

        Ok(Assembly {
            ready,
            gaps,
            pending: u32::try_from(open.len()).unwrap_or(u32::MAX),
            checkpoint,
            items_read: self.items_read,
        })
    }
}

impl CompletionPolicy {
    fn is_quiet(self, txn: &OpenTransaction, now: DateTime<Utc>) -> bool {
        match self {
            Self::CommitMarker => false,
            Self::Quiescence { window } => txn.newest_event_at.is_some_and(|newest| {
                now.signed_duration_since(newest)
                    .to_std()
                    .is_ok_and(|age| age >= window)
            }),
        }
    }
}

impl ReadyTransaction {
    /// Lowest position this transaction occupies in the capture log.
    fn first_position(&self) -> LogPosition {
        self.events
            .iter()
            .map(|e| e.log_position)
            .min()
            .unwrap_or(self.commit_position)
            .min(self.commit_position)
    }
}

fn ready_transaction(
    transaction_id: String,
    txn: OpenTransaction,
) -> Result<ReadyTransaction, RecordError> {
    let mut events = txn.events;
    events.sort_by_key(|e| (e.sequence, e.log_position));
    for pair in events.windows(2) {
        if pair[0].sequence == pair[1].sequence {
            return Err(RecordError::malformed(
                pair[1].log_position,
                format!(
                    "transaction {transaction_id} repeats sequence {} (also at {})",
                    pair[1].sequence, pair[0].log_position
                ),
            ));
        }
    }

    let (commit_position, committed_at) = match txn.commit {
        Some(commit) => (commit.commit_position, commit.committed_at),
        None => (
            txn.last_position,
            txn.newest_event_at.unwrap_or_else(Utc::now),
        ),
    };
    Ok(ReadyTransaction {
        transaction_id,
        commit_position,
        committed_at,
        events,
        checkpoint: LogPosition::ZERO,
    })
}
