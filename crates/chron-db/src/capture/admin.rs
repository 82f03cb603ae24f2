//! Administrative toggle for the reference capture log.
//!
//! Every action that throws unacknowledged entries away records a pending
//! gap that is delivered to readers like any other capture item. Entries are
//! discarded a whole transaction at a time, so a reader never sees part of a
//! transaction.

use chron_core::capture::LogPosition;
use chron_core::enums::GapReason;
use chron_core::errors::CaptureError;
use chron_core::source::CaptureAdmin;

use super::LibsqlCaptureSource;
use crate::error::DatabaseError;

/// Capture instances kept per source table.
const MAX_INSTANCES_PER_TABLE: usize = 2;

/// `(after, through, lost entries)` of a discarded range.
type Discarded = (LogPosition, LogPosition, i64);

impl LibsqlCaptureSource {
    /// Discard every transaction with an entry matching `condition` (a SQL
    /// predicate over `capture_log`, parameter `?1`), and record a pending gap
    /// for the unacknowledged entries among them.
    ///
    /// Runs inside the caller's transaction.
    async fn discard_transactions(
        conn: &libsql::Connection,
        condition: &str,
        param: i64,
        reason: GapReason,
        what: &str,
    ) -> Result<Option<Discarded>, DatabaseError> {
        let mut rows = conn
            .query("SELECT acknowledged FROM capture_state WHERE id = 1", ())
            .await?;
        let acknowledged = rows.next().await?.ok_or(DatabaseError::NoResult)?.get::<i64>(0)?;

        let affected = format!("SELECT transaction_id FROM capture_log WHERE {condition}");
        let mut rows = conn
            .query(
                &format!(
                    "SELECT COUNT(*), MAX(position) FROM capture_log
                     WHERE position > ?2 AND transaction_id IN ({affected})"
                ),
                libsql::params![param, acknowledged],
            )
            .await?;
        let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
        let lost = row.get::<i64>(0)?;
        let through = row.get::<Option<i64>>(1)?;

        conn.execute(
            &format!(
                "INSERT OR IGNORE INTO capture_dropped_transactions (transaction_id) {affected}"
            ),
            [param],
        )
        .await?;
        conn.execute(
            &format!("DELETE FROM capture_log WHERE transaction_id IN ({affected})"),
            [param],
        )
        .await?;

        let Some(through) = through.filter(|_| lost > 0) else {
            return Ok(None);
        };
        conn.execute(
            "INSERT OR REPLACE INTO capture_pending_gaps
                (through_position, after_position, reason, detail)
             VALUES (?1, ?2, ?3, ?4)",
            libsql::params![
                through,
                acknowledged,
                reason.as_str(),
                format!("{what}: {lost} unacknowledged capture entries discarded")
            ],
        )
        .await?;
        Ok(Some((LogPosition::new(acknowledged), LogPosition::new(through), lost)))
    }

    async fn ensure_enabled(&self) -> Result<(), CaptureError> {
        if self.is_enabled().await? {
            Ok(())
        } else {
            Err(CaptureError::Disabled)
        }
    }
}

/// Commit `tx` when `result` is `Ok`, otherwise roll it back.
async fn finish<T>(
    tx: libsql::Transaction,
    result: Result<T, DatabaseError>,
) -> Result<T, DatabaseError> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            let _ = tx.rollback().await;
            Err(e)
        }
    }
}

async fn disable_in(conn: &libsql::Connection) -> Result<Option<Discarded>, DatabaseError> {
    let gap = LibsqlCaptureSource::discard_transactions(
        conn,
        "1 = ?1",
        1,
        GapReason::CaptureDisabled,
        "capture disabled",
    )
    .await?;
    conn.execute("DELETE FROM capture_instances", ()).await?;
    conn.execute("UPDATE capture_state SET enabled = 0 WHERE id = 1", ())
        .await?;
    Ok(gap)
}

async fn drop_instance_in(
    conn: &libsql::Connection,
    source_table: &str,
    instance: i64,
) -> Result<Option<Discarded>, DatabaseError> {
    let gap = LibsqlCaptureSource::discard_transactions(
        conn,
        "instance_id = ?1",
        instance,
        GapReason::InstanceReplaced,
        &format!("capture instance {instance} of {source_table} dropped"),
    )
    .await?;
    conn.execute("DELETE FROM capture_instances WHERE id = ?1", [instance])
        .await?;
    Ok(gap)
}

fn log_gap(gap: Option<Discarded>, reason: GapReason) {
    if let Some((after, through, lost)) = gap {
        tracing::warn!(
            %after,
            %through,
            lost,
            %reason,
            "capture entries discarded before acknowledgement"
        );
    }
}

impl CaptureAdmin for LibsqlCaptureSource {
    async fn enable_capture(&self, storage_path: &str) -> Result<(), CaptureError> {
        if storage_path.trim().is_empty() {
            return Err(CaptureError::InvalidRequest("storage path must not be empty".into()));
        }
        self.db()
            .conn()
            .execute(
                "UPDATE capture_state SET enabled = 1, storage_path = ?1 WHERE id = 1",
                [storage_path],
            )
            .await
            .map_err(DatabaseError::from)?;
        tracing::info!(storage_path, "capture enabled");
        Ok(())
    }

    async fn disable_capture(&self) -> Result<(), CaptureError> {
        if !self.is_enabled().await? {
            return Ok(());
        }
        let tx = self.db().conn().transaction().await.map_err(DatabaseError::from)?;
        let result = disable_in(&tx).await;
        let gap = finish(tx, result).await?;
        log_gap(gap, GapReason::CaptureDisabled);
        tracing::info!("capture disabled");
        Ok(())
    }

    async fn replace_capture_instance(&self, source_table: &str) -> Result<(), CaptureError> {
        self.ensure_enabled().await?;
        let created = self.create_instance(source_table).await?;
        let instances = self.instances(source_table).await?;
        tracing::info!(source_table, instance = created, "capture instance created");

        if instances.len() <= MAX_INSTANCES_PER_TABLE {
            return Ok(());
        }
        let oldest = instances[0];
        let tx = self.db().conn().transaction().await.map_err(DatabaseError::from)?;
        let result = drop_instance_in(&tx, source_table, oldest).await;
        let gap = finish(tx, result).await?;
        log_gap(gap, GapReason::InstanceReplaced);
        Ok(())
    }

    async fn purge_through(&self, position: LogPosition) -> Result<(), CaptureError> {
        let tx = self.db().conn().transaction().await.map_err(DatabaseError::from)?;
        let result = Self::discard_transactions(
            &tx,
            "position <= ?1",
            position.get(),
            GapReason::RetentionCleanup,
            &format!("retention cleanup through {position}"),
        )
        .await;
        let gap = finish(tx, result).await?;
        log_gap(gap, GapReason::RetentionCleanup);
        Ok(())
    }
}
