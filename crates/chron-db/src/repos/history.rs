//! Entity history: every record mentioning one entity id, in playback order.

use chron_core::enums::Operation;
use chron_core::responses::EntityHistory;

use crate::error::DatabaseError;
use crate::repos::change_records::{RECORD_COLUMNS, row_to_record};
use crate::store::ChangeStore;

impl ChangeStore {
    /// Replay what the history knows about `entity_id`.
    ///
    /// Distinguishes an id that was never recorded from one whose latest
    /// record deleted it.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn entity_history(&self, entity_id: &str) -> Result<EntityHistory, DatabaseError> {
        let _read = self.read_gate().await;
        let mut rows = self
            .db()
            .conn()
            .query(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM change_records r
                     JOIN change_sets cs ON cs.id = r.change_set_id
                     WHERE r.entity_id = ?1
                     ORDER BY cs.created_at, r.change_set_id, r.sequence_number"
                ),
                [entity_id],
            )
            .await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(row_to_record(&row)?.0);
        }

        let Some(last) = records.last() else {
            return Ok(EntityHistory::NotFound);
        };
        if last.operation == Operation::Delete {
            let deleted_in = last.change_set_id.clone();
            return Ok(EntityHistory::Deleted { deleted_in, records });
        }
        Ok(EntityHistory::Live { records })
    }
}
