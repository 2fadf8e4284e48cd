//! Mapping output history using redb.
//!
//! Records are keyed by `(mapping_id, record_id)` so one mapping's history is
//! a single range scan. Deleting a mapping leaves its history in place.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use serde_json::Value;

use cblocks_core::mapping::{record_limit, MappingOutputRecord, MappingOutputStore};

use crate::Error;

// Outputs table: key = (mapping_id, record_id), value = MappingOutputRecord (JSON)
const OUTPUTS_TABLE: TableDefinition<(&str, &str), &str> =
    TableDefinition::new("mapping_outputs");

/// Append-only mapping output store shared by every mapping family.
pub struct RedbMappingOutputStore {
    db: Arc<Database>,
}

impl RedbMappingOutputStore {
    /// Create the store on an opened database.
    pub fn new(db: Arc<Database>) -> Result<Self, Error> {
        let write_txn = db.begin_write()?;
        {
            let _outputs = write_txn.open_table(OUTPUTS_TABLE)?;
        }
        write_txn.commit()?;
        Ok(Self { db })
    }

    /// Append a record.
    pub fn save(&self, record: &MappingOutputRecord) -> Result<(), Error> {
        let json = serde_json::to_string(record)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(OUTPUTS_TABLE)?;
            table.insert(
                (record.mapping_id.as_str(), record.id.as_str()),
                json.as_str(),
            )?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// List a mapping's records that pass `filter`, newest event first.
    pub fn list<F>(
        &self,
        mapping_id: &str,
        filter: F,
        limit: Option<usize>,
    ) -> Result<Vec<MappingOutputRecord>, Error>
    where
        F: Fn(&MappingOutputRecord) -> bool,
    {
        let limit = record_limit(limit);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(OUTPUTS_TABLE)?;

        let mut records = Vec::new();
        let start_key = (mapping_id, "");
        let end_key = (mapping_id, "\x7F");

        for result in table.range(start_key..=end_key)? {
            let (_key, value) = result?;
            let record: MappingOutputRecord = serde_json::from_str(value.value())?;
            if filter(&record) {
                records.push(record);
            }
        }

        // Sort by event timestamp descending (newest first)
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(limit);

        Ok(records)
    }
}

#[async_trait]
impl MappingOutputStore for RedbMappingOutputStore {
    async fn record(
        &self,
        mapping_id: &str,
        from: Value,
        to: Value,
        timestamp: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> cblocks_core::Result<MappingOutputRecord> {
        let record = MappingOutputRecord {
            id: uuid::Uuid::new_v4().to_string(),
            mapping_id: mapping_id.to_string(),
            from,
            to,
            timestamp,
            created_at,
        };
        self.save(&record)?;
        Ok(record)
    }

    async fn get_records(
        &self,
        mapping_id: &str,
        limit: Option<usize>,
    ) -> cblocks_core::Result<Vec<MappingOutputRecord>> {
        Ok(self.list(mapping_id, |_| true, limit)?)
    }

    async fn get_records_by_to(
        &self,
        mapping_id: &str,
        to: &Value,
        limit: Option<usize>,
    ) -> cblocks_core::Result<Vec<MappingOutputRecord>> {
        Ok(self.list(mapping_id, |record| &record.to == to, limit)?)
    }
}
