use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::persistence::store::{KvStore, StoreError};

const RECORDS_TABLE: TableDefinition<&str, Vec<u8>> = TableDefinition::new("safety_records");

/// Durable `KvStore` backend. A committed write transaction is the atomic
/// "durable-then-visible" primitive: a crash mid-write leaves the previous
/// value intact, never a partial record.
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = Database::create(path)?;
        info!("📦 Redb safety store opened");
        Ok(Self { db: Arc::new(db) })
    }
}

impl KvStore for RedbStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(RECORDS_TABLE) {
            Ok(t) => t,
            // First read before any write: the table does not exist yet.
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let value = table.get(key)?.map(|v| v.value());
        Ok(value)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(RECORDS_TABLE)?;
            table.insert(key, value.to_vec())?;
        }
        txn.commit()?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(RECORDS_TABLE)?;
            table.remove(key)?;
        }
        txn.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redb_roundtrip_and_reopen() {
        let path = format!("/tmp/test_kv_{}.redb", uuid::Uuid::new_v4());

        {
            let store = RedbStore::new(&path).unwrap();
            assert!(store.get("lock").unwrap().is_none());
            store.put("lock", b"engaged").unwrap();
            assert_eq!(store.get("lock").unwrap().unwrap(), b"engaged");
        }

        // Survives reopen (process restart).
        {
            let store = RedbStore::new(&path).unwrap();
            assert_eq!(store.get("lock").unwrap().unwrap(), b"engaged");
            store.delete("lock").unwrap();
            assert!(store.get("lock").unwrap().is_none());
        }

        std::fs::remove_file(path).unwrap_or(());
    }
}
