use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition};

use stride_core::{ActivityId, ActivityRecord, SyncCheckpoint};

use crate::api::{DbState, CURRENT_SCHEMA, STRIDE_REDB_FILENAME};
use crate::codec::{decode_checkpoint, decode_record, encode_checkpoint, encode_record};
use crate::maintenance::quarantine_corrupt_file;
use crate::{ActivityStore, StorageError};

const META: TableDefinition<&str, &str> = TableDefinition::new("meta");
const RECORDS: TableDefinition<u64, &[u8]> = TableDefinition::new("records");

const META_FORMAT_KEY: &str = "format";
const META_FORMAT_VALUE: &str = "stride-redb";
const META_SCHEMA_VERSION: &str = "schema_version";
const META_CREATED_AT: &str = "created_at";
const META_CHECKPOINT: &str = "checkpoint";
const META_LAST_SYNC_AT: &str = "last_sync_at";

#[derive(Debug, Default, Clone)]
pub struct RedbActivityStore;

impl RedbActivityStore {
    fn is_corrupt_open_error(err: &redb::DatabaseError) -> bool {
        match err {
            redb::DatabaseError::Storage(storage) => match storage {
                redb::StorageError::Corrupted(_) => true,
                redb::StorageError::Io(ioe) => matches!(
                    ioe.kind(),
                    std::io::ErrorKind::InvalidData | std::io::ErrorKind::UnexpectedEof
                ),
                _ => false,
            },
            _ => false,
        }
    }

    fn db_cache() -> &'static Mutex<HashMap<Utf8PathBuf, Arc<Database>>> {
        static CACHE: OnceLock<Mutex<HashMap<Utf8PathBuf, Arc<Database>>>> = OnceLock::new();
        CACHE.get_or_init(|| Mutex::new(HashMap::new()))
    }

    pub fn new() -> Self {
        Self
    }

    pub fn path_for_dir(dir: &Utf8Path) -> Utf8PathBuf {
        dir.join(STRIDE_REDB_FILENAME)
    }

    /// Open the store, creating it if missing. A corrupt file is
    /// quarantined and replaced with a fresh database: the store is a
    /// dedup ledger, losing it only costs re-fetching.
    fn open_or_create(&self, dir: &Utf8Path) -> Result<Arc<Database>, StorageError> {
        let path = Self::path_for_dir(dir);
        std::fs::create_dir_all(dir.as_std_path())?;

        let mut cache = Self::db_cache().lock().expect("db cache lock poisoned");
        if let Some(existing) = cache.get(&path) {
            if !path.exists() {
                cache.remove(&path);
            } else {
                return Ok(existing.clone());
            }
        }

        let db = if path.exists() {
            match Database::open(path.as_std_path()) {
                Ok(db) => db,
                Err(redb::DatabaseError::DatabaseAlreadyOpen) => {
                    return Err(StorageError::DatabaseAlreadyOpen);
                }
                Err(e) if Self::is_corrupt_open_error(&e) => {
                    quarantine_corrupt_file(&path)?;
                    Database::create(path.as_std_path())?
                }
                Err(e) => return Err(e.into()),
            }
        } else {
            Database::create(path.as_std_path())?
        };

        let db = match self.ensure_schema(&db) {
            Ok(()) => db,
            Err(StorageError::Corrupt) => {
                drop(db);
                quarantine_corrupt_file(&path)?;
                let fresh = Database::create(path.as_std_path())?;
                self.ensure_schema(&fresh)?;
                fresh
            }
            Err(e) => {
                drop(db);
                return Err(e);
            }
        };

        let db = Arc::new(db);
        cache.insert(path, db.clone());
        Ok(db)
    }

    fn open_existing(&self, dir: &Utf8Path) -> Result<Arc<Database>, StorageError> {
        let path = Self::path_for_dir(dir);
        if !path.exists() {
            return Err(StorageError::Missing);
        }
        self.open_or_create(dir)
    }

    fn ensure_schema(&self, db: &Database) -> Result<(), StorageError> {
        // Create tables and required meta keys on first open.
        let write_tx = db.begin_write()?;
        {
            let mut meta = write_tx.open_table(META)?;
            let format: Option<String> = meta.get(META_FORMAT_KEY)?.map(|g| g.value().to_string());
            if format.is_none() {
                let schema_version = CURRENT_SCHEMA.to_string();
                let created_at = Utc::now().to_rfc3339();
                meta.insert(META_FORMAT_KEY, META_FORMAT_VALUE)?;
                meta.insert(META_SCHEMA_VERSION, schema_version.as_str())?;
                meta.insert(META_CREATED_AT, created_at.as_str())?;
            } else if format.as_deref() != Some(META_FORMAT_VALUE) {
                return Err(StorageError::Corrupt);
            }
        }
        let _ = write_tx.open_table(RECORDS)?;
        write_tx.commit()?;

        // Validate schema version.
        let read_tx = db.begin_read()?;
        let meta = read_tx.open_table(META)?;
        let schema_version = meta
            .get(META_SCHEMA_VERSION)?
            .and_then(|g| g.value().parse::<u32>().ok())
            .unwrap_or(0);
        if schema_version == 0 {
            return Err(StorageError::Corrupt);
        }
        if schema_version > CURRENT_SCHEMA {
            return Err(StorageError::NewerSchema {
                found: schema_version,
                supported: CURRENT_SCHEMA,
            });
        }
        if schema_version != CURRENT_SCHEMA {
            return Err(StorageError::Corrupt);
        }
        Ok(())
    }
}

impl ActivityStore for RedbActivityStore {
    fn validate(&self, dir: &Utf8Path) -> Result<DbState, StorageError> {
        let path = Self::path_for_dir(dir);
        if !path.exists() {
            return Ok(DbState::Missing);
        }
        {
            let mut cache = Self::db_cache().lock().expect("db cache lock poisoned");
            if cache.contains_key(&path) {
                if !path.exists() {
                    cache.remove(&path);
                    return Ok(DbState::Missing);
                }
                return Ok(DbState::Valid);
            }
        }

        match Database::open(path.as_std_path()) {
            Ok(db) => match self.ensure_schema(&db) {
                Ok(()) => Ok(DbState::Valid),
                Err(StorageError::NewerSchema { found, supported }) => {
                    Ok(DbState::NewerSchema { found, supported })
                }
                Err(StorageError::DatabaseAlreadyOpen) => Ok(DbState::Busy),
                Err(StorageError::Corrupt) => Ok(DbState::Corrupt),
                Err(e) => Err(e),
            },
            Err(redb::DatabaseError::DatabaseAlreadyOpen) => Ok(DbState::Busy),
            Err(e) if Self::is_corrupt_open_error(&e) => Ok(DbState::Corrupt),
            Err(e) => Err(e.into()),
        }
    }

    fn get(
        &self,
        dir: &Utf8Path,
        id: ActivityId,
    ) -> Result<Option<ActivityRecord>, StorageError> {
        let db = match self.open_existing(dir) {
            Ok(db) => db,
            Err(StorageError::Missing) => return Ok(None),
            Err(e) => return Err(e),
        };
        let read_tx = db.begin_read()?;
        let records = read_tx.open_table(RECORDS)?;
        let Some(guard) = records.get(id)? else {
            return Ok(None);
        };
        match decode_record(guard.value()) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::warn!(activity_id = id, "undecodable activity record ({e}), treating as absent");
                Ok(None)
            }
        }
    }

    fn upsert(&self, dir: &Utf8Path, record: &ActivityRecord) -> Result<(), StorageError> {
        let db = self.open_or_create(dir)?;
        let bytes = encode_record(record)?;
        let write_tx = db.begin_write()?;
        {
            let mut records = write_tx.open_table(RECORDS)?;
            records.insert(record.activity_id, bytes.as_slice())?;
        }
        write_tx.commit()?;
        Ok(())
    }

    fn scan_all(&self, dir: &Utf8Path) -> Result<Vec<ActivityRecord>, StorageError> {
        let db = match self.open_existing(dir) {
            Ok(db) => db,
            Err(StorageError::Missing) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let read_tx = db.begin_read()?;
        let records = read_tx.open_table(RECORDS)?;

        let mut out = Vec::new();
        for row in records.iter()? {
            let (key, value) = row?;
            match decode_record(value.value()) {
                Ok(record) => out.push(record),
                Err(e) => {
                    tracing::warn!(
                        activity_id = key.value(),
                        "skipping undecodable activity record ({e})"
                    );
                }
            }
        }
        Ok(out)
    }

    fn load_checkpoint(&self, dir: &Utf8Path) -> Result<SyncCheckpoint, StorageError> {
        let db = match self.open_existing(dir) {
            Ok(db) => db,
            Err(StorageError::Missing) => return Ok(SyncCheckpoint::default()),
            Err(e) => return Err(e),
        };
        let read_tx = db.begin_read()?;
        let meta = read_tx.open_table(META)?;
        let Some(guard) = meta.get(META_CHECKPOINT)? else {
            return Ok(SyncCheckpoint::default());
        };
        match decode_checkpoint(guard.value()) {
            Ok(checkpoint) => Ok(checkpoint),
            Err(e) => {
                // An unreadable checkpoint only costs a full rescan.
                tracing::warn!("undecodable checkpoint ({e}), starting from scratch");
                Ok(SyncCheckpoint::default())
            }
        }
    }

    fn save_checkpoint(
        &self,
        dir: &Utf8Path,
        checkpoint: &SyncCheckpoint,
    ) -> Result<(), StorageError> {
        let db = self.open_or_create(dir)?;
        let encoded = encode_checkpoint(checkpoint)?;
        let write_tx = db.begin_write()?;
        {
            let mut meta = write_tx.open_table(META)?;
            meta.insert(META_CHECKPOINT, encoded.as_str())?;
            let ts = Utc::now().to_rfc3339();
            meta.insert(META_LAST_SYNC_AT, ts.as_str())?;
        }
        write_tx.commit()?;
        Ok(())
    }
}
