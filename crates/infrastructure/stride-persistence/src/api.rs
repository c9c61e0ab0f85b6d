use camino::Utf8Path;

use stride_core::{ActivityId, ActivityRecord, SyncCheckpoint};

pub const STRIDE_REDB_FILENAME: &str = "stride.redb";
pub const CURRENT_SCHEMA: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbState {
    Missing,
    Valid,
    Busy,
    Corrupt,
    NewerSchema { found: u32, supported: u32 },
}

/// Durable home of activity records and the pass checkpoint.
///
/// `dir` is the state directory; the store file lives inside it. Exactly
/// one pass is ever active against a store at a time; the trait only needs
/// to be safe for that degenerate form of sharing.
pub trait ActivityStore: Send + Sync {
    fn validate(&self, dir: &Utf8Path) -> Result<DbState, crate::StorageError>;

    /// A record that exists but cannot be decoded is reported as absent so
    /// the activity is re-fetched rather than failing the pass.
    fn get(
        &self,
        dir: &Utf8Path,
        id: ActivityId,
    ) -> Result<Option<ActivityRecord>, crate::StorageError>;

    /// Idempotent: writing the same record twice stores the same bytes.
    fn upsert(&self, dir: &Utf8Path, record: &ActivityRecord) -> Result<(), crate::StorageError>;

    /// All decodable records, order unspecified.
    fn scan_all(&self, dir: &Utf8Path) -> Result<Vec<ActivityRecord>, crate::StorageError>;

    /// Empty checkpoint when none has ever been saved.
    fn load_checkpoint(&self, dir: &Utf8Path) -> Result<SyncCheckpoint, crate::StorageError>;

    fn save_checkpoint(
        &self,
        dir: &Utf8Path,
        checkpoint: &SyncCheckpoint,
    ) -> Result<(), crate::StorageError>;
}
