use stride_core::filter::FilterConfig;
use stride_core::{ActivityId, OutputKind, SyncCheckpoint};

pub mod engine;
pub mod remote;
pub mod writer;

pub use engine::SyncEngine;
pub use remote::{ActivityProvider, HttpActivityProvider};
pub use writer::OutputWriter;

/// Knobs one pass runs under. The CLI builds this from `SyncConfig`; tests
/// build it directly.
#[derive(Debug, Clone)]
pub struct PassOptions {
    pub batch_size: usize,
    pub check_for_activity_changes: bool,
    pub always_recheck_all_activities: bool,
    pub filter: FilterConfig,
}

impl Default for PassOptions {
    fn default() -> Self {
        Self {
            batch_size: 30,
            check_for_activity_changes: true,
            always_recheck_all_activities: false,
            filter: FilterConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PassStats {
    pub listed: u64,
    pub excluded: u64,
    pub deferred: u64,
    pub new: u64,
    pub modified: u64,
    pub incomplete: u64,
    pub unchanged: u64,
    pub outputs_written: u64,
    pub outputs_failed: u64,
    pub bytes_written: u64,
}

#[derive(Debug, Clone)]
pub struct PassReport {
    pub stats: PassStats,
    pub full_scan: bool,
    pub checkpoint: SyncCheckpoint,
}

/// Progress feed for interactive frontends.
#[derive(Debug)]
pub enum PassEvent {
    PageFetched { start: usize, count: usize },
    OutputWritten { id: ActivityId, kind: OutputKind },
    OutputFailed { id: ActivityId, kind: OutputKind },
    ActivityProcessed { id: ActivityId },
}

/// High-level error type for one pass. Unit-level failures (one activity,
/// one output) never surface here; only pass-fatal conditions do.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("listing failed: {0}")]
    Listing(String),
    #[error("record store error: {0}")]
    Storage(#[from] stride_persistence::StorageError),
    #[error("output tree error: {0}")]
    OutputTree(String),
}
