pub mod sync;

// Re-export core engine components
pub use sync::{
    ActivityProvider, HttpActivityProvider, OutputWriter, PassEvent, PassOptions, PassReport,
    PassStats, SyncEngine, SyncError,
};

// Re-export scanner types often needed by consumers
pub use stride_scanner::ScanStats;
