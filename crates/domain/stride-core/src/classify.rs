use std::collections::BTreeSet;

use crate::{ActivityRecord, ActivitySummary, OutputKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeDetection {
    /// Compare the stored fingerprint against the remote one.
    Fingerprint,
    /// Skip fingerprint comparison; only missing files are detected.
    PresenceOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    New,
    Unchanged,
    Modified,
    Incomplete { missing: BTreeSet<OutputKind> },
}

/// Decide what, if anything, must be fetched for one remote activity.
///
/// `on_disk` is the set of output kinds actually found in the output tree;
/// presence is the intersection of the record's ledger with it, so a file
/// deleted behind our back downgrades a complete record to `Incomplete`.
pub fn classify(
    summary: &ActivitySummary,
    expected: &BTreeSet<OutputKind>,
    stored: Option<&ActivityRecord>,
    on_disk: &BTreeSet<OutputKind>,
    detection: ChangeDetection,
) -> Classification {
    let Some(record) = stored else {
        return Classification::New;
    };

    if detection == ChangeDetection::Fingerprint && record.fingerprint != summary.fingerprint {
        return Classification::Modified;
    }

    let present: BTreeSet<OutputKind> = record
        .present_outputs
        .intersection(on_disk)
        .copied()
        .collect();

    let missing: BTreeSet<OutputKind> = expected.difference(&present).copied().collect();
    if !missing.is_empty() {
        return Classification::Incomplete { missing };
    }

    Classification::Unchanged
}
