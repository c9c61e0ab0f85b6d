use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod classify;
pub mod filename;
pub mod filter;

pub type ActivityId = u64;

/// Activity type tags the remote service reports for indoor activities.
/// Anything not listed here is treated as outdoor and gets GPS outputs.
pub const INDOOR_ACTIVITY_TYPES: &[&str] = &[
    "indoor_cycling",
    "indoor_cardio",
    "indoor_rowing",
    "indoor_running",
    "treadmill_running",
    "strength_training",
    "fitness_equipment",
    "yoga",
    "pilates",
    "breathwork",
];

pub fn is_outdoor(activity_type: &str) -> bool {
    !INDOOR_ACTIVITY_TYPES.contains(&activity_type)
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    #[serde(rename = "activity_json")]
    Json,
    Gpx,
    Tcx,
    Kml,
    Csv,
}

impl OutputKind {
    pub const ALL: [OutputKind; 5] = [
        OutputKind::Json,
        OutputKind::Gpx,
        OutputKind::Tcx,
        OutputKind::Kml,
        OutputKind::Csv,
    ];

    /// Directory name under the download root.
    pub fn dir_name(self) -> &'static str {
        match self {
            OutputKind::Json => "activity_json",
            OutputKind::Gpx => "gpx",
            OutputKind::Tcx => "tcx",
            OutputKind::Kml => "kml",
            OutputKind::Csv => "csv",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputKind::Json => "json",
            OutputKind::Gpx => "gpx",
            OutputKind::Tcx => "tcx",
            OutputKind::Kml => "kml",
            OutputKind::Csv => "csv",
        }
    }

    pub fn from_dir_name(name: &str) -> Option<OutputKind> {
        OutputKind::ALL.into_iter().find(|k| k.dir_name() == name)
    }

    /// Kinds fetched from the remote export endpoint. `Json` is written
    /// from the listing payload and never costs a detail call.
    pub fn is_export(self) -> bool {
        !matches!(self, OutputKind::Json)
    }
}

impl std::fmt::Display for OutputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// One entry of a remote listing page.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivitySummary {
    pub id: ActivityId,
    pub name: String,
    pub activity_type: String,
    pub start_time: DateTime<Utc>,
    /// Opaque modification marker; compared only for equality.
    pub fingerprint: String,
    pub raw: serde_json::Value,
}

impl ActivitySummary {
    pub fn from_api_response(raw: serde_json::Value) -> anyhow::Result<ActivitySummary> {
        let id = raw
            .get("activityId")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| anyhow::anyhow!("listing entry missing activityId: {raw}"))?;
        let name = raw
            .get("activityName")
            .and_then(|v| v.as_str())
            .unwrap_or("unnamed")
            .to_owned();
        let activity_type = raw
            .get("activityType")
            .and_then(|v| v.get("typeKey"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("activity {id} missing activityType.typeKey"))?
            .to_owned();
        let start_raw = raw
            .get("startTimeGMT")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("activity {id} missing startTimeGMT"))?;
        let start_time = parse_gmt_timestamp(start_raw)
            .ok_or_else(|| anyhow::anyhow!("activity {id} has bad startTimeGMT {start_raw:?}"))?;
        let fingerprint = raw
            .get("lastUpdateTimeGMT")
            .and_then(|v| v.as_str())
            .unwrap_or(start_raw)
            .to_owned();

        Ok(ActivitySummary {
            id,
            name,
            activity_type,
            start_time,
            fingerprint,
            raw,
        })
    }

    /// Bytes for the `Json` output kind: pretty-printed with sorted keys
    /// (serde_json maps are ordered), so rewrites are byte-stable.
    pub fn dump(&self) -> Vec<u8> {
        let mut bytes = serde_json::to_vec_pretty(&self.raw).unwrap_or_default();
        bytes.push(b'\n');
        bytes
    }
}

pub fn parse_gmt_timestamp(s: &str) -> Option<DateTime<Utc>> {
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Expected output set for an activity: JSON + CSV + KML always, GPX + TCX
/// only for outdoor activities, minus kinds the configuration excludes.
pub fn expected_outputs(
    activity_type: &str,
    excluded: &BTreeSet<OutputKind>,
) -> BTreeSet<OutputKind> {
    let mut kinds: BTreeSet<OutputKind> =
        [OutputKind::Json, OutputKind::Csv, OutputKind::Kml].into();
    if is_outdoor(activity_type) {
        kinds.insert(OutputKind::Gpx);
        kinds.insert(OutputKind::Tcx);
    }
    kinds.retain(|k| !excluded.contains(k));
    kinds
}

/// Durable per-activity state: what the last seen remote version looked
/// like and which outputs have been confirmed written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub activity_id: ActivityId,
    pub name: String,
    pub activity_type: String,
    pub start_time: DateTime<Utc>,
    pub fingerprint: String,
    pub expected_outputs: BTreeSet<OutputKind>,
    pub present_outputs: BTreeSet<OutputKind>,
}

impl ActivityRecord {
    pub fn from_summary(
        summary: &ActivitySummary,
        expected: BTreeSet<OutputKind>,
    ) -> ActivityRecord {
        ActivityRecord {
            activity_id: summary.id,
            name: summary.name.clone(),
            activity_type: summary.activity_type.clone(),
            start_time: summary.start_time,
            fingerprint: summary.fingerprint.clone(),
            expected_outputs: expected,
            present_outputs: BTreeSet::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.present_outputs == self.expected_outputs
    }

    pub fn missing_outputs(&self) -> BTreeSet<OutputKind> {
        self.expected_outputs
            .difference(&self.present_outputs)
            .copied()
            .collect()
    }
}

/// Persisted pass watermarks. Written only after a pass finishes without a
/// fatal error; a pass that aborts leaves the previous values in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncCheckpoint {
    pub last_full_scan_time: Option<DateTime<Utc>>,
    pub last_incremental_cursor: Option<DateTime<Utc>>,
}
