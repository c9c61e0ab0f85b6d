//! Canonical output filename format. The writer and the output-tree
//! scanner must agree on this byte-for-byte, so both live here.

use chrono::{DateTime, Utc};

use crate::{ActivityId, OutputKind};

const ACTIVITY_MARKER: &str = "activity";
const MAX_NAME_COMPONENT: usize = 50;

/// `{start}_activity_{id}_{type}_{sanitized-name}.{ext}`
pub fn format_output_filename(
    start_time: DateTime<Utc>,
    id: ActivityId,
    activity_type: &str,
    name: &str,
    kind: OutputKind,
) -> String {
    format!(
        "{}_{}_{}_{}_{}.{}",
        start_time.format("%Y-%m-%d-%H-%M-%S"),
        ACTIVITY_MARKER,
        id,
        activity_type,
        sanitize_component(name),
        kind.extension(),
    )
}

/// Extract the activity id from a filename produced by
/// [`format_output_filename`]. The extension must match `kind`.
pub fn parse_output_filename(file_name: &str, kind: OutputKind) -> anyhow::Result<ActivityId> {
    let stem = file_name
        .strip_suffix(&format!(".{}", kind.extension()))
        .ok_or_else(|| anyhow::anyhow!("{file_name}: extension does not match {kind}"))?;

    let parts: Vec<&str> = stem.split('_').collect();
    if parts.len() < 3 || parts[1] != ACTIVITY_MARKER {
        anyhow::bail!("{file_name}: missing activity marker");
    }

    parts[2]
        .parse::<ActivityId>()
        .map_err(|_| anyhow::anyhow!("{file_name}: activity id {:?} is not numeric", parts[2]))
}

/// Keep alphanumerics, dashes and underscores; spaces become underscores;
/// everything else is dropped. Bounded length, never empty.
pub fn sanitize_component(name: &str) -> String {
    let replaced = name.replace(['/', '\\'], "_");
    let kept: String = replaced
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let sanitized: String = kept.trim().replace(' ', "_").chars().take(MAX_NAME_COMPONENT).collect();

    if sanitized.is_empty() {
        "unnamed".to_owned()
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_gmt_timestamp;

    #[test]
    fn format_matches_layout() {
        let name = format_output_filename(
            parse_gmt_timestamp("2024-03-01 06:30:05").unwrap(),
            12345,
            "trail_running",
            "Hill Repeats!",
            OutputKind::Gpx,
        );
        assert_eq!(name, "2024-03-01-06-30-05_activity_12345_trail_running_Hill_Repeats.gpx");
    }

    #[test]
    fn parse_round_trips() {
        for kind in OutputKind::ALL {
            let name = format_output_filename(
                parse_gmt_timestamp("2024-03-01 06:30:05").unwrap(),
                987,
                "cycling",
                "Commute",
                kind,
            );
            assert_eq!(parse_output_filename(&name, kind).unwrap(), 987);
        }
    }

    #[test]
    fn parse_rejects_wrong_extension() {
        assert!(parse_output_filename(
            "2024-03-01-06-30-05_activity_987_cycling_Commute.gpx",
            OutputKind::Tcx
        )
        .is_err());
    }

    #[test]
    fn parse_rejects_foreign_files() {
        assert!(parse_output_filename("notes.csv", OutputKind::Csv).is_err());
        assert!(parse_output_filename("2024_activity_abc_x_y.csv", OutputKind::Csv).is_err());
    }

    #[test]
    fn sanitize_strips_and_bounds() {
        assert_eq!(sanitize_component("Morning Run"), "Morning_Run");
        assert_eq!(sanitize_component("a/b\\c"), "a_b_c");
        assert_eq!(sanitize_component("Côte d'Azur"), "Côte_dAzur");
        assert_eq!(sanitize_component("  "), "unnamed");
        assert_eq!(sanitize_component(""), "unnamed");
        let long = "x".repeat(80);
        assert_eq!(sanitize_component(&long).len(), 50);
    }
}
