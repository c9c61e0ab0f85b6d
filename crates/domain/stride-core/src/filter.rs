use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};

use crate::{ActivityId, ActivitySummary, OutputKind};

/// Per-run activity filtering, fixed at startup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterConfig {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub excluded_activity_types: BTreeSet<String>,
    pub excluded_activity_ids: BTreeSet<ActivityId>,
    /// Applied at output selection, not here. `Json` is rejected at
    /// configuration time.
    pub excluded_output_kinds: BTreeSet<OutputKind>,
    pub min_activity_age: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    Include,
    /// Permanently out of scope for this configuration.
    Exclude,
    /// Too young right now; a later pass must re-evaluate it.
    Defer,
}

pub fn evaluate(
    summary: &ActivitySummary,
    config: &FilterConfig,
    now: DateTime<Utc>,
) -> FilterVerdict {
    if let Some(start) = config.start_date {
        if summary.start_time < start {
            return FilterVerdict::Exclude;
        }
    }
    if let Some(end) = config.end_date {
        if summary.start_time > end {
            return FilterVerdict::Exclude;
        }
    }
    if config.excluded_activity_types.contains(&summary.activity_type) {
        return FilterVerdict::Exclude;
    }
    if config.excluded_activity_ids.contains(&summary.id) {
        return FilterVerdict::Exclude;
    }
    if let Some(min_age) = config.min_activity_age {
        if now - summary.start_time < min_age {
            return FilterVerdict::Defer;
        }
    }
    FilterVerdict::Include
}

pub fn should_include(
    summary: &ActivitySummary,
    config: &FilterConfig,
    now: DateTime<Utc>,
) -> bool {
    evaluate(summary, config, now) == FilterVerdict::Include
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_gmt_timestamp;

    fn summary(id: ActivityId, activity_type: &str, start: &str) -> ActivitySummary {
        ActivitySummary {
            id,
            name: "a".into(),
            activity_type: activity_type.into(),
            start_time: parse_gmt_timestamp(start).unwrap(),
            fingerprint: "f".into(),
            raw: serde_json::Value::Null,
        }
    }

    fn now() -> DateTime<Utc> {
        parse_gmt_timestamp("2024-06-15 12:00:00").unwrap()
    }

    #[test]
    fn default_config_includes_everything() {
        let s = summary(1, "running", "2024-06-01 08:00:00");
        assert!(should_include(&s, &FilterConfig::default(), now()));
    }

    #[test]
    fn start_date_bound_is_inclusive() {
        let config = FilterConfig {
            start_date: parse_gmt_timestamp("2024-01-01 00:00:00"),
            ..Default::default()
        };
        let before = summary(1, "running", "2023-12-31 23:59:59");
        let at = summary(2, "running", "2024-01-01 00:00:00");
        assert_eq!(evaluate(&before, &config, now()), FilterVerdict::Exclude);
        assert_eq!(evaluate(&at, &config, now()), FilterVerdict::Include);
    }

    #[test]
    fn end_date_bound_is_inclusive() {
        let config = FilterConfig {
            end_date: parse_gmt_timestamp("2024-06-01 23:59:59"),
            ..Default::default()
        };
        let at = summary(1, "running", "2024-06-01 23:59:59");
        let after = summary(2, "running", "2024-06-02 00:00:00");
        assert_eq!(evaluate(&at, &config, now()), FilterVerdict::Include);
        assert_eq!(evaluate(&after, &config, now()), FilterVerdict::Exclude);
    }

    #[test]
    fn excluded_type_and_id_are_rejected() {
        let config = FilterConfig {
            excluded_activity_types: ["yoga".to_owned()].into(),
            excluded_activity_ids: [9].into(),
            ..Default::default()
        };
        let by_type = summary(1, "yoga", "2024-06-01 08:00:00");
        let by_id = summary(9, "running", "2024-06-01 08:00:00");
        let ok = summary(2, "running", "2024-06-01 08:00:00");
        assert_eq!(evaluate(&by_type, &config, now()), FilterVerdict::Exclude);
        assert_eq!(evaluate(&by_id, &config, now()), FilterVerdict::Exclude);
        assert_eq!(evaluate(&ok, &config, now()), FilterVerdict::Include);
    }

    #[test]
    fn young_activity_is_deferred_not_excluded() {
        let config = FilterConfig {
            min_activity_age: Some(Duration::hours(6)),
            ..Default::default()
        };
        let young = summary(1, "running", "2024-06-15 09:00:00");
        let old = summary(2, "running", "2024-06-15 05:00:00");
        assert_eq!(evaluate(&young, &config, now()), FilterVerdict::Defer);
        assert_eq!(evaluate(&old, &config, now()), FilterVerdict::Include);
    }

    #[test]
    fn min_age_boundary_is_inclusive() {
        let config = FilterConfig {
            min_activity_age: Some(Duration::hours(6)),
            ..Default::default()
        };
        let exactly = summary(1, "running", "2024-06-15 06:00:00");
        assert_eq!(evaluate(&exactly, &config, now()), FilterVerdict::Include);
    }
}
