use std::collections::BTreeSet;

use camino::Utf8PathBuf;
use chrono::TimeZone;
use stride_core::{expected_outputs, ActivityRecord, OutputKind, SyncCheckpoint};
use stride_persistence::{ActivityStore, RedbActivityStore};

fn state_dir(dir: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
}

fn record(id: u64) -> ActivityRecord {
    ActivityRecord {
        activity_id: id,
        name: "Morning Run".into(),
        activity_type: "running".into(),
        start_time: chrono::Utc.with_ymd_and_hms(2024, 3, 1, 6, 30, 0).unwrap(),
        fingerprint: "2024-03-01 07:00:00".into(),
        expected_outputs: expected_outputs("running", &BTreeSet::new()),
        present_outputs: [OutputKind::Json].into(),
    }
}

#[test]
fn get_returns_none_for_unknown_id() {
    let dir = tempfile::tempdir().unwrap();
    let store = RedbActivityStore::new();
    assert_eq!(store.get(&state_dir(&dir), 1).unwrap(), None);
}

#[test]
fn upsert_then_get_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let store = RedbActivityStore::new();
    let rec = record(10);

    store.upsert(&state_dir(&dir), &rec).unwrap();
    assert_eq!(store.get(&state_dir(&dir), 10).unwrap(), Some(rec));
}

#[test]
fn upsert_is_idempotent_and_last_write_wins() {
    let dir = tempfile::tempdir().unwrap();
    let store = RedbActivityStore::new();
    let mut rec = record(10);

    store.upsert(&state_dir(&dir), &rec).unwrap();
    store.upsert(&state_dir(&dir), &rec).unwrap();
    assert_eq!(store.scan_all(&state_dir(&dir)).unwrap().len(), 1);

    rec.present_outputs.insert(OutputKind::Gpx);
    store.upsert(&state_dir(&dir), &rec).unwrap();
    let loaded = store.get(&state_dir(&dir), 10).unwrap().unwrap();
    assert!(loaded.present_outputs.contains(&OutputKind::Gpx));
}

#[test]
fn scan_all_returns_every_record() {
    let dir = tempfile::tempdir().unwrap();
    let store = RedbActivityStore::new();
    for id in [3, 1, 2] {
        store.upsert(&state_dir(&dir), &record(id)).unwrap();
    }
    let mut ids: Vec<u64> = store
        .scan_all(&state_dir(&dir))
        .unwrap()
        .iter()
        .map(|r| r.activity_id)
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[test]
fn checkpoint_defaults_to_empty_and_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let store = RedbActivityStore::new();
    let d = state_dir(&dir);

    assert_eq!(store.load_checkpoint(&d).unwrap(), SyncCheckpoint::default());

    let checkpoint = SyncCheckpoint {
        last_full_scan_time: Some(chrono::Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()),
        last_incremental_cursor: Some(
            chrono::Utc.with_ymd_and_hms(2024, 6, 10, 18, 0, 0).unwrap(),
        ),
    };
    store.save_checkpoint(&d, &checkpoint).unwrap();
    assert_eq!(store.load_checkpoint(&d).unwrap(), checkpoint);
}
