use camino::Utf8PathBuf;
use chrono::TimeZone;
use stride_core::filename::format_output_filename;
use stride_core::OutputKind;
use stride_scanner::Scanner;

fn touch(root: &Utf8PathBuf, kind: OutputKind, id: u64, activity_type: &str, name: &str) {
    let start = chrono::Utc.with_ymd_and_hms(2024, 2, 10, 9, 0, 0).unwrap();
    let dir = root.join(kind.dir_name());
    std::fs::create_dir_all(&dir).unwrap();
    let file_name = format_output_filename(start, id, activity_type, name, kind);
    std::fs::write(dir.join(file_name), b"payload").unwrap();
}

#[test]
fn scan_round_trips_writer_filenames() {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();

    for kind in OutputKind::ALL {
        touch(&root, kind, 42, "trail_running", "Hill Repeats");
    }
    touch(&root, OutputKind::Json, 7, "indoor_cycling", "Trainer");
    touch(&root, OutputKind::Csv, 7, "indoor_cycling", "Trainer");

    let (index, stats) = Scanner::scan_output_tree(&root).unwrap();

    assert_eq!(index.activity_count(), 2);
    assert_eq!(index.kinds_for(42), OutputKind::ALL.into());
    assert_eq!(index.kinds_for(7), [OutputKind::Json, OutputKind::Csv].into());
    assert_eq!(stats.files_matched, 7);
    assert_eq!(stats.files_ignored, 0);

    let paths = index.paths_for(42);
    assert_eq!(paths.len(), 5);
    for (kind, path) in paths {
        assert!(path.as_str().contains(kind.dir_name()));
        assert!(path.exists());
    }
}

#[test]
fn foreign_and_junk_files_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();

    touch(&root, OutputKind::Gpx, 5, "running", "Run");
    let gpx_dir = root.join("gpx");
    std::fs::write(gpx_dir.join(".DS_Store"), b"").unwrap();
    std::fs::write(gpx_dir.join("scribbles.gpx"), b"not ours").unwrap();
    std::fs::write(gpx_dir.join("half-download.part"), b"").unwrap();

    let (index, stats) = Scanner::scan_output_tree(&root).unwrap();

    assert_eq!(index.kinds_for(5), [OutputKind::Gpx].into());
    assert_eq!(stats.files_matched, 1);
    assert_eq!(stats.files_ignored, 3);
}

#[test]
fn unknown_activity_has_empty_presence() {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    let (index, _) = Scanner::scan_output_tree(&root).unwrap();
    assert!(index.kinds_for(999).is_empty());
    assert!(index.paths_for(999).is_empty());
}
