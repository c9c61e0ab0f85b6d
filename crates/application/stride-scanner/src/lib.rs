use std::collections::{BTreeMap, BTreeSet, HashMap};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use stride_core::filename::parse_output_filename;
use stride_core::{ActivityId, OutputKind};

#[derive(Debug, thiserror::Error)]
pub enum ScannerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("non-utf8 path under output tree: {0}")]
    NonUtf8(String),
}

#[derive(Debug, Clone, Default)]
pub struct ScanStats {
    pub files_seen: u64,
    pub files_matched: u64,
    pub files_ignored: u64,
}

/// Which output files actually exist on disk, by activity, with their
/// real paths. Filenames embed mutable metadata (name, type), so deletes
/// must go through the scanned path, not a recomputed one.
#[derive(Debug, Clone, Default)]
pub struct PresenceIndex {
    entries: HashMap<ActivityId, BTreeMap<OutputKind, Utf8PathBuf>>,
}

impl PresenceIndex {
    pub fn kinds_for(&self, id: ActivityId) -> BTreeSet<OutputKind> {
        self.entries
            .get(&id)
            .map(|kinds| kinds.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn paths_for(&self, id: ActivityId) -> Vec<(OutputKind, Utf8PathBuf)> {
        self.entries
            .get(&id)
            .map(|kinds| kinds.iter().map(|(k, p)| (*k, p.clone())).collect())
            .unwrap_or_default()
    }

    pub fn activity_count(&self) -> usize {
        self.entries.len()
    }

    fn insert(&mut self, id: ActivityId, kind: OutputKind, path: Utf8PathBuf) {
        self.entries.entry(id).or_default().insert(kind, path);
    }
}

const IGNORED_FILENAMES: &[&str] = &[".DS_Store", "Thumbs.db", ".gitkeep", ".gitignore"];
const IGNORED_EXTENSIONS: &[&str] = &["tmp", "temp", "swp", "bak", "part"];

fn should_ignore(path: &Utf8Path) -> bool {
    if path
        .file_name()
        .is_some_and(|name| IGNORED_FILENAMES.contains(&name))
    {
        return true;
    }
    path.extension()
        .map(|ext| ext.to_ascii_lowercase())
        .is_some_and(|ext| IGNORED_EXTENSIONS.contains(&ext.as_str()))
}

pub struct Scanner;

impl Scanner {
    /// Walk the kind directories under `root` and index every file whose
    /// name parses as a canonical output filename. Foreign files are the
    /// user's business: counted, warned about once each, never fatal.
    pub fn scan_output_tree(root: &Utf8Path) -> Result<(PresenceIndex, ScanStats), ScannerError> {
        let mut index = PresenceIndex::default();
        let mut stats = ScanStats::default();

        for kind in OutputKind::ALL {
            let dir = root.join(kind.dir_name());
            if !dir.exists() {
                continue;
            }

            for entry in WalkDir::new(&dir).min_depth(1) {
                let entry = entry?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let path = Utf8PathBuf::from_path_buf(entry.into_path())
                    .map_err(|p| ScannerError::NonUtf8(p.display().to_string()))?;

                stats.files_seen += 1;
                if should_ignore(&path) {
                    stats.files_ignored += 1;
                    continue;
                }

                let Some(file_name) = path.file_name() else {
                    continue;
                };
                match parse_output_filename(file_name, kind) {
                    Ok(id) => {
                        index.insert(id, kind, path);
                        stats.files_matched += 1;
                    }
                    Err(e) => {
                        warn!("unrecognized file in {}: {e}", kind.dir_name());
                        stats.files_ignored += 1;
                    }
                }
            }
        }

        debug!(
            activities = index.activity_count(),
            matched = stats.files_matched,
            ignored = stats.files_ignored,
            "output tree scan complete"
        );
        Ok((index, stats))
    }
}
