use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use stride_core::filename::format_output_filename;
use stride_core::{ActivityRecord, OutputKind};

/// Writes output files into the kind-directory layout. Payloads land in a
/// `.part` file first and are renamed into place, so the tree never holds
/// a half-written output under its final name.
pub struct OutputWriter {
    root: Utf8PathBuf,
}

impl OutputWriter {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// The download root must already exist (it is typically a mounted
    /// volume); the per-kind directories are created on demand.
    pub fn ensure_layout(&self) -> std::io::Result<()> {
        if !self.root.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("download directory does not exist: {}", self.root),
            ));
        }
        for kind in OutputKind::ALL {
            std::fs::create_dir_all(self.root.join(kind.dir_name()).as_std_path())?;
        }
        Ok(())
    }

    pub fn path_for(&self, record: &ActivityRecord, kind: OutputKind) -> Utf8PathBuf {
        let file_name = format_output_filename(
            record.start_time,
            record.activity_id,
            &record.activity_type,
            &record.name,
            kind,
        );
        self.root.join(kind.dir_name()).join(file_name)
    }

    pub fn write(
        &self,
        record: &ActivityRecord,
        kind: OutputKind,
        payload: &[u8],
    ) -> std::io::Result<Utf8PathBuf> {
        let target = self.path_for(record, kind);
        let tmp = target.with_extension("part");

        {
            let mut file = std::fs::File::create(tmp.as_std_path())?;
            file.write_all(payload)?;
            file.flush()?;
        }
        std::fs::rename(tmp.as_std_path(), target.as_std_path())?;
        debug!(activity_id = record.activity_id, "wrote {target}");
        Ok(target)
    }

    pub fn remove(&self, path: &Utf8Path) -> std::io::Result<()> {
        if path.exists() {
            std::fs::remove_file(path.as_std_path())?;
        }
        Ok(())
    }
}
