use std::{
    fs::File,
    io::Write as _,
    path::{Path, PathBuf},
};

use zip::{ZipWriter, write::FileOptions};

use crate::{
    error::{StampError, StampResult},
    fs::{Filesystem, LocalFs},
};

/// Destination for archive entries.
pub trait ArchiveSink {
    fn append(&mut self, entry_name: &str, bytes: &[u8]) -> StampResult<()>;

    /// Flush the container. Entries appended before a failure stay written.
    fn finish(&mut self) -> StampResult<()>;
}

pub struct ZipSink {
    path: PathBuf,
    writer: ZipWriter<File>,
}

impl ZipSink {
    pub fn create(path: &Path) -> StampResult<Self> {
        let file = File::create(path).map_err(|e| {
            StampError::archive(format!("create archive '{}': {e}", path.display()))
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: ZipWriter::new(file),
        })
    }
}

impl ArchiveSink for ZipSink {
    fn append(&mut self, entry_name: &str, bytes: &[u8]) -> StampResult<()> {
        let err = |e: String| {
            StampError::archive(format!(
                "entry '{entry_name}' in '{}': {e}",
                self.path.display()
            ))
        };
        self.writer
            .start_file(entry_name, FileOptions::default())
            .map_err(|e| err(e.to_string()))?;
        self.writer
            .write_all(bytes)
            .map_err(|e| err(e.to_string()))
    }

    fn finish(&mut self) -> StampResult<()> {
        self.writer
            .finish()
            .map(|_| ())
            .map_err(|e| StampError::archive(format!("finish '{}': {e}", self.path.display())))
    }
}

/// Pack the composites in `dir` into a zip at `archive_path`.
///
/// Returns the number of entries written.
pub fn archive_dir(dir: &Path, archive_path: &Path) -> StampResult<usize> {
    let mut sink = ZipSink::create(archive_path)?;
    archive_dir_into(&LocalFs, dir, &mut sink)
}

/// Append every file of `dir` to `sink`.
///
/// Top-level files are named by base name. Files inside a direct
/// subdirectory are named `<subdir>/<file>`; deeper levels are ignored.
/// The first failure stops the walk and is returned.
pub fn archive_dir_into(
    fs: &dyn Filesystem,
    dir: &Path,
    sink: &mut dyn ArchiveSink,
) -> StampResult<usize> {
    let entries = collect_entries(fs, dir)?;

    let mut written = 0usize;
    for (name, path) in &entries {
        let bytes = std::fs::read(path).map_err(|e| {
            StampError::archive(format!("read '{}': {e}", path.display()))
        })?;
        sink.append(name, &bytes)?;
        written += 1;
    }
    sink.finish()?;

    tracing::debug!(dir = %dir.display(), entries = written, "archived working directory");
    Ok(written)
}

fn collect_entries(fs: &dyn Filesystem, dir: &Path) -> StampResult<Vec<(String, PathBuf)>> {
    let mut out = Vec::new();
    for entry in fs.list_dir(dir)? {
        if entry.is_file() {
            out.push((entry.name, entry.path));
        } else if entry.is_dir() {
            for inner in fs.list_dir(&entry.path)? {
                if inner.is_file() {
                    out.push((format!("{}/{}", entry.name, inner.name), inner.path));
                }
            }
        }
    }
    Ok(out)
}
