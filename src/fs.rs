use std::path::{Path, PathBuf};

use crate::error::{StampError, StampResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Other,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub name: String,
    pub path: PathBuf,
    pub kind: EntryKind,
}

impl DirEntryInfo {
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }
}

/// Directory operations the pipeline needs from its host.
pub trait Filesystem: Send + Sync {
    /// Non-recursive listing, sorted by entry name.
    fn list_dir(&self, path: &Path) -> StampResult<Vec<DirEntryInfo>>;

    fn ensure_dir(&self, path: &Path) -> StampResult<()>;

    fn remove_dir_all(&self, path: &Path) -> StampResult<()>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LocalFs;

impl Filesystem for LocalFs {
    fn list_dir(&self, path: &Path) -> StampResult<Vec<DirEntryInfo>> {
        let rd = std::fs::read_dir(path).map_err(|e| StampError::enumeration(path, e))?;
        let mut out = Vec::new();
        for entry in rd {
            let entry = entry.map_err(|e| StampError::enumeration(path, e))?;
            // Follow symlinks so linked assets behave like the files they point at.
            let kind = match std::fs::metadata(entry.path()) {
                Ok(m) if m.is_file() => EntryKind::File,
                Ok(m) if m.is_dir() => EntryKind::Dir,
                _ => EntryKind::Other,
            };
            out.push(DirEntryInfo {
                name: entry.file_name().to_string_lossy().into_owned(),
                path: entry.path(),
                kind,
            });
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    fn ensure_dir(&self, path: &Path) -> StampResult<()> {
        use anyhow::Context as _;
        std::fs::create_dir_all(path)
            .with_context(|| format!("create directory '{}'", path.display()))?;
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> StampResult<()> {
        match std::fs::remove_dir_all(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("remove directory '{}'", path.display()))
                .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_dir_is_sorted_and_typed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.jpg"), b"b").unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"a").unwrap();
        std::fs::create_dir(dir.path().join("c")).unwrap();

        let entries = LocalFs.list_dir(dir.path()).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a.jpg", "b.jpg", "c"]);
        assert!(entries[0].is_file());
        assert!(entries[2].is_dir());
    }

    #[test]
    fn list_missing_dir_is_enumeration_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = LocalFs.list_dir(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, StampError::Enumeration { .. }));
    }

    #[test]
    fn ensure_and_remove_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("x").join("y");
        LocalFs.ensure_dir(&nested).unwrap();
        LocalFs.ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());

        LocalFs.remove_dir_all(&dir.path().join("x")).unwrap();
        LocalFs.remove_dir_all(&dir.path().join("x")).unwrap();
        assert!(!nested.exists());
    }
}
