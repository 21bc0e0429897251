use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::clear_dir;
use crate::domain::{RawArtifact, SourceKind};
use crate::error::Result;

/// Directory of raw artifacts, one file per ingest call, named
/// `<prefix>_<YYYYMMDD_HHMMSS>.<ext>`
#[derive(Debug, Clone)]
pub struct RawStore {
    dir: PathBuf,
}

impl RawStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write an artifact and return its path. Artifacts are never
    /// overwritten; a same-second name collision gets a numeric suffix.
    pub fn save(&self, artifact: &RawArtifact) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let stamp = artifact.ingested_at.format("%Y%m%d_%H%M%S");
        let prefix = artifact.kind.raw_prefix();
        let ext = artifact
            .extension()
            .unwrap_or_else(|| artifact.kind.default_extension().to_string());

        let mut path = self.dir.join(format!("{prefix}_{stamp}.{ext}"));
        let mut n = 1;
        while path.exists() {
            path = self.dir.join(format!("{prefix}_{stamp}_{n}.{ext}"));
            n += 1;
        }
        fs::write(&path, &artifact.payload)?;
        info!(path = %path.display(), digest = %artifact.digest(), "Raw artifact archived");
        Ok(path)
    }

    /// The most recently written artifact of `kind`, by modification time
    pub fn latest(&self, kind: SourceKind) -> Result<Option<RawArtifact>> {
        let prefix = format!("{}_", kind.raw_prefix());
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut newest: Option<(SystemTime, PathBuf)> = None;
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(&prefix) || !entry.file_type()?.is_file() {
                continue;
            }
            let modified = entry.metadata()?.modified()?;
            if newest.as_ref().map_or(true, |(t, _)| modified >= *t) {
                newest = Some((modified, entry.path()));
            }
        }

        let Some((modified, path)) = newest else {
            debug!(kind = %kind, "No raw artifact stored");
            return Ok(None);
        };
        let payload = fs::read(&path)?;
        let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned());
        Ok(Some(RawArtifact {
            kind,
            payload,
            file_name,
            ingested_at: DateTime::<Utc>::from(modified),
        }))
    }

    /// Delete every non-hidden raw file
    pub fn purge(&self) -> Result<usize> {
        let removed = clear_dir(&self.dir)?;
        info!(removed, dir = %self.dir.display(), "Raw store purged");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn save_names_by_prefix_and_keeps_extension() {
        let dir = TempDir::new().unwrap();
        let store = RawStore::new(dir.path());
        let artifact = RawArtifact::new(SourceKind::Unrecognized, b"a: b".to_vec(), Some("notes.TXT".into()));
        let path = store.save(&artifact).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("universal_"));
        assert!(name.ends_with(".txt"));
    }

    #[test]
    fn same_second_saves_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let store = RawStore::new(dir.path());
        let artifact = RawArtifact::new(SourceKind::Json, b"[]".to_vec(), None);
        let first = store.save(&artifact).unwrap();
        let second = store.save(&artifact).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn latest_reads_back_payload() {
        let dir = TempDir::new().unwrap();
        let store = RawStore::new(dir.path());
        assert!(store.latest(SourceKind::Xml).unwrap().is_none());
        store
            .save(&RawArtifact::new(SourceKind::Xml, b"<r/>".to_vec(), None))
            .unwrap();
        let loaded = store.latest(SourceKind::Xml).unwrap().unwrap();
        assert_eq!(loaded.payload, b"<r/>");
        assert_eq!(loaded.kind, SourceKind::Xml);
        assert!(store.latest(SourceKind::Json).unwrap().is_none());
    }

    #[test]
    fn purge_empties_store() {
        let dir = TempDir::new().unwrap();
        let store = RawStore::new(dir.path().join("raw"));
        assert_eq!(store.purge().unwrap(), 0);
        store
            .save(&RawArtifact::new(SourceKind::Pdf, b"%PDF".to_vec(), None))
            .unwrap();
        assert_eq!(store.purge().unwrap(), 1);
        assert!(store.latest(SourceKind::Pdf).unwrap().is_none());
    }
}
