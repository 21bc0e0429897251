// Pipeline storage: raw artifact store and the canonical processed tables

pub mod csv_mirror;
pub mod parquet_io;
pub mod raw_store;

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info};

use crate::constants::{CLEANED_TABLE_STEM, UNIFIED_TABLE_STEM};
use crate::error::{PipelineError, Result};
use crate::pipeline::processing::table::Table;

pub use parquet_io::ColumnTyping;
pub use raw_store::RawStore;

/// Marker used for null cells in previews
pub const PREVIEW_NULL: &str = "—";

/// Rows returned by [`preview`] when the caller does not say otherwise
pub const DEFAULT_PREVIEW_ROWS: usize = 100;

/// Which canonical table a path refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Canonical {
    Unified,
    Cleaned,
}

impl Canonical {
    fn stem(&self) -> &'static str {
        match self {
            Canonical::Unified => UNIFIED_TABLE_STEM,
            Canonical::Cleaned => CLEANED_TABLE_STEM,
        }
    }

    fn typing(&self) -> ColumnTyping {
        match self {
            Canonical::Unified => ColumnTyping::Text,
            Canonical::Cleaned => ColumnTyping::Inferred,
        }
    }
}

/// The canonical table files under the processed data directory. Each
/// write fully replaces the previous file.
#[derive(Debug, Clone)]
pub struct CanonicalStore {
    dir: PathBuf,
}

impl CanonicalStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn parquet_path(&self, which: Canonical) -> PathBuf {
        self.dir.join(format!("{}.parquet", which.stem()))
    }

    pub fn csv_path(&self, which: Canonical) -> PathBuf {
        self.dir.join(format!("{}.csv", which.stem()))
    }

    /// Persist the columnar file and its CSV mirror
    pub fn write(&self, which: Canonical, table: &Table) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let parquet = self.parquet_path(which);
        parquet_io::write_table(&parquet, table, which.typing())?;
        csv_mirror::write_table(&self.csv_path(which), table)?;
        info!(
            table = which.stem(),
            rows = table.row_count(),
            columns = table.column_count(),
            "Canonical table written"
        );
        Ok(parquet)
    }

    /// Read a canonical table back. A missing or unreadable file is
    /// reported as `MissingTable`.
    pub fn read(&self, which: Canonical) -> Result<Table> {
        let path = self.parquet_path(which);
        parquet_io::read_table(&path).map_err(|e| {
            debug!(path = %path.display(), error = %e, "Canonical table unreadable");
            PipelineError::MissingTable(path)
        })
    }

    /// Remove every file under the processed directory
    pub fn clear(&self) -> Result<usize> {
        clear_dir(&self.dir)
    }
}

/// Load a table for scoring from a Parquet or CSV file
pub fn load_table(path: &Path) -> Result<Table> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);
    match ext.as_deref() {
        Some("parquet") => parquet_io::read_table(path),
        Some("csv") => csv_mirror::read_table(path),
        _ => Err(PipelineError::InvalidInput(format!(
            "unsupported table file: {}",
            path.display()
        ))),
    }
}

/// Up to `limit` rows of a stored table as JSON objects, nulls shown as
/// [`PREVIEW_NULL`]
pub fn preview(path: &Path, limit: usize) -> Result<Vec<Value>> {
    let table = load_table(path)?;
    Ok(table.preview(limit, PREVIEW_NULL))
}

/// Delete the regular, non-hidden files directly under `dir`
pub(crate) fn clear_dir(dir: &Path) -> Result<usize> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if hidden || !entry.file_type()?.is_file() {
            continue;
        }
        fs::remove_file(entry.path())?;
        removed += 1;
    }
    Ok(removed)
}

/// Sibling path used while a replacement file is being written
pub(crate) fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
