use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::constants::{INGESTED_AT_COLUMN, SOURCE_COLUMN};
use crate::error::PipelineError;

/// A single table cell. `Null` is distinct from an empty string.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    #[default]
    Null,
    Number(f64),
    Text(String),
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Single textual representation used for persistence.
    /// Integral floats render without a fractional part.
    pub fn render(&self) -> Option<String> {
        match self {
            Cell::Null => None,
            Cell::Text(s) => Some(s.clone()),
            Cell::Number(n) => Some(format_number(*n)),
        }
    }

    /// Coerce to text, leaving nulls untouched
    pub fn into_text(self) -> Cell {
        match self {
            Cell::Number(n) => Cell::Text(format_number(n)),
            other => other,
        }
    }

    /// Stable key used for duplicate detection. Two nulls compare equal.
    pub(crate) fn identity_key(&self, out: &mut String) {
        match self {
            Cell::Null => out.push('\u{0}'),
            Cell::Number(n) => {
                out.push('\u{1}');
                out.push_str(&n.to_bits().to_string());
            }
            Cell::Text(s) => {
                out.push('\u{2}');
                out.push_str(s);
            }
        }
        out.push('\u{1f}');
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl From<Option<String>> for Cell {
    fn from(value: Option<String>) -> Self {
        value.map(Cell::Text).unwrap_or(Cell::Null)
    }
}

pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// A flat mapping from column name to scalar value, kept in insertion order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: Vec<(String, Cell)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column, replacing any earlier value under the same name
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Cell>) {
        let column = column.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| *name == column) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Cell> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, v)| v)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn fields(&self) -> &[(String, Cell)] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// True when at least one non-lineage cell is non-null
    pub fn has_data(&self) -> bool {
        self.fields.iter().any(|(name, v)| {
            name != SOURCE_COLUMN && name != INGESTED_AT_COLUMN && !v.is_null()
        })
    }

    /// Attach the two required lineage fields
    pub fn stamp(mut self, source: &str, ingested_at: &str) -> Self {
        self.insert(SOURCE_COLUMN, source);
        self.insert(INGESTED_AT_COLUMN, ingested_at);
        self
    }
}

impl<K: Into<String>, V: Into<Cell>> FromIterator<(K, V)> for Record {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

/// Origin category of a raw artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    LiveApi,
    Scrape,
    UserTableUpload,
    Pdf,
    Docx,
    Json,
    Xlsx,
    ZipArchive,
    Xml,
    Parquet,
    Unrecognized,
}

impl SourceKind {
    /// Fixed concatenation order used by the unifier
    pub const ALL: [SourceKind; 11] = [
        SourceKind::LiveApi,
        SourceKind::Scrape,
        SourceKind::UserTableUpload,
        SourceKind::Pdf,
        SourceKind::Docx,
        SourceKind::Json,
        SourceKind::Xlsx,
        SourceKind::ZipArchive,
        SourceKind::Xml,
        SourceKind::Parquet,
        SourceKind::Unrecognized,
    ];

    /// Tag accepted at the trigger boundary
    pub fn tag(&self) -> &'static str {
        match self {
            SourceKind::LiveApi => "api",
            SourceKind::Scrape => "scraping",
            SourceKind::UserTableUpload => "upload",
            SourceKind::Pdf => "pdf",
            SourceKind::Docx => "docx",
            SourceKind::Json => "json_upload",
            SourceKind::Xlsx => "xlsx_upload",
            SourceKind::ZipArchive => "zip_upload",
            SourceKind::Xml => "xml_upload",
            SourceKind::Parquet => "parquet_upload",
            SourceKind::Unrecognized => "others_upload",
        }
    }

    /// File prefix used in the raw store
    pub fn raw_prefix(&self) -> &'static str {
        match self {
            SourceKind::LiveApi => "api_data",
            SourceKind::Scrape => "web_scrape",
            SourceKind::UserTableUpload => "user_upload",
            SourceKind::Pdf => "pdf_upload",
            SourceKind::Docx => "docx_upload",
            SourceKind::Json => "json_upload",
            SourceKind::Xlsx => "xlsx_upload",
            SourceKind::ZipArchive => "zip_upload",
            SourceKind::Xml => "xml_upload",
            SourceKind::Parquet => "parquet_upload",
            SourceKind::Unrecognized => "universal",
        }
    }

    /// Default extension for raw files of this kind
    pub fn default_extension(&self) -> &'static str {
        match self {
            SourceKind::LiveApi => "json",
            SourceKind::Scrape => "html",
            SourceKind::UserTableUpload => "csv",
            SourceKind::Pdf => "pdf",
            SourceKind::Docx => "docx",
            SourceKind::Json => "json",
            SourceKind::Xlsx => "xlsx",
            SourceKind::ZipArchive => "zip",
            SourceKind::Xml => "xml",
            SourceKind::Parquet => "parquet",
            SourceKind::Unrecognized => "bin",
        }
    }

    /// Kinds fetched over the network rather than uploaded
    pub fn is_remote(&self) -> bool {
        matches!(self, SourceKind::LiveApi | SourceKind::Scrape)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for SourceKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceKind::ALL
            .into_iter()
            .find(|k| k.tag() == s)
            .ok_or_else(|| PipelineError::InvalidInput(format!("Invalid source type: {s}")))
    }
}

/// An opaque payload plus its origin. Immutable once written.
#[derive(Debug, Clone)]
pub struct RawArtifact {
    pub kind: SourceKind,
    pub payload: Vec<u8>,
    /// Original file name, when the artifact came from an upload
    pub file_name: Option<String>,
    pub ingested_at: DateTime<Utc>,
}

impl RawArtifact {
    pub fn new(kind: SourceKind, payload: Vec<u8>, file_name: Option<String>) -> Self {
        Self {
            kind,
            payload,
            file_name,
            ingested_at: Utc::now(),
        }
    }

    /// Hex SHA-256 of the payload
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(&self.payload))
    }

    /// Lowercased extension of the original file name, if any
    pub fn extension(&self) -> Option<String> {
        self.file_name
            .as_deref()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_lowercase())
            .filter(|ext| !ext.is_empty())
    }

    /// ISO-8601 timestamp written into `ingested_at`
    pub fn ingested_at_iso(&self) -> String {
        self.ingested_at.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    pub fn display_name(&self) -> String {
        self.file_name
            .clone()
            .unwrap_or_else(|| format!("{}.{}", self.kind.raw_prefix(), self.kind.default_extension()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_insert_replaces_in_place() {
        let mut record = Record::new();
        record.insert("a", "1");
        record.insert("b", "2");
        record.insert("a", "3");
        assert_eq!(record.columns().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(record.get("a"), Some(&Cell::text("3")));
    }

    #[test]
    fn stamp_adds_lineage_last() {
        let record: Record = [("price", Cell::Number(10.0))].into_iter().collect();
        let record = record.stamp("API_Source", "2026-01-01T00:00:00Z");
        assert_eq!(
            record.columns().collect::<Vec<_>>(),
            vec!["price", "source", "ingested_at"]
        );
        assert!(record.has_data());
    }

    #[test]
    fn lineage_only_record_has_no_data() {
        let record = Record::new().stamp("API_Source", "2026-01-01T00:00:00Z");
        assert!(!record.has_data());
    }

    #[test]
    fn numbers_render_without_trailing_zero() {
        assert_eq!(Cell::Number(300000.0).render().unwrap(), "300000");
        assert_eq!(Cell::Number(25.5).render().unwrap(), "25.5");
        assert_eq!(Cell::Null.render(), None);
    }

    #[test]
    fn source_kind_tags_round_trip() {
        for kind in SourceKind::ALL {
            assert_eq!(kind.tag().parse::<SourceKind>().unwrap(), kind);
        }
        assert!("ftp".parse::<SourceKind>().is_err());
    }

    #[test]
    fn artifact_extension_is_lowercased() {
        let artifact = RawArtifact::new(SourceKind::Unrecognized, vec![], Some("Report.XLSX".into()));
        assert_eq!(artifact.extension().as_deref(), Some("xlsx"));
        let bare = RawArtifact::new(SourceKind::Unrecognized, vec![], Some("README".into()));
        assert_eq!(bare.extension(), None);
    }
}
