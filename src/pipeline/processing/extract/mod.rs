// Record extraction: one routine per source kind, all producing flat
// records stamped with `source` and `ingested_at`.

pub mod archive;
pub mod columnar;
pub mod delimited;
pub mod docx;
pub mod flatten;
pub mod html;
pub mod json;
pub mod pdf;
pub mod sensor;
pub mod spreadsheet;
pub mod text;
pub mod xml;

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::config::HttpSettings;
use crate::domain::{RawArtifact, Record, SourceKind};
use crate::error::Result;
use crate::metrics;

/// Extraction routine signature. Routines may fail; [`extract`] absorbs it.
pub type ExtractFn = fn(&RawArtifact, &ExtractContext) -> Result<Vec<Record>>;

/// Per-run knobs that shape extraction
#[derive(Debug, Clone)]
pub struct ExtractContext {
    /// Inclusive date window applied to live API records
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    /// Records kept from an API response when no window is given
    pub api_record_limit: usize,
    /// Records kept from a scraped page
    pub html_record_limit: usize,
}

impl Default for ExtractContext {
    fn default() -> Self {
        Self::from_http(&HttpSettings::default())
    }
}

impl ExtractContext {
    pub fn from_http(http: &HttpSettings) -> Self {
        Self {
            start: None,
            end: None,
            api_record_limit: http.api_record_limit,
            html_record_limit: http.html_record_limit,
        }
    }

    pub fn with_window(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.start = start;
        self.end = end;
        self
    }
}

impl SourceKind {
    /// The extraction routine bound to this kind
    pub fn extractor(&self) -> ExtractFn {
        match self {
            SourceKind::LiveApi => json::extract_api,
            SourceKind::Scrape => html::extract,
            SourceKind::UserTableUpload => delimited::extract_upload,
            SourceKind::Pdf => pdf::extract,
            SourceKind::Docx => docx::extract,
            SourceKind::Json => json::extract_upload,
            SourceKind::Xlsx => spreadsheet::extract,
            SourceKind::ZipArchive => archive::extract,
            SourceKind::Xml => xml::extract,
            SourceKind::Parquet => columnar::extract,
            SourceKind::Unrecognized => sensor::extract_sensed,
        }
    }
}

/// Run the routine for `artifact.kind`. Never fails: a parse error is
/// logged and yields an empty sequence so other sources still unify.
pub fn extract(artifact: &RawArtifact, ctx: &ExtractContext) -> Vec<Record> {
    let kind = artifact.kind;
    match (kind.extractor())(artifact, ctx) {
        Ok(records) => {
            debug!(
                kind = %kind,
                artifact = %artifact.display_name(),
                records = records.len(),
                "Extracted records"
            );
            metrics::extract::records(kind.tag(), records.len());
            records
        }
        Err(e) => {
            warn!(
                kind = %kind,
                artifact = %artifact.display_name(),
                error = %e,
                "Extraction failed; continuing with no records for this source"
            );
            metrics::extract::failure(kind.tag());
            Vec::new()
        }
    }
}

/// Attach lineage fields to every record, all sharing one timestamp
pub(crate) fn stamp_all(records: Vec<Record>, source: &str, artifact: &RawArtifact) -> Vec<Record> {
    let ingested_at = artifact.ingested_at_iso();
    records
        .into_iter()
        .map(|r| r.stamp(source, &ingested_at))
        .collect()
}

/// Lossy UTF-8 decode with any leading byte-order mark removed
pub(crate) fn decode_text(payload: &[u8]) -> String {
    let text = String::from_utf8_lossy(payload);
    text.strip_prefix('\u{feff}').unwrap_or(&text).to_string()
}

/// Header name with `Col_<i>` fallback for blanks and `.n` suffixes for repeats
pub(crate) fn normalize_headers<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut headers: Vec<String> = Vec::new();
    for (i, name) in raw.into_iter().enumerate() {
        let trimmed = name.as_ref().trim();
        let base = if trimmed.is_empty() {
            format!("Col_{i}")
        } else {
            trimmed.to_string()
        };
        let mut candidate = base.clone();
        let mut n = 1;
        while headers.contains(&candidate) {
            candidate = format!("{base}.{n}");
            n += 1;
        }
        headers.push(candidate);
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Cell;

    #[test]
    fn failing_routine_yields_empty_sequence() {
        let artifact = RawArtifact::new(SourceKind::Json, b"{not json".to_vec(), None);
        assert!(extract(&artifact, &ExtractContext::default()).is_empty());
    }

    #[test]
    fn every_record_carries_lineage() {
        let artifact = RawArtifact::new(
            SourceKind::Json,
            br#"[{"a": 1}, {"b": "x"}]"#.to_vec(),
            Some("rows.json".into()),
        );
        let records = extract(&artifact, &ExtractContext::default());
        assert_eq!(records.len(), 2);
        for record in &records {
            assert_eq!(record.get("source"), Some(&Cell::text("JSON_Upload")));
            assert!(matches!(record.get("ingested_at"), Some(Cell::Text(_))));
        }
    }

    #[test]
    fn headers_fall_back_and_deduplicate() {
        let headers = normalize_headers(["id", "", "id", " name "]);
        assert_eq!(headers, vec!["id", "Col_1", "id.1", "name"]);
    }

    #[test]
    fn decode_strips_bom() {
        assert_eq!(decode_text("\u{feff}a,b".as_bytes()), "a,b");
    }
}
