//! Format sensing for artifacts whose upload category says nothing about
//! their shape. Rules run in a fixed priority order and the first match
//! wins; there is no scoring or voting between them.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

use super::{columnar, decode_text, delimited, json, spreadsheet, stamp_all, text, ExtractContext};
use crate::domain::{RawArtifact, Record};
use crate::error::Result;

/// Bytes inspected by the delimiter and key-value heuristics
pub const SAMPLE_BYTES: usize = 2048;

/// A delimiter must occur more often than this to mark a table
const DELIMITER_THRESHOLD: usize = 10;

/// Candidate delimiters in priority order
const DELIMITERS: [u8; 4] = [b',', b';', b'|', b'\t'];

/// Distinct labels needed before a sample counts as key-value text
const MIN_KV_LABELS: usize = 3;

pub(crate) static KV_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([\w\s_-]+)[:=](.*)$").expect("valid key-value regex"));

pub const TABLE_TAG: &str = "Universal_Heuristic";
pub const KV_TAG: &str = "Universal_Heuristic_KV";
pub const TEXT_TAG: &str = "Universal_Heuristic_Text";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensedFormat {
    BinaryExcel,
    BinaryParquet,
    Json,
    DelimitedTable { delimiter: u8 },
    KeyValueText,
    UnstructuredText,
}

impl fmt::Display for SensedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensedFormat::BinaryExcel => f.write_str("binary-excel"),
            SensedFormat::BinaryParquet => f.write_str("binary-parquet"),
            SensedFormat::Json => f.write_str("json"),
            SensedFormat::DelimitedTable { delimiter } => {
                write!(f, "delimited-table ({:?})", *delimiter as char)
            }
            SensedFormat::KeyValueText => f.write_str("key-value-text"),
            SensedFormat::UnstructuredText => f.write_str("unstructured-text"),
        }
    }
}

/// Classify a payload from its file name (if any) and leading bytes
pub fn sense(file_name: Option<&str>, payload: &[u8]) -> SensedFormat {
    if let Some(format) = file_name.and_then(sense_extension) {
        return format;
    }

    let sample = sample_text(payload);

    if let Some(delimiter) = DELIMITERS
        .into_iter()
        .find(|d| sample.bytes().filter(|b| b == d).count() > DELIMITER_THRESHOLD)
    {
        return SensedFormat::DelimitedTable { delimiter };
    }

    if key_value_pairs(&sample).len() >= MIN_KV_LABELS {
        return SensedFormat::KeyValueText;
    }

    SensedFormat::UnstructuredText
}

fn sense_extension(file_name: &str) -> Option<SensedFormat> {
    let (_, ext) = file_name.rsplit_once('.')?;
    match ext.to_lowercase().as_str() {
        "xlsx" | "xls" | "xlsm" => Some(SensedFormat::BinaryExcel),
        "parquet" => Some(SensedFormat::BinaryParquet),
        "json" => Some(SensedFormat::Json),
        _ => None,
    }
}

fn sample_text(payload: &[u8]) -> String {
    let end = payload.len().min(SAMPLE_BYTES);
    decode_text(&payload[..end])
}

/// `label: value` / `label=value` pairs in line order, labels normalized
/// to lowercase with spaces replaced by underscores. Later repeats of a
/// label overwrite the earlier value in place.
pub fn key_value_pairs(sample: &str) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = Vec::new();
    for line in sample.lines() {
        let Some(caps) = KV_LINE.captures(line.trim()) else {
            continue;
        };
        let key = caps[1].trim().to_lowercase().replace(' ', "_");
        let value = caps[2].trim().to_string();
        match pairs.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => pairs.push((key, value)),
        }
    }
    pairs
}

/// Extraction routine for unrecognized uploads
pub fn extract_sensed(artifact: &RawArtifact, _ctx: &ExtractContext) -> Result<Vec<Record>> {
    let format = sense(artifact.file_name.as_deref(), &artifact.payload);
    info!(artifact = %artifact.display_name(), format = %format, "Sensed upload format");

    let filename = artifact.display_name();
    match format {
        SensedFormat::BinaryExcel => Ok(stamp_all(
            spreadsheet::read_first_sheet(&artifact.payload)?,
            TABLE_TAG,
            artifact,
        )),
        SensedFormat::BinaryParquet => Ok(stamp_all(
            columnar::read_rows(&artifact.payload)?,
            TABLE_TAG,
            artifact,
        )),
        SensedFormat::Json => Ok(stamp_all(
            json::records_from_payload(&artifact.payload, &json::UPLOAD_RECORD_KEYS)?,
            TABLE_TAG,
            artifact,
        )),
        SensedFormat::DelimitedTable { delimiter } => Ok(stamp_all(
            delimited::read_table(&artifact.payload, delimiter)?,
            TABLE_TAG,
            artifact,
        )),
        SensedFormat::KeyValueText => {
            let pairs = key_value_pairs(&sample_text(&artifact.payload));
            let mut record: Record = pairs.into_iter().collect();
            record.insert("sensed_format", "Key-Value Pairs");
            record.insert("filename", filename);
            Ok(stamp_all(vec![record], KV_TAG, artifact))
        }
        SensedFormat::UnstructuredText => Ok(stamp_all(
            text::blocks_to_records(&decode_text(&artifact.payload), &filename),
            TEXT_TAG,
            artifact,
        )),
    }
}
