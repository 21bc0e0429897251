use csv::ReaderBuilder;

use super::{decode_text, normalize_headers, stamp_all, ExtractContext};
use crate::domain::{Cell, RawArtifact, Record};
use crate::error::Result;

pub const UPLOAD_TAG: &str = "User_Upload";

pub fn extract_upload(artifact: &RawArtifact, _ctx: &ExtractContext) -> Result<Vec<Record>> {
    let records = read_table(&artifact.payload, b',')?;
    Ok(stamp_all(records, UPLOAD_TAG, artifact))
}

/// Parse delimited text whose first row is the header. Invalid UTF-8 is
/// replaced, ragged rows are tolerated, and empty fields become null.
pub fn read_table(payload: &[u8], delimiter: u8) -> Result<Vec<Record>> {
    let text = decode_text(payload);
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .has_headers(true)
        .from_reader(text.as_bytes());

    let headers = normalize_headers(reader.headers()?.iter());

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let record: Record = headers
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let cell = match row.get(i).map(str::trim) {
                    Some(value) if !value.is_empty() => Cell::text(value),
                    _ => Cell::Null,
                };
                (name.clone(), cell)
            })
            .collect();
        records.push(record);
    }
    Ok(records)
}
