use bytes::Bytes;

use super::{stamp_all, ExtractContext};
use crate::domain::{RawArtifact, Record};
use crate::error::Result;
use crate::pipeline::storage::parquet_io;

pub const PARQUET_TAG: &str = "Parquet_Upload";

pub fn extract(artifact: &RawArtifact, _ctx: &ExtractContext) -> Result<Vec<Record>> {
    let records = read_rows(&artifact.payload)?;
    Ok(stamp_all(records, PARQUET_TAG, artifact))
}

/// One record per row of an uploaded Parquet file
pub fn read_rows(payload: &[u8]) -> Result<Vec<Record>> {
    let table = parquet_io::table_from_bytes(Bytes::copy_from_slice(payload))?;
    Ok(table.to_records())
}
