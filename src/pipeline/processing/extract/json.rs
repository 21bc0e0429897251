use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde_json::Value;
use tracing::{debug, info};

use super::flatten::record_from_value;
use super::{decode_text, stamp_all, ExtractContext};
use crate::pipeline::processing::temporal::parse_timestamp;
use crate::domain::{RawArtifact, Record};
use crate::error::Result;

pub const API_TAG: &str = "API_Source";
pub const UPLOAD_TAG: &str = "JSON_Upload";

/// Members that commonly wrap the record list in uploaded JSON documents
pub const UPLOAD_RECORD_KEYS: [&str; 6] = ["data", "properties", "results", "items", "records", "features"];

/// Members checked on an API response before treating it as one record
pub const API_RECORD_KEYS: [&str; 2] = ["data", "works"];

/// Field name fragments used to find the date of an API record
const DATE_FIELD_TOKENS: [&str; 3] = ["date", "time", "created"];

pub fn extract_upload(artifact: &RawArtifact, _ctx: &ExtractContext) -> Result<Vec<Record>> {
    let records = records_from_payload(&artifact.payload, &UPLOAD_RECORD_KEYS)?;
    info!(records = records.len(), "JSON upload parsed");
    Ok(stamp_all(records, UPLOAD_TAG, artifact))
}

/// Live API responses: pick the record list, apply the date window or the
/// default record limit, then flatten
pub fn extract_api(artifact: &RawArtifact, ctx: &ExtractContext) -> Result<Vec<Record>> {
    let value = parse(&artifact.payload)?;
    let mut items = api_items(value);

    if ctx.start.is_some() || ctx.end.is_some() {
        let before = items.len();
        items.retain(|item| within_window(item, ctx.start, ctx.end));
        info!(kept = items.len(), of = before, "API records filtered by date window");
    } else {
        items.truncate(ctx.api_record_limit);
        debug!(limit = ctx.api_record_limit, kept = items.len(), "API records limited");
    }

    let records = items.iter().map(record_from_value).collect();
    Ok(stamp_all(records, API_TAG, artifact))
}

/// Flattened records from a JSON payload, looking for the record list
/// under the first of `keys` that holds an array
pub fn records_from_payload(payload: &[u8], keys: &[&str]) -> Result<Vec<Record>> {
    let value = parse(payload)?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            let key = keys.iter().find(|k| matches!(map.get(**k), Some(Value::Array(_))));
            match key.and_then(|k| map.remove(*k)) {
                Some(Value::Array(items)) => items,
                _ => vec![Value::Object(map)],
            }
        }
        scalar => vec![scalar],
    };
    Ok(items.iter().map(record_from_value).collect())
}

fn parse(payload: &[u8]) -> Result<Value> {
    Ok(serde_json::from_str(&decode_text(payload))?)
}

fn api_items(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            let key = API_RECORD_KEYS
                .iter()
                .find(|k| map.get(**k).is_some_and(is_truthy));
            match key.and_then(|k| map.remove(*k)) {
                Some(Value::Array(items)) => items,
                Some(single) => vec![single],
                None => vec![Value::Object(map)],
            }
        }
        scalar => vec![scalar],
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Records without a recognizable date field, or with an unparseable
/// date, are kept
fn within_window(item: &Value, start: Option<NaiveDate>, end: Option<NaiveDate>) -> bool {
    let Value::Object(map) = item else {
        return true;
    };
    let date_value = map
        .iter()
        .find(|(k, _)| {
            let k = k.to_lowercase();
            DATE_FIELD_TOKENS.iter().any(|t| k.contains(t))
        })
        .map(|(_, v)| v);

    let Some(date_value) = date_value.filter(|v| is_truthy(v)) else {
        return true;
    };
    let raw = match date_value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let Some(at) = parse_timestamp(&raw) else {
        return true;
    };

    let lower = start
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let upper = end
        .and_then(|d| d.and_hms_milli_opt(23, 59, 59, 999))
        .map(|d| d.and_utc())
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    lower <= at && at <= upper
}
