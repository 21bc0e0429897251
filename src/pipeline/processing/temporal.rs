use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use crate::constants::CANONICAL_TIMESTAMP_FORMAT;

const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f%z", "%Y-%m-%dT%H:%M:%S%.f%z"];

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];

/// Parse a timestamp in one of the accepted layouts. Values carrying an
/// offset are converted to UTC; naive values are taken to be UTC already.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.and_utc());
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
}

/// Render in the canonical `YYYY-MM-DD HH:MM:SS` layout
pub fn canonical(ts: &DateTime<Utc>) -> String {
    ts.format(CANONICAL_TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_normalized_to_utc() {
        let ts = parse_timestamp("2024-05-01T12:00:00+02:00").unwrap();
        assert_eq!(canonical(&ts), "2024-05-01 10:00:00");
    }

    #[test]
    fn accepted_layouts() {
        for raw in [
            "2024-05-01 10:00:00",
            "2024-05-01T10:00:00.250",
            "2024-05-01T10:00:00Z",
            "2024/05/01 10:00:00",
        ] {
            let ts = parse_timestamp(raw).unwrap_or_else(|| panic!("{raw} should parse"));
            assert_eq!(canonical(&ts), "2024-05-01 10:00:00");
        }
        assert_eq!(canonical(&parse_timestamp("05/01/2024").unwrap()), "2024-05-01 00:00:00");
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("2024-13-40").is_none());
    }

    #[test]
    fn canonical_output_reparses() {
        let ts = parse_timestamp("2023-12-31T23:59:59Z").unwrap();
        assert_eq!(parse_timestamp(&canonical(&ts)), Some(ts));
    }
}
