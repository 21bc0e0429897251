//! Column and tag constants shared by extraction, remediation and scoring.
//! Keeping them here keeps the metadata contract in one place.

// Lineage columns every record must carry
pub const SOURCE_COLUMN: &str = "source";
pub const INGESTED_AT_COLUMN: &str = "ingested_at";

// Annotation column appended by the bulk remediation pass
pub const REMEDIATION_NOTES_COLUMN: &str = "remediation_notes";
pub const SUSPICIOUS_VALUE_NOTE: &str = "Suspicious null or zero value detected; ";

// Canonical file stems under the processed data directory
pub const UNIFIED_TABLE_STEM: &str = "raw_structured";
pub const CLEANED_TABLE_STEM: &str = "cleaned_data";

/// Default trust threshold below which one feedback pass is triggered
pub const DEFAULT_TRUST_THRESHOLD: f64 = 95.0;

/// Status strings surfaced to the trigger collaborator
pub const STATUS_SUCCESS: &str = "Success";
pub const STATUS_NO_DATA: &str = "No Data Found for this period";

/// Cell tokens the remediator treats as missing values
pub const NULL_TOKENS: [&str; 4] = ["", "—", "None", "nan"];

/// Name fragments that mark a column as time-like
pub const TIME_LIKE_TOKENS: [&str; 3] = ["date", "time", "timestamp"];

/// Canonical timestamp layout written by remediation
pub const CANONICAL_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Returns true for the two lineage columns
pub fn is_lineage_column(name: &str) -> bool {
    name == SOURCE_COLUMN || name == INGESTED_AT_COLUMN
}

/// Returns true for lineage columns and the remediation annotation column
pub fn is_metadata_column(name: &str) -> bool {
    is_lineage_column(name) || name == REMEDIATION_NOTES_COLUMN
}

/// Column names containing `date`, `time`, `timestamp`, or ending in `_at`
pub fn is_time_like_column(name: &str) -> bool {
    let lower = name.to_lowercase();
    TIME_LIKE_TOKENS.iter().any(|t| lower.contains(t)) || lower.ends_with("_at")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_like_columns_are_detected() {
        assert!(is_time_like_column("listed_date"));
        assert!(is_time_like_column("Timestamp"));
        assert!(is_time_like_column("ingested_at"));
        assert!(is_time_like_column("start_TIME"));
        assert!(!is_time_like_column("address"));
        assert!(!is_time_like_column("attribute"));
    }

    #[test]
    fn metadata_columns() {
        assert!(is_metadata_column("source"));
        assert!(is_metadata_column("remediation_notes"));
        assert!(!is_lineage_column("remediation_notes"));
        assert!(!is_metadata_column("price"));
    }
}
