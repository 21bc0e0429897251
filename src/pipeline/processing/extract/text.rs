use crate::domain::Record;

pub const SENSED_FORMAT: &str = "Unstructured Text Blocks";

/// Split free text into blocks: paragraphs when blank lines separate them,
/// otherwise individual lines. Empty input gives no blocks.
pub fn split_blocks(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    let normalized = text.replace("\r\n", "\n");
    let blocks: Vec<&str> = if normalized.contains("\n\n") {
        normalized.split("\n\n").collect()
    } else {
        normalized.lines().collect()
    };
    blocks
        .into_iter()
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .map(str::to_string)
        .collect()
}

/// One `raw_content` record per block
pub fn blocks_to_records(text: &str, filename: &str) -> Vec<Record> {
    split_blocks(text)
        .into_iter()
        .map(|block| {
            let mut record = Record::new();
            record.insert("raw_content", block);
            record.insert("filename", filename);
            record.insert("sensed_format", SENSED_FORMAT);
            record
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paragraphs_win_over_lines() {
        let blocks = split_blocks("first line\nstill first\n\nsecond\n\n\n");
        assert_eq!(blocks, vec!["first line\nstill first", "second"]);
    }

    #[test]
    fn lines_when_no_blank_separator() {
        assert_eq!(split_blocks("a\r\n b \r\n\r"), vec!["a", "b"]);
    }

    #[test]
    fn whitespace_only_is_empty() {
        assert!(blocks_to_records(" \n\t ", "x.txt").is_empty());
    }
}
