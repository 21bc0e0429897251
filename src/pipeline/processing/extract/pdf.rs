use lopdf::Document;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use super::{normalize_headers, stamp_all, ExtractContext};
use crate::domain::{Cell, RawArtifact, Record};
use crate::error::Result;

pub const TABLE_TAG: &str = "PDF_Table";
pub const KV_TAG: &str = "PDF_KV_Pairs";
pub const LINE_TAG: &str = "PDF_Text_Line";

/// `Label: Value` lines needed before a page counts as a form
const MIN_KV_LINES: usize = 2;

static KV_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([\w\s]+?)\s*:\s*(.+)$").expect("valid key-value regex"));
static COLUMN_GAP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").expect("valid gap regex"));

pub fn extract(artifact: &RawArtifact, _ctx: &ExtractContext) -> Result<Vec<Record>> {
    let doc = Document::load_mem(&artifact.payload)?;
    let mut records = Vec::new();

    for page_number in doc.get_pages().into_keys() {
        let text = match doc.extract_text(&[page_number]) {
            Ok(text) => text,
            Err(e) => {
                warn!(page = page_number, error = %e, "Skipping unreadable PDF page");
                continue;
            }
        };
        let page = classify_page(&text, page_number);
        debug!(page = page_number, tag = page.tag, records = page.records.len(), "PDF page extracted");
        records.extend(stamp_all(page.records, page.tag, artifact));
    }
    Ok(records)
}

/// Records from one page, all produced by a single priority level
#[derive(Debug)]
pub struct PageRecords {
    pub tag: &'static str,
    pub records: Vec<Record>,
}

/// Table-like lines first, then `Label: Value` pairs, then raw lines
pub fn classify_page(text: &str, page_number: u32) -> PageRecords {
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let page = Cell::Number(page_number as f64);

    if let Some(rows) = table_rows(&lines) {
        let headers = normalize_headers(&rows[0]);
        let records = rows[1..]
            .iter()
            .filter(|row| row.iter().any(|v| !v.is_empty()))
            .map(|row| {
                let mut record: Record = headers
                    .iter()
                    .zip(row)
                    .map(|(h, v)| (h.clone(), Cell::text(v.as_str())))
                    .collect();
                record.insert("page", page.clone());
                record
            })
            .collect();
        return PageRecords { tag: TABLE_TAG, records };
    }

    let pairs: Vec<(String, String)> = lines
        .iter()
        .filter_map(|line| KV_LINE.captures(line))
        .map(|caps| (caps[1].trim().replace(' ', "_"), caps[2].trim().to_string()))
        .collect();
    if pairs.len() >= MIN_KV_LINES {
        let mut record: Record = pairs.into_iter().collect();
        record.insert("page", page);
        return PageRecords { tag: KV_TAG, records: vec![record] };
    }

    let records = lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let mut record = Record::new();
            record.insert("Content", *line);
            record.insert("Page_Number", page.clone());
            record.insert("Line_Number", (i + 1) as f64);
            record
        })
        .collect();
    PageRecords { tag: LINE_TAG, records }
}

#[derive(Clone, Copy)]
enum Splitter {
    Tab,
    Pipe,
    Semicolon,
    Comma,
    Gap,
}

impl Splitter {
    const ALL: [Splitter; 5] = [
        Splitter::Tab,
        Splitter::Pipe,
        Splitter::Semicolon,
        Splitter::Comma,
        Splitter::Gap,
    ];

    fn split(self, line: &str) -> Vec<String> {
        let parts: Vec<&str> = match self {
            Splitter::Tab => line.split('\t').collect(),
            Splitter::Pipe => line.trim_matches('|').split('|').collect(),
            Splitter::Semicolon => line.split(';').collect(),
            Splitter::Comma => line.split(',').collect(),
            Splitter::Gap => COLUMN_GAP.split(line).collect(),
        };
        parts.into_iter().map(|p| p.trim().to_string()).collect()
    }
}

/// Header plus rows when at least half of the page's lines split into the
/// same number (two or more) of columns under one delimiter
fn table_rows(lines: &[&str]) -> Option<Vec<Vec<String>>> {
    for splitter in Splitter::ALL {
        let split: Vec<Vec<String>> = lines.iter().map(|l| splitter.split(l)).collect();
        let Some(header_idx) = split.iter().position(|fields| fields.len() >= 2) else {
            continue;
        };
        let width = split[header_idx].len();
        let mut rows = vec![split[header_idx].clone()];
        rows.extend(
            split[header_idx + 1..]
                .iter()
                .filter(|fields| fields.len() == width)
                .cloned(),
        );
        if rows.len() >= 2 && rows.len() * 2 >= lines.len() {
            let excluded = lines.len() - rows.len();
            if excluded > 0 {
                debug!(excluded, width, "PDF table lines left out for column count mismatch");
            }
            return Some(rows);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligned_columns_become_table_rows() {
        let text = "Item    Qty    Price\nApple   3      1.20\nPear    10     0.80\n";
        let page = classify_page(text, 2);
        assert_eq!(page.tag, TABLE_TAG);
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[1].get("Qty"), Some(&Cell::text("10")));
        assert_eq!(page.records[0].get("page"), Some(&Cell::Number(2.0)));
    }

    #[test]
    fn off_width_lines_are_left_out_of_the_table() {
        let text = "Item    Qty    Price\nApple   3      1.20\nPear    10     0.80\nSubtotal        4.80\n";
        let page = classify_page(text, 1);
        assert_eq!(page.tag, TABLE_TAG);
        assert_eq!(page.records.len(), 2);
        assert!(page
            .records
            .iter()
            .all(|r| r.get("Item") != Some(&Cell::text("Subtotal"))));
    }

    #[test]
    fn labelled_lines_become_one_record() {
        let text = "Invoice Number: 42\nCustomer Name : Ada Lovelace\nThank you\n";
        let page = classify_page(text, 1);
        assert_eq!(page.tag, KV_TAG);
        assert_eq!(page.records.len(), 1);
        let record = &page.records[0];
        assert_eq!(record.get("Invoice_Number"), Some(&Cell::text("42")));
        assert_eq!(record.get("Customer_Name"), Some(&Cell::text("Ada Lovelace")));
        assert!(record.get("Content").is_none());
    }

    #[test]
    fn prose_falls_back_to_lines() {
        let page = classify_page("Hello world\n\nSecond line here\n", 3);
        assert_eq!(page.tag, LINE_TAG);
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[1].get("Line_Number"), Some(&Cell::Number(2.0)));
        assert_eq!(page.records[1].get("Page_Number"), Some(&Cell::Number(3.0)));
    }

    #[test]
    fn single_label_is_not_a_form() {
        let page = classify_page("Total: 10\n", 1);
        assert_eq!(page.tag, LINE_TAG);
    }

    #[test]
    fn invalid_pdf_is_an_error() {
        let artifact = RawArtifact::new(crate::domain::SourceKind::Pdf, b"not a pdf".to_vec(), None);
        assert!(extract(&artifact, &ExtractContext::default()).is_err());
    }
}
