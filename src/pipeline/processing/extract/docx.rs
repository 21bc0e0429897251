use std::io::{Cursor, Read};

use once_cell::sync::Lazy;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use zip::ZipArchive;

use super::{normalize_headers, stamp_all, ExtractContext};
use crate::domain::{Cell, RawArtifact, Record};
use crate::error::Result;

pub const TABLE_TAG: &str = "DOCX_Table";
pub const KV_TAG: &str = "DOCX_KV_Pairs";
pub const TEXT_TAG: &str = "DOCX_Text";

const DOCUMENT_PART: &str = "word/document.xml";

/// Paragraphs of the form `Label: Value` needed before the document counts
/// as a form
const MIN_KV_PARAGRAPHS: usize = 2;

static KV_PARAGRAPH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^:]+?)\s*:\s*(.+)$").expect("valid key-value regex"));

pub fn extract(artifact: &RawArtifact, _ctx: &ExtractContext) -> Result<Vec<Record>> {
    let xml = document_xml(&artifact.payload)?;
    let body = parse_body(&xml)?;
    let (tag, records) = body_records(&body);
    Ok(stamp_all(records, tag, artifact))
}

/// Text content of a document body: top-level tables (rows of cell text)
/// and the paragraphs outside them
#[derive(Debug, Default, PartialEq)]
pub struct DocumentBody {
    pub tables: Vec<Vec<Vec<String>>>,
    pub paragraphs: Vec<String>,
}

fn document_xml(payload: &[u8]) -> Result<String> {
    let mut archive = ZipArchive::new(Cursor::new(payload))?;
    let mut part = archive.by_name(DOCUMENT_PART)?;
    let mut xml = String::new();
    part.read_to_string(&mut xml)?;
    Ok(xml)
}

/// Walk WordprocessingML, collecting `w:t` runs into paragraphs and cells
pub fn parse_body(xml: &str) -> Result<DocumentBody> {
    let mut reader = Reader::from_str(xml);
    let mut body = DocumentBody::default();

    let mut table_depth = 0usize;
    let mut table: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell: Option<String> = None;
    let mut paragraph = String::new();
    let mut in_run_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"tbl" => {
                    table_depth += 1;
                    if table_depth == 1 {
                        table.clear();
                    }
                }
                b"tr" if table_depth == 1 => row.clear(),
                b"tc" if table_depth == 1 => cell = Some(String::new()),
                b"p" => paragraph.clear(),
                b"t" => in_run_text = true,
                _ => {}
            },
            Event::Empty(e) => {
                if matches!(e.local_name().as_ref(), b"tab" | b"br") {
                    paragraph.push(' ');
                }
            }
            Event::Text(t) if in_run_text => paragraph.push_str(&t.unescape()?),
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_run_text = false,
                b"p" => {
                    let text = paragraph.trim().to_string();
                    if table_depth == 0 {
                        if !text.is_empty() {
                            body.paragraphs.push(text);
                        }
                    } else if let Some(cell) = cell.as_mut() {
                        if !text.is_empty() {
                            if !cell.is_empty() {
                                cell.push('\n');
                            }
                            cell.push_str(&text);
                        }
                    }
                    paragraph.clear();
                }
                b"tc" if table_depth == 1 => {
                    row.push(cell.take().unwrap_or_default());
                }
                b"tr" if table_depth == 1 => table.push(std::mem::take(&mut row)),
                b"tbl" => {
                    if table_depth == 1 {
                        body.tables.push(std::mem::take(&mut table));
                    }
                    table_depth = table_depth.saturating_sub(1);
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(body)
}

/// Tables first, else labelled paragraphs, else the joined text
pub fn body_records(body: &DocumentBody) -> (&'static str, Vec<Record>) {
    let mut table_records = Vec::new();
    for table in body.tables.iter().filter(|t| t.len() >= 2) {
        let headers = normalize_headers(&table[0]);
        for row in &table[1..] {
            if row.iter().all(|v| v.is_empty()) {
                continue;
            }
            let record: Record = headers
                .iter()
                .zip(row)
                .map(|(h, v)| (h.clone(), Cell::text(v.as_str())))
                .collect();
            table_records.push(record);
        }
    }
    if !table_records.is_empty() {
        return (TABLE_TAG, table_records);
    }

    let pairs: Vec<(String, String)> = body
        .paragraphs
        .iter()
        .filter_map(|p| KV_PARAGRAPH.captures(p))
        .map(|caps| (caps[1].trim().replace(' ', "_"), caps[2].trim().to_string()))
        .collect();
    if pairs.len() >= MIN_KV_PARAGRAPHS {
        return (KV_TAG, vec![pairs.into_iter().collect()]);
    }

    if body.paragraphs.is_empty() {
        return (TEXT_TAG, Vec::new());
    }
    let mut record = Record::new();
    record.insert("Content", body.paragraphs.join("\n"));
    (TEXT_TAG, vec![record])
}
