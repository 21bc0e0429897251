use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::{decode_text, normalize_headers, stamp_all, ExtractContext};
use crate::domain::{Cell, RawArtifact, Record};
use crate::error::Result;

pub const SCRAPE_TAG: &str = "Web_Scrape";

/// Lists shorter than this are treated as navigation and ignored
const MIN_LIST_ITEMS: usize = 5;

static TABLE: Lazy<Selector> = Lazy::new(|| selector("table"));
static THEAD: Lazy<Selector> = Lazy::new(|| selector("thead"));
static ROW: Lazy<Selector> = Lazy::new(|| selector("tr"));
static CELL: Lazy<Selector> = Lazy::new(|| selector("th, td"));
static LIST: Lazy<Selector> = Lazy::new(|| selector("ul, ol"));
static ITEM: Lazy<Selector> = Lazy::new(|| selector("li"));

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

pub fn extract(artifact: &RawArtifact, ctx: &ExtractContext) -> Result<Vec<Record>> {
    let document = Html::parse_document(&decode_text(&artifact.payload));

    let mut records = table_records(&document);
    if records.is_empty() {
        debug!("No table rows found, checking list items");
        records = list_records(&document);
    }
    records.truncate(ctx.html_record_limit);

    Ok(stamp_all(records, SCRAPE_TAG, artifact))
}

/// One record per data row of every `<table>`; rows without any text are skipped
fn table_records(document: &Html) -> Vec<Record> {
    let mut records = Vec::new();
    for table in document.select(&TABLE) {
        let rows: Vec<ElementRef> = table.select(&ROW).collect();
        let Some(first) = rows.first() else {
            continue;
        };
        let header_row = table
            .select(&THEAD)
            .next()
            .and_then(|head| head.select(&ROW).next())
            .unwrap_or(*first);
        let headers = normalize_headers(header_row.select(&CELL).map(element_text));

        for row in rows.iter().filter(|r| r.id() != header_row.id()) {
            let values: Vec<String> = row.select(&CELL).map(element_text).collect();
            if values.iter().all(String::is_empty) {
                continue;
            }
            let record: Record = headers
                .iter()
                .zip(values)
                .map(|(name, value)| (name.clone(), Cell::text(value)))
                .collect();
            records.push(record);
        }
    }
    records
}

/// `Item_Content` records from lists long enough to hold data
fn list_records(document: &Html) -> Vec<Record> {
    let mut records = Vec::new();
    for list in document.select(&LIST) {
        let items: Vec<ElementRef> = list.select(&ITEM).collect();
        if items.len() < MIN_LIST_ITEMS {
            continue;
        }
        for item in items {
            let text = element_text(item);
            if !text.is_empty() {
                let mut record = Record::new();
                record.insert("Item_Content", text);
                records.push(record);
            }
        }
    }
    records
}

/// Text content with each fragment trimmed and blank fragments removed
fn element_text(element: ElementRef) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
