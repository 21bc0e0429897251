use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{decode_text, stamp_all, ExtractContext};
use crate::domain::{Cell, RawArtifact, Record};
use crate::error::Result;

pub const XML_TAG: &str = "XML_Upload";

// Element depths while reading: the document root sits at 1, its children
// (one per row) at 2, and their children (one per column) at 3.
const ROW_DEPTH: usize = 2;
const FIELD_DEPTH: usize = 3;

pub fn extract(artifact: &RawArtifact, _ctx: &ExtractContext) -> Result<Vec<Record>> {
    let records = read_rows(&artifact.payload)?;
    Ok(stamp_all(records, XML_TAG, artifact))
}

/// Each child of the root element becomes a record. Its attributes and
/// the text of its own children become columns; deeper text is folded
/// into the enclosing column.
pub fn read_rows(payload: &[u8]) -> Result<Vec<Record>> {
    let text = decode_text(payload);
    let mut reader = Reader::from_str(&text);
    reader.config_mut().trim_text(true);

    let mut records = Vec::new();
    let mut depth = 0usize;
    let mut row: Option<PendingRow> = None;
    let mut field: Option<(String, String)> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                depth += 1;
                if depth == ROW_DEPTH {
                    row = Some(PendingRow::open(&e)?);
                } else if depth == FIELD_DEPTH {
                    let name = local_name(&e);
                    if let Some(row) = row.as_mut() {
                        push_attributes(&mut row.record, &e, Some(&name))?;
                    }
                    field = Some((name, String::new()));
                }
            }
            Event::Empty(e) => {
                if depth + 1 == ROW_DEPTH {
                    records.push(PendingRow::open(&e)?.close());
                } else if depth + 1 == FIELD_DEPTH {
                    if let Some(row) = row.as_mut() {
                        let name = local_name(&e);
                        push_attributes(&mut row.record, &e, Some(&name))?;
                        if row.record.get(&name).is_none() {
                            row.record.insert(name, Cell::Null);
                        }
                    }
                }
            }
            Event::Text(t) => {
                let value = t.unescape()?;
                append_text(depth, &value, &mut row, &mut field);
            }
            Event::CData(c) => {
                let value = String::from_utf8_lossy(&c.into_inner()).into_owned();
                append_text(depth, &value, &mut row, &mut field);
            }
            Event::End(_) => {
                if depth == FIELD_DEPTH {
                    if let (Some(row), Some((name, value))) = (row.as_mut(), field.take()) {
                        let cell = if value.is_empty() { Cell::Null } else { Cell::text(value) };
                        row.record.insert(name, cell);
                    }
                } else if depth == ROW_DEPTH {
                    if let Some(done) = row.take() {
                        records.push(done.close());
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(records)
}

struct PendingRow {
    tag: String,
    record: Record,
    text: String,
}

impl PendingRow {
    fn open(element: &BytesStart<'_>) -> Result<Self> {
        let mut record = Record::new();
        push_attributes(&mut record, element, None)?;
        Ok(Self {
            tag: local_name(element),
            record,
            text: String::new(),
        })
    }

    /// A row with only its own text keeps it under the row's tag
    fn close(mut self) -> Record {
        if self.record.is_empty() && !self.text.is_empty() {
            self.record.insert(self.tag, self.text);
        }
        self.record
    }
}

fn append_text(
    depth: usize,
    value: &str,
    row: &mut Option<PendingRow>,
    field: &mut Option<(String, String)>,
) {
    let target = if depth >= FIELD_DEPTH {
        field.as_mut().map(|(_, text)| text)
    } else if depth == ROW_DEPTH {
        row.as_mut().map(|r| &mut r.text)
    } else {
        None
    };
    if let Some(text) = target {
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(value.trim());
    }
}

fn local_name(element: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(element.local_name().as_ref()).into_owned()
}

/// Attributes become columns, prefixed with the field name when given
fn push_attributes(record: &mut Record, element: &BytesStart<'_>, prefix: Option<&str>) -> Result<()> {
    for attr in element.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let column = match prefix {
            Some(p) => format!("{p}_{key}"),
            None => key,
        };
        let value = attr.unescape_value()?;
        record.insert(column, Cell::text(value.trim()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_children_are_rows() {
        let xml = br#"<?xml version="1.0"?>
            <catalog>
              <book id="b1"><title>Dune</title><price currency="USD">9.99</price></book>
              <book id="b2"><title>Emma &amp; Co</title><price/></book>
            </catalog>"#;
        let records = read_rows(xml).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("id"), Some(&Cell::text("b1")));
        assert_eq!(records[0].get("price"), Some(&Cell::text("9.99")));
        assert_eq!(records[0].get("price_currency"), Some(&Cell::text("USD")));
        assert_eq!(records[1].get("title"), Some(&Cell::text("Emma & Co")));
        assert_eq!(records[1].get("price"), Some(&Cell::Null));
    }

    #[test]
    fn text_only_rows_use_their_tag() {
        let records = read_rows(b"<list><item>a</item><item>b</item></list>").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get("item"), Some(&Cell::text("b")));
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(read_rows(b"<a><b></a>").is_err());
    }
}
