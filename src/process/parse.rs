use bytes::Bytes;
use csv::{ReaderBuilder, StringRecord};
use std::{collections::HashMap, io::Cursor};
use tracing::debug;

use crate::error::ParseError;
use crate::process::utils::{clean_str, is_blank};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// One data line of the posting, keyed by header name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// 1-based line in the response body.
    pub line: u64,
    fields: HashMap<String, String>,
}

impl RawRow {
    pub fn new(line: u64, fields: HashMap<String, String>) -> Self {
        Self { line, fields }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.fields.contains_key(column)
    }

    /// Overwrite `column` unconditionally.
    pub fn stamp(&mut self, column: &str, value: impl Into<String>) {
        self.fields.insert(column.to_string(), value.into());
    }

    /// Fill `column` only when the feed left it absent or blank (`NA`, `N/A`, ...).
    pub fn stamp_if_blank(&mut self, column: &str, value: impl Into<String>) {
        let slot = self.fields.entry(column.to_string()).or_default();
        if is_blank(slot) {
            *slot = value.into();
        }
    }
}

/// A response body that has been checked end to end.
///
/// Cloning is cheap; the body is shared. [`ParsedFeed::rows`] can be called any
/// number of times and always yields the same rows.
#[derive(Debug, Clone)]
pub struct ParsedFeed {
    body: Bytes,
    headers: Vec<String>,
    rows: usize,
}

impl ParsedFeed {
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Number of non-blank data rows.
    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Lazily decode the data rows. Records shorter than the header simply lack
    /// the trailing columns; extra trailing fields are ignored.
    pub fn rows(&self) -> impl Iterator<Item = RawRow> + '_ {
        reader(&self.body)
            .into_records()
            .filter_map(Result::ok)
            .filter(|r| !is_blank_record(r))
            // header line
            .skip(1)
            .map(move |record| {
                let line = record.position().map(|p| p.line()).unwrap_or_default();
                let fields = self
                    .headers
                    .iter()
                    .zip(record.iter())
                    .map(|(h, v)| (h.clone(), v.to_string()))
                    .collect();
                RawRow::new(line, fields)
            })
    }
}

fn reader(body: &[u8]) -> csv::Reader<Cursor<&[u8]>> {
    let body = body.strip_prefix(UTF8_BOM).unwrap_or(body);
    ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(Cursor::new(body))
}

fn is_blank_record(record: &StringRecord) -> bool {
    record.iter().all(|f| f.trim().is_empty())
}

/// A quote only opens a field at its first byte; elsewhere it is literal
/// (`TW 24" METER`). Inside a quoted field `""` is an escaped quote.
fn has_unterminated_quote(body: &[u8]) -> bool {
    let mut in_quotes = false;
    let mut field_start = true;
    let mut i = 0;
    while i < body.len() {
        let b = body[i];
        i += 1;
        if in_quotes {
            if b == b'"' {
                if body.get(i) == Some(&b'"') {
                    i += 1;
                } else {
                    in_quotes = false;
                }
            }
            continue;
        }
        match b {
            b',' | b'\n' | b'\r' => {
                field_start = true;
                continue;
            }
            b'"' if field_start => in_quotes = true,
            _ => {}
        }
        field_start = false;
    }
    in_quotes
}

/// Check a whole response body and return a restartable view of its rows.
///
/// Nothing is emitted unless every record decodes; a broken body fails the day.
pub fn parse(body: Bytes) -> Result<ParsedFeed, ParseError> {
    if has_unterminated_quote(body.strip_prefix(UTF8_BOM).unwrap_or(&body)) {
        return Err(ParseError::UnbalancedQuotes);
    }

    let mut rdr = reader(&body);
    let mut headers: Option<Vec<String>> = None;
    let mut rows = 0usize;

    for result in rdr.records() {
        let record = result.map_err(|e| ParseError::Csv {
            line: e.position().map(|p| p.line()).unwrap_or_default(),
            message: e.to_string(),
        })?;
        if is_blank_record(&record) {
            continue;
        }
        match headers {
            None => {
                if record.len() < 2 {
                    return Err(ParseError::SingleColumnHeader {
                        header: record.get(0).unwrap_or_default().to_string(),
                    });
                }
                headers = Some(record.iter().map(|h| clean_str(h).to_string()).collect());
            }
            Some(_) => rows += 1,
        }
    }

    let headers = headers.ok_or(ParseError::MissingHeader)?;
    debug!(columns = headers.len(), rows, "parsed posting");
    Ok(ParsedFeed {
        body,
        headers,
        rows,
    })
}
