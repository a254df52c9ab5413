use super::error::{ImportError, ParseError};
use std::collections::BTreeMap;

pub const DEFAULT_MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;

const ACCEPTED_EXTENSIONS: [&str; 3] = ["csv", "tsv", "txt"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Comma,
    Tab,
    Semicolon,
    Auto,
}

impl Delimiter {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "comma" | "," => Some(Self::Comma),
            "tab" | "\t" => Some(Self::Tab),
            "semicolon" | ";" => Some(Self::Semicolon),
            "auto" | "" => Some(Self::Auto),
            _ => None,
        }
    }

    /// Default for an upload: `.tsv` files are tab separated, everything else is sniffed.
    pub fn for_file_name(file_name: &str) -> Self {
        if extension(file_name).as_deref() == Some("tsv") {
            Self::Tab
        } else {
            Self::Auto
        }
    }

    fn byte(self) -> Option<u8> {
        match self {
            Self::Comma => Some(b','),
            Self::Tab => Some(b'\t'),
            Self::Semicolon => Some(b';'),
            Self::Auto => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTable {
    pub headers: Vec<String>,
    pub rows: Vec<BTreeMap<String, String>>,
    /// 1-based data row number in the source for each kept row.
    pub row_numbers: Vec<usize>,
    /// Data records read, including blank ones that were dropped.
    pub raw_row_count: usize,
    pub delimiter: u8,
}

impl ParsedTable {
    pub fn cell(&self, row: usize, header: &str) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(header))
            .map(|s| s.as_str())
    }

    pub fn row_number(&self, row: usize) -> usize {
        self.row_numbers.get(row).copied().unwrap_or(row + 1)
    }
}

fn extension(file_name: &str) -> Option<String> {
    let (_, ext) = file_name.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
}

/// Upload gate, run before any bytes are parsed.
pub fn check_upload(file_name: &str, size: u64, max_bytes: u64) -> Result<(), ImportError> {
    let accepted = extension(file_name)
        .map(|e| ACCEPTED_EXTENSIONS.contains(&e.as_str()))
        .unwrap_or(false);
    if !accepted {
        return Err(ImportError::UnsupportedFile {
            file_name: file_name.to_string(),
        });
    }
    if size > max_bytes {
        return Err(ImportError::FileTooLarge {
            size,
            max: max_bytes,
        });
    }
    Ok(())
}

pub fn decode_upload(bytes: &[u8]) -> Result<&str, ParseError> {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    std::str::from_utf8(bytes).map_err(|e| ParseError::Encoding {
        offset: e.valid_up_to(),
    })
}

/// Pick the candidate delimiter seen most often in the first line, outside quotes.
pub fn detect_delimiter(text: &str) -> u8 {
    let mut counts = [(b',', 0usize), (b'\t', 0usize), (b';', 0usize)];
    let mut in_quotes = false;
    for ch in text.bytes() {
        match ch {
            b'"' => in_quotes = !in_quotes,
            b'\n' | b'\r' if !in_quotes => break,
            _ if !in_quotes => {
                for c in counts.iter_mut() {
                    if c.0 == ch {
                        c.1 += 1;
                    }
                }
            }
            _ => {}
        }
    }
    // Comma is listed first, so it wins ties.
    let mut best = counts[0];
    for c in &counts[1..] {
        if c.1 > best.1 {
            best = *c;
        }
    }
    best.0
}

pub fn parse_table(text: &str, delimiter: Delimiter) -> Result<ParsedTable, ParseError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    if text.trim().is_empty() {
        return Err(ParseError::Empty);
    }
    let delim = delimiter.byte().unwrap_or_else(|| detect_delimiter(text));

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delim)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut records = reader.records();
    let header_record = match records.next() {
        Some(r) => r.map_err(|e| ParseError::Malformed(e.to_string()))?,
        None => return Err(ParseError::Empty),
    };
    let headers = parse_header(&header_record)?;

    let mut rows = Vec::new();
    let mut row_numbers = Vec::new();
    let mut raw_row_count = 0usize;
    for result in records {
        let record = result.map_err(|e| ParseError::Malformed(e.to_string()))?;
        raw_row_count += 1;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        if record.len() != headers.len() {
            return Err(ParseError::InconsistentColumns {
                line: record.position().map(|p| p.line()).unwrap_or(0),
                expected: headers.len(),
                found: record.len(),
            });
        }
        let row = headers
            .iter()
            .cloned()
            .zip(record.iter().map(|v| v.to_string()))
            .collect::<BTreeMap<_, _>>();
        rows.push(row);
        row_numbers.push(raw_row_count);
    }
    if rows.is_empty() {
        return Err(ParseError::NoDataRows);
    }

    Ok(ParsedTable {
        headers,
        rows,
        row_numbers,
        raw_row_count,
        delimiter: delim,
    })
}

fn parse_header(record: &csv::StringRecord) -> Result<Vec<String>, ParseError> {
    let mut out: Vec<String> = Vec::with_capacity(record.len());
    for raw in record.iter() {
        let h = raw.trim();
        if h.is_empty() {
            return Err(ParseError::EmptyHeader);
        }
        if out.iter().any(|existing| existing == h) {
            return Err(ParseError::DuplicateHeader(h.to_string()));
        }
        out.push(h.to_string());
    }
    Ok(out)
}
