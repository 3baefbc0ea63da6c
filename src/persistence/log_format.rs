//! Lenient parsing of the feedback log's on-disk representations.
//!
//! The log may be a single JSON array (legacy), newline-delimited JSON
//! objects (current), or a mix: an array followed by stray NDJSON lines, or
//! an array cut off by an interrupted write. Parsing walks a fixed sequence
//! of stages and every stage is allowed to fail; malformed fragments are
//! skipped, never raised.

use serde_json::{Deserializer, Value};
use tracing::debug;

/// Parse result tagged with the path that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLog {
    /// Nothing but whitespace.
    Empty,
    /// The whole file is one JSON document (array elements, or a single value).
    Document(Vec<Value>),
    /// An array signature was found but the file is not one document.
    ///
    /// `array` holds the array's elements (only the complete leading ones when
    /// `truncated` is set) and `lines` the NDJSON objects that follow it.
    Recovered {
        /// Elements recovered from the array.
        array: Vec<Value>,
        /// Whether the array was cut off before its closing bracket.
        truncated: bool,
        /// Well-formed object lines after the array.
        lines: Vec<Value>,
    },
    /// Line-by-line objects only.
    Lines(Vec<Value>),
}

impl ParsedLog {
    /// Flatten into values, array elements first, in file order.
    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        match self {
            Self::Empty => Vec::new(),
            Self::Document(values) | Self::Lines(values) => values,
            Self::Recovered {
                mut array, lines, ..
            } => {
                array.extend(lines);
                array
            }
        }
    }
}

/// Whether the text begins with the legacy array signature.
#[must_use]
pub fn has_array_signature(text: &str) -> bool {
    text.trim_start().starts_with('[')
}

/// Parse `text` leniently. Never fails.
#[must_use]
pub fn parse(text: &str) -> ParsedLog {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return ParsedLog::Empty;
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return match value {
            Value::Array(items) => ParsedLog::Document(items),
            other => ParsedLog::Document(vec![other]),
        };
    }

    let Some(start) = array_start(text) else {
        return ParsedLog::Lines(object_lines(text));
    };

    let candidate = &text[start..];
    if let Some((array, consumed)) = leading_array(candidate) {
        return ParsedLog::Recovered {
            array,
            truncated: false,
            lines: object_lines(&candidate[consumed..]),
        };
    }

    let (array, consumed) = salvage_array_prefix(candidate);
    debug!(
        recovered = array.len(),
        "feedback log array is truncated, salvaged complete elements"
    );
    ParsedLog::Recovered {
        array,
        truncated: true,
        lines: object_lines(&candidate[consumed..]),
    }
}

/// Byte offset of the first `[` that is not nested inside an object.
fn array_start(text: &str) -> Option<usize> {
    let start = text.find('[')?;
    if text[..start].contains('{') {
        return None;
    }
    Some(start)
}

/// Parse one complete array at the start of `text`, returning its elements
/// and the number of bytes it spans.
fn leading_array(text: &str) -> Option<(Vec<Value>, usize)> {
    let mut stream = Deserializer::from_str(text).into_iter::<Value>();
    match stream.next() {
        Some(Ok(Value::Array(items))) => Some((items, stream.byte_offset())),
        _ => None,
    }
}

/// Recover every complete element of an array that lacks its closing bracket.
///
/// Returns the elements and the byte offset just past the last one, so the
/// caller can resume line parsing from there.
fn salvage_array_prefix(text: &str) -> (Vec<Value>, usize) {
    let mut items = Vec::new();
    // Skip the opening bracket.
    let mut pos = 1;
    let mut consumed = pos;

    loop {
        let rest = &text[pos..];
        let remaining = rest.trim_start_matches(|c: char| c.is_whitespace() || c == ',');
        pos += rest.len() - remaining.len();
        if pos >= text.len() || text[pos..].starts_with(']') {
            break;
        }

        let mut stream = Deserializer::from_str(&text[pos..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(value)) => {
                pos += stream.byte_offset();
                consumed = pos;
                items.push(value);
            }
            _ => break,
        }
    }

    (items, consumed)
}

/// Parse every line that starts with `{` as an independent object.
fn object_lines(text: &str) -> Vec<Value> {
    text.lines()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .filter_map(|line| match serde_json::from_str::<Value>(line) {
            Ok(value @ Value::Object(_)) => Some(value),
            Ok(_) => None,
            Err(err) => {
                debug!(%err, "skipping malformed feedback log line");
                None
            }
        })
        .collect()
}
