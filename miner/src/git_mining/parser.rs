//! Git blame output parsing.
//!
//! A default `git blame` line looks like
//! `<SHA> (<Author> <Date> <Time> <TZ> <LineNum>) <Code>`.
//! Parsing never fails: anything unrecognisable degrades to a record with an
//! `unknown` actor and the raw line as code.

use provenance_store::BlameRow;
use regex::Regex;

/// Actor reported for lines whose metadata could not be read.
pub const UNKNOWN_ACTOR: &str = "unknown";

/// Timestamp inside the blame metadata.
const TIMESTAMP_PATTERN: &str = r"(\d{4}-\d{2}-\d{2}) (\d{2}:\d{2}:\d{2})";

/// One parsed blame line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlameRecord {
    pub revision_id: String,
    pub actor: String,
    pub date: String,
    pub time: String,
    /// 1-based; positional once the record comes from a whole listing
    pub line_number: Option<u64>,
    pub code: String,
}

impl BlameRecord {
    fn degraded(revision_id: &str, line: &str) -> Self {
        Self {
            revision_id: revision_id.to_string(),
            actor: UNKNOWN_ACTOR.to_string(),
            date: String::new(),
            time: String::new(),
            line_number: None,
            code: line.to_string(),
        }
    }

    /// Whether the metadata was recognised.
    pub fn is_degraded(&self) -> bool {
        self.actor == UNKNOWN_ACTOR && self.date.is_empty() && self.line_number.is_none()
    }

    /// Table row for this record; 0 when no line number is known.
    pub fn into_row(self, repository: &str, file_path: &str) -> BlameRow {
        BlameRow {
            repository: repository.to_string(),
            file_path: file_path.to_string(),
            revision_id: self.revision_id,
            line_number: self.line_number.unwrap_or_default(),
            actor: self.actor,
            date: self.date,
            time: self.time,
            code: self.code,
        }
    }
}

/// Parser for blame-annotated lines.
pub struct BlameParser {
    timestamp: Option<Regex>,
}

impl Default for BlameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl BlameParser {
    pub fn new() -> Self {
        Self {
            timestamp: Regex::new(TIMESTAMP_PATTERN).ok(),
        }
    }

    /// Parse one line of blame output for `revision_id`.
    ///
    /// The metadata span runs from the first `(` to the first `)` after it.
    /// A `)` inside the author name therefore cuts the span short.
    pub fn parse(&self, revision_id: &str, line: &str) -> BlameRecord {
        let Some(open) = line.find('(') else {
            tracing::debug!("blame line without metadata: {:?}", line);
            return BlameRecord::degraded(revision_id, line);
        };
        let after_open = &line[open + 1..];
        let Some(close) = after_open.find(')') else {
            tracing::debug!("blame line with unterminated metadata: {:?}", line);
            return BlameRecord::degraded(revision_id, line);
        };

        let meta = after_open[..close].trim();
        if meta.is_empty() {
            return BlameRecord::degraded(revision_id, line);
        }
        let rest = &after_open[close + 1..];
        let code = rest.strip_prefix(' ').unwrap_or(rest);

        let (actor, date, time, tail) = match self.timestamp.as_ref().and_then(|re| re.captures(meta)) {
            Some(caps) => {
                let (Some(whole), Some(date), Some(time)) = (caps.get(0), caps.get(1), caps.get(2))
                else {
                    return BlameRecord::degraded(revision_id, line);
                };
                let actor = meta[..whole.start()]
                    .split_whitespace()
                    .next()
                    .unwrap_or(UNKNOWN_ACTOR);
                (actor, date.as_str(), time.as_str(), &meta[whole.end()..])
            }
            None => {
                let mut tokens = meta.splitn(2, char::is_whitespace);
                let actor = tokens.next().unwrap_or(UNKNOWN_ACTOR);
                (actor, "", "", tokens.next().unwrap_or(""))
            }
        };

        BlameRecord {
            revision_id: revision_id.to_string(),
            actor: actor.to_string(),
            date: date.to_string(),
            time: time.to_string(),
            line_number: trailing_number(tail),
            code: code.to_string(),
        }
    }

    /// Parse a whole blame listing.
    ///
    /// Every record is numbered by its 1-based position in the listing. A
    /// printed number that disagrees with the position is logged and dropped.
    pub fn parse_output(&self, revision_id: &str, output: &str) -> Vec<BlameRecord> {
        let records: Vec<BlameRecord> = output
            .lines()
            .enumerate()
            .map(|(i, line)| {
                let position = i as u64 + 1;
                let mut record = self.parse(revision_id, line);
                if let Some(printed) = record.line_number.filter(|&n| n != position) {
                    tracing::debug!(
                        "blame line {} of {} printed line number {}",
                        position,
                        revision_id,
                        printed
                    );
                }
                record.line_number = Some(position);
                record
            })
            .collect();

        let degraded = records.iter().filter(|r| r.actor == UNKNOWN_ACTOR).count();
        if degraded > 0 {
            tracing::debug!(
                "{} of {} blame lines for {} had unreadable metadata",
                degraded,
                records.len(),
                revision_id
            );
        }
        records
    }
}

/// Last whitespace-delimited token, when it is all digits.
fn trailing_number(text: &str) -> Option<u64> {
    text.split_whitespace()
        .last()
        .filter(|t| t.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|t| t.parse().ok())
}
