use std::io::{self, BufRead};

use tracing::{debug, warn};
use unicase::UniCase;

use crate::enc::{cut_str_to_max, decode_base64};
use crate::error::{Location, ParseError, ParseErrorKind, ReadError};
use crate::format::FormatReader;
use crate::record::{ChangeRecord, EntryBuilder, ModOp, Modification, Rename};


#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
enum State {
    Fresh,
    Producing,
    Ended,
    Failed,
    Closed,
}


/// A line after unfolding, tagged with the physical line it started on.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
struct LogicalLine {
    number: usize,
    text: Vec<u8>,
}
impl LogicalLine {
    fn location(&self) -> Location { Location::Line(self.number) }

    fn is_separator(&self) -> bool {
        let trimmed = trim_end_spaces(&self.text);
        trimmed == b"-"
    }
}


#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
struct RawRecord {
    lines: Vec<LogicalLine>,
    orphan_continuation: Option<usize>,
}


/// Reads change records from LDIF (RFC 2849).
///
/// The reader borrows its input through `R`; pass `&mut stream` to keep
/// ownership of the stream with the caller.
#[derive(Debug)]
pub struct LdifReader<R> {
    input: R,
    line_number: usize,
    state: State,
}
impl<R: BufRead> LdifReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            line_number: 0,
            state: State::Fresh,
        }
    }

    /// Reads one physical line without its terminator; `None` at the end of
    /// the input.
    fn read_physical_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut line = Vec::new();
        let read = self.input.read_until(b'\n', &mut line)?;
        if read == 0 {
            return Ok(None);
        }
        self.line_number += 1;
        if line.last() == Some(&b'\n') {
            line.pop();
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Ok(Some(line))
    }

    /// Collects the logical lines of the next record, skipping comments and
    /// leading separators.
    fn read_raw_record(&mut self) -> io::Result<Option<RawRecord>> {
        let mut record = RawRecord::default();
        let mut in_comment = false;
        while let Some(line) = self.read_physical_line()? {
            if line.is_empty() {
                if record.lines.is_empty() && record.orphan_continuation.is_none() {
                    in_comment = false;
                    continue;
                }
                break;
            }

            match line[0] {
                b'#' => {
                    in_comment = true;
                },
                b' ' => {
                    if in_comment {
                        continue;
                    }
                    match record.lines.last_mut() {
                        Some(last) => last.text.extend_from_slice(&line[1..]),
                        None => {
                            record.orphan_continuation.get_or_insert(self.line_number);
                        },
                    }
                },
                _ => {
                    in_comment = false;
                    record.lines.push(LogicalLine {
                        number: self.line_number,
                        text: line,
                    });
                },
            }
        }

        if record.lines.is_empty() && record.orphan_continuation.is_none() {
            Ok(None)
        } else {
            Ok(Some(record))
        }
    }
}
impl<R: BufRead> Iterator for LdifReader<R> {
    type Item = Result<ChangeRecord, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.state {
                State::Ended | State::Failed | State::Closed => return None,
                State::Fresh | State::Producing => {},
            }

            let raw = match self.read_raw_record() {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    self.state = State::Ended;
                    return None;
                },
                Err(e) => {
                    self.state = State::Failed;
                    return Some(Err(ReadError::Io(e)));
                },
            };

            let allow_version = self.state == State::Fresh;
            self.state = State::Producing;
            match parse_record(raw, allow_version) {
                Ok(Some(record)) => {
                    debug!(dn = record.dn(), kind = record.kind(), "read LDIF record");
                    return Some(Ok(record));
                },
                Ok(None) => continue,
                Err(e) => {
                    if !e.may_continue {
                        self.state = State::Failed;
                    }
                    return Some(Err(ReadError::Parse(e)));
                },
            }
        }
    }
}
impl<R: BufRead> FormatReader for LdifReader<R> {
    fn close(&mut self) -> io::Result<()> {
        self.state = State::Closed;
        Ok(())
    }
}


fn trim_end_spaces(bytes: &[u8]) -> &[u8] {
    let mut end = bytes.len();
    while end > 0 && bytes[end - 1] == b' ' {
        end -= 1;
    }
    &bytes[..end]
}

fn trim_spaces(bytes: &[u8]) -> &[u8] {
    let trimmed = trim_end_spaces(bytes);
    let start = trimmed.iter()
        .position(|&b| b != b' ')
        .unwrap_or(trimmed.len());
    &trimmed[start..]
}

fn is_named(line: &LogicalLine, name: &str) -> bool {
    let Some(colon) = line.text.iter().position(|&b| b == b':') else { return false };
    match std::str::from_utf8(&line.text[..colon]) {
        Ok(n) => UniCase::new(n) == UniCase::new(name),
        Err(_) => false,
    }
}

/// Splits `name: value`, `name:: base64` or `name:< url` into name and octets.
fn split_line(line: &LogicalLine) -> Result<(String, Vec<u8>), ParseError> {
    let err = |kind| ParseError::recoverable(kind, line.location());

    let colon = line.text.iter()
        .position(|&b| b == b':')
        .ok_or_else(|| err(ParseErrorKind::MalformedLine))?;
    let name = std::str::from_utf8(&line.text[..colon])
        .map_err(|_| err(ParseErrorKind::InvalidUtf8))?;
    if name.is_empty() {
        return Err(err(ParseErrorKind::MalformedLine));
    }

    let rest = &line.text[colon+1..];
    let value = match rest.first() {
        Some(b':') => {
            let encoded = std::str::from_utf8(trim_spaces(&rest[1..]))
                .map_err(|_| err(ParseErrorKind::InvalidBase64))?;
            match decode_base64(encoded) {
                Some(decoded) => decoded,
                None => {
                    warn!(
                        line = line.number,
                        value = cut_str_to_max(encoded, 64),
                        "invalid base64 value"
                    );
                    return Err(err(ParseErrorKind::InvalidBase64));
                },
            }
        },
        Some(b'<') => return Err(err(ParseErrorKind::UnsupportedReference)),
        Some(b' ') => rest[1..].to_vec(),
        _ => rest.to_vec(),
    };
    Ok((name.to_owned(), value))
}

fn split_text_line(line: &LogicalLine) -> Result<(String, String), ParseError> {
    let (name, value) = split_line(line)?;
    let value = String::from_utf8(value)
        .map_err(|_| ParseError::recoverable(ParseErrorKind::InvalidUtf8, line.location()))?;
    Ok((name, value))
}

fn parse_record(raw: RawRecord, allow_version: bool) -> Result<Option<ChangeRecord>, ParseError> {
    if let Some(number) = raw.orphan_continuation {
        return Err(ParseError::recoverable(ParseErrorKind::MalformedLine, Location::Line(number)));
    }

    let mut lines = &raw.lines[..];
    if allow_version {
        if let Some(first) = lines.first() {
            if is_named(first, "version") {
                let (_, version) = split_text_line(first)?;
                if version.trim() != "1" {
                    warn!(line = first.number, version = version.as_str(), "unexpected LDIF version");
                }
                lines = &lines[1..];
                if lines.is_empty() {
                    return Ok(None);
                }
            }
        }
    }

    let Some(first) = lines.first() else { return Ok(None) };
    let location = first.location();
    if !is_named(first, "dn") {
        return Err(ParseError::fatal(ParseErrorKind::MissingDn, location));
    }
    let (_, dn) = split_text_line(first)?;
    lines = &lines[1..];

    while let Some(line) = lines.first() {
        if !is_named(line, "control") {
            break;
        }
        debug!(line = line.number, "ignoring LDIF control");
        lines = &lines[1..];
    }

    let Some(line) = lines.first().filter(|l| is_named(l, "changetype")) else {
        return parse_add(dn, lines, location).map(Some);
    };
    let (_, change_type) = split_text_line(line)?;
    let body = &lines[1..];
    let record = match change_type.trim().to_ascii_lowercase().as_str() {
        "add" => parse_add(dn, body, location)?,
        "delete" => {
            if let Some(extra) = body.first() {
                return Err(unexpected(extra));
            }
            ChangeRecord::delete(dn)
                .map_err(|e| ParseError::invalid_record(e, location))?
        },
        "modify" => parse_modify(dn, body, location)?,
        "modrdn" | "moddn" => parse_rename(dn, body, location)?,
        _ => {
            return Err(ParseError::recoverable(
                ParseErrorKind::UnknownChangeType(change_type),
                line.location(),
            ));
        },
    };
    Ok(Some(record))
}

fn unexpected(line: &LogicalLine) -> ParseError {
    let text = String::from_utf8_lossy(&line.text);
    ParseError::recoverable(
        ParseErrorKind::UnexpectedLine(cut_str_to_max(&text, 64).to_owned()),
        line.location(),
    )
}

fn parse_add(dn: String, lines: &[LogicalLine], location: Location) -> Result<ChangeRecord, ParseError> {
    let mut builder = EntryBuilder::new(dn);
    for line in lines {
        if is_named(line, "dn") {
            // usually two records run together
            return Err(unexpected(line));
        }
        let (name, value) = split_line(line)?;
        builder.push_value(name, value);
    }
    let entry = builder.build()
        .map_err(|e| ParseError::invalid_record(e, location))?;
    Ok(ChangeRecord::add(entry))
}

fn parse_modify(dn: String, lines: &[LogicalLine], location: Location) -> Result<ChangeRecord, ParseError> {
    let mut modifications = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let head = &lines[i];
        let (op_name, attribute) = split_text_line(head)?;
        let op = match op_name.to_ascii_lowercase().as_str() {
            "add" => ModOp::Add,
            "delete" => ModOp::Delete,
            "replace" => ModOp::Replace,
            _ => {
                return Err(ParseError::recoverable(
                    ParseErrorKind::UnknownModification(op_name),
                    head.location(),
                ));
            },
        };
        let attribute = attribute.trim().to_owned();
        i += 1;

        let mut values = Vec::new();
        while i < lines.len() && !lines[i].is_separator() {
            let (name, value) = split_line(&lines[i])?;
            if UniCase::new(name.as_str()) != UniCase::new(attribute.as_str()) {
                return Err(unexpected(&lines[i]));
            }
            values.push(value);
            i += 1;
        }
        if i < lines.len() {
            // skip the "-"
            i += 1;
        }

        let modification = Modification::new(op, attribute, values)
            .map_err(|e| ParseError::invalid_record(e, head.location()))?;
        modifications.push(modification);
    }
    ChangeRecord::modify(dn, modifications)
        .map_err(|e| ParseError::invalid_record(e, location))
}

fn parse_rename(dn: String, lines: &[LogicalLine], location: Location) -> Result<ChangeRecord, ParseError> {
    let mut new_rdn = None;
    let mut delete_old_rdn = None;
    let mut new_superior = None;
    for line in lines {
        let (name, value) = split_text_line(line)?;
        match name.to_ascii_lowercase().as_str() {
            "newrdn" if new_rdn.is_none() => new_rdn = Some(value),
            "deleteoldrdn" if delete_old_rdn.is_none() => {
                delete_old_rdn = match value.trim() {
                    "0" => Some(false),
                    "1" => Some(true),
                    _ => return Err(ParseError::recoverable(ParseErrorKind::MalformedLine, line.location())),
                };
            },
            "newsuperior" if new_superior.is_none() => new_superior = Some(value),
            _ => return Err(unexpected(line)),
        }
    }

    let (Some(new_rdn), Some(delete_old_rdn)) = (new_rdn, delete_old_rdn) else {
        return Err(ParseError::recoverable(ParseErrorKind::MalformedLine, location));
    };
    let rename = Rename { new_rdn, delete_old_rdn, new_superior };
    ChangeRecord::modify_dn(dn, rename)
        .map_err(|e| ParseError::invalid_record(e, location))
}
