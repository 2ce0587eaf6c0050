use std::io;

use base64::Engine;


/// Line terminator of the host platform.
pub const EOL: &str = if cfg!(windows) { "\r\n" } else { "\n" };


/// Returns whether the value can be written out verbatim as text.
///
/// A value is unsafe if it is not UTF-8, contains NUL, LF or CR, starts with
/// a space, `:` or `<`, or ends with a space.
pub fn is_safe_value(value: &[u8]) -> bool {
    if std::str::from_utf8(value).is_err() {
        return false;
    }
    if value.iter().any(|&b| b == b'\0' || b == b'\n' || b == b'\r') {
        return false;
    }
    match value.first() {
        Some(b' ') | Some(b':') | Some(b'<') => return false,
        _ => {},
    }
    if value.last() == Some(&b' ') {
        return false;
    }
    true
}


/// Returns whether the value survives a trip through XML character data.
///
/// Carriage returns are excluded since XML parsers normalize line ends.
pub fn is_xml_safe_value(value: &[u8]) -> bool {
    let Ok(text) = std::str::from_utf8(value) else { return false };
    text.chars()
        .all(|c| c == '\t' || c == '\n' || c >= ' ')
}


pub fn encode_base64(value: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(value)
}

pub fn decode_base64(encoded: &str) -> Option<Vec<u8>> {
    // tolerate whitespace introduced by pretty-printing
    let compact: String = encoded.chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    base64::engine::general_purpose::STANDARD.decode(compact).ok()
}


/// Cuts the string to at most `max_bytes` without splitting a character.
pub fn cut_str_to_max(s: &str, mut max_bytes: usize) -> &str {
    if max_bytes >= s.len() {
        return s;
    }
    while !s.is_char_boundary(max_bytes) {
        max_bytes -= 1;
    }
    &s[0..max_bytes]
}


/// Writes `line` followed by [`EOL`], folding it so that no physical line
/// exceeds `width` columns.
///
/// Continuation lines start with a single space which counts towards the
/// width.
pub fn write_folded<W: io::Write + ?Sized>(writer: &mut W, line: &str, width: usize) -> io::Result<()> {
    let mut rest = line;
    let mut first = true;
    loop {
        let room = if first { width } else { width - 1 };
        let mut piece = cut_str_to_max(rest, room);
        if piece.is_empty() && !rest.is_empty() {
            // a single character wider than the line; emit it anyway
            let first_char_len = rest.chars().next().map(char::len_utf8).unwrap_or(1);
            piece = &rest[..first_char_len];
        }
        if !first {
            writer.write_all(b" ")?;
        }
        writer.write_all(piece.as_bytes())?;
        writer.write_all(EOL.as_bytes())?;
        rest = &rest[piece.len()..];
        first = false;
        if rest.is_empty() {
            return Ok(());
        }
    }
}
