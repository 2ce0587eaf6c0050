use std::io::{self, Write};

use unicase::UniCase;

use crate::enc::{encode_base64, is_safe_value, write_folded, EOL};
use crate::format::FormatWriter;
use crate::record::Entry;


/// Physical line width before folding.
pub const WRAP_COLUMN: usize = 76;


/// Writes entries as LDIF content records.
///
/// Entries are separated by exactly one blank line; nothing precedes the
/// first entry or follows the last one.
#[derive(Debug)]
pub struct LdifWriter<W> {
    output: W,
    entries_written: usize,
    closed: bool,
}
impl<W: Write> LdifWriter<W> {
    pub fn new(output: W) -> Self {
        Self {
            output,
            entries_written: 0,
            closed: false,
        }
    }

    pub fn entries_written(&self) -> usize { self.entries_written }
}
impl<W: Write> FormatWriter for LdifWriter<W> {
    fn print_entry(&mut self, entry: &Entry) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::Other, "LDIF writer is closed"));
        }

        let mut buffer = Vec::new();
        if self.entries_written > 0 {
            buffer.extend_from_slice(EOL.as_bytes());
        }
        write_value_line(&mut buffer, "dn", entry.dn().as_bytes())?;
        if entry.attributes().first().map_or(false, |a| is_directive(a.name())) {
            // otherwise the first attribute reads as a directive
            write_value_line(&mut buffer, "changetype", b"add")?;
        }
        for attribute in entry.attributes() {
            for value in attribute.values() {
                write_value_line(&mut buffer, attribute.name(), value)?;
            }
        }
        self.output.write_all(&buffer)?;
        self.entries_written += 1;
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.output.flush()
    }
}


fn is_directive(name: &str) -> bool {
    let name = UniCase::new(name);
    name == UniCase::new("changetype") || name == UniCase::new("control")
}


fn write_value_line(buffer: &mut Vec<u8>, name: &str, value: &[u8]) -> io::Result<()> {
    let line = if value.is_empty() {
        format!("{}:", name)
    } else if is_safe_value(value) {
        // is_safe_value guarantees UTF-8
        format!("{}: {}", name, String::from_utf8_lossy(value))
    } else {
        format!("{}:: {}", name, encode_base64(value))
    };
    write_folded(buffer, &line, WRAP_COLUMN)
}
