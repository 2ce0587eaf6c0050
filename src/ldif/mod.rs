//! LDAP Data Interchange Format (RFC 2849).

mod reader;
mod writer;


use std::io::{self, BufRead, Write};

use crate::error::ReadError;
use crate::format::{Format, FormatReader, FormatWriter};

pub use crate::ldif::reader::LdifReader;
pub use crate::ldif::writer::{LdifWriter, WRAP_COLUMN};


#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Ldif;
impl Format for Ldif {
    fn name(&self) -> &'static str { "LDIF" }

    fn open_reader<'a>(&self, input: &'a mut dyn BufRead) -> Result<Box<dyn FormatReader + 'a>, ReadError> {
        Ok(Box::new(LdifReader::new(input)))
    }

    fn create_writer<'a>(&self, output: &'a mut dyn Write) -> io::Result<Box<dyn FormatWriter + 'a>> {
        Ok(Box::new(LdifWriter::new(output)))
    }
}
