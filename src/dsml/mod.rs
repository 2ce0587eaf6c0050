//! Directory Services Markup Language v1, `directory-entries` dialect.

mod reader;
mod writer;


use std::io::{self, BufRead, Write};

use crate::error::ReadError;
use crate::format::{Format, FormatReader, FormatWriter};

pub use crate::dsml::reader::DsmlReader;
pub use crate::dsml::writer::DsmlWriter;


pub const DSML_NAMESPACE: &str = "http://www.dsml.org/DSML";


#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Dsml;
impl Format for Dsml {
    fn name(&self) -> &'static str { "DSML" }

    fn open_reader<'a>(&self, input: &'a mut dyn BufRead) -> Result<Box<dyn FormatReader + 'a>, ReadError> {
        Ok(Box::new(DsmlReader::new(input)?))
    }

    fn create_writer<'a>(&self, output: &'a mut dyn Write) -> io::Result<Box<dyn FormatWriter + 'a>> {
        Ok(Box::new(DsmlWriter::new(output)?))
    }
}
