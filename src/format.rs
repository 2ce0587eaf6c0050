//! Reader and writer contracts shared by the LDIF and DSML formats.

use std::io::{self, BufRead, Write};
use std::path::Path;

use crate::dsml::Dsml;
use crate::error::ReadError;
use crate::ldif::Ldif;
use crate::record::{ChangeRecord, Entry};


/// Lazy producer of change records.
///
/// Iteration yields records in source order and ends with `None`. A reader
/// holds a borrowed stream and never closes it; `close` only releases the
/// reader's own state and is legal at any point.
pub trait FormatReader: Iterator<Item = Result<ChangeRecord, ReadError>> {
    fn close(&mut self) -> io::Result<()>;
}


/// Consumer of entries.
///
/// `close` emits whatever epilogue the format needs and flushes, but leaves
/// the stream open.
pub trait FormatWriter {
    fn print_entry(&mut self, entry: &Entry) -> io::Result<()>;
    fn close(&mut self) -> io::Result<()>;
}


/// Factory for the reader and writer of one format.
pub trait Format {
    fn name(&self) -> &'static str;

    fn open_reader<'a>(&self, input: &'a mut dyn BufRead) -> Result<Box<dyn FormatReader + 'a>, ReadError>;

    fn create_writer<'a>(&self, output: &'a mut dyn Write) -> io::Result<Box<dyn FormatWriter + 'a>>;
}
impl<F: Format + ?Sized> Format for &F {
    fn name(&self) -> &'static str { (**self).name() }

    fn open_reader<'a>(&self, input: &'a mut dyn BufRead) -> Result<Box<dyn FormatReader + 'a>, ReadError> {
        (**self).open_reader(input)
    }

    fn create_writer<'a>(&self, output: &'a mut dyn Write) -> io::Result<Box<dyn FormatWriter + 'a>> {
        (**self).create_writer(output)
    }
}


/// Runtime choice between the supported formats.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, clap::ValueEnum)]
pub enum FormatKind {
    Ldif,
    Dsml,
}
impl FormatKind {
    /// Guesses the format from a file extension, defaulting to LDIF.
    pub fn from_path(path: &Path) -> Self {
        let extension = path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match extension.as_deref() {
            Some("dsml") | Some("xml") => Self::Dsml,
            _ => Self::Ldif,
        }
    }
}
impl Format for FormatKind {
    fn name(&self) -> &'static str {
        match self {
            Self::Ldif => Ldif.name(),
            Self::Dsml => Dsml.name(),
        }
    }

    fn open_reader<'a>(&self, input: &'a mut dyn BufRead) -> Result<Box<dyn FormatReader + 'a>, ReadError> {
        match self {
            Self::Ldif => Ldif.open_reader(input),
            Self::Dsml => Dsml.open_reader(input),
        }
    }

    fn create_writer<'a>(&self, output: &'a mut dyn Write) -> io::Result<Box<dyn FormatWriter + 'a>> {
        match self {
            Self::Ldif => Ldif.create_writer(output),
            Self::Dsml => Dsml.create_writer(output),
        }
    }
}
