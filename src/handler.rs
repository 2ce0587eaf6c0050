//! Drives a format's reader into a directory (`load`) and a directory search
//! into a format's writer (`dump`).

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::directory::Connection;
use crate::error::{DirectoryError, Error, OperationError, ReadError};
use crate::format::{Format, FormatReader, FormatWriter};
use crate::record::{ChangeRecord, Entry, SearchRequest};


/// Whether errors end in the log or are also returned to the caller.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Mode {
    /// Errors are logged; the call returns a summary.
    #[default]
    Tolerant,

    /// Errors that stop the operation are logged and then returned.
    Strict,
}


/// Shared flag used to stop a load or dump between records.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);
impl CancelFlag {
    pub fn new() -> Self { Self::default() }
    pub fn cancel(&self) { self.0.store(true, Ordering::SeqCst) }
    pub fn is_cancelled(&self) -> bool { self.0.load(Ordering::SeqCst) }
}


#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    /// Skip records that fail to parse (if the reader can continue) or that
    /// the directory rejects.
    pub ignore_errors: bool,
    pub mode: Mode,
    pub cancel: Option<CancelFlag>,
}
impl LoadOptions {
    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map(|c| c.is_cancelled()).unwrap_or(false)
    }
}


#[derive(Clone, Debug, Default)]
pub struct DumpOptions {
    pub mode: Mode,
    pub cancel: Option<CancelFlag>,
}
impl DumpOptions {
    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map(|c| c.is_cancelled()).unwrap_or(false)
    }
}


#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct LoadSummary {
    /// Records accepted by the directory.
    pub applied: usize,

    /// Records dropped because of a tolerated error.
    pub skipped: usize,

    /// Whether the input was read to the end.
    pub complete: bool,
}


#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct DumpSummary {
    pub written: usize,

    /// Whether every entry returned by the search was written.
    pub complete: bool,
}


/// Closes the reader when dropped unless it was closed explicitly.
struct ReaderGuard<'a> {
    reader: Box<dyn FormatReader + 'a>,
    closed: bool,
}
impl<'a> ReaderGuard<'a> {
    fn new(reader: Box<dyn FormatReader + 'a>) -> Self { Self { reader, closed: false } }

    fn next(&mut self) -> Option<Result<ChangeRecord, ReadError>> {
        self.reader.next()
    }

    fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        self.reader.close()
    }
}
impl Drop for ReaderGuard<'_> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                error!(error = %e, "I/O error closing the input stream reader");
            }
        }
    }
}


/// Closes the writer, emitting the epilogue, when dropped unless it was
/// closed explicitly.
struct WriterGuard<'a> {
    writer: Box<dyn FormatWriter + 'a>,
    closed: bool,
}
impl<'a> WriterGuard<'a> {
    fn new(writer: Box<dyn FormatWriter + 'a>) -> Self { Self { writer, closed: false } }

    fn print_entry(&mut self, entry: &Entry) -> io::Result<()> {
        self.writer.print_entry(entry)
    }

    fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        self.writer.close()
    }
}
impl Drop for WriterGuard<'_> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                error!(error = %e, "I/O error writing directory entries to the output stream");
            }
        }
    }
}


/// Loads and dumps directory entries in one format.
///
/// The handler keeps no state between calls. Streams passed in are borrowed
/// and never closed.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FormatHandler<F> {
    format: F,
}
impl<F: Format> FormatHandler<F> {
    pub fn new(format: F) -> Self { Self { format } }

    pub fn format(&self) -> &F { &self.format }

    /// Reads change records from `input` and applies them to the directory
    /// one at a time, in source order.
    ///
    /// Records already applied stay applied if the load stops early.
    pub fn load<C: Connection + ?Sized>(
        &self,
        connection: &mut C,
        input: &mut dyn BufRead,
        options: &LoadOptions,
    ) -> Result<LoadSummary, Error> {
        let format_name = self.format.name();
        let mut summary = LoadSummary::default();

        let mut reader = match self.format.open_reader(input) {
            Ok(reader) => ReaderGuard::new(reader),
            Err(e) => {
                error!(format = format_name, error = %e, "Could not open the reader");
                return conclude(options.mode, Some(e.into()), summary);
            },
        };

        let mut failure: Option<Error> = None;
        loop {
            if options.is_cancelled() {
                warn!(format = format_name, "load cancelled");
                break;
            }

            let record = match reader.next() {
                None => {
                    summary.complete = true;
                    break;
                },
                Some(Ok(record)) => record,
                Some(Err(ReadError::Parse(e))) => {
                    error!(format = format_name, error = %e, "Error parsing directory entry read from the input stream");
                    if options.ignore_errors && e.may_continue {
                        summary.skipped += 1;
                        continue;
                    }
                    failure = Some(e.into());
                    break;
                },
                Some(Err(ReadError::Io(e))) => {
                    error!(format = format_name, error = %e, "I/O error reading directory entry from input stream");
                    failure = Some(e.into());
                    break;
                },
            };

            if options.is_cancelled() {
                warn!(format = format_name, dn = record.dn(), "load cancelled");
                break;
            }

            match connection.apply(&record) {
                Ok(()) => {
                    debug!(dn = record.dn(), kind = record.kind(), "applied change record");
                    summary.applied += 1;
                },
                Err(OperationError::Directory(e)) => {
                    error!(dn = record.dn(), error = %e, "Error loading directory entry into the LDAP directory server");
                    if options.ignore_errors {
                        summary.skipped += 1;
                        continue;
                    }
                    failure = Some(e.into());
                    break;
                },
                Err(OperationError::Connection(e)) => {
                    error!(dn = record.dn(), error = %e, "Error loading directory entry into the LDAP directory server");
                    failure = Some(e.into());
                    break;
                },
            }
        }

        if let Err(e) = reader.close() {
            error!(format = format_name, error = %e, "I/O error closing the input stream reader");
        }

        info!(
            format = format_name,
            applied = summary.applied,
            skipped = summary.skipped,
            complete = summary.complete,
            "load finished"
        );
        conclude(options.mode, failure, summary)
    }

    /// Searches the subtree below `base` and writes each matching entry to
    /// `output` in the order the directory returned them.
    ///
    /// The document epilogue is written even when the search or a write
    /// fails, so the output stays well-formed up to the failure.
    pub fn dump<C: Connection + ?Sized>(
        &self,
        connection: &mut C,
        base: &str,
        filter: &str,
        output: &mut dyn Write,
        options: &DumpOptions,
    ) -> Result<DumpSummary, Error> {
        let format_name = self.format.name();
        let mut summary = DumpSummary::default();

        let mut writer = match self.format.create_writer(output) {
            Ok(writer) => WriterGuard::new(writer),
            Err(e) => {
                error!(format = format_name, error = %e, "Could not create and initialise the writer");
                return conclude(options.mode, Some(e.into()), summary);
            },
        };

        let mut failure: Option<Error> = None;
        let request = SearchRequest::subtree(base, filter);
        match connection.search(&request) {
            Ok(result) if result.code.is_success() => {
                summary.complete = true;
                for entry in &result.entries {
                    if options.is_cancelled() {
                        warn!(format = format_name, "dump cancelled");
                        summary.complete = false;
                        break;
                    }
                    if let Err(e) = writer.print_entry(entry) {
                        error!(format = format_name, dn = entry.dn(), error = %e, "I/O error writing directory entries to the output stream");
                        summary.complete = false;
                        failure = Some(e.into());
                        break;
                    }
                    summary.written += 1;
                }
            },
            Ok(result) => {
                error!(base, filter, code = %result.code, message = result.message.as_str(), "Search operation failed");
                failure = Some(DirectoryError::new(result.code, result.message).into());
            },
            Err(e) => {
                error!(base, filter, error = %e, "Error searching the LDAP directory server");
                failure = Some(e.into());
            },
        }

        if let Err(e) = writer.close() {
            error!(format = format_name, error = %e, "I/O error writing directory entries to the output stream");
            summary.complete = false;
            failure.get_or_insert(e.into());
        }

        info!(format = format_name, written = summary.written, complete = summary.complete, "dump finished");
        conclude(options.mode, failure, summary)
    }
}


fn conclude<T>(mode: Mode, failure: Option<Error>, summary: T) -> Result<T, Error> {
    match (mode, failure) {
        (Mode::Strict, Some(e)) => Err(e),
        _ => Ok(summary),
    }
}
