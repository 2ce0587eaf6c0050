//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::io::{self, Read, Write};
use std::rc::Rc;
use std::sync::Once;

use ldapfix::error::{DirectoryError, OperationError};
use ldapfix::record::{SearchRequest, SearchResult};
use ldapfix::{ChangeRecord, Connection, Entry, EntryBuilder, ResultCode};


static INIT: Once = Once::new();

/// Routes log output to the test harness when RUST_LOG is set.
pub fn init_test_logging() {
    INIT.call_once(|| {
        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::fmt()
                .with_test_writer()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .try_init()
                .ok();
        }
    });
}


/// Connection double that records every call.
#[derive(Debug, Default)]
pub struct RecordingConnection {
    pub applied: Vec<ChangeRecord>,
    pub searches: Vec<SearchRequest>,
    pub reject: Vec<String>,
    pub search_result: Option<SearchResult>,
}
impl RecordingConnection {
    pub fn new() -> Self { Self::default() }

    pub fn returning(entries: Vec<Entry>) -> Self {
        Self {
            search_result: Some(SearchResult::success(entries)),
            ..Self::default()
        }
    }

    pub fn applied_dns(&self) -> Vec<&str> {
        self.applied.iter().map(|r| r.dn()).collect()
    }
}
impl Connection for RecordingConnection {
    fn apply(&mut self, record: &ChangeRecord) -> Result<(), OperationError> {
        if self.reject.iter().any(|dn| dn == record.dn()) {
            return Err(DirectoryError::new(ResultCode::ENTRY_ALREADY_EXISTS, "rejected").into());
        }
        self.applied.push(record.clone());
        Ok(())
    }

    fn search(&mut self, request: &SearchRequest) -> Result<SearchResult, OperationError> {
        self.searches.push(request.clone());
        Ok(self.search_result.clone().unwrap_or_else(|| SearchResult::success(Vec::new())))
    }
}


/// Byte source that counts how much has been pulled out of it.
pub struct CountingReader {
    inner: io::Cursor<Vec<u8>>,
    bytes_read: Rc<Cell<usize>>,
}
impl CountingReader {
    pub fn new(data: &[u8]) -> (Self, Rc<Cell<usize>>) {
        let counter = Rc::new(Cell::new(0));
        let reader = Self {
            inner: io::Cursor::new(data.to_vec()),
            bytes_read: counter.clone(),
        };
        (reader, counter)
    }
}
impl Read for CountingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = self.inner.read(buf)?;
        self.bytes_read.set(self.bytes_read.get() + count);
        Ok(count)
    }
}


/// Byte sink that stays inspectable while a writer holds a handle to it.
#[derive(Clone, Debug, Default)]
pub struct SharedSink {
    bytes: Rc<RefCell<Vec<u8>>>,
    flushes: Rc<Cell<usize>>,
}
impl SharedSink {
    pub fn text(&self) -> String { String::from_utf8(self.bytes.borrow().clone()).unwrap() }
    pub fn flushes(&self) -> usize { self.flushes.get() }
}
impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flushes.set(self.flushes.get() + 1);
        Ok(())
    }
}


pub fn entry(dn: &str, pairs: &[(&str, &str)]) -> Entry {
    let mut builder = EntryBuilder::new(dn);
    for (name, value) in pairs {
        builder.push_value(name, value.as_bytes().to_vec());
    }
    builder.build().unwrap()
}


pub fn people() -> Entry {
    entry(
        "ou=People,dc=btmatthews,dc=com",
        &[("objectclass", "organizationalUnit"), ("ou", "People")],
    )
}


pub fn bart() -> Entry {
    entry(
        "cn=Bart Simpson,ou=People,dc=btmatthews,dc=com",
        &[
            ("objectclass", "inetOrgPerson"),
            ("cn", "Bart Simpson"),
            ("sn", "Simpson"),
            ("givenName", "Bart"),
            ("uid", "bsimpson"),
        ],
    )
}


/// Drops whitespace between tags so XML compares independently of layout.
pub fn squash(xml: &str) -> String {
    xml.lines().map(str::trim).collect::<Vec<_>>().join("")
}
