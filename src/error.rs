use std::fmt;
use std::io;

use crate::record::ResultCode;


/// Where in the source a parse error was detected.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Location {
    /// 1-based physical line of an LDIF source.
    Line(usize),

    /// Byte offset into the source.
    Offset(u64),

    /// Element path within a DSML document.
    Element(String),

    Unknown,
}
impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Line(line) => write!(f, "line {}", line),
            Self::Offset(offset) => write!(f, "byte {}", offset),
            Self::Element(path) => write!(f, "{}", path),
            Self::Unknown => write!(f, "unknown location"),
        }
    }
}


/// A change record or entry violated one of the model invariants.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, thiserror::Error)]
pub enum ModelError {
    #[error("distinguished name is empty")]
    EmptyDn,

    #[error("attribute name is empty")]
    EmptyAttributeName,

    #[error("attribute {0:?} has no values")]
    NoValues(String),

    #[error("attribute {0:?} appears more than once")]
    DuplicateAttribute(String),

    #[error("modify record carries no modifications")]
    NoModifications,

    #[error("new RDN is empty")]
    EmptyNewRdn,
}


#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, thiserror::Error)]
pub enum ParseErrorKind {
    #[error("malformed line")]
    MalformedLine,

    #[error("record does not start with a dn line")]
    MissingDn,

    #[error("invalid base64 value")]
    InvalidBase64,

    #[error("value is not valid UTF-8")]
    InvalidUtf8,

    #[error("unknown change type {0:?}")]
    UnknownChangeType(String),

    #[error("unknown modification type {0:?}")]
    UnknownModification(String),

    #[error("values by URL reference are not supported")]
    UnsupportedReference,

    #[error("unexpected line {0:?}")]
    UnexpectedLine(String),

    #[error("invalid record: {0}")]
    InvalidRecord(ModelError),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("document is not DSML: {0}")]
    NotDsml(String),
}


/// A fault in the byte stream being read.
///
/// `may_continue` tells the caller whether the reader is still positioned at
/// a record boundary and can be asked for the next record.
#[derive(Clone, Debug, Eq, Hash, PartialEq, thiserror::Error)]
#[error("{kind} at {location}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub may_continue: bool,
    pub location: Location,
}
impl ParseError {
    pub fn new(kind: ParseErrorKind, may_continue: bool, location: Location) -> Self {
        Self { kind, may_continue, location }
    }

    pub fn recoverable(kind: ParseErrorKind, location: Location) -> Self {
        Self::new(kind, true, location)
    }

    pub fn fatal(kind: ParseErrorKind, location: Location) -> Self {
        Self::new(kind, false, location)
    }

    pub fn invalid_record(error: ModelError, location: Location) -> Self {
        Self::recoverable(ParseErrorKind::InvalidRecord(error), location)
    }
}


/// Error produced by a format reader.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
impl ReadError {
    /// Whether the reader can still produce records after this error.
    pub fn may_continue(&self) -> bool {
        match self {
            Self::Parse(e) => e.may_continue,
            Self::Io(_) => false,
        }
    }
}


/// The directory refused the operation.
#[derive(Clone, Debug, Eq, Hash, PartialEq, thiserror::Error)]
#[error("directory returned {code}: {message}")]
pub struct DirectoryError {
    pub code: ResultCode,
    pub message: String,
}
impl DirectoryError {
    pub fn new<M: Into<String>>(code: ResultCode, message: M) -> Self {
        Self { code, message: message.into() }
    }
}


/// The transport to the directory failed.
#[derive(Debug, thiserror::Error)]
#[error("connection failed: {message}")]
pub struct ConnectionError {
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}
impl ConnectionError {
    pub fn new<M: Into<String>>(message: M) -> Self {
        Self { message: message.into(), source: None }
    }

    pub fn with_source<M, E>(message: M, source: E) -> Self
            where
                M: Into<String>,
                E: std::error::Error + Send + Sync + 'static {
        Self { message: message.into(), source: Some(Box::new(source)) }
    }
}


/// Error returned by a [`Connection`](crate::directory::Connection).
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}


/// Error raised by the format handler in strict mode.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
impl From<ReadError> for Error {
    fn from(value: ReadError) -> Self {
        match value {
            ReadError::Parse(e) => Self::Parse(e),
            ReadError::Io(e) => Self::Io(e),
        }
    }
}
impl From<OperationError> for Error {
    fn from(value: OperationError) -> Self {
        match value {
            OperationError::Connection(e) => Self::Connection(e),
            OperationError::Directory(e) => Self::Directory(e),
        }
    }
}
