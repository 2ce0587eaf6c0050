//! Loading LDIF and DSML fixtures into LDAP directories and dumping
//! directory subtrees back out.

pub mod directory;
pub mod dsml;
pub mod enc;
pub mod error;
pub mod format;
pub mod handler;
pub mod ldap;
pub mod ldif;
pub mod record;
pub mod tiny_directory;


pub use crate::directory::Connection;
pub use crate::dsml::Dsml;
pub use crate::error::{ConnectionError, DirectoryError, Error, OperationError, ParseError, ReadError};
pub use crate::format::{Format, FormatKind, FormatReader, FormatWriter};
pub use crate::handler::{CancelFlag, DumpOptions, DumpSummary, FormatHandler, LoadOptions, LoadSummary, Mode};
pub use crate::ldif::Ldif;
pub use crate::record::{ChangeRecord, Entry, EntryBuilder, ResultCode};
pub use crate::tiny_directory::TinyDirectory;
