use crate::error::OperationError;
use crate::record::{ChangeRecord, SearchRequest, SearchResult};


/// What the format handler needs from a directory.
///
/// Opening, binding and closing the underlying connection are the
/// implementation's business.
pub trait Connection {
    /// Applies one change record.
    fn apply(&mut self, record: &ChangeRecord) -> Result<(), OperationError>;

    /// Executes a search, returning the entries in directory order along
    /// with the outcome code.
    fn search(&mut self, request: &SearchRequest) -> Result<SearchResult, OperationError>;
}
impl<C: Connection + ?Sized> Connection for &mut C {
    fn apply(&mut self, record: &ChangeRecord) -> Result<(), OperationError> {
        (**self).apply(record)
    }

    fn search(&mut self, request: &SearchRequest) -> Result<SearchResult, OperationError> {
        (**self).search(request)
    }
}
