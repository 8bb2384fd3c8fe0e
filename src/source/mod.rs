//! Record sources feeding the session loop.
//!
//! The loop only needs "read up to K records" and "is exhausted"; the
//! [`RecordSource`] trait captures exactly that so file-backed and in-memory
//! sources are interchangeable.

pub mod csv;
pub mod memory;

use std::future::Future;
use std::pin::Pin;

use crate::models::Record;
use crate::Result;

pub use csv::CsvRecordSource;
pub use memory::MemorySource;

/// A lazily consumed supply of validated records.
pub trait RecordSource: Send {
    /// Read up to `max` records; fewer (possibly none) once exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Source`](crate::AppError::Source) or
    /// [`AppError::InvalidRecord`](crate::AppError::InvalidRecord) when the
    /// underlying data cannot be read or parsed.
    fn read_batch(
        &mut self,
        max: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Record>>> + Send + '_>>;

    /// Whether every record has been handed out.
    fn is_exhausted(&self) -> bool;
}
