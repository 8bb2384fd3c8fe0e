//! In-memory record source.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;

use super::RecordSource;
use crate::models::Record;
use crate::Result;

/// Serves a fixed list of records in order.
#[derive(Debug, Default)]
pub struct MemorySource {
    records: VecDeque<Record>,
}

impl MemorySource {
    /// Build a source over `records`.
    #[must_use]
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records: records.into(),
        }
    }

    /// Records not yet handed out.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.records.len()
    }
}

impl RecordSource for MemorySource {
    fn read_batch(
        &mut self,
        max: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Record>>> + Send + '_>> {
        let take = max.min(self.records.len());
        let batch = self.records.drain(..take).collect();
        Box::pin(async move { Ok(batch) })
    }

    fn is_exhausted(&self) -> bool {
        self.records.is_empty()
    }
}
