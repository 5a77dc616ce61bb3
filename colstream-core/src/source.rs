//! Dataset source interface and an in-memory implementation

use std::sync::Arc;

use crate::error::Result;
use crate::schema::Schema;
use crate::value::Record;

/// A source of per-item records that can be reopened for every epoch
#[cfg_attr(test, mockall::automock)]
pub trait DatasetSource: Send + Sync {
    /// Get the schema of the records produced by this source
    fn schema(&self) -> Arc<Schema>;

    /// Open a fresh reader positioned at the first record
    fn open(&self) -> Result<Box<dyn RecordReader>>;

    /// Provides a hint about the total number of records (if known)
    fn size_hint(&self) -> Option<usize> {
        None
    }
}

/// A single-owner cursor over the records of one epoch
#[cfg_attr(test, mockall::automock)]
pub trait RecordReader: Send {
    /// Retrieve the next record.
    /// Returns None when exhausted
    fn next_record(&mut self) -> Result<Option<Record>>;
}

/// A source backed by records held in memory
#[derive(Debug, Clone)]
pub struct InMemorySource {
    /// Schema of the records
    schema: Arc<Schema>,

    /// Records shared by every reader
    records: Arc<[Record]>,
}

impl InMemorySource {
    /// Create a new in-memory source
    pub fn new(schema: Arc<Schema>, records: Vec<Record>) -> Self {
        Self {
            schema,
            records: records.into(),
        }
    }

    /// Get the records of this source
    pub fn records(&self) -> &[Record] {
        &self.records
    }
}

impl DatasetSource for InMemorySource {
    fn schema(&self) -> Arc<Schema> {
        Arc::clone(&self.schema)
    }

    fn open(&self) -> Result<Box<dyn RecordReader>> {
        Ok(Box::new(InMemoryReader {
            records: Arc::clone(&self.records),
            position: 0,
        }))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.records.len())
    }
}

/// Reader over an [`InMemorySource`]
struct InMemoryReader {
    records: Arc<[Record]>,
    position: usize,
}

impl RecordReader for InMemoryReader {
    fn next_record(&mut self) -> Result<Option<Record>> {
        let record = self.records.get(self.position).cloned();
        if record.is_some() {
            self.position += 1;
        }
        Ok(record)
    }
}
