//! Columnar batch streams over dataset sources
//!
//! [`create_stream`] groups the records of a [`DatasetSource`] into batches of
//! `batch_size` consecutive records and exposes them as a [`Range`]: every
//! cursor reopens the source and starts a new epoch. A failed batch is never
//! handed out partially; its error is yielded once and the cursor ends.

use std::sync::Arc;

use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::column::ColumnBuilder;
use crate::config::{EmptySourcePolicy, StreamConfig};
use crate::error::{Error, Result};
use crate::range::{Extent, Range, RangeIter};
use crate::record_batch::Batch;
use crate::schema::{ColumnRole, Schema};
use crate::source::{DatasetSource, RecordReader};
use crate::value::Record;

/// Create a restartable stream of batches over `source`
pub fn create_stream(source: Arc<dyn DatasetSource>, config: StreamConfig) -> Result<Range<Batch>> {
    config.validate()?;

    let extent = match source.size_hint() {
        Some(0) => match config.empty_source_policy {
            EmptySourcePolicy::EmitEmptyBatch => Extent::Finite(1),
            EmptySourcePolicy::EmitNothing => Extent::Finite(0),
        },
        Some(records) => Extent::Finite(records.div_ceil(config.batch_size)),
        None => Extent::Unknown,
    };

    let prefetch = config.prefetch;
    let stream = Range::try_from_fn(extent, move || {
        let reader = source.open()?;
        Ok(BatchCursor::new(source.schema(), reader, config.clone()))
    });
    if prefetch > 0 {
        stream.buffered(prefetch)
    } else {
        Ok(stream)
    }
}

/// Cursor producing the batches of a single epoch
struct BatchCursor {
    schema: Arc<Schema>,
    reader: Box<dyn RecordReader>,
    builders: Vec<ColumnBuilder>,
    config: StreamConfig,
    epoch: Uuid,
    batches: usize,
    rows: usize,
    exhausted: bool,
    finished: bool,
}

impl BatchCursor {
    fn new(schema: Arc<Schema>, reader: Box<dyn RecordReader>, config: StreamConfig) -> Self {
        let epoch = Uuid::new_v4();
        debug!(%epoch, batch_size = config.batch_size, columns = schema.len(), "starting epoch");
        let builders = schema
            .fields()
            .iter()
            .map(|field| ColumnBuilder::new(field, config.batch_size))
            .collect();
        Self {
            schema,
            reader,
            builders,
            config,
            epoch,
            batches: 0,
            rows: 0,
            exhausted: false,
            finished: false,
        }
    }

    fn append(&mut self, record: &Record, position: usize) -> Result<()> {
        for (field, builder) in self.schema.fields().iter().zip(&mut self.builders) {
            let value = record.get(field.name()).ok_or_else(|| {
                Error::Schema(format!("Record is missing column '{}'", field.name()))
            })?;
            match field.role() {
                ColumnRole::PerRow => builder.push(value)?,
                ColumnRole::PerBatch if position == 0 => builder.push(value)?,
                ColumnRole::PerBatch => {}
            }
        }
        Ok(())
    }

    fn fill(&mut self) -> Result<usize> {
        let mut count = 0;
        while count < self.config.batch_size && !self.exhausted {
            match self.reader.next_record()? {
                Some(record) => {
                    self.append(&record, count)?;
                    count += 1;
                }
                None => self.exhausted = true,
            }
        }
        Ok(count)
    }

    fn next_batch(&mut self) -> Result<Option<Batch>> {
        let count = self.fill()?;
        if count == 0 {
            let emit_empty = self.batches == 0
                && self.config.empty_source_policy == EmptySourcePolicy::EmitEmptyBatch;
            return Ok(emit_empty.then(|| Batch::empty(Arc::clone(&self.schema))));
        }

        let columns = self
            .builders
            .iter_mut()
            .map(ColumnBuilder::finish)
            .collect::<Result<Vec<_>>>()?;
        Batch::new(Arc::clone(&self.schema), columns).map(Some)
    }
}

impl Iterator for BatchCursor {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.next_batch() {
            Ok(Some(batch)) => {
                if self.config.log_batches {
                    trace!(
                        epoch = %self.epoch,
                        batch = self.batches,
                        rows = batch.row_count(),
                        "emitting batch"
                    );
                }
                self.batches += 1;
                self.rows += batch.row_count();
                Some(Ok(batch))
            }
            Ok(None) => {
                self.finished = true;
                debug!(epoch = %self.epoch, batches = self.batches, rows = self.rows, "epoch finished");
                None
            }
            Err(e) => {
                self.finished = true;
                warn!(epoch = %self.epoch, batch = self.batches, error = %e, "failed to build batch");
                Some(Err(e))
            }
        }
    }
}

/// Regroup a stream of batches into batches of exactly `batch_size` rows.
///
/// Only the last batch may be shorter. Incoming batches without rows are
/// skipped, so an all-empty stream yields no batches.
pub fn rebatch(stream: &Range<Batch>, batch_size: usize) -> Result<Range<Batch>> {
    if batch_size == 0 {
        return Err(Error::InvalidArgument("batch_size must be at least 1".into()));
    }
    let extent = match stream.extent() {
        Extent::Unbounded => Extent::Unbounded,
        Extent::Finite(_) | Extent::Unknown => Extent::Unknown,
    };
    let stream = stream.clone();
    Ok(Range::try_from_fn(extent, move || {
        Ok(RebatchCursor {
            inner: stream.create(),
            pending: Vec::new(),
            pending_rows: 0,
            batch_size,
            finished: false,
        })
    }))
}

struct RebatchCursor {
    inner: RangeIter<Batch>,
    pending: Vec<Batch>,
    pending_rows: usize,
    batch_size: usize,
    finished: bool,
}

impl RebatchCursor {
    fn next_batch(&mut self) -> Result<Option<Batch>> {
        while self.pending_rows < self.batch_size {
            match self.inner.next() {
                Some(batch) => {
                    let batch = batch?;
                    if !batch.is_empty() {
                        self.pending_rows += batch.row_count();
                        self.pending.push(batch);
                    }
                }
                None => break,
            }
        }

        let Some(first) = self.pending.first() else {
            return Ok(None);
        };
        let schema = Arc::clone(first.schema());
        let joined = Batch::concat(schema, &std::mem::take(&mut self.pending))?;
        let total = joined.row_count();
        if total <= self.batch_size {
            self.pending_rows = 0;
            return Ok(Some(joined));
        }

        let rest = joined.slice(self.batch_size, total - self.batch_size)?;
        self.pending_rows = rest.row_count();
        self.pending.push(rest);
        joined.slice(0, self.batch_size).map(Some)
    }
}

impl Iterator for RebatchCursor {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_batch() {
            Ok(Some(batch)) => Some(Ok(batch)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
