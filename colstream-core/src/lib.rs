//! Core ranges, typed containers and columnar batch streams for ML data loading
//!
//! This crate provides the in-process half of the loader: lazy restartable
//! [`Range`]s with host-style indexing and slicing, the typed container model
//! ([`NdArray`], [`Record`]), named [`Column`]s grouped into [`Batch`]es, and
//! [`create_stream`], which turns any [`DatasetSource`] into a stream of
//! fixed-size batches. Batch transforms ([`MapColumns`], [`RandomFill`], ...)
//! reshape streams lazily, and [`Range::buffered`] prefetches them on a
//! background thread.

#![warn(missing_docs)]

pub mod column;
pub mod config;
pub mod error;
pub mod prefetch;
pub mod random;
pub mod range;
pub mod record_batch;
pub mod schema;
pub mod source;
pub mod stream;
pub mod transform;
pub mod value;

// Re-export key types for convenience
pub use column::{Column, ColumnBuilder};
pub use config::{EmptySourcePolicy, StreamConfig};
pub use error::{Error, Result};
pub use random::{generate_groups, generate_many_groups, RandomFill, SharedRng};
pub use range::{Extent, Range, RangeIter};
pub use record_batch::Batch;
pub use schema::{ColumnRole, ElementKind, Field, Schema};
pub use source::{DatasetSource, InMemorySource, RecordReader};
pub use stream::{create_stream, rebatch};
pub use transform::{
    apply_transform, BatchTransform, DropColumn, ForEachColumns, MapColumn, MapColumns,
    TransformChain,
};
pub use value::{ArrayData, Element, NdArray, ObjectRef, Record, Scalar};

static_assertions::assert_impl_all!(Range<Batch>: Send, Sync);
static_assertions::assert_impl_all!(RangeIter<Batch>: Send);
static_assertions::assert_impl_all!(Batch: Send, Sync);
static_assertions::assert_impl_all!(NdArray: Send, Sync);
static_assertions::assert_impl_all!(Error: Send, Sync);
static_assertions::assert_impl_all!(MapColumns: BatchTransform);
static_assertions::assert_impl_all!(RandomFill: BatchTransform);
