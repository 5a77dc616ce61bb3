//! Host-facing conversion layer for colstream
//!
//! Renders typed arrays, batches and batch streams as host values
//! ([`HostValue`], [`HostArray`]) and converts host values back, keeping the
//! element dtype of every array, including empty ones.

#![warn(missing_docs)]

pub mod convert;
pub mod host;

pub use convert::{
    batch_to_host, columns_from_host, from_host, from_host_as, stream_to_host, to_host,
    to_host_list,
};
pub use host::{DType, HostArray, HostBuffer, HostNumeric, HostValue};

static_assertions::assert_impl_all!(HostValue: Send, Sync, Clone);
static_assertions::assert_impl_all!(HostArray: Send, Sync);
