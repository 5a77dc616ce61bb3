//! Dataset sources for colstream batch streams
//!
//! This crate provides [`ImageFolderSource`], a [`DatasetSource`] over a
//! directory of fixed-shape raw images with optional CSV labels.

#![warn(missing_docs)]

mod error;
pub mod image;
pub mod labels;

pub use error::{Error, Result};
pub use image::{ImageDecoder, ImageFolderOptions, ImageFolderSource, RawImageDecoder};
pub use labels::{load_label_csv, LabelDictionary};

// Re-export core types
pub use colstream_core::{DatasetSource, Record, RecordReader, Schema};
