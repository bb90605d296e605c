//! Tandem Core - document engine seam and awareness values
//!
//! This crate provides the pieces every other Tandem crate builds on:
//! - Capability-scoped read/write handles over an external CRDT document
//! - A yrs-backed document implementing those handles
//! - The JSON value type carried as awareness state

pub mod document;
pub mod error;
pub mod value;

pub use document::{
    ClientId, DocRead, DocWrite, Document, DocumentEngine, DocumentId, DocumentMeta, ReadHandle,
    WriteHandle,
};
pub use error::{Error, Result};
pub use value::{Number, Value};
