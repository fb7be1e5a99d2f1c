//! worksignal.input.v1 schema
//!
//! This module defines the raw input records supplied by an external loader
//! and the adapter that validates them at the pipeline boundary.

mod adapter;
mod raw_record;

pub use adapter::*;
pub use raw_record::*;
