//! # QGD - Whole-Project Code Search
//!
//! QGD searches an entire project through an offline-prepared data file:
//! source files are packed into fixed-target-size chunks, each chunk is
//! LZ4-compressed and carries a bloom filter over its case-folded 4-grams,
//! and searches stream the file with sequential decompression feeding a
//! parallel regex matcher.
//!
//! ## Architecture
//!
//! - [`archive`] - Building and reading the `.qgd` data file
//! - [`search`] - Parallel search pipeline (pool, queue, ordered output)
//! - [`output`] - Match line formatting
//! - [`utils`] - Case folding, bloom filter, byte encoding helpers
//!
//! ## Quick Start
//!
//! ```ignore
//! use qgd::archive::build_project;
//! use qgd::search::{search_project, SearchOptions};
//! use std::path::Path;
//!
//! build_project(Path::new("/path/to/project")).unwrap();
//!
//! let options = SearchOptions::default();
//! search_project(
//!     Path::new("/path/to/project"),
//!     "fn main",
//!     options,
//!     Box::new(std::io::stdout()),
//! )
//! .unwrap();
//! ```
//!
//! ## Why chunks
//!
//! The chunk is the unit of compression, indexing, and parallelism. Files
//! are split only on line boundaries, so a match never straddles two
//! chunks, and each fragment records the line number where it starts so
//! reported positions are absolute within the original file.

pub mod archive;
pub mod output;
pub mod search;
pub mod utils;
