//! Archive building and reading.
//!
//! This module owns the data-file side of the engine:
//!
//! - [`builder`] - Streaming packer: files -> line-split chunks -> data file
//! - [`reader`] - Sequential chunk streaming and body decoding
//! - [`index`] - Per-chunk bloom index over case-folded 4-grams
//! - [`codec`] - LZ4 block compression adapter
//! - [`types`] - On-disk layout and build configuration
//! - [`stats`] - Build counters and progress reporting

pub mod builder;
pub mod codec;
pub mod index;
pub mod reader;
pub mod stats;
pub mod types;

pub use builder::{build_project, Builder};
pub use reader::ChunkReader;
pub use types::{ArchiveConfig, ChunkFileHeader, ChunkHeader};
