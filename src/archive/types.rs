//! On-disk layout of the archive data file.
//!
//! ```text
//! <project>.qgd
//! ├── magic "QGD0"
//! └── chunk*
//!     ├── ChunkHeader        (20 bytes, little-endian)
//!     ├── bloom index        (index_size raw bytes)
//!     └── compressed body    (compressed_size bytes, LZ4 block)
//! ```
//!
//! A decompressed chunk body is `file_count` fixed-size [`ChunkFileHeader`]s
//! followed by the names region and the data region; offsets are absolute
//! within the body. There is no trailer, so readers stream chunks until EOF.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::utils::encoding::{
    read_u16_le, read_u32_le, read_u64_le, write_u16_le, write_u32_le, write_u64_le,
};

/// Magic prefix of a data file.
pub const DATA_FILE_MAGIC: &[u8; 4] = b"QGD0";

/// Extension of the finished data file; the builder writes to the extension
/// with a trailing underscore and renames on success.
pub const DATA_FILE_EXTENSION: &str = "qgd";

/// Unit of compression, indexing, and parallel search.
pub const TARGET_CHUNK_SIZE: usize = 512 * 1024;

/// In-flight byte budget for the search work queue.
pub const MAX_QUEUED_CHUNK_DATA: usize = 128 * 1024 * 1024;

/// Outstanding-bytes budget for the search block pool.
pub const BLOCK_POOL_BUDGET: usize = 256 * 1024 * 1024;

/// The head chunk's output buffer is written through once it holds this much.
pub const BUFFERED_OUTPUT_FLUSH_THRESHOLD: usize = 32 * 1024;

/// Ceiling on a single chunk's buffered output; a worker past it waits for
/// its chunk to reach the head of the emit order.
pub const MAX_BUFFERED_OUTPUT: usize = 1024 * 1024;

/// Fixed-size chunk record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkHeader {
    pub file_count: u32,
    pub uncompressed_size: u32,
    pub compressed_size: u32,
    pub index_size: u32,
    pub index_hash_iterations: u32,
}

impl ChunkHeader {
    /// Serialized size in bytes.
    pub const SIZE: usize = 20;

    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        write_u32_le(writer, self.file_count)?;
        write_u32_le(writer, self.uncompressed_size)?;
        write_u32_le(writer, self.compressed_size)?;
        write_u32_le(writer, self.index_size)?;
        write_u32_le(writer, self.index_hash_iterations)
    }

    pub fn read_from<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        Ok(Self {
            file_count: read_u32_le(reader)?,
            uncompressed_size: read_u32_le(reader)?,
            compressed_size: read_u32_le(reader)?,
            index_size: read_u32_le(reader)?,
            index_hash_iterations: read_u32_le(reader)?,
        })
    }
}

/// Per-file header inside a decompressed chunk body.
///
/// `start_line` is the 1-based line offset of the fragment within its source
/// file, with 0 meaning "from the top"; a chunk whose first fragment has a
/// nonzero `start_line` continues a file from the previous chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkFileHeader {
    pub name_offset: u32,
    pub name_length: u16,
    pub data_offset: u32,
    pub data_size: u32,
    pub start_line: u32,
    pub reserved: u32,
    pub file_size: u64,
    pub time_stamp: u64,
}

impl ChunkFileHeader {
    /// Serialized size in bytes (fields packed in declaration order).
    pub const SIZE: usize = 38;

    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        write_u32_le(writer, self.name_offset)?;
        write_u16_le(writer, self.name_length)?;
        write_u32_le(writer, self.data_offset)?;
        write_u32_le(writer, self.data_size)?;
        write_u32_le(writer, self.start_line)?;
        write_u32_le(writer, self.reserved)?;
        write_u64_le(writer, self.file_size)?;
        write_u64_le(writer, self.time_stamp)
    }

    pub fn read_from<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        Ok(Self {
            name_offset: read_u32_le(reader)?,
            name_length: read_u16_le(reader)?,
            data_offset: read_u32_le(reader)?,
            data_size: read_u32_le(reader)?,
            start_line: read_u32_le(reader)?,
            reserved: read_u32_le(reader)?,
            file_size: read_u64_le(reader)?,
            time_stamp: read_u64_le(reader)?,
        })
    }
}

/// Build-time configuration, loaded from `<project>/.qgd.json` when present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Uncompressed chunk size the builder aims for.
    #[serde(default = "default_chunk_size")]
    pub target_chunk_size: usize,

    /// Files larger than this are skipped at build time.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Extra exclude globs applied on top of gitignore rules, matched
    /// against project-relative paths.
    #[serde(default)]
    pub excludes: Vec<String>,
}

fn default_chunk_size() -> usize {
    TARGET_CHUNK_SIZE
}

fn default_max_file_size() -> u64 {
    16 * 1024 * 1024
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            target_chunk_size: default_chunk_size(),
            max_file_size: default_max_file_size(),
            excludes: Vec::new(),
        }
    }
}

impl ArchiveConfig {
    /// Config file name inside the project directory.
    pub const FILE_NAME: &'static str = ".qgd.json";

    /// Load the project config, or defaults if the file does not exist.
    pub fn load(project: &Path) -> Result<Self> {
        let config_path = project.join(Self::FILE_NAME);

        if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .with_context(|| format!("failed to read {}", config_path.display()))?;
            let config = serde_json::from_str(&content)
                .with_context(|| format!("failed to parse {}", config_path.display()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }
}

/// Path of the data file for a project directory.
pub fn data_file_path(project: &Path) -> PathBuf {
    project.with_extension(DATA_FILE_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_header_roundtrip() {
        let header = ChunkHeader {
            file_count: 3,
            uncompressed_size: 123_456,
            compressed_size: 23_456,
            index_size: 2048,
            index_hash_iterations: 7,
        };

        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), ChunkHeader::SIZE);

        let decoded = ChunkHeader::read_from(&mut &buf[..]).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_chunk_file_header_roundtrip() {
        let header = ChunkFileHeader {
            name_offset: 76,
            name_length: 11,
            data_offset: 87,
            data_size: 4096,
            start_line: 120,
            reserved: 0,
            file_size: 99_999,
            time_stamp: 1_700_000_000,
        };

        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), ChunkFileHeader::SIZE);

        let decoded = ChunkFileHeader::read_from(&mut &buf[..]).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_data_file_path() {
        assert_eq!(
            data_file_path(Path::new("/tmp/project")),
            PathBuf::from("/tmp/project.qgd")
        );
    }

    #[test]
    fn test_config_defaults() {
        let config = ArchiveConfig::default();
        assert_eq!(config.target_chunk_size, TARGET_CHUNK_SIZE);
        assert!(config.excludes.is_empty());
    }

    #[test]
    fn test_config_partial_json() {
        let config: ArchiveConfig =
            serde_json::from_str(r#"{"excludes": ["*.min.js"]}"#).unwrap();
        assert_eq!(config.target_chunk_size, TARGET_CHUNK_SIZE);
        assert_eq!(config.excludes, vec!["*.min.js".to_string()]);
    }
}
