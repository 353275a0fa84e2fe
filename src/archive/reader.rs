//! Sequential reader for archive data files.
//!
//! The data file has no trailer or chunk directory; readers validate the
//! magic prefix and then stream chunk records until a clean EOF. A partial
//! record is a decode error, never silently ignored.

use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use crate::archive::types::{ChunkFileHeader, ChunkHeader, DATA_FILE_MAGIC};

#[derive(Debug)]
pub struct ChunkReader {
    reader: BufReader<File>,
    path: PathBuf,
}

impl ChunkReader {
    /// Open a data file and validate its magic prefix.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("error reading data file {}", path.display()))?;
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 4];
        if read_fully(&mut reader, &mut magic)? != magic.len() || &magic != DATA_FILE_MAGIC {
            bail!(
                "error reading data file {}: malformed header",
                path.display()
            );
        }

        Ok(Self {
            reader,
            path: path.to_path_buf(),
        })
    }

    /// Read the next chunk header and its raw bloom index. Returns `None` at
    /// a clean end of file.
    pub fn next_chunk(&mut self) -> Result<Option<(ChunkHeader, Vec<u8>)>> {
        let mut header_bytes = [0u8; ChunkHeader::SIZE];
        let read = read_fully(&mut self.reader, &mut header_bytes)?;
        if read == 0 {
            return Ok(None);
        }
        if read != header_bytes.len() {
            return Err(self.malformed());
        }

        let header = ChunkHeader::read_from(&mut &header_bytes[..])?;

        let mut index = vec![0u8; header.index_size as usize];
        if read_fully(&mut self.reader, &mut index)? != index.len() {
            return Err(self.malformed());
        }

        Ok(Some((header, index)))
    }

    /// Read the compressed payload of the current chunk; `buf` must be
    /// `compressed_size` long.
    pub fn read_payload(&mut self, buf: &mut [u8]) -> Result<()> {
        if read_fully(&mut self.reader, buf)? != buf.len() {
            return Err(self.malformed());
        }
        Ok(())
    }

    /// Discard the compressed payload of a chunk rejected by the bloom
    /// pre-filter.
    pub fn skip_payload(&mut self, header: &ChunkHeader) -> Result<()> {
        let skipped = std::io::copy(
            &mut self.reader.by_ref().take(header.compressed_size as u64),
            &mut std::io::sink(),
        )?;
        if skipped != header.compressed_size as u64 {
            return Err(self.malformed());
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn malformed(&self) -> anyhow::Error {
        anyhow::anyhow!(
            "error reading data file {}: malformed chunk",
            self.path.display()
        )
    }
}

/// Read until `buf` is full or EOF; returns the number of bytes read.
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// One decoded file fragment inside a chunk body.
pub struct ChunkFile<'a> {
    pub name: &'a [u8],
    pub start_line: u32,
    pub file_size: u64,
    pub time_stamp: u64,
    pub data: &'a [u8],
}

/// Decode a decompressed chunk body into its file fragments, validating
/// that every header, name, and data range stays inside the body.
pub fn chunk_files(body: &[u8], file_count: u32) -> Result<Vec<ChunkFile<'_>>> {
    let header_region = ChunkFileHeader::SIZE
        .checked_mul(file_count as usize)
        .filter(|&size| size <= body.len())
        .context("malformed chunk: file headers out of bounds")?;

    let mut cursor = &body[..header_region];
    let mut files = Vec::with_capacity(file_count as usize);

    for _ in 0..file_count {
        let header = ChunkFileHeader::read_from(&mut cursor)?;

        let name_start = header.name_offset as usize;
        let name_end = name_start + header.name_length as usize;
        let data_start = header.data_offset as usize;
        let data_end = data_start + header.data_size as usize;

        if name_end > body.len() || data_end > body.len() {
            bail!("malformed chunk: file ranges out of bounds");
        }

        files.push(ChunkFile {
            name: &body[name_start..name_end],
            start_line: header.start_line,
            file_size: header.file_size,
            time_stamp: header.time_stamp,
            data: &body[data_start..data_end],
        });
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_open_rejects_bad_magic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.qgd");
        std::fs::write(&path, b"NOPE").unwrap();

        let err = ChunkReader::open(&path).unwrap_err();
        assert!(err.to_string().contains("malformed header"));
    }

    #[test]
    fn test_open_rejects_truncated_magic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("short.qgd");
        std::fs::write(&path, b"QG").unwrap();

        assert!(ChunkReader::open(&path).is_err());
    }

    #[test]
    fn test_empty_archive_yields_no_chunks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.qgd");
        std::fs::write(&path, DATA_FILE_MAGIC).unwrap();

        let mut reader = ChunkReader::open(&path).unwrap();
        assert!(reader.next_chunk().unwrap().is_none());
    }

    #[test]
    fn test_truncated_chunk_header_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trunc.qgd");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(DATA_FILE_MAGIC).unwrap();
        file.write_all(&[0u8; 7]).unwrap(); // partial chunk header
        drop(file);

        let mut reader = ChunkReader::open(&path).unwrap();
        let err = reader.next_chunk().unwrap_err();
        assert!(err.to_string().contains("malformed chunk"));
    }

    #[test]
    fn test_truncated_payload_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trunc2.qgd");

        let header = ChunkHeader {
            file_count: 1,
            uncompressed_size: 100,
            compressed_size: 50,
            index_size: 0,
            index_hash_iterations: 0,
        };

        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(DATA_FILE_MAGIC).unwrap();
        header.write_to(&mut file).unwrap();
        file.write_all(&[0u8; 10]).unwrap(); // payload shorter than claimed
        drop(file);

        let mut reader = ChunkReader::open(&path).unwrap();
        let (header, _index) = reader.next_chunk().unwrap().unwrap();
        let mut payload = vec![0u8; header.compressed_size as usize];
        assert!(reader.read_payload(&mut payload).is_err());
    }

    #[test]
    fn test_chunk_files_rejects_out_of_bounds() {
        let mut body = Vec::new();
        ChunkFileHeader {
            name_offset: 1000, // past the end
            name_length: 4,
            data_offset: 0,
            data_size: 0,
            start_line: 0,
            reserved: 0,
            file_size: 0,
            time_stamp: 0,
        }
        .write_to(&mut body)
        .unwrap();

        assert!(chunk_files(&body, 1).is_err());
        assert!(chunk_files(&body, 5).is_err()); // header region too large
    }
}
