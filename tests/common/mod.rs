//! Shared helpers for integration tests.
#![allow(dead_code)]

use qgd::archive::codec;
use qgd::archive::reader::ChunkReader;
use qgd::archive::types::ChunkHeader;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Read every chunk of a data file: (header, bloom index, decompressed body).
pub fn read_chunks(path: &Path) -> Vec<(ChunkHeader, Vec<u8>, Vec<u8>)> {
    let mut reader = ChunkReader::open(path).unwrap();
    let mut chunks = Vec::new();

    while let Some((header, index)) = reader.next_chunk().unwrap() {
        let mut compressed = vec![0u8; header.compressed_size as usize];
        reader.read_payload(&mut compressed).unwrap();

        let mut body = vec![0u8; header.uncompressed_size as usize];
        codec::decompress_into(&compressed, &mut body).unwrap();

        chunks.push((header, index, body));
    }

    chunks
}

/// Cloneable in-memory sink for capturing search output.
#[derive(Clone, Default)]
pub struct SharedSink(Arc<Mutex<Vec<u8>>>);

impl SharedSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_string(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
