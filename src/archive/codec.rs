//! LZ4 block compression adapter.
//!
//! Chunks are self-contained blocks; the chunk header records both sizes, so
//! decompression targets a pre-sized buffer instead of a length-prefixed
//! frame.

use anyhow::{bail, Result};

/// Compress a chunk body into a raw LZ4 block.
pub fn compress(data: &[u8]) -> Vec<u8> {
    lz4_flex::block::compress(data)
}

/// Decompress a raw LZ4 block into `dst`, whose length must be the recorded
/// uncompressed size.
pub fn decompress_into(src: &[u8], dst: &mut [u8]) -> Result<()> {
    let written = lz4_flex::block::decompress_into(src, dst)?;
    if written != dst.len() {
        bail!(
            "short decompressed block: {} of {} bytes",
            written,
            dst.len()
        );
    }
    Ok(())
}
