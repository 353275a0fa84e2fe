//! Parallel archive search.
//!
//! One producer streams chunk records off disk; decompression and matching
//! run on a worker pool. Memory stays bounded by two blocking admissions
//! (the block pool and the work queue's byte budget), and match output is
//! serialized per chunk through [`ordered::OrderedOutput`] so concurrent
//! search prints exactly what a single-threaded scan would.

pub mod matcher;
pub mod ordered;
pub mod pool;
pub mod queue;

use anyhow::{bail, Context, Result};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::archive::codec;
use crate::archive::index::query_ngrams;
use crate::archive::reader::{chunk_files, ChunkReader};
use crate::archive::types::{
    data_file_path, ChunkHeader, BLOCK_POOL_BUDGET, BUFFERED_OUTPUT_FLUSH_THRESHOLD,
    MAX_BUFFERED_OUTPUT, MAX_QUEUED_CHUNK_DATA, TARGET_CHUNK_SIZE,
};
use crate::output::append_match;
use crate::search::matcher::{scan_fragment, PatternMatcher};
use crate::search::ordered::OrderedOutput;
use crate::search::pool::{BlockPool, PoolBlock};
use crate::search::queue::WorkQueue;
use crate::utils::bloom::bloom_test;

#[derive(Debug, Clone, Copy, Default)]
pub struct SearchOptions {
    pub ignore_case: bool,
    pub literal: bool,
    pub column: bool,
    pub visual_studio: bool,
}

/// Search a project's data file (`<project>.qgd`).
pub fn search_project(
    project: &Path,
    pattern: &str,
    options: SearchOptions,
    writer: Box<dyn Write + Send>,
) -> Result<()> {
    search_data_file(&data_file_path(project), pattern, options, writer)
}

/// Search a data file directly, writing match lines to `writer`.
pub fn search_data_file(
    data_path: &Path,
    pattern: &str,
    options: SearchOptions,
    writer: Box<dyn Write + Send>,
) -> Result<()> {
    let matcher = Arc::new(PatternMatcher::new(
        pattern,
        options.literal,
        options.ignore_case,
    )?);
    let output = Arc::new(OrderedOutput::new(
        writer,
        MAX_BUFFERED_OUTPUT,
        BUFFERED_OUTPUT_FLUSH_THRESHOLD,
    ));
    let failure: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let data_name: Arc<str> = data_path.display().to_string().into();

    // Literal queries can be pre-filtered against each chunk's bloom index
    // before its payload is even read.
    let prefilter = if options.literal && pattern.len() >= 4 {
        let grams = query_ngrams(pattern.as_bytes());
        (!grams.is_empty()).then_some(grams)
    } else {
        None
    };

    let mut reader = ChunkReader::open(data_path)?;

    // Blocks hold the compressed and decompressed body side by side;
    // compression is assumed no worse than 50%, usually far better.
    let pool = BlockPool::new(TARGET_CHUNK_SIZE * 3 / 2, BLOCK_POOL_BUDGET);
    let queue = WorkQueue::new(WorkQueue::ideal_worker_count(), MAX_QUEUED_CHUNK_DATA);

    let mut chunk_index = 0u32;

    while let Some((header, index_bytes)) = reader.next_chunk()? {
        if let Some(grams) = &prefilter {
            if !index_bytes.is_empty()
                && grams
                    .iter()
                    .any(|&g| !bloom_test(&index_bytes, g, header.index_hash_iterations))
            {
                reader.skip_payload(&header)?;
                continue;
            }
        }

        let total = header.compressed_size as usize + header.uncompressed_size as usize;
        let mut block = pool.allocate(total);
        reader.read_payload(&mut block[..header.compressed_size as usize])?;

        let matcher = Arc::clone(&matcher);
        let output = Arc::clone(&output);
        let failure = Arc::clone(&failure);
        let data_name = Arc::clone(&data_name);

        queue.push(total, move || {
            process_chunk(
                &matcher,
                &output,
                options,
                header,
                block,
                chunk_index,
                &failure,
                &data_name,
            );
        });

        chunk_index += 1;
    }

    // Dropping the queue waits for every outstanding chunk to finish.
    drop(queue);

    output.finish().context("failed to write search output")?;

    if let Some(message) = failure.lock().unwrap().take() {
        bail!("{}", message);
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn process_chunk(
    matcher: &PatternMatcher,
    output: &OrderedOutput,
    options: SearchOptions,
    header: ChunkHeader,
    mut block: PoolBlock,
    chunk_index: u32,
    failure: &Mutex<Option<String>>,
    data_name: &str,
) {
    let (compressed, uncompressed) = block.split_at_mut(header.compressed_size as usize);

    let decoded = codec::decompress_into(compressed, uncompressed)
        .and_then(|()| chunk_files(uncompressed, header.file_count));

    // The chunk is begun and ended even on failure so the emit cursor keeps
    // advancing for later chunks.
    let mut chunk = output.begin(chunk_index);

    match decoded {
        Ok(files) => {
            let mut line_buf = Vec::new();
            for file in &files {
                scan_fragment(matcher, file.data, file.start_line, |line, column, range| {
                    line_buf.clear();
                    append_match(
                        &mut line_buf,
                        &options,
                        file.name,
                        line,
                        column,
                        &file.data[range],
                    );
                    output.write(&mut chunk, &line_buf);
                });
            }
        }
        Err(err) => {
            chunk.clear();
            let mut failure = failure.lock().unwrap();
            if failure.is_none() {
                *failure = Some(format!("error reading data file {}: {:#}", data_name, err));
            }
        }
    }

    output.end(chunk);
}
