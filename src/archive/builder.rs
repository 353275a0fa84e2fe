//! Streaming archive builder.
//!
//! Files are appended to a pending buffer at the tail; once two target
//! chunks' worth of bytes are buffered, a chunk is carved from the head,
//! split on line boundaries, indexed, compressed, and appended to the data
//! file. The builder never rewrites a chunk.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use crate::archive::codec;
use crate::archive::index::build_chunk_index;
use crate::archive::stats::{BuildProgress, BuildStats};
use crate::archive::types::{
    data_file_path, ArchiveConfig, ChunkFileHeader, ChunkHeader, DATA_FILE_EXTENSION,
    DATA_FILE_MAGIC,
};
use crate::utils::encoding::{normalize_eol, to_utf8};

/// A buffered file fragment waiting to be packed.
///
/// Fragments of the same logical file are contiguous in the pending queue
/// with strictly increasing `start_line` and identical metadata.
struct PendingFile {
    name: String,
    start_line: u32,
    time_stamp: u64,
    file_size: u64,
    contents: Vec<u8>,
}

/// Files carved out of the pending buffer for one chunk.
struct Chunk {
    files: Vec<PendingFile>,
    total_size: usize,
}

pub struct Builder {
    out: BufWriter<File>,
    pending: VecDeque<PendingFile>,
    pending_size: usize,
    target_chunk_size: usize,
    stats: BuildStats,
    finished: bool,
}

impl Builder {
    /// Create the data file at `path` and write the magic prefix.
    pub fn create(path: &Path, target_chunk_size: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }

        let file = File::create(path)
            .with_context(|| format!("failed to open data file {} for writing", path.display()))?;
        let mut out = BufWriter::new(file);
        out.write_all(DATA_FILE_MAGIC)?;

        Ok(Self {
            out,
            pending: VecDeque::new(),
            pending_size: 0,
            target_chunk_size,
            stats: BuildStats::default(),
            finished: false,
        })
    }

    pub fn stats(&self) -> BuildStats {
        self.stats
    }

    /// Read a file from disk, normalize line endings, coerce to UTF-8, and
    /// buffer it as a fresh fragment starting at the top.
    pub fn append_file(
        &mut self,
        name: &str,
        path: &Path,
        time_stamp: u64,
        file_size: u64,
    ) -> Result<()> {
        let mut contents =
            fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let len = normalize_eol(&mut contents);
        contents.truncate(len);
        let contents = to_utf8(contents);

        self.append_file_part(name, 0, &contents, time_stamp, file_size)
    }

    /// Buffer one fragment. Consecutive fragments of the same file merge
    /// into a single pending record.
    pub fn append_file_part(
        &mut self,
        name: &str,
        start_line: u32,
        data: &[u8],
        time_stamp: u64,
        file_size: u64,
    ) -> Result<()> {
        match self.pending.back_mut() {
            Some(last) if last.name == name => {
                assert!(last.start_line < start_line);
                assert!(last.time_stamp == time_stamp && last.file_size == file_size);
                last.contents.extend_from_slice(data);
            }
            _ => {
                self.pending.push_back(PendingFile {
                    name: name.to_string(),
                    start_line,
                    time_stamp,
                    file_size,
                    contents: data.to_vec(),
                });
            }
        }
        self.pending_size += data.len();

        self.flush_if_needed()
    }

    /// Splice a pre-formed chunk into the output.
    ///
    /// The pending buffer must drain to exactly empty first; when the
    /// leftover pending data is too small to make a decent chunk, or too
    /// large to trust the drain heuristic, the splice is refused and the
    /// caller falls back to appending the chunk's files individually.
    /// Returns `Ok(false)` on refusal.
    pub fn append_chunk(
        &mut self,
        header: ChunkHeader,
        compressed: &[u8],
        index: &[u8],
        first_file_is_suffix: bool,
    ) -> Result<bool> {
        self.flush_if_needed()?;

        // flush_if_needed leaves pending in [0, 2*target). Flush the rest as
        // one chunk when it lands in the acceptable size band, as two when
        // it is too big for one, and refuse when it is too small for either.
        let chunk_max_size = self.target_chunk_size * 3 / 2;
        let chunk_min_size = chunk_max_size / 2;

        if !self.pending.is_empty() {
            if self.pending_size > self.target_chunk_size * 2 {
                return Ok(false);
            }
            if self.pending_size < chunk_min_size {
                return Ok(false);
            }
            if self.pending_size > chunk_max_size {
                self.flush_chunk_of(self.pending_size / 2)?;
            }

            assert!(self.pending_size < chunk_max_size);
            self.flush_chunk_of(self.pending_size)?;
        }

        assert!(self.pending_size == 0 && self.pending.is_empty());
        self.write_raw_chunk(&header, index, compressed, first_file_is_suffix)?;

        Ok(true)
    }

    /// Drain everything still pending, then flush the output stream.
    pub fn finish(mut self) -> Result<BuildStats> {
        self.flush()?;
        self.out.flush().context("failed to write data file")?;
        self.finished = true;
        Ok(self.stats)
    }

    fn flush_if_needed(&mut self) -> Result<()> {
        while self.pending_size >= self.target_chunk_size * 2 {
            self.flush_chunk_of(self.target_chunk_size)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        // Keyed on the record queue rather than the byte count so trailing
        // zero-byte fragments still land in the archive.
        while !self.pending.is_empty() {
            self.flush_chunk_of(self.target_chunk_size)?;
        }
        Ok(())
    }

    /// Carve up to `size` bytes of pending files into one chunk and write it.
    fn flush_chunk_of(&mut self, size: usize) -> Result<()> {
        let mut chunk = Chunk {
            files: Vec::new(),
            total_size: 0,
        };

        while chunk.total_size < size {
            let Some(mut file) = self.pending.pop_front() else {
                break;
            };

            let remaining = size - chunk.total_size;

            if file.contents.len() <= remaining {
                chunk.total_size += file.contents.len();
                chunk.files.push(file);
            } else {
                // The file does not fit; take a prefix ending on a line
                // boundary and put the trimmed remainder back at the head.
                self.split_into_chunk(&mut chunk, file, remaining);
                break;
            }
        }

        assert!(chunk.total_size <= self.pending_size);
        self.pending_size -= chunk.total_size;

        self.write_chunk(&chunk)
    }

    fn split_into_chunk(&mut self, chunk: &mut Chunk, mut file: PendingFile, remaining: usize) {
        let (mut split, mut lines) = last_line_boundary(&file.contents[..remaining]);

        // No line boundary within the budget: take the file's first line
        // whole, but only if the chunk would otherwise be empty (the
        // oversized-chunk escape hatch for a single enormous line).
        if split == 0 {
            if !chunk.files.is_empty() {
                self.pending.push_front(file);
                return;
            }
            split = first_line_len(&file.contents);
            lines = 1;
        }

        let rest = file.contents.split_off(split);
        let prefix = PendingFile {
            name: file.name.clone(),
            start_line: file.start_line,
            time_stamp: file.time_stamp,
            file_size: file.file_size,
            contents: file.contents,
        };

        chunk.total_size += split;
        chunk.files.push(prefix);

        if !rest.is_empty() {
            file.contents = rest;
            file.start_line += lines;
            self.pending.push_front(file);
        }
    }

    fn write_chunk(&mut self, chunk: &Chunk) -> Result<()> {
        if chunk.files.is_empty() {
            return Ok(());
        }

        let (body, data_offset) = prepare_chunk_body(chunk)?;
        let index = build_chunk_index(&body[data_offset..]);
        let compressed = codec::compress(&body);

        let header = ChunkHeader {
            file_count: chunk.files.len() as u32,
            uncompressed_size: body.len() as u32,
            compressed_size: compressed.len() as u32,
            index_size: index.data.len() as u32,
            index_hash_iterations: index.iterations,
        };

        let first_file_is_suffix = chunk.files[0].start_line != 0;

        self.write_raw_chunk(&header, &index.data, &compressed, first_file_is_suffix)
    }

    fn write_raw_chunk(
        &mut self,
        header: &ChunkHeader,
        index: &[u8],
        compressed: &[u8],
        first_file_is_suffix: bool,
    ) -> Result<()> {
        header.write_to(&mut self.out)?;
        self.out.write_all(index)?;
        self.out.write_all(compressed)?;

        self.stats.chunk_count += 1;
        self.stats.file_count += header.file_count as u64 - first_file_is_suffix as u64;
        self.stats.file_size += header.uncompressed_size as u64;
        self.stats.result_size += header.compressed_size as u64;

        Ok(())
    }
}

impl Drop for Builder {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.flush();
            let _ = self.out.flush();
        }
    }
}

/// Offset just past the last `'\n'` in `data` and the newline count up to
/// it; `(0, 0)` when there is none.
fn last_line_boundary(data: &[u8]) -> (usize, u32) {
    let mut end = 0;
    let mut lines = 0;
    for (i, &b) in data.iter().enumerate() {
        if b == b'\n' {
            end = i + 1;
            lines += 1;
        }
    }
    (end, lines)
}

/// Length of the first line including its `'\n'`, or the whole slice.
fn first_line_len(data: &[u8]) -> usize {
    data.iter()
        .position(|&b| b == b'\n')
        .map(|i| i + 1)
        .unwrap_or(data.len())
}

/// Lay out a chunk body: file headers, then names, then contents. Returns
/// the body and the offset where the data region begins.
fn prepare_chunk_body(chunk: &Chunk) -> Result<(Vec<u8>, usize)> {
    let header_size = ChunkFileHeader::SIZE * chunk.files.len();
    let name_size: usize = chunk.files.iter().map(|f| f.name.len()).sum();
    let data_size: usize = chunk.files.iter().map(|f| f.contents.len()).sum();

    let mut body = Vec::with_capacity(header_size + name_size + data_size);

    let mut name_offset = header_size;
    let mut data_offset = header_size + name_size;

    for file in &chunk.files {
        let header = ChunkFileHeader {
            name_offset: name_offset as u32,
            name_length: file.name.len() as u16,
            data_offset: data_offset as u32,
            data_size: file.contents.len() as u32,
            start_line: file.start_line,
            reserved: 0,
            file_size: file.file_size,
            time_stamp: file.time_stamp,
        };
        header.write_to(&mut body)?;

        name_offset += file.name.len();
        data_offset += file.contents.len();
    }

    for file in &chunk.files {
        body.extend_from_slice(file.name.as_bytes());
    }
    for file in &chunk.files {
        body.extend_from_slice(&file.contents);
    }

    assert_eq!(body.len(), header_size + name_size + data_size);

    Ok((body, header_size + name_size))
}

/// One enumerated project file.
pub struct ProjectFile {
    pub name: String,
    pub path: PathBuf,
    pub time_stamp: u64,
    pub file_size: u64,
}

/// Enumerate project files: gitignore-aware walk, config excludes, size
/// cap, sorted by name so rebuilds are deterministic.
pub fn project_files(project: &Path, config: &ArchiveConfig) -> Result<Vec<ProjectFile>> {
    let excludes = build_exclude_set(&config.excludes)?;

    let walker = WalkBuilder::new(project)
        .hidden(true)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            !matches!(name.as_ref(), ".git" | "node_modules" | "target")
        })
        .build();

    let mut files = Vec::new();

    for entry in walker.filter_map(|entry| entry.ok()) {
        if !entry.path().is_file() {
            continue;
        }

        let Ok(rel) = entry.path().strip_prefix(project) else {
            continue;
        };
        let name = rel.to_string_lossy().replace('\\', "/");

        if name == ArchiveConfig::FILE_NAME || excludes.is_match(&name) {
            continue;
        }

        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if metadata.len() > config.max_file_size {
            continue;
        }

        let time_stamp = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);

        files.push(ProjectFile {
            name,
            path: entry.path().to_path_buf(),
            time_stamp,
            file_size: metadata.len(),
        });
    }

    files.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(files)
}

fn build_exclude_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .with_context(|| format!("invalid exclude pattern {:?}", pattern))?;
        builder.add(glob);
    }
    builder.build().context("failed to compile exclude patterns")
}

/// Build `<project>.qgd`: enumerate, pack into a temp file, rename on
/// success. The temp file is discarded on failure.
pub fn build_project(project: &Path) -> Result<()> {
    let config = ArchiveConfig::load(project)?;

    println!("Building {}:", project.display());
    print!("Scanning project...\r");
    let _ = std::io::stdout().flush();

    let files = project_files(project, &config)?;

    let target_path = data_file_path(project);
    let temp_path = target_path.with_extension(format!("{}_", DATA_FILE_EXTENSION));

    let result = build_into(&temp_path, &files, &config);
    println!();

    if let Err(err) = result {
        let _ = fs::remove_file(&temp_path);
        return Err(err);
    }

    fs::rename(&temp_path, &target_path)
        .with_context(|| format!("failed to save data file {}", target_path.display()))?;

    Ok(())
}

fn build_into(temp_path: &Path, files: &[ProjectFile], config: &ArchiveConfig) -> Result<()> {
    let mut builder = Builder::create(temp_path, config.target_chunk_size)?;
    let mut progress = BuildProgress::new(files.len());
    progress.report(&builder.stats());

    for file in files {
        if let Err(err) =
            builder.append_file(&file.name, &file.path, file.time_stamp, file.file_size)
        {
            eprintln!("Error reading file {}: {:#}", file.name, err);
        }
        progress.report(&builder.stats());
    }

    let stats = builder.finish()?;
    progress.report(&stats);

    Ok(())
}
