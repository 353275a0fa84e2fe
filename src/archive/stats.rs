//! Build statistics and the in-place progress line.

use std::io::Write;

/// Counters accumulated while chunks are written.
///
/// `file_count` counts logical files: a chunk whose first fragment continues
/// a file from the previous chunk contributes one less than its header's
/// file count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub chunk_count: u64,
    pub file_count: u64,
    pub file_size: u64,
    pub result_size: u64,
}

/// Reprints a `\r`-terminated progress line whenever the output size moved.
pub struct BuildProgress {
    total_files: usize,
    last_result_size: Option<u64>,
}

impl BuildProgress {
    pub fn new(total_files: usize) -> Self {
        Self {
            total_files,
            last_result_size: None,
        }
    }

    pub fn report(&mut self, stats: &BuildStats) {
        if self.last_result_size == Some(stats.result_size) {
            return;
        }
        self.last_result_size = Some(stats.result_size);

        let percent = if self.total_files == 0 {
            100
        } else {
            stats.file_count * 100 / self.total_files as u64
        };

        print!(
            "\r[{:3}%] {} files, {} MB in, {} MB out\r",
            percent,
            stats.file_count,
            stats.file_size / 1024 / 1024,
            stats.result_size / 1024 / 1024
        );
        let _ = std::io::stdout().flush();
    }
}
