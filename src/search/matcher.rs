//! Regex matching over decompressed file fragments.
//!
//! Matching is byte-oriented (`regex::bytes`) since fragments are raw file
//! contents. Case-insensitivity is ASCII-only, in agreement with the
//! byte-wise case folding used when building chunk indexes.

use anyhow::{Context, Result};
use regex::bytes::{Regex, RegexBuilder};
use std::ops::Range;

pub struct PatternMatcher {
    re: Regex,
}

impl PatternMatcher {
    pub fn new(pattern: &str, literal: bool, ignore_case: bool) -> Result<Self> {
        let source = if literal {
            regex::escape(pattern)
        } else {
            pattern.to_string()
        };

        let re = RegexBuilder::new(&source)
            .case_insensitive(ignore_case)
            .unicode(false)
            .build()
            .with_context(|| format!("invalid search pattern {:?}", pattern))?;

        Ok(Self { re })
    }

    fn find(&self, data: &[u8], start: usize) -> Option<(usize, usize)> {
        self.re
            .find_at(data, start)
            .map(|m| (m.start(), m.end()))
    }
}

/// Scan one fragment and report the first match of every matching line.
///
/// `start_line` is the number of lines of this file that live in earlier
/// chunks, so reported line numbers are absolute within the source file.
/// `emit` receives `(line, column, line_range)` with a 1-based byte column.
pub fn scan_fragment<F>(matcher: &PatternMatcher, data: &[u8], start_line: u32, mut emit: F)
where
    F: FnMut(u32, u32, Range<usize>),
{
    let mut line = start_line;
    let mut cursor = 0;

    while let Some((start, end)) = matcher.find(data, cursor) {
        line += 1 + count_lines(&data[cursor..start]);

        let line_start = data[..start]
            .iter()
            .rposition(|&b| b == b'\n')
            .map(|i| i + 1)
            .unwrap_or(0);
        let line_end = data[end..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|i| end + i)
            .unwrap_or(data.len());

        let column = (start - line_start + 1) as u32;
        emit(line, column, line_start..line_end);

        if line_end == data.len() {
            break;
        }
        cursor = line_end + 1;
    }
}

fn count_lines(data: &[u8]) -> u32 {
    data.iter().filter(|&&b| b == b'\n').count() as u32
}
