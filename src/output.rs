//! Match line formatting.
//!
//! Lines are assembled into byte buffers (not written straight to stdout)
//! because the searcher batches output per chunk and emits whole buffers in
//! chunk order.

use std::io::Write;

use crate::search::SearchOptions;

/// Append one formatted match line.
///
/// Default format is `path:line: text` with an optional `:column` after the
/// line. Visual Studio format is `path(line): text` / `path(line,column): text`
/// with backslash path separators, which VS parses for jump-to-source.
pub fn append_match(
    buf: &mut Vec<u8>,
    options: &SearchOptions,
    path: &[u8],
    line: u32,
    column: u32,
    text: &[u8],
) {
    if options.visual_studio {
        buf.extend(path.iter().map(|&b| if b == b'/' { b'\\' } else { b }));
        if options.column {
            let _ = write!(buf, "({},{})", line, column);
        } else {
            let _ = write!(buf, "({})", line);
        }
    } else {
        buf.extend_from_slice(path);
        if options.column {
            let _ = write!(buf, ":{}:{}", line, column);
        } else {
            let _ = write!(buf, ":{}", line);
        }
    }

    buf.extend_from_slice(b": ");
    buf.extend_from_slice(text);
    buf.push(b'\n');
}

#[cfg(test)]
mod tests {
    use super::*;

    fn formatted(options: &SearchOptions, path: &[u8], line: u32, column: u32, text: &[u8]) -> String {
        let mut buf = Vec::new();
        append_match(&mut buf, options, path, line, column, text);
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_default_format() {
        let options = SearchOptions::default();
        assert_eq!(
            formatted(&options, b"src/a.txt", 2, 1, b"world"),
            "src/a.txt:2: world\n"
        );
    }

    #[test]
    fn test_column_format() {
        let options = SearchOptions {
            column: true,
            ..Default::default()
        };
        assert_eq!(
            formatted(&options, b"a.txt", 10, 7, b"needle"),
            "a.txt:10:7: needle\n"
        );
    }

    #[test]
    fn test_visual_studio_format() {
        let options = SearchOptions {
            visual_studio: true,
            ..Default::default()
        };
        assert_eq!(
            formatted(&options, b"src/sub/a.txt", 3, 1, b"text"),
            "src\\sub\\a.txt(3): text\n"
        );
    }

    #[test]
    fn test_visual_studio_column_format() {
        let options = SearchOptions {
            visual_studio: true,
            column: true,
            ..Default::default()
        };
        assert_eq!(
            formatted(&options, b"a.txt", 3, 9, b"text"),
            "a.txt(3,9): text\n"
        );
    }
}
