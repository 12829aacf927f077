use crate::error::{EngineError, Result};
use memchr::memchr_iter;
use std::io::{ErrorKind, Read};
use std::ops::Range;

/// Byte offset of every line start in a file.
///
/// `offsets[0]` is always 0 and each following entry is the byte right after a
/// newline, so a file with `k` newline bytes has `k + 1` lines. The last line
/// runs to the end of the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineOffsetIndex {
    offsets: Vec<u64>,
    file_size: u64,
}

impl LineOffsetIndex {
    /// Scans `reader` chunk by chunk. `on_progress` receives the percentage of
    /// `file_size` scanned so far after every chunk.
    pub fn build<R: Read>(
        mut reader: R,
        file_size: u64,
        chunk_size: usize,
        on_progress: &mut dyn FnMut(u8),
    ) -> Result<Self> {
        let mut offsets = Vec::with_capacity(estimate_lines(file_size));
        offsets.push(0);

        let mut chunk = vec![0u8; chunk_size.max(1)];
        let mut offset = 0u64;
        let mut last_percent = None;
        loop {
            let read = match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(source) => return Err(EngineError::Indexing { offset, source }),
            };
            for pos in memchr_iter(b'\n', &chunk[..read]) {
                offsets.push(offset + pos as u64 + 1);
            }
            offset += read as u64;

            let percent = percent_of(offset, file_size);
            if last_percent != Some(percent) {
                on_progress(percent);
                last_percent = Some(percent);
            }
        }

        Ok(Self {
            offsets,
            file_size: offset,
        })
    }

    pub fn from_bytes(data: &[u8]) -> Self {
        let mut offsets = vec![0];
        offsets.extend(memchr_iter(b'\n', data).map(|pos| pos as u64 + 1));
        Self {
            offsets,
            file_size: data.len() as u64,
        }
    }

    pub fn line_count(&self) -> usize {
        self.offsets.len()
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    /// Start of `line`, or the file size one past the last line. This is the
    /// exclusive end of the byte range covering lines `..line`.
    pub fn boundary(&self, line: usize) -> Option<u64> {
        match self.offsets.get(line) {
            Some(&start) => Some(start),
            None if line == self.offsets.len() => Some(self.file_size),
            None => None,
        }
    }

    /// Bytes of `line` including its terminator.
    pub fn line_range(&self, line: usize) -> Option<Range<u64>> {
        let start = *self.offsets.get(line)?;
        let end = self.boundary(line + 1)?;
        Some(start..end.max(start))
    }
}

fn estimate_lines(file_size: u64) -> usize {
    // Typical log lines are around 100 bytes; the Vec still doubles past this.
    (file_size / 128).min(1 << 24) as usize + 1
}

pub(crate) fn percent_of(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done.min(total) as u128 * 100) / total as u128) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::{self, Cursor};

    #[test]
    fn offsets_follow_each_newline() {
        let data = b"alpha\nbe\n\ngamma";
        let index = LineOffsetIndex::from_bytes(data);
        assert_eq!(index.offsets(), &[0, 6, 9, 10]);
        assert_eq!(index.line_count(), 4);
        assert_eq!(index.line_range(3), Some(10..15));
    }

    #[test]
    fn k_newlines_give_k_plus_one_lines() {
        let data = b"A\nB\nC\nD\nE\n";
        let mut progress = Vec::new();
        let index = LineOffsetIndex::build(Cursor::new(&data[..]), data.len() as u64, 3, &mut |p| {
            progress.push(p)
        })
        .unwrap();
        assert_eq!(index.line_count(), 6);
        assert_eq!(index.offsets(), &[0, 2, 4, 6, 8, 10]);
        assert_eq!(index.line_range(5), Some(10..10));
        assert_eq!(progress.last(), Some(&100));
    }

    #[test]
    fn chunk_boundaries_do_not_change_the_index() {
        let data: Vec<u8> = (0..500)
            .flat_map(|i| format!("line number {i}\r\n").into_bytes())
            .collect();
        let reference = LineOffsetIndex::from_bytes(&data);
        for chunk in [1, 7, 64, 4096] {
            let built =
                LineOffsetIndex::build(Cursor::new(&data), data.len() as u64, chunk, &mut |_| {})
                    .unwrap();
            assert_eq!(built, reference);
        }
    }

    #[test]
    fn empty_input_has_one_empty_line() {
        let index = LineOffsetIndex::build(Cursor::new(Vec::new()), 0, 16, &mut |_| {}).unwrap();
        assert_eq!(index.offsets(), &[0]);
        assert_eq!(index.line_range(0), Some(0..0));
        assert_eq!(index.line_range(1), None);
    }

    struct FailingReader {
        served: bool,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.served {
                return Err(io::Error::new(io::ErrorKind::Other, "disk gone"));
            }
            self.served = true;
            buf[..4].copy_from_slice(b"ab\nc");
            Ok(4)
        }
    }

    #[test]
    fn read_failure_is_fatal() {
        let err = LineOffsetIndex::build(FailingReader { served: false }, 100, 16, &mut |_| {})
            .unwrap_err();
        match err {
            EngineError::Indexing { offset, .. } => assert_eq!(offset, 4),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
