use super::{decode_line, LineSlice, LineSource};
use crate::error::{EngineError, Result};
use crate::index::{percent_of, LineOffsetIndex};
use crate::matcher::SourceMode;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::Path;

/// A log file on disk, addressed through its line offset index. Only the
/// index lives in memory; line text is read on demand.
pub struct FileBackedSource {
    file: File,
    index: LineOffsetIndex,
    chunk_size: usize,
}

impl FileBackedSource {
    pub fn open(path: &Path, chunk_size: usize, on_progress: &mut dyn FnMut(u8)) -> Result<Self> {
        let open_err = |source| EngineError::Open {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(open_err)?;
        let file_size = file.metadata().map_err(open_err)?.len();

        let reader = file.try_clone().map_err(open_err)?;
        let index = LineOffsetIndex::build(reader, file_size, chunk_size, on_progress)?;

        Ok(Self {
            file,
            index,
            chunk_size,
        })
    }

    pub fn index(&self) -> &LineOffsetIndex {
        &self.index
    }
}

impl LineSource for FileBackedSource {
    fn mode(&self) -> SourceMode {
        SourceMode::File
    }

    fn total_lines(&self) -> usize {
        self.index.line_count()
    }

    fn locate(&self, original: usize) -> Option<LineSlice<'_>> {
        self.index.line_range(original).map(LineSlice::Bytes)
    }

    fn read_bytes(&mut self, range: Range<u64>) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; (range.end - range.start) as usize];
        self.file.seek(SeekFrom::Start(range.start))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn scan(
        &mut self,
        progress_every: usize,
        visit: &mut dyn FnMut(usize, &str),
        on_progress: &mut dyn FnMut(u8),
    ) -> Result<()> {
        let scan_err = |line, source| EngineError::Scan { line, source };
        let mut handle = self.file.try_clone().map_err(|e| scan_err(0, e))?;
        handle
            .seek(SeekFrom::Start(0))
            .map_err(|e| scan_err(0, e))?;
        let mut reader = BufReader::with_capacity(self.chunk_size, handle);

        let total = self.index.line_count();
        let file_size = self.index.file_size();
        let progress_every = progress_every.max(1);
        let mut buf = Vec::new();
        let mut consumed = 0u64;
        for line in 0..total {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .map_err(|e| scan_err(line, e))?;
            consumed += read as u64;
            visit(line, &decode_line(&buf));

            if (line + 1) % progress_every == 0 {
                on_progress(percent_of(consumed, file_size));
            }
        }
        on_progress(100);
        Ok(())
    }
}
