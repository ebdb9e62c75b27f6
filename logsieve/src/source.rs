/// Read access to the log being filtered.
///
/// Every worker asks the source for its own reader, limited to the byte range
/// of its segment. Readers are never shared and never write.
use memmap2::Mmap;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::ops::Deref;
use std::path::{Path, PathBuf};

use crate::engine::chunker::Segment;
use crate::errors::{SieveError, SieveResult};

/// Something workers can read segments from
pub trait LogSource: Sync {
    /// Where the log lives, for error messages
    fn path(&self) -> &Path;

    /// Size of the log in bytes
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read-only view of the whole log, used to plan segments and count lines
    fn view(&self) -> io::Result<SourceBytes<'_>>;

    /// Opens an independent reader positioned at `segment.start` that yields
    /// at most `segment.len()` bytes
    fn open_segment(&self, segment: &Segment) -> io::Result<Box<dyn Read + Send + '_>>;
}

/// Bytes of a log, either memory-mapped or borrowed
pub enum SourceBytes<'a> {
    Mapped(Mmap),
    Borrowed(&'a [u8]),
}

impl Deref for SourceBytes<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            SourceBytes::Mapped(mmap) => mmap,
            SourceBytes::Borrowed(bytes) => bytes,
        }
    }
}

/// A log file on disk; each segment gets its own file handle
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    len: u64,
}

impl FileSource {
    /// Checks that `path` is a readable regular file and records its size
    pub fn open(path: impl AsRef<Path>) -> SieveResult<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path).map_err(|e| SieveError::file_access(path, e))?;
        if !metadata.is_file() {
            return Err(SieveError::file_access(
                path,
                io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }
        // Fail early on permission problems rather than inside a worker
        File::open(path).map_err(|e| SieveError::file_access(path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            len: metadata.len(),
        })
    }
}

impl LogSource for FileSource {
    fn path(&self) -> &Path {
        &self.path
    }

    fn len(&self) -> u64 {
        self.len
    }

    fn view(&self) -> io::Result<SourceBytes<'_>> {
        // Zero-length files cannot be mapped on every platform
        if self.len == 0 {
            return Ok(SourceBytes::Borrowed(&[]));
        }
        let file = File::open(&self.path)?;
        let mmap = unsafe { Mmap::map(&file) }?;
        Ok(SourceBytes::Mapped(mmap))
    }

    fn open_segment(&self, segment: &Segment) -> io::Result<Box<dyn Read + Send + '_>> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(segment.start))?;
        Ok(Box::new(file.take(segment.len())))
    }
}

/// A log held in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    data: Vec<u8>,
}

impl MemorySource {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }
}

impl LogSource for MemorySource {
    fn path(&self) -> &Path {
        Path::new("<memory>")
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn view(&self) -> io::Result<SourceBytes<'_>> {
        Ok(SourceBytes::Borrowed(&self.data))
    }

    fn open_segment(&self, segment: &Segment) -> io::Result<Box<dyn Read + Send + '_>> {
        let range = segment.start as usize..segment.end as usize;
        let bytes = self.data.get(range).ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "segment beyond end of log")
        })?;
        Ok(Box::new(bytes))
    }
}
