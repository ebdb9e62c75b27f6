use serde::Serialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::SystemTime;
use tracing::trace;
use xxhash_rust::xxh3::Xxh3;

use crate::errors::{SieveError, SieveResult};

const HASH_BUFFER_CAPACITY: usize = 1024 * 1024;

/// Descriptive metadata about a log file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub file_name: String,
    pub size_bytes: u64,
    /// RFC 3339 timestamps, if the platform reports them
    pub created_at: Option<String>,
    pub modified_at: Option<String>,
    pub lines: u64,
    /// XXH3-128 of the contents, lowercase hex
    pub hash: String,
}

impl FileInfo {
    /// Reads `path` once, counting lines and hashing as it goes
    pub fn inspect(path: impl AsRef<Path>) -> SieveResult<Self> {
        let path = path.as_ref();
        trace!("Inspecting {}", path.display());

        let metadata = std::fs::metadata(path).map_err(|e| SieveError::file_access(path, e))?;
        let mut file = File::open(path).map_err(|e| SieveError::file_access(path, e))?;

        let mut hasher = Xxh3::new();
        let mut buf = vec![0u8; HASH_BUFFER_CAPACITY];
        let mut terminators = 0u64;
        let mut last_byte = None;
        loop {
            let n = file
                .read(&mut buf)
                .map_err(|e| SieveError::file_access(path, e))?;
            if n == 0 {
                break;
            }
            let chunk = &buf[..n];
            hasher.update(chunk);
            terminators += chunk.iter().filter(|&&b| b == b'\n').count() as u64;
            last_byte = chunk.last().copied();
        }

        // A trailing unterminated line still counts
        let lines = terminators + u64::from(last_byte.is_some_and(|b| b != b'\n'));

        Ok(Self {
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            size_bytes: metadata.len(),
            created_at: metadata.created().ok().map(format_time),
            modified_at: metadata.modified().ok().map(format_time),
            lines,
            hash: format!("{:032x}", hasher.digest128()),
        })
    }
}

fn format_time(time: SystemTime) -> String {
    humantime::format_rfc3339_seconds(time).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_inspect() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("service.log");
        std::fs::write(&path, "one\ntwo\nthree").unwrap();

        let info = FileInfo::inspect(&path).unwrap();
        assert_eq!(info.file_name, "service.log");
        assert_eq!(info.size_bytes, 13);
        assert_eq!(info.lines, 3);
        assert_eq!(info.hash.len(), 32);
        assert!(info.modified_at.is_some());
        let created = std::fs::metadata(&path).unwrap().created().ok();
        assert_eq!(info.created_at, created.map(format_time));
    }

    #[test]
    fn test_hash_depends_on_contents() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.log");
        let b = dir.path().join("b.log");
        let c = dir.path().join("c.log");
        std::fs::write(&a, "same\n").unwrap();
        std::fs::write(&b, "same\n").unwrap();
        std::fs::write(&c, "different\n").unwrap();

        let a = FileInfo::inspect(&a).unwrap();
        let b = FileInfo::inspect(&b).unwrap();
        let c = FileInfo::inspect(&c).unwrap();
        assert_eq!(a.hash, b.hash);
        assert_ne!(a.hash, c.hash);
        assert_eq!(a.lines, 1);
    }

    #[test]
    fn test_empty_and_missing() {
        let dir = tempdir().unwrap();
        let empty = dir.path().join("empty.log");
        std::fs::write(&empty, "").unwrap();
        assert_eq!(FileInfo::inspect(&empty).unwrap().lines, 0);

        assert!(matches!(
            FileInfo::inspect(dir.path().join("missing.log")),
            Err(SieveError::FileAccess { .. })
        ));
    }
}
