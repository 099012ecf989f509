//! Segment file IO

use super::{SegmentCodec, SegmentData};
use crate::{Result, SanError};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Read and decode a segment file. A missing file yields `Ok(None)`.
pub fn read_segment(path: &Path) -> Result<Option<SegmentData>> {
    let buf = match fs::read(path) {
        Ok(buf) => buf,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(SanError::Io(e)),
    };

    match SegmentCodec::decode(&buf) {
        Ok(data) => Ok(Some(data)),
        Err(SanError::CorruptSegment(reason)) => Err(SanError::CorruptSegment(format!(
            "{}: {}",
            path.display(),
            reason
        ))),
        Err(e) => Err(e),
    }
}

/// Encode and write a segment, replacing any existing file in full.
///
/// The bytes go to a uniquely named sibling first and are renamed over the
/// target once synced, so a reader sees either the old or the new segment.
/// Missing parent directories are created. Returns the encoded size.
pub fn write_segment(path: &Path, data: &SegmentData) -> Result<u64> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let encoded = SegmentCodec::encode(data);
    let tmp = temp_path(path);

    let written = (|| -> io::Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(&encoded)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if let Err(e) = written {
        if let Err(cleanup) = fs::remove_file(&tmp) {
            if cleanup.kind() != io::ErrorKind::NotFound {
                warn!("Failed to remove temp segment {:?}: {}", tmp, cleanup);
            }
        }
        return Err(SanError::Io(e));
    }

    Ok(encoded.len() as u64)
}

/// Remove a segment file. Returns `false` if it was already gone.
pub fn remove_segment(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(SanError::Io(e)),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{}.tmp-{}", name, uuid::Uuid::new_v4().simple()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tempfile::TempDir;

    #[test]
    fn test_write_read_remove() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("c/2024/61/2.san");

        assert!(read_segment(&path).unwrap().is_none());

        let mut data = SegmentData::new();
        data.insert(42, Bytes::from_static(b"\"x\""));
        let size = write_segment(&path, &data).unwrap();
        assert_eq!(size, fs::metadata(&path).unwrap().len());
        assert_eq!(read_segment(&path).unwrap(), Some(data));

        // No temp files left behind
        let names: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("2.san")]);

        assert!(remove_segment(&path).unwrap());
        assert!(!remove_segment(&path).unwrap());
    }

    #[test]
    fn test_corrupt_file_reports_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("1.san");
        fs::write(&path, b"definitely not a segment").unwrap();

        let err = read_segment(&path).unwrap_err();
        assert!(err.is_corruption());
        assert!(err.to_string().contains("1.san"));
        // Left untouched
        assert!(path.exists());
    }
}
