//! The segment (data file) layer: a single append-only `<id>.data` file
//! with bounded append and positional reads. At most one segment per
//! directory is writable (the active segment) at any time.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, Write};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use crate::entry::{decode, decode_header, encode, verify, Entry, HEADER_SIZE};
use crate::error::{SegmentError, SegmentIdError};
use crate::keydir::EntryIndex;

pub(crate) const SEGMENT_EXT: &str = "data";

pub(crate) fn segment_path(dir: &Path, id: u64) -> PathBuf {
    dir.join(format!("{id}.{SEGMENT_EXT}"))
}

/// Parses the `<id>` stem of a segment path. Used by `Store::open` to
/// enumerate existing segments; a non-integer stem is the caller's cue
/// to skip the file with a diagnostic rather than fail outright.
pub(crate) fn parse_segment_id(path: &Path) -> Result<u64, SegmentIdError> {
    let stem = path
        .file_stem()
        .ok_or(SegmentIdError::EmptyStem)?
        .to_str()
        .ok_or_else(|| SegmentIdError::InvalidUtf8(path.to_path_buf()))?;
    u64::from_str(stem).map_err(|_| SegmentIdError::NotAnInt)
}

/// The outcome of scanning a segment front-to-back at `Store::open`.
pub(crate) struct ScanReport {
    pub entries: Vec<(Entry, u64)>,
    /// Set if the scan stopped before reaching the recorded end of the
    /// file, due to a truncated or corrupt entry. The tail from this
    /// offset onward was discarded rather than treated as an error.
    pub stopped_at: Option<u64>,
}

/// A single append-only data file, identified by a numeric id.
///
/// Concurrency: `append` is serialized through an internal mutex; many
/// `read_value` calls may run at once via a shared `RwLock` and
/// positional (`pread`-style) reads that never touch the file's cursor.
#[derive(Debug)]
pub(crate) struct Segment {
    id: u64,
    path: PathBuf,
    read_file: RwLock<Option<File>>,
    write_file: Mutex<Option<File>>,
    size: AtomicU64,
}

impl Segment {
    /// Opens (creating if absent) the segment `<id>.data` under `dir`.
    /// A read handle is always opened; an append-mode write handle is
    /// opened additionally when `writable` is true.
    pub fn open(dir: &Path, id: u64, writable: bool) -> Result<Segment, SegmentError> {
        let path = segment_path(dir, id);

        let read_file =
            OpenOptions::new()
                .create(true)
                .read(true)
                .open(&path)
                .map_err(|source| SegmentError::IoAtPath {
                    path: path.clone(),
                    source,
                })?;
        let size = read_file.metadata()?.len();

        let write_file = if writable {
            Some(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .map_err(|source| SegmentError::IoAtPath {
                        path: path.clone(),
                        source,
                    })?,
            )
        } else {
            None
        };

        Ok(Segment {
            id,
            path,
            read_file: RwLock::new(Some(read_file)),
            write_file: Mutex::new(write_file),
            size: AtomicU64::new(size),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn size(&self) -> u64 {
        self.size.load(Ordering::SeqCst)
    }

    /// True iff appending an entry for `key_len`/`value_len` bytes would
    /// keep the segment at or under `max_segment_size`. Conservative: the
    /// source this engine is modeled on only compared against the value
    /// length, which undercounts header and key overhead; this tightens
    /// the check so that no successful append can ever cross the cap.
    pub fn can_accept(&self, key_len: usize, value_len: usize, max_segment_size: u64) -> bool {
        let needed = HEADER_SIZE as u64 + key_len as u64 + value_len as u64;
        self.size().saturating_add(needed) <= max_segment_size
    }

    /// Appends one entry. Only legal on a writable segment; serialized
    /// with any other concurrent append on this segment.
    pub fn append(
        &self,
        key: &[u8],
        value: &[u8],
        timestamp: u64,
    ) -> Result<EntryIndex, SegmentError> {
        let mut guard = self.write_file.lock().unwrap();
        let file = guard.as_mut().ok_or(SegmentError::NotWritable)?;

        let encoded = encode(key, value, timestamp)?;
        file.write_all(&encoded)?;

        let entry_start = self.size.fetch_add(encoded.len() as u64, Ordering::SeqCst);
        let value_offset = entry_start + HEADER_SIZE as u64 + key.len() as u64;

        Ok(EntryIndex {
            segment_id: self.id,
            value_offset,
            value_len: value.len() as u32,
            timestamp,
        })
    }

    /// Positional read of exactly `len` bytes starting at `offset`. Safe
    /// to call concurrently with `append`, since appends never rewrite
    /// bytes that a prior `Put` already made readable.
    pub fn read_value(&self, offset: u64, len: u32) -> Result<Vec<u8>, SegmentError> {
        let guard = self.read_file.read().unwrap();
        let file = guard.as_ref().ok_or(SegmentError::Closed)?;

        let mut buf = vec![0u8; len as usize];
        let mut total = 0usize;
        while total < buf.len() {
            let n = file.read_at(&mut buf[total..], offset + total as u64)?;
            if n == 0 {
                return Err(SegmentError::ShortRead {
                    expected: buf.len(),
                    found: total,
                });
            }
            total += n;
        }
        Ok(buf)
    }

    /// Sequential scan of the entire segment from byte 0, used only at
    /// `Store::open` to rebuild the key directory. Reads through an
    /// independent file handle so it never contends with the segment's
    /// own read/write locks.
    pub fn scan(&self) -> Result<ScanReport, SegmentError> {
        let file = File::open(&self.path).map_err(|source| SegmentError::IoAtPath {
            path: self.path.clone(),
            source,
        })?;
        let file_len = self.size();
        let mut reader = BufReader::new(file);

        let mut entries = Vec::new();
        let mut stopped_at = None;

        loop {
            let offset = reader.stream_position()?;
            if offset >= file_len {
                break;
            }

            let mut header_buf = [0u8; HEADER_SIZE];
            if reader.read_exact(&mut header_buf).is_err() {
                stopped_at = Some(offset);
                break;
            }

            let header = match decode_header(&header_buf) {
                Ok(h) if h.key_size > 0 => h,
                _ => {
                    stopped_at = Some(offset);
                    break;
                }
            };

            let body_len = header.body_len();
            if offset + HEADER_SIZE as u64 + body_len as u64 > file_len {
                stopped_at = Some(offset);
                break;
            }

            let mut body_buf = vec![0u8; body_len];
            if reader.read_exact(&mut body_buf).is_err() {
                stopped_at = Some(offset);
                break;
            }

            let mut full = Vec::with_capacity(HEADER_SIZE + body_len);
            full.extend_from_slice(&header_buf);
            full.extend_from_slice(&body_buf);
            if !verify(&full) {
                stopped_at = Some(offset);
                break;
            }

            let entry = decode(&body_buf, &header)?;
            entries.push((entry, offset));
        }

        Ok(ScanReport { entries, stopped_at })
    }

    /// Closes the writable handle, demoting this segment to read-only.
    /// Part of rollover; a segment only ever goes writable -> read-only,
    /// never back.
    pub fn make_read_only(&self) -> Result<(), SegmentError> {
        self.write_file.lock().unwrap().take();
        Ok(())
    }

    /// Releases both file handles. Idempotent.
    pub fn close(&self) -> Result<(), SegmentError> {
        self.write_file.lock().unwrap().take();
        self.read_file.write().unwrap().take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_and_read_value_round_trip() {
        let dir = tempdir().unwrap();
        let seg = Segment::open(dir.path(), 1, true).unwrap();

        let idx = seg.append(b"key", b"value", 42).unwrap();
        assert_eq!(idx.segment_id, 1);
        assert_eq!(idx.value_len, 5);

        let value = seg.read_value(idx.value_offset, idx.value_len).unwrap();
        assert_eq!(value, b"value");
    }

    #[test]
    fn can_accept_respects_cap() {
        let dir = tempdir().unwrap();
        let seg = Segment::open(dir.path(), 1, true).unwrap();
        assert!(seg.can_accept(3, 5, 100));
        assert!(!seg.can_accept(3, 5, (HEADER_SIZE + 3 + 5 - 1) as u64));

        seg.append(b"key", b"value", 1).unwrap();
        let size = seg.size();
        assert!(seg.can_accept(1, 1, size + HEADER_SIZE as u64 + 2));
        assert!(!seg.can_accept(1, 1, size));
    }

    #[test]
    fn scan_recovers_multiple_entries_in_order() {
        let dir = tempdir().unwrap();
        let seg = Segment::open(dir.path(), 1, true).unwrap();
        seg.append(b"a", b"1", 1).unwrap();
        seg.append(b"b", b"2", 2).unwrap();
        seg.append(b"a", b"3", 3).unwrap();

        let report = seg.scan().unwrap();
        assert!(report.stopped_at.is_none());
        assert_eq!(report.entries.len(), 3);
        assert_eq!(report.entries[0].0.key, b"a");
        assert_eq!(report.entries[2].0.value, b"3");
    }

    #[test]
    fn scan_stops_at_truncated_tail() {
        let dir = tempdir().unwrap();
        {
            let seg = Segment::open(dir.path(), 1, true).unwrap();
            seg.append(b"a", b"1", 1).unwrap();
        }

        // Append a torn, partial entry directly, bypassing the codec.
        let path = segment_path(dir.path(), 1);
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[1, 2, 3, 4, 5, 6, 7]).unwrap();
        }

        let seg = Segment::open(dir.path(), 1, false).unwrap();
        let report = seg.scan().unwrap();
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].0.key, b"a");
        assert!(report.stopped_at.is_some());
    }

    #[test]
    fn make_read_only_then_append_fails() {
        let dir = tempdir().unwrap();
        let seg = Segment::open(dir.path(), 1, true).unwrap();
        seg.make_read_only().unwrap();
        assert!(matches!(
            seg.append(b"a", b"1", 1),
            Err(SegmentError::NotWritable)
        ));
    }

    #[test]
    fn parses_segment_id_from_path() {
        let dir = tempdir().unwrap();
        let path = segment_path(dir.path(), 42);
        assert_eq!(parse_segment_id(&path), Ok(42));

        let bad = dir.path().join("not-a-number.data");
        assert_eq!(parse_segment_id(&bad), Err(SegmentIdError::NotAnInt));
    }
}
