//! The `Store` façade: opens a directory of segments, rebuilds the key
//! directory, and routes `get`/`put`/`delete` to the right segment,
//! rolling over to a fresh active segment when the current one is full.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::entry::{DEFAULT_MAX_SEGMENT_SIZE, HEADER_SIZE};
use crate::error::{CloseError, DeleteError, GetError, InvalidArgument, OpenError, PutError, SegmentError};
use crate::keydir::{EntryIndex, KeyDirectory};
use crate::segment::{parse_segment_id, Segment, SEGMENT_EXT};

/// Tunable knobs for opening a `Store`. The segment size cap defaults to
/// [`DEFAULT_MAX_SEGMENT_SIZE`] (1 GiB); tests that need to exercise
/// rollover construct an `Options` with a small cap instead of writing
/// gigabytes of data.
#[derive(Debug, Clone, Copy)]
pub struct Options {
    pub max_segment_size: u64,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
        }
    }
}

struct StoreState {
    active: Arc<Segment>,
    closed: HashMap<u64, Arc<Segment>>,
}

/// An embeddable, log-structured key-value store over a directory of
/// `<id>.data` segments. Cheap to share across threads: every operation
/// takes `&self`.
pub struct Store {
    path: PathBuf,
    state: RwLock<StoreState>,
    keydir: KeyDirectory,
    max_segment_size: u64,
    closed: AtomicBool,
}

impl Store {
    /// Opens (or creates) the store at `path` using the default options.
    pub fn open(path: impl AsRef<Path>) -> Result<Store, OpenError> {
        Self::open_with_options(path, Options::default())
    }

    /// Opens (or creates) the store at `path`, scanning existing
    /// segments in ascending id order to rebuild the key directory. The
    /// highest-id segment becomes active; all others are opened
    /// read-only. An empty directory gets a fresh segment with id 1.
    pub fn open_with_options(path: impl AsRef<Path>, options: Options) -> Result<Store, OpenError> {
        let path = path.as_ref().to_path_buf();

        let mut ids = Vec::new();
        for entry in fs::read_dir(&path)? {
            let entry = entry?;
            let candidate = entry.path();
            if candidate.extension().and_then(|e| e.to_str()) != Some(SEGMENT_EXT) {
                continue;
            }
            match parse_segment_id(&candidate) {
                Ok(id) => ids.push(id),
                Err(_) => log::warn!("skipping non-segment file {:?}", candidate),
            }
        }
        ids.sort_unstable();

        let keydir = KeyDirectory::new();
        let mut closed_segments = HashMap::new();
        let active = if ids.is_empty() {
            Arc::new(Segment::open(&path, 1, true)?)
        } else {
            let last = ids.len() - 1;
            let mut active_segment = None;
            for (i, id) in ids.iter().enumerate() {
                let writable = i == last;
                let segment = Arc::new(Segment::open(&path, *id, writable)?);
                Self::recover_segment(&segment, *id, &keydir)?;

                if writable {
                    active_segment = Some(segment);
                } else {
                    closed_segments.insert(*id, segment);
                }
            }
            active_segment.expect("highest-id segment is always opened writable")
        };

        Ok(Store {
            path,
            state: RwLock::new(StoreState {
                active,
                closed: closed_segments,
            }),
            keydir,
            max_segment_size: options.max_segment_size,
            closed: AtomicBool::new(false),
        })
    }

    /// Scans one segment front-to-back at open time, upserting or
    /// removing keys in `keydir` in write order so the final state
    /// reflects each key's latest write.
    fn recover_segment(segment: &Segment, id: u64, keydir: &KeyDirectory) -> Result<(), SegmentError> {
        let report = segment.scan()?;
        if let Some(offset) = report.stopped_at {
            log::warn!(
                "segment {} truncated or corrupt at offset {}, discarding tail",
                id,
                offset
            );
        }

        for (entry, start) in report.entries {
            if entry.header.is_tombstone() {
                keydir.remove(&entry.key);
            } else {
                let value_offset = start + HEADER_SIZE as u64 + entry.header.key_size as u64;
                keydir.put(
                    entry.key,
                    EntryIndex {
                        segment_id: id,
                        value_offset,
                        value_len: entry.header.value_size,
                        timestamp: entry.header.timestamp,
                    },
                );
            }
        }

        log::debug!("recovered segment {} ({} live keys so far)", id, keydir.len());
        Ok(())
    }

    /// Looks up `key` and, if present, reads its value back from the
    /// owning segment. Returns `Ok(None)` for an absent key — distinct
    /// from a stored zero-length value, which returns `Ok(Some(vec![]))`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, GetError> {
        if self.is_closed() {
            return Err(GetError::Closed);
        }

        let index = match self.keydir.get(key) {
            Some(index) => index,
            None => return Ok(None),
        };

        let segment = {
            let state = self.state.read().unwrap();
            self.resolve_segment(&state, index.segment_id)
        };

        // The directory can briefly point at a segment id that a
        // concurrent merge (not implemented here) would have retired;
        // treat that race as a miss rather than panicking.
        let segment = match segment {
            Some(segment) => segment,
            None => return Ok(None),
        };

        let value = segment.read_value(index.value_offset, index.value_len)?;
        Ok(Some(value))
    }

    /// Appends `value` for `key`, rolling the active segment over first
    /// if it can't accept the new entry.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), PutError> {
        if self.is_closed() {
            return Err(PutError::Closed);
        }
        if key.is_empty() {
            return Err(InvalidArgument::EmptyKey.into());
        }
        let needed = HEADER_SIZE as u64 + key.len() as u64 + value.len() as u64;
        if needed > self.max_segment_size {
            return Err(InvalidArgument::ValueTooLarge {
                value_len: value.len() as u64,
                cap: self.max_segment_size,
            }
            .into());
        }

        let mut state = self.state.write().unwrap();
        if !state.active.can_accept(key.len(), value.len(), self.max_segment_size) {
            self.rollover(&mut state)?;
        }

        let timestamp = current_timestamp();
        let index = state.active.append(key, value, timestamp)?;
        self.keydir.put(key.to_vec(), index);
        Ok(())
    }

    /// Appends a tombstone for `key` and drops it from the directory.
    /// Errs with `KeyNotFound` if the key is already absent.
    pub fn delete(&self, key: &[u8]) -> Result<(), DeleteError> {
        if self.is_closed() {
            return Err(DeleteError::Closed);
        }

        // The existence check and the append+remove below must run under
        // the same critical section: otherwise two concurrent deletes of
        // the same key can both observe it present and both succeed.
        let mut state = self.state.write().unwrap();
        if self.keydir.get(key).is_none() {
            return Err(DeleteError::KeyNotFound);
        }

        if !state.active.can_accept(key.len(), 0, self.max_segment_size) {
            self.rollover(&mut state)?;
        }

        let timestamp = current_timestamp();
        state.active.append(key, &[], timestamp)?;
        self.keydir.remove(key);
        Ok(())
    }

    /// Closes every open segment handle. Idempotent; operations after
    /// `close` fail with a `Closed` error rather than panicking.
    pub fn close(&self) -> Result<(), CloseError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let state = self.state.read().unwrap();
        state.active.close()?;
        for segment in state.closed.values() {
            segment.close()?;
        }
        Ok(())
    }

    fn rollover(&self, state: &mut StoreState) -> Result<(), SegmentError> {
        let old_id = state.active.id();
        state.active.make_read_only()?;

        let new_id = old_id + 1;
        let new_active = Arc::new(Segment::open(&self.path, new_id, true)?);
        let old_active = std::mem::replace(&mut state.active, new_active);
        state.closed.insert(old_id, old_active);

        log::debug!("rolled active segment over from {} to {}", old_id, new_id);
        Ok(())
    }

    fn resolve_segment(&self, state: &StoreState, segment_id: u64) -> Option<Arc<Segment>> {
        if state.active.id() == segment_id {
            Some(Arc::clone(&state.active))
        } else {
            state.closed.get(&segment_id).cloned()
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_secs()
}
