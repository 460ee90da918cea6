//! An embeddable, single-process, persistent key-value store built on a
//! log-structured on-disk layout with an in-memory index — the Bitcask
//! model: every mutation is appended to an active log segment, and a
//! memory-resident directory from key to physical location gives point
//! reads a single seek.
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = embercask::Store::open("./data")?;
//! store.put(b"hello", b"world")?;
//! assert_eq!(store.get(b"hello")?, Some(b"world".to_vec()));
//! store.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! Out of scope, by design: multi-process access to one directory,
//! fsync-backed durability stronger than "the latest fully written entry
//! is recoverable", cross-key transactions, range scans, compression,
//! encryption, and the merge/compaction policy (its interface is staked
//! out by the `Segment`/`KeyDirectory` contracts but no policy ships
//! here).

mod entry;
mod error;
mod keydir;
mod segment;
mod store;

pub use error::{
    CloseError, DeleteError, EntryError, GetError, InvalidArgument, OpenError, PutError,
    SegmentError,
};
pub use store::{Options, Store};
