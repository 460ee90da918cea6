use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while decoding or verifying an on-disk entry.
#[derive(Error, Debug)]
pub enum EntryError {
    #[error("key must not be empty")]
    EmptyKey,

    #[error("key exceeds max size (expected < {})", u32::MAX)]
    KeyTooLarge,

    #[error("value exceeds max size (expected < {})", u32::MAX)]
    ValueTooLarge,

    #[error("entry body truncated (expected {expected} bytes, found {found})")]
    Truncated { expected: usize, found: usize },

    #[error("invalid checksum (expected {expected:?}, found {found:?})")]
    ChecksumMismatch { expected: u32, found: u32 },
}

/// Errors raised while parsing a segment id out of a `<id>.data` path.
#[derive(Error, Debug, PartialEq)]
pub(crate) enum SegmentIdError {
    #[error("segment stem is not a positive integer")]
    NotAnInt,

    #[error("segment path has no stem")]
    EmptyStem,

    #[error("segment path is not valid utf-8: {0:?}")]
    InvalidUtf8(PathBuf),
}

/// Errors raised by the `Segment` (data file) layer.
#[derive(Error, Debug)]
pub enum SegmentError {
    #[error("segment is not open for writing")]
    NotWritable,

    #[error("segment is closed")]
    Closed,

    #[error("short read: expected {expected} bytes, got {found}")]
    ShortRead { expected: usize, found: usize },

    #[error("entry error")]
    Entry(#[from] EntryError),

    #[error("IO error at path: {path}")]
    IoAtPath {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("IO error")]
    Io(#[from] io::Error),
}

/// Errors raised while opening a `Store`.
#[derive(Error, Debug)]
pub enum OpenError {
    #[error("segment error")]
    Segment(#[from] SegmentError),

    #[error("IO error")]
    Io(#[from] io::Error),
}

/// Argument validation failures, surfaced by `put`.
#[derive(Error, Debug)]
pub enum InvalidArgument {
    #[error("key must not be empty")]
    EmptyKey,

    #[error("value of {value_len} bytes cannot fit in a fresh segment (cap {cap} bytes)")]
    ValueTooLarge { value_len: u64, cap: u64 },
}

/// Errors raised by `Store::put`.
#[derive(Error, Debug)]
pub enum PutError {
    #[error("the store is closed")]
    Closed,

    #[error("invalid argument")]
    InvalidArgument(#[from] InvalidArgument),

    #[error("segment error")]
    Segment(#[from] SegmentError),

    #[error("IO error")]
    Io(#[from] io::Error),
}

/// Errors raised by `Store::get`.
#[derive(Error, Debug)]
pub enum GetError {
    #[error("the store is closed")]
    Closed,

    #[error("segment error")]
    Segment(#[from] SegmentError),

    #[error("IO error")]
    Io(#[from] io::Error),
}

/// Errors raised by `Store::delete`.
#[derive(Error, Debug)]
pub enum DeleteError {
    #[error("the store is closed")]
    Closed,

    #[error("key not found")]
    KeyNotFound,

    #[error("segment error")]
    Segment(#[from] SegmentError),

    #[error("IO error")]
    Io(#[from] io::Error),
}

/// Errors raised by `Store::close`.
#[derive(Error, Debug)]
pub enum CloseError {
    #[error("segment error")]
    Segment(#[from] SegmentError),

    #[error("IO error")]
    Io(#[from] io::Error),
}
