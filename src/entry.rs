//! The on-disk entry format: a fixed 20-byte header (CRC, timestamp, key
//! size, value size) followed by the raw key and value bytes, all
//! big-endian.

use std::mem::size_of;

use crate::error::EntryError;

/// `crc(4) + timestamp(8) + key_size(4) + value_size(4)`.
pub const HEADER_SIZE: usize = size_of::<u32>() + size_of::<u64>() + size_of::<u32>() + size_of::<u32>();

/// The segment size cap used unless a `Store` is opened with different
/// `Options`.
pub const DEFAULT_MAX_SEGMENT_SIZE: u64 = 1 << 30; // 1 GiB

/// A value length of zero marks a tombstone (deletion) entry.
pub const TOMBSTONE_VALUE_SIZE: u32 = 0;

/// The fixed-width, scalar fields that precede every entry's key and value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub crc: u32,
    pub timestamp: u64,
    pub key_size: u32,
    pub value_size: u32,
}

impl Header {
    pub fn is_tombstone(&self) -> bool {
        self.value_size == TOMBSTONE_VALUE_SIZE
    }

    pub fn body_len(&self) -> usize {
        self.key_size as usize + self.value_size as usize
    }
}

/// A fully decoded on-disk record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub header: Header,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Encodes `key`/`value` into a single buffer ready to append to a segment.
///
/// Layout: `crc(4) | timestamp(8) | key_size(4) | value_size(4) | key | value`,
/// with the CRC computed over every byte from `timestamp` onward.
pub fn encode(key: &[u8], value: &[u8], timestamp: u64) -> Result<Vec<u8>, EntryError> {
    if key.is_empty() {
        return Err(EntryError::EmptyKey);
    }
    let key_size = u32::try_from(key.len()).map_err(|_| EntryError::KeyTooLarge)?;
    let value_size = u32::try_from(value.len()).map_err(|_| EntryError::ValueTooLarge)?;

    let mut buf = Vec::with_capacity(HEADER_SIZE + key.len() + value.len());
    buf.extend_from_slice(&[0u8; size_of::<u32>()]); // crc placeholder
    buf.extend_from_slice(&timestamp.to_be_bytes());
    buf.extend_from_slice(&key_size.to_be_bytes());
    buf.extend_from_slice(&value_size.to_be_bytes());
    buf.extend_from_slice(key);
    buf.extend_from_slice(value);

    let crc = crc32fast::hash(&buf[size_of::<u32>()..]);
    buf[0..size_of::<u32>()].copy_from_slice(&crc.to_be_bytes());

    Ok(buf)
}

/// Parses the fixed-width header out of the first [`HEADER_SIZE`] bytes of
/// an entry. Does not validate the CRC — that requires the body too, see
/// [`verify`].
pub fn decode_header(bytes: &[u8]) -> Result<Header, EntryError> {
    if bytes.len() < HEADER_SIZE {
        return Err(EntryError::Truncated {
            expected: HEADER_SIZE,
            found: bytes.len(),
        });
    }

    let crc = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
    let timestamp = u64::from_be_bytes(bytes[4..12].try_into().unwrap());
    let key_size = u32::from_be_bytes(bytes[12..16].try_into().unwrap());
    let value_size = u32::from_be_bytes(bytes[16..20].try_into().unwrap());

    Ok(Header {
        crc,
        timestamp,
        key_size,
        value_size,
    })
}

/// Slices `key` and `value` out of the bytes following the header.
pub fn decode(body: &[u8], header: &Header) -> Result<Entry, EntryError> {
    let expected = header.body_len();
    if body.len() < expected {
        return Err(EntryError::Truncated {
            expected,
            found: body.len(),
        });
    }

    let key = body[..header.key_size as usize].to_vec();
    let value = body[header.key_size as usize..expected].to_vec();

    Ok(Entry {
        header: *header,
        key,
        value,
    })
}

/// Recomputes the CRC over `entry_bytes[4..]` and compares it against the
/// CRC stored in `entry_bytes[0..4]`. `entry_bytes` must be a full,
/// header-plus-body encoded entry.
pub fn verify(entry_bytes: &[u8]) -> bool {
    if entry_bytes.len() < HEADER_SIZE {
        return false;
    }
    let stored = u32::from_be_bytes(entry_bytes[0..4].try_into().unwrap());
    let computed = crc32fast::hash(&entry_bytes[4..]);
    stored == computed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let encoded = encode(b"key", b"value", 1_700_000_000).unwrap();
        assert_eq!(encoded.len(), HEADER_SIZE + 3 + 5);

        let header = decode_header(&encoded[..HEADER_SIZE]).unwrap();
        assert_eq!(header.key_size, 3);
        assert_eq!(header.value_size, 5);
        assert_eq!(header.timestamp, 1_700_000_000);
        assert!(!header.is_tombstone());

        let entry = decode(&encoded[HEADER_SIZE..], &header).unwrap();
        assert_eq!(entry.key, b"key");
        assert_eq!(entry.value, b"value");

        assert!(verify(&encoded));
    }

    #[test]
    fn tombstone_has_zero_value_size() {
        let encoded = encode(b"key", b"", 1).unwrap();
        let header = decode_header(&encoded[..HEADER_SIZE]).unwrap();
        assert!(header.is_tombstone());
    }

    #[test]
    fn rejects_empty_key() {
        assert!(matches!(encode(b"", b"value", 1), Err(EntryError::EmptyKey)));
    }

    #[test]
    fn verify_detects_corruption() {
        let mut encoded = encode(b"key", b"value", 1).unwrap();
        let last = encoded.len() - 1;
        encoded[last] ^= 0xFF;
        assert!(!verify(&encoded));
    }

    #[test]
    fn decode_header_rejects_short_buffer() {
        let short = [0u8; HEADER_SIZE - 1];
        assert!(matches!(
            decode_header(&short),
            Err(EntryError::Truncated { .. })
        ));
    }

    #[test]
    fn decode_rejects_truncated_body() {
        let encoded = encode(b"key", b"value", 1).unwrap();
        let header = decode_header(&encoded[..HEADER_SIZE]).unwrap();
        let short_body = &encoded[HEADER_SIZE..encoded.len() - 1];
        assert!(matches!(
            decode(short_body, &header),
            Err(EntryError::Truncated { .. })
        ));
    }
}
