//! Container formats for coded payloads.
//!
//! Two magic-discriminated variants, all integers little-endian:
//!
//! Plain (25-byte header + one payload):
//! - magic: `b"LLMC"`
//! - version: u8 (= 1)
//! - original_len: u32 LE (original text byte length)
//! - token_count: u32 LE
//! - model_hash: u32 LE
//! - reserved: 8 zero bytes
//!
//! Chunked (25-byte base + chunk tables + concatenated payloads):
//! - magic: `b"LLMP"`
//! - version: u8
//! - original_len: u32 LE
//! - total_token_count: u32 LE (reconstructed stream, overlap excluded)
//! - model_hash: u32 LE
//! - chunk_count: u16 LE
//! - chunk_size: u16 LE (configured tokens per chunk)
//! - overlap_size: u16 LE
//! - reserved: 2 zero bytes
//! - chunk_offsets: [u32; chunk_count] LE (absolute byte offsets)
//! - chunk_token_counts: [u16; chunk_count] LE (on-wire tokens, overlap included)

use crate::error::{Error, Result};

/// Magic bytes of the plain container.
pub const PLAIN_MAGIC: [u8; 4] = *b"LLMC";
/// Magic bytes of the chunked container.
pub const CHUNKED_MAGIC: [u8; 4] = *b"LLMP";
/// Newest format revision this build understands.
pub const FORMAT_VERSION: u8 = 1;

/// Plain header size in bytes.
pub const PLAIN_HEADER_SIZE: usize = 25;
/// Chunked header size in bytes before the chunk tables.
pub const CHUNKED_HEADER_BASE_SIZE: usize = 25;

/// True when the buffer starts with the chunked magic.
pub fn is_chunked(data: &[u8]) -> bool {
    data.len() >= 4 && data[0..4] == CHUNKED_MAGIC
}

fn check_magic_and_version(data: &[u8], expected: &[u8; 4]) -> Result<()> {
    if data.len() < 5 {
        return Err(Error::TruncatedHeader {
            required: 5,
            provided: data.len(),
        });
    }
    let mut magic = [0u8; 4];
    magic.copy_from_slice(&data[0..4]);
    if &magic != expected {
        return Err(Error::BadMagic(magic));
    }
    if data[4] != FORMAT_VERSION {
        return Err(Error::UnsupportedVersion {
            found: data[4],
            newest: FORMAT_VERSION,
        });
    }
    Ok(())
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
}

fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes(data[offset..offset + 2].try_into().unwrap())
}

/// Header of the plain (single-payload) container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlainHeader {
    pub original_len: u32,
    pub token_count: u32,
    pub model_hash: u32,
}

impl PlainHeader {
    /// Serialize to the fixed 25-byte layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(PLAIN_HEADER_SIZE);
        buf.extend_from_slice(&PLAIN_MAGIC);
        buf.push(FORMAT_VERSION);
        buf.extend_from_slice(&self.original_len.to_le_bytes());
        buf.extend_from_slice(&self.token_count.to_le_bytes());
        buf.extend_from_slice(&self.model_hash.to_le_bytes());
        buf.extend_from_slice(&[0u8; 8]);
        buf
    }

    /// Parse from the front of a buffer. Magic and version are validated
    /// before any other field.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        check_magic_and_version(data, &PLAIN_MAGIC)?;
        if data.len() < PLAIN_HEADER_SIZE {
            return Err(Error::TruncatedHeader {
                required: PLAIN_HEADER_SIZE,
                provided: data.len(),
            });
        }
        Ok(Self {
            original_len: read_u32(data, 5),
            token_count: read_u32(data, 9),
            model_hash: read_u32(data, 13),
        })
    }
}

/// Split a plain container into its header and coded payload.
pub fn split_plain(container: &[u8]) -> Result<(PlainHeader, &[u8])> {
    let header = PlainHeader::from_bytes(container)?;
    Ok((header, &container[PLAIN_HEADER_SIZE..]))
}

/// Header of the chunked container, including both chunk tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedHeader {
    pub original_len: u32,
    pub total_token_count: u32,
    pub model_hash: u32,
    pub chunk_size: u16,
    pub overlap_size: u16,
    /// Absolute byte offset of each chunk payload from the container start.
    pub chunk_offsets: Vec<u32>,
    /// On-wire token count of each chunk, overlap prefix included.
    pub chunk_token_counts: Vec<u16>,
}

impl ChunkedHeader {
    pub fn chunk_count(&self) -> usize {
        self.chunk_offsets.len()
    }

    /// Total header size: 25-byte base plus 6 bytes per chunk.
    pub fn header_size(&self) -> usize {
        CHUNKED_HEADER_BASE_SIZE + 6 * self.chunk_count()
    }

    /// Serialize base header, offset table, then token-count table.
    pub fn to_bytes(&self) -> Vec<u8> {
        assert_eq!(
            self.chunk_offsets.len(),
            self.chunk_token_counts.len(),
            "offset and token-count tables must have equal length"
        );
        assert!(self.chunk_offsets.len() <= u16::MAX as usize, "too many chunks");

        let mut buf = Vec::with_capacity(self.header_size());
        buf.extend_from_slice(&CHUNKED_MAGIC);
        buf.push(FORMAT_VERSION);
        buf.extend_from_slice(&self.original_len.to_le_bytes());
        buf.extend_from_slice(&self.total_token_count.to_le_bytes());
        buf.extend_from_slice(&self.model_hash.to_le_bytes());
        buf.extend_from_slice(&(self.chunk_offsets.len() as u16).to_le_bytes());
        buf.extend_from_slice(&self.chunk_size.to_le_bytes());
        buf.extend_from_slice(&self.overlap_size.to_le_bytes());
        buf.extend_from_slice(&[0u8; 2]);
        for &offset in &self.chunk_offsets {
            buf.extend_from_slice(&offset.to_le_bytes());
        }
        for &count in &self.chunk_token_counts {
            buf.extend_from_slice(&count.to_le_bytes());
        }
        buf
    }

    /// Parse from the front of a buffer. Magic and version are validated
    /// before any other field; the offset table must be strictly increasing.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        check_magic_and_version(data, &CHUNKED_MAGIC)?;
        if data.len() < CHUNKED_HEADER_BASE_SIZE {
            return Err(Error::TruncatedHeader {
                required: CHUNKED_HEADER_BASE_SIZE,
                provided: data.len(),
            });
        }

        let original_len = read_u32(data, 5);
        let total_token_count = read_u32(data, 9);
        let model_hash = read_u32(data, 13);
        let chunk_count = read_u16(data, 17) as usize;
        let chunk_size = read_u16(data, 19);
        let overlap_size = read_u16(data, 21);

        let table_end = CHUNKED_HEADER_BASE_SIZE + 6 * chunk_count;
        if data.len() < table_end {
            return Err(Error::TruncatedHeader {
                required: table_end,
                provided: data.len(),
            });
        }

        let mut chunk_offsets = Vec::with_capacity(chunk_count);
        let mut cursor = CHUNKED_HEADER_BASE_SIZE;
        for _ in 0..chunk_count {
            chunk_offsets.push(read_u32(data, cursor));
            cursor += 4;
        }
        let mut chunk_token_counts = Vec::with_capacity(chunk_count);
        for _ in 0..chunk_count {
            chunk_token_counts.push(read_u16(data, cursor));
            cursor += 2;
        }

        for pair in chunk_offsets.windows(2) {
            if pair[1] <= pair[0] {
                return Err(Error::InvalidChunkTable(format!(
                    "offsets not strictly increasing: {} then {}",
                    pair[0], pair[1]
                )));
            }
        }

        Ok(Self {
            original_len,
            total_token_count,
            model_hash,
            chunk_size,
            overlap_size,
            chunk_offsets,
            chunk_token_counts,
        })
    }

    /// Borrow the per-chunk payload slices out of the full container.
    ///
    /// Validates the offsets against the container bounds: the first offset
    /// must equal the header size and every payload must lie inside the
    /// container.
    pub fn payload_slices<'a>(&self, container: &'a [u8]) -> Result<Vec<&'a [u8]>> {
        let k = self.chunk_count();
        if k == 0 {
            return Ok(Vec::new());
        }

        if self.chunk_offsets[0] as usize != self.header_size() {
            return Err(Error::InvalidChunkTable(format!(
                "first chunk offset {} does not match header size {}",
                self.chunk_offsets[0],
                self.header_size()
            )));
        }

        let mut slices = Vec::with_capacity(k);
        for i in 0..k {
            let start = self.chunk_offsets[i] as usize;
            let end = if i + 1 < k {
                self.chunk_offsets[i + 1] as usize
            } else {
                container.len()
            };
            if start > container.len() || end > container.len() || start > end {
                return Err(Error::TruncatedContainer {
                    required: end.max(start),
                    provided: container.len(),
                });
            }
            slices.push(&container[start..end]);
        }
        Ok(slices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_header_roundtrip() {
        let header = PlainHeader {
            original_len: 5000,
            token_count: 1234,
            model_hash: 0xABCD_EF00,
        };
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), PLAIN_HEADER_SIZE);
        assert_eq!(&bytes[0..4], b"LLMC");
        assert_eq!(bytes[4], 1);
        // Reserved tail is zeroed.
        assert_eq!(&bytes[17..25], &[0u8; 8]);

        let parsed = PlainHeader::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_split_plain() {
        let header = PlainHeader {
            original_len: 3,
            token_count: 2,
            model_hash: 7,
        };
        let mut container = header.to_bytes();
        container.extend_from_slice(&[0xAA, 0xBB, 0xCC]);

        let (parsed, payload) = split_plain(&container).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(payload, &[0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn test_chunked_header_roundtrip() {
        let header = ChunkedHeader {
            original_len: 1000,
            total_token_count: 84,
            model_hash: 0x1234_5678,
            chunk_size: 64,
            overlap_size: 8,
            chunk_offsets: vec![25, 100, 175],
            chunk_token_counts: vec![30, 35, 35],
        };
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), 25 + 6 * 3);
        assert_eq!(&bytes[0..4], b"LLMP");

        let parsed = ChunkedHeader::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.chunk_count(), 3);
    }

    #[test]
    fn test_empty_chunked_header() {
        let header = ChunkedHeader {
            original_len: 0,
            total_token_count: 0,
            model_hash: 9,
            chunk_size: 128,
            overlap_size: 16,
            chunk_offsets: Vec::new(),
            chunk_token_counts: Vec::new(),
        };
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), CHUNKED_HEADER_BASE_SIZE);
        let parsed = ChunkedHeader::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.chunk_count(), 0);
        assert!(parsed.payload_slices(&bytes).unwrap().is_empty());
    }

    #[test]
    fn test_is_chunked_discrimination() {
        let plain = PlainHeader {
            original_len: 0,
            token_count: 0,
            model_hash: 0,
        }
        .to_bytes();
        assert!(!is_chunked(&plain));

        let chunked = ChunkedHeader {
            original_len: 0,
            total_token_count: 0,
            model_hash: 0,
            chunk_size: 1,
            overlap_size: 0,
            chunk_offsets: Vec::new(),
            chunk_token_counts: Vec::new(),
        }
        .to_bytes();
        assert!(is_chunked(&chunked));

        assert!(!is_chunked(b"LLM"));
        assert!(!is_chunked(b"ZZZZ whatever"));
        assert!(!is_chunked(&[]));
    }

    #[test]
    fn test_bad_magic_is_rejected() {
        let mut bytes = PlainHeader {
            original_len: 1,
            token_count: 1,
            model_hash: 1,
        }
        .to_bytes();
        bytes[0] = b'X';
        assert!(matches!(
            PlainHeader::from_bytes(&bytes),
            Err(Error::BadMagic(_))
        ));
        // A chunked container is not a plain one.
        let chunked = ChunkedHeader {
            original_len: 0,
            total_token_count: 0,
            model_hash: 0,
            chunk_size: 1,
            overlap_size: 0,
            chunk_offsets: Vec::new(),
            chunk_token_counts: Vec::new(),
        }
        .to_bytes();
        assert!(matches!(
            PlainHeader::from_bytes(&chunked),
            Err(Error::BadMagic(_))
        ));
    }

    #[test]
    fn test_newer_version_is_rejected() {
        let mut bytes = PlainHeader {
            original_len: 1,
            token_count: 1,
            model_hash: 1,
        }
        .to_bytes();
        bytes[4] = 2;
        assert!(matches!(
            PlainHeader::from_bytes(&bytes),
            Err(Error::UnsupportedVersion { found: 2, .. })
        ));
    }

    #[test]
    fn test_truncated_header_is_rejected() {
        let bytes = PlainHeader {
            original_len: 1,
            token_count: 1,
            model_hash: 1,
        }
        .to_bytes();
        assert!(PlainHeader::from_bytes(&bytes[..10]).is_err());
        assert!(PlainHeader::from_bytes(&bytes[..3]).is_err());
    }

    #[test]
    fn test_truncated_chunk_table_is_rejected() {
        let header = ChunkedHeader {
            original_len: 10,
            total_token_count: 10,
            model_hash: 0,
            chunk_size: 4,
            overlap_size: 1,
            chunk_offsets: vec![37, 40],
            chunk_token_counts: vec![4, 7],
        };
        let bytes = header.to_bytes();
        assert!(ChunkedHeader::from_bytes(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn test_non_increasing_offsets_are_rejected() {
        let header = ChunkedHeader {
            original_len: 10,
            total_token_count: 10,
            model_hash: 0,
            chunk_size: 4,
            overlap_size: 1,
            chunk_offsets: vec![40, 31],
            chunk_token_counts: vec![4, 7],
        };
        let bytes = header.to_bytes();
        assert!(matches!(
            ChunkedHeader::from_bytes(&bytes),
            Err(Error::InvalidChunkTable(_))
        ));
    }

    #[test]
    fn test_payload_slices() {
        let header = ChunkedHeader {
            original_len: 10,
            total_token_count: 10,
            model_hash: 0,
            chunk_size: 4,
            overlap_size: 1,
            chunk_offsets: vec![43, 46, 50],
            chunk_token_counts: vec![4, 5, 5],
        };
        assert_eq!(header.header_size(), 43);

        let mut container = header.to_bytes();
        container.extend_from_slice(&[1, 2, 3]); // chunk 0
        container.extend_from_slice(&[4, 5, 6, 7]); // chunk 1
        container.extend_from_slice(&[8, 9]); // chunk 2

        let slices = header.payload_slices(&container).unwrap();
        assert_eq!(slices, vec![&[1u8, 2, 3][..], &[4, 5, 6, 7][..], &[8, 9][..]]);
    }

    #[test]
    fn test_payload_slices_validate_bounds() {
        let header = ChunkedHeader {
            original_len: 10,
            total_token_count: 10,
            model_hash: 0,
            chunk_size: 4,
            overlap_size: 1,
            chunk_offsets: vec![37, 400],
            chunk_token_counts: vec![4, 5],
        };
        let mut container = header.to_bytes();
        container.extend_from_slice(&[1, 2, 3]);
        assert!(header.payload_slices(&container).is_err());

        // First offset must match the header size.
        let header = ChunkedHeader {
            chunk_offsets: vec![25, 40],
            ..header
        };
        let container = header.to_bytes();
        assert!(matches!(
            header.payload_slices(&container),
            Err(Error::InvalidChunkTable(_))
        ));
    }
}
