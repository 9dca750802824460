//! Self-describing container metadata
//!
//! The container records every chunk's plaintext length explicitly, so the
//! decoder never infers chunk boundaries from the blob. Ciphertext length of
//! chunk `i` is always `lengths[i] + 16`.
//!
//! Binary layout (version 1, integers big-endian):
//! ```text
//! magic        4 bytes  "CSEL"
//! version      u8
//! flags        u8       bit0: chunk position bound as AAD
//! base_nonce   12 bytes
//! chunk_size   u32
//! total_size   u64
//! chunk_count  u32
//! lengths      chunk_count x u32
//! mime_len     u16
//! mime         mime_len bytes, UTF-8
//! digest       32 bytes, SHA-256 of the whole plaintext
//! ```

use serde::{Deserialize, Serialize};

use crate::chunk::ChunkBinding;
use crate::digest::Digest;
use crate::error::{CryptoError, CryptoResult};
use crate::nonce::BaseNonce;
use crate::{DIGEST_SIZE, MAX_CHUNKS, NONCE_SIZE, TAG_SIZE};

pub const CONTAINER_MAGIC: &[u8; 4] = b"CSEL";
pub const CONTAINER_VERSION: u8 = 1;

/// Chunk index and final flag are part of each chunk's AAD
pub const FLAG_BIND_POSITION: u8 = 0x01;
const KNOWN_FLAGS: u8 = FLAG_BIND_POSITION;

/// Number of chunks a file of `total_size` bytes splits into.
///
/// A zero-byte file is one zero-length chunk, so even an empty file carries
/// an authentication tag.
pub fn expected_chunk_count(total_size: u64, chunk_size: u32) -> u64 {
    if total_size == 0 || chunk_size == 0 {
        1
    } else {
        total_size.div_ceil(chunk_size as u64)
    }
}

/// Durable record of one encryption session. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    version: u8,
    flags: u8,
    base_nonce: BaseNonce,
    chunk_size: u32,
    total_size: u64,
    chunk_count: u32,
    chunk_lengths: Vec<u32>,
    mime: String,
    digest: Digest,
}

impl Container {
    /// Build the container at the end of an encryption session.
    pub fn finalize(
        base_nonce: BaseNonce,
        chunk_size: u32,
        chunk_lengths: Vec<u32>,
        total_size: u64,
        mime: impl Into<String>,
        digest: Digest,
        binding: ChunkBinding,
    ) -> CryptoResult<Self> {
        let chunk_count =
            u32::try_from(chunk_lengths.len()).map_err(|_| CryptoError::ChunkCountExceeded {
                chunks: chunk_lengths.len() as u64,
                max: MAX_CHUNKS,
            })?;

        let flags = match binding {
            ChunkBinding::Position => FLAG_BIND_POSITION,
            ChunkBinding::None => 0,
        };

        let container = Self {
            version: CONTAINER_VERSION,
            flags,
            base_nonce,
            chunk_size,
            total_size,
            chunk_count,
            chunk_lengths,
            mime: mime.into(),
            digest,
        };
        container.validate()?;
        Ok(container)
    }

    /// Check every internal consistency rule. Runs before any decryption.
    pub fn validate(&self) -> CryptoResult<()> {
        if self.version != CONTAINER_VERSION {
            return Err(malformed(format!("unsupported version {}", self.version)));
        }
        if self.flags & !KNOWN_FLAGS != 0 {
            return Err(malformed(format!("unknown flags {:#04x}", self.flags)));
        }
        if self.chunk_size == 0 {
            return Err(malformed("chunk size is zero"));
        }
        if self.mime.len() > u16::MAX as usize {
            return Err(malformed("mime longer than 65535 bytes"));
        }
        if self.chunk_count as usize != self.chunk_lengths.len() {
            return Err(malformed(format!(
                "chunk count {} but {} lengths recorded",
                self.chunk_count,
                self.chunk_lengths.len()
            )));
        }

        let expected = expected_chunk_count(self.total_size, self.chunk_size);
        if self.chunk_count as u64 != expected {
            return Err(malformed(format!(
                "chunk count {} does not match {} bytes at chunk size {} (expected {expected})",
                self.chunk_count, self.total_size, self.chunk_size
            )));
        }

        let mut sum = 0u64;
        for (i, &len) in self.chunk_lengths.iter().enumerate() {
            if len > self.chunk_size {
                return Err(malformed(format!(
                    "chunk {i} length {len} exceeds chunk size {}",
                    self.chunk_size
                )));
            }
            if len == 0 && self.total_size != 0 {
                return Err(malformed(format!("chunk {i} is empty in a non-empty file")));
            }
            sum += len as u64;
        }
        if sum != self.total_size {
            return Err(malformed(format!(
                "chunk lengths sum to {sum}, total size is {}",
                self.total_size
            )));
        }
        Ok(())
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn binding(&self) -> ChunkBinding {
        if self.flags & FLAG_BIND_POSITION != 0 {
            ChunkBinding::Position
        } else {
            ChunkBinding::None
        }
    }

    pub fn base_nonce(&self) -> &BaseNonce {
        &self.base_nonce
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn chunk_count(&self) -> u32 {
        self.chunk_count
    }

    pub fn chunk_lengths(&self) -> &[u32] {
        &self.chunk_lengths
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    /// Ciphertext bytes of chunk `index` (plaintext length plus tag).
    pub fn ciphertext_len(&self, index: usize) -> Option<u64> {
        self.chunk_lengths
            .get(index)
            .map(|&len| len as u64 + TAG_SIZE as u64)
    }

    /// Byte offset of chunk `index` within the ciphertext blob.
    pub fn ciphertext_offset(&self, index: usize) -> Option<u64> {
        if index > self.chunk_lengths.len() {
            return None;
        }
        let plain: u64 = self.chunk_lengths[..index].iter().map(|&l| l as u64).sum();
        Some(plain + (index * TAG_SIZE) as u64)
    }

    /// Total size of the ciphertext blob this container describes.
    pub fn ciphertext_size(&self) -> u64 {
        self.total_size + self.chunk_count as u64 * TAG_SIZE as u64
    }

    /// Serialize to the binary wire format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            4 + 2 + NONCE_SIZE + 4 + 8 + 4 + 4 * self.chunk_lengths.len() + 2 + self.mime.len()
                + DIGEST_SIZE,
        );
        out.extend_from_slice(CONTAINER_MAGIC);
        out.push(self.version);
        out.push(self.flags);
        out.extend_from_slice(self.base_nonce.as_bytes());
        out.extend_from_slice(&self.chunk_size.to_be_bytes());
        out.extend_from_slice(&self.total_size.to_be_bytes());
        out.extend_from_slice(&self.chunk_count.to_be_bytes());
        for len in &self.chunk_lengths {
            out.extend_from_slice(&len.to_be_bytes());
        }
        // validate() bounds the mime to u16
        out.extend_from_slice(&(self.mime.len() as u16).to_be_bytes());
        out.extend_from_slice(self.mime.as_bytes());
        out.extend_from_slice(self.digest.as_bytes());
        out
    }

    /// Parse and validate the binary wire format.
    pub fn parse(bytes: &[u8]) -> CryptoResult<Self> {
        let mut r = ByteReader::new(bytes);

        if r.take(4)? != CONTAINER_MAGIC {
            return Err(malformed("bad magic"));
        }
        let version = r.u8()?;
        if version != CONTAINER_VERSION {
            return Err(malformed(format!("unsupported version {version}")));
        }
        let flags = r.u8()?;
        let base_nonce = BaseNonce::from_bytes(r.array::<NONCE_SIZE>()?);
        let chunk_size = r.u32()?;
        let total_size = r.u64()?;
        let chunk_count = r.u32()?;

        // Bound the allocation by what the input can actually hold
        if (chunk_count as usize).saturating_mul(4) > r.remaining() {
            return Err(malformed(format!(
                "chunk count {chunk_count} larger than the length table"
            )));
        }
        let mut chunk_lengths = Vec::with_capacity(chunk_count as usize);
        for _ in 0..chunk_count {
            chunk_lengths.push(r.u32()?);
        }

        let mime_len = r.u16()? as usize;
        let mime = std::str::from_utf8(r.take(mime_len)?)
            .map_err(|_| malformed("mime is not UTF-8"))?
            .to_string();
        let digest = Digest::from_bytes(r.array::<DIGEST_SIZE>()?);

        if r.remaining() != 0 {
            return Err(malformed(format!("{} trailing bytes", r.remaining())));
        }

        let container = Self {
            version,
            flags,
            base_nonce,
            chunk_size,
            total_size,
            chunk_count,
            chunk_lengths,
            mime,
            digest,
        };
        container.validate()?;
        Ok(container)
    }

    /// JSON form for embedding alongside a content address.
    pub fn to_json(&self) -> CryptoResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| malformed(format!("container serialization: {e}")))
    }

    /// Parse the JSON form; applies the same validation as [`Container::parse`].
    pub fn from_json(data: &[u8]) -> CryptoResult<Self> {
        let container: Self = serde_json::from_slice(data)
            .map_err(|e| malformed(format!("container deserialization: {e}")))?;
        container.validate()?;
        Ok(container)
    }
}

/// Parse a serialized container.
pub fn parse(bytes: &[u8]) -> CryptoResult<Container> {
    Container::parse(bytes)
}

fn malformed(reason: impl Into<String>) -> CryptoError {
    CryptoError::MalformedContainer(reason.into())
}

struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> CryptoResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(malformed(format!(
                "truncated at offset {} (needed {n} more bytes)",
                self.pos
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> CryptoResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> CryptoResult<u8> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> CryptoResult<u16> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    fn u32(&mut self) -> CryptoResult<u32> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    fn u64(&mut self) -> CryptoResult<u64> {
        Ok(u64::from_be_bytes(self.array()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::digest;

    fn sample(lengths: Vec<u32>, total: u64) -> CryptoResult<Container> {
        Container::finalize(
            BaseNonce::from_bytes([3u8; NONCE_SIZE]),
            1_000_000,
            lengths,
            total,
            "image/png",
            digest(b"whatever"),
            ChunkBinding::Position,
        )
    }

    #[test]
    fn test_example_layout() {
        let c = sample(vec![1_000_000, 1_000_000, 500_000], 2_500_000).unwrap();
        assert_eq!(c.chunk_count(), 3);
        assert_eq!(c.chunk_lengths(), &[1_000_000, 1_000_000, 500_000]);
        assert_eq!(c.ciphertext_len(2), Some(500_016));
        assert_eq!(c.ciphertext_offset(1), Some(1_000_016));
        assert_eq!(c.ciphertext_offset(3), Some(2_500_048));
        assert_eq!(c.ciphertext_size(), 2_500_048);
        assert_eq!(c.binding(), ChunkBinding::Position);
    }

    #[test]
    fn test_binary_roundtrip() {
        let c = sample(vec![1_000_000, 1], 1_000_001).unwrap();
        let bytes = c.to_bytes();
        assert_eq!(&bytes[..4], CONTAINER_MAGIC);
        assert_eq!(parse(&bytes).unwrap(), c);
    }

    #[test]
    fn test_json_roundtrip() {
        let c = sample(vec![0], 0).unwrap();
        let json = c.to_json().unwrap();
        assert_eq!(Container::from_json(&json).unwrap(), c);
    }

    #[test]
    fn test_zero_byte_file_is_one_empty_chunk() {
        assert_eq!(expected_chunk_count(0, 4096), 1);
        assert!(sample(vec![0], 0).is_ok());
        assert!(sample(vec![], 0).is_err());
    }

    #[test]
    fn test_sum_mismatch_rejected() {
        let err = sample(vec![1_000_000, 400_000], 1_500_000).unwrap_err();
        assert!(matches!(err, CryptoError::MalformedContainer(ref m) if m.contains("sum")));
    }

    #[test]
    fn test_count_mismatch_rejected() {
        // sums correctly but splits into more chunks than the chunk size implies
        let err = sample(vec![500_000, 500_000, 500_000], 1_500_000).unwrap_err();
        assert!(matches!(err, CryptoError::MalformedContainer(ref m) if m.contains("chunk count")));
    }

    #[test]
    fn test_oversized_chunk_rejected() {
        let err = sample(vec![1_000_001, 999_999], 2_000_000).unwrap_err();
        assert!(matches!(err, CryptoError::MalformedContainer(_)));
    }

    #[test]
    fn test_empty_chunk_in_nonempty_file_rejected() {
        let err = sample(vec![0, 10], 10).unwrap_err();
        assert!(matches!(err, CryptoError::MalformedContainer(_)));
    }

    #[test]
    fn test_parse_rejects_tampered_totals() {
        let c = sample(vec![1_000_000, 500_000], 1_500_000).unwrap();
        let mut bytes = c.to_bytes();
        // total_size lives after magic(4) + version(1) + flags(1) + nonce(12) + chunk_size(4)
        let total_at = 4 + 1 + 1 + NONCE_SIZE + 4;
        bytes[total_at + 7] ^= 0x01;
        assert!(matches!(parse(&bytes), Err(CryptoError::MalformedContainer(_))));
    }

    #[test]
    fn test_parse_rejects_unsupported_version() {
        let mut bytes = sample(vec![7], 7).unwrap().to_bytes();
        bytes[4] = 2;
        let err = parse(&bytes).unwrap_err();
        assert!(matches!(err, CryptoError::MalformedContainer(ref m) if m.contains("version")));
    }

    #[test]
    fn test_parse_rejects_unknown_flags() {
        let mut bytes = sample(vec![7], 7).unwrap().to_bytes();
        bytes[5] |= 0x80;
        assert!(matches!(parse(&bytes), Err(CryptoError::MalformedContainer(_))));
    }

    #[test]
    fn test_parse_rejects_truncation_and_trailing_bytes() {
        let bytes = sample(vec![7], 7).unwrap().to_bytes();
        for cut in [0, 3, 10, bytes.len() - 1] {
            assert!(parse(&bytes[..cut]).is_err(), "truncated at {cut} must fail");
        }
        let mut longer = bytes.clone();
        longer.push(0);
        assert!(parse(&longer).is_err());
    }

    #[test]
    fn test_parse_rejects_huge_declared_count() {
        let mut bytes = sample(vec![7], 7).unwrap().to_bytes();
        let count_at = 4 + 1 + 1 + NONCE_SIZE + 4 + 8;
        bytes[count_at..count_at + 4].copy_from_slice(&u32::MAX.to_be_bytes());
        assert!(matches!(parse(&bytes), Err(CryptoError::MalformedContainer(_))));
    }

    #[test]
    fn test_from_json_validates() {
        let c = sample(vec![1_000_000, 500_000], 1_500_000).unwrap();
        let mut value: serde_json::Value = serde_json::from_slice(&c.to_json().unwrap()).unwrap();
        value["total_size"] = serde_json::json!(1_500_001u64);
        let tampered = serde_json::to_vec(&value).unwrap();
        assert!(matches!(
            Container::from_json(&tampered),
            Err(CryptoError::MalformedContainer(_))
        ));
    }
}
