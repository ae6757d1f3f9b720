//! Frame codec
//!
//! Encodes one record as `[LSN (8)][CRC (4)][Len (4)][Payload]`,
//! little-endian. The CRC covers LSN, length and payload.

use bytes::BufMut;

use super::FRAME_HEADER_SIZE;

/// Decoded frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub lsn: u64,
    pub crc: u32,
    pub length: u32,
}

impl FrameHeader {
    /// Decode a header from its 16 on-disk bytes
    pub fn decode(bytes: &[u8; FRAME_HEADER_SIZE]) -> Self {
        let mut lsn = [0u8; 8];
        let mut crc = [0u8; 4];
        let mut length = [0u8; 4];
        lsn.copy_from_slice(&bytes[0..8]);
        crc.copy_from_slice(&bytes[8..12]);
        length.copy_from_slice(&bytes[12..16]);

        Self {
            lsn: u64::from_le_bytes(lsn),
            crc: u32::from_le_bytes(crc),
            length: u32::from_le_bytes(length),
        }
    }

    /// Decode a header from the front of `bytes`, if enough bytes are there
    pub fn peek(bytes: &[u8]) -> Option<Self> {
        let header: &[u8; FRAME_HEADER_SIZE] = bytes.get(..FRAME_HEADER_SIZE)?.try_into().ok()?;
        Some(Self::decode(header))
    }

    /// Total on-disk size of the frame, header included
    pub fn frame_len(&self) -> u64 {
        FRAME_HEADER_SIZE as u64 + self.length as u64
    }

    /// Check the stored CRC against `payload`
    pub fn verify(&self, payload: &[u8]) -> bool {
        payload.len() == self.length as usize && checksum(self.lsn, payload) == self.crc
    }
}

/// CRC32 over LSN, payload length and payload
pub fn checksum(lsn: u64, payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&lsn.to_le_bytes());
    hasher.update(&(payload.len() as u32).to_le_bytes());
    hasher.update(payload);
    hasher.finalize()
}

/// Size of the frame that would carry `payload_len` bytes
pub fn encoded_len(payload_len: usize) -> usize {
    FRAME_HEADER_SIZE + payload_len
}

/// Append the frame for `payload` to `buf`
///
/// The caller guarantees `payload.len()` fits in a `u32`.
pub fn encode_into<B: BufMut>(buf: &mut B, lsn: u64, payload: &[u8]) {
    buf.put_u64_le(lsn);
    buf.put_u32_le(checksum(lsn, payload));
    buf.put_u32_le(payload.len() as u32);
    buf.put_slice(payload);
}

/// Encode a frame into a fresh vector
pub fn encode_frame(lsn: u64, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(encoded_len(payload.len()));
    encode_into(&mut buf, lsn, payload);
    buf
}
