use serde::de::DeserializeOwned;
use serde::Serialize;

use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use sha2::{Digest, Sha256};

use super::error::{FormatError, Result};
use super::{from_bytes, to_bytes, FORMAT_VERSION, MAGIC};

const CHECKSUM_LEN: usize = 32;
const HEADER_LEN: usize = MAGIC.len() + 2 + 1;

/// Payload is LZ4 compressed with its size prepended.
pub const FLAG_COMPRESSED: u8 = 0b0000_0001;

/// Largest decompressed payload a record may declare.
pub const MAX_PAYLOAD_LEN: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordOptions {
    pub compress: bool,
}

impl Default for RecordOptions {
    fn default() -> Self {
        Self { compress: true }
    }
}

/// Encode a value into a complete record: header, payload and checksum.
pub fn encode_record<T: Serialize + ?Sized>(value: &T, options: RecordOptions) -> Result<Vec<u8>> {
    // 1. Structural encoding
    let raw = to_bytes(value)?;

    // 2. Optional LZ4 compression (size prepended for easy decompression)
    let (flags, payload) = if options.compress {
        (FLAG_COMPRESSED, compress_prepend_size(&raw))
    } else {
        (0, raw)
    };

    // 3. Header
    let mut record = Vec::with_capacity(HEADER_LEN + payload.len() + CHECKSUM_LEN);
    record.extend_from_slice(&MAGIC);
    record.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    record.push(flags);
    record.extend_from_slice(&payload);

    // 4. SHA256 checksum over everything before it
    let checksum = Sha256::digest(&record);
    record.extend_from_slice(&checksum);

    log::debug!(
        "Encoded record: {} bytes (flags {:#04x}, payload {} bytes)",
        record.len(),
        flags,
        payload.len()
    );
    Ok(record)
}

/// Verify and decode a complete record.
pub fn decode_record<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    // Check minimum size (header + checksum)
    if bytes.len() < HEADER_LEN + CHECKSUM_LEN {
        return Err(FormatError::Truncated);
    }

    if bytes[..MAGIC.len()] != MAGIC {
        return Err(FormatError::BadMagic);
    }

    let version = u16::from_le_bytes([bytes[MAGIC.len()], bytes[MAGIC.len() + 1]]);
    if version == 0 || version > FORMAT_VERSION {
        return Err(FormatError::UnsupportedVersion { found: version, supported: FORMAT_VERSION });
    }

    // Split body and checksum
    let (body, checksum_bytes) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    let calculated = Sha256::digest(body);
    if calculated[..] != *checksum_bytes {
        return Err(FormatError::ChecksumMismatch);
    }

    let flags = body[HEADER_LEN - 1];
    if flags & !FLAG_COMPRESSED != 0 {
        return Err(FormatError::UnsupportedFlags(flags));
    }

    let payload = &body[HEADER_LEN..];
    if flags & FLAG_COMPRESSED != 0 {
        let declared = payload.get(..4).ok_or(FormatError::Truncated)?;
        let size = u32::from_le_bytes([declared[0], declared[1], declared[2], declared[3]]) as usize;
        if size > MAX_PAYLOAD_LEN {
            return Err(FormatError::PayloadTooLarge { size, limit: MAX_PAYLOAD_LEN });
        }
        let raw = decompress_size_prepended(payload)
            .map_err(|err| FormatError::Decompression(err.to_string()))?;
        from_bytes(&raw)
    } else {
        from_bytes(payload)
    }
}
