// Binary record format
// Self-describing structural encoding, optional LZ4 compression, SHA256 trailer

pub mod de;
pub mod error;
pub mod record;
pub mod ser;
pub(crate) mod wire;

pub use de::{from_bytes, Deserializer};
pub use error::FormatError;
pub use record::{decode_record, encode_record, RecordOptions, FLAG_COMPRESSED};
pub use ser::{to_bytes, Serializer};

/// First bytes of every record.
pub const MAGIC: [u8; 4] = *b"GDSB";

/// Current record format version. Older versions are accepted, newer ones rejected.
pub const FORMAT_VERSION: u16 = 1;
