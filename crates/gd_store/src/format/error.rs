use std::fmt::Display;
use std::io;

use serde::{de, ser};
use thiserror::Error;

/// Everything that can go wrong while encoding a value or decoding a record.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Record is truncated")]
    Truncated,

    #[error("Not a game data record (bad magic bytes)")]
    BadMagic,

    #[error("Record format version {found} is not supported (current: {supported})")]
    UnsupportedVersion { found: u16, supported: u16 },

    #[error("Unknown record flags: {0:#04x}")]
    UnsupportedFlags(u8),

    #[error("Checksum mismatch")]
    ChecksumMismatch,

    #[error("Decompression error: {0}")]
    Decompression(String),

    #[error("Unknown value tag {0:#04x}")]
    UnknownTag(u8),

    #[error("Expected {expected}, found {found}")]
    UnexpectedTag { expected: &'static str, found: &'static str },

    #[error("Expected type `{expected}`, record holds `{found}`")]
    TypeMismatch { expected: String, found: String },

    #[error("Missing field `{0}`")]
    MissingField(String),

    #[error("`{type_name}` is missing component `{component}`")]
    MissingComponent { type_name: &'static str, component: String },

    #[error("`{type_name}` has unexpected component `{component}`")]
    UnexpectedComponent { type_name: &'static str, component: String },

    #[error("Component `{component}` of `{type_name}` is not an f32")]
    NonFloatComponent { type_name: &'static str, component: &'static str },

    #[error("Unknown special value kind {0}")]
    UnknownSpecialKind(u8),

    #[error("Unknown type id {0}")]
    UnknownTypeId(u32),

    #[error("Unknown shared object id {0}")]
    UnknownObjectId(u32),

    #[error("Shared object id {0} is defined twice")]
    DuplicateObjectId(u32),

    #[error("Shared object {id} does not hold a `{expected}`")]
    SharedTypeMismatch { id: u32, expected: &'static str },

    #[error("Back-reference to shared object {0} outside a shared field")]
    UntypedBackReference(u32),

    #[error("Length prefix is too large")]
    LengthOverflow,

    #[error("Invalid UTF-8 in string")]
    InvalidUtf8,

    #[error("Invalid char value {0:#x}")]
    InvalidChar(u32),

    #[error("Values nested deeper than {0} levels")]
    DepthLimit(usize),

    #[error("Decompressed payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("{0} trailing bytes after the root value")]
    TrailingBytes(usize),

    #[error("{0}")]
    Message(String),
}

impl ser::Error for FormatError {
    fn custom<T: Display>(msg: T) -> Self {
        FormatError::Message(msg.to_string())
    }
}

impl de::Error for FormatError {
    fn custom<T: Display>(msg: T) -> Self {
        FormatError::Message(msg.to_string())
    }

    fn invalid_type(unexp: de::Unexpected<'_>, exp: &dyn de::Expected) -> Self {
        FormatError::TypeMismatch { expected: exp.to_string(), found: unexp.to_string() }
    }

    fn missing_field(field: &'static str) -> Self {
        FormatError::MissingField(field.to_string())
    }
}

impl From<io::Error> for FormatError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => FormatError::Truncated,
            _ => FormatError::Message(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, FormatError>;
