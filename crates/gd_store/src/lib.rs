//! # gd_store - Binary game-data store
//!
//! Typed save/load of serde data holders into one binary record per file.
//!
//! ## Features
//! - Self-describing record format (type names and field names in the stream)
//! - Dedicated codec for vector, color and quaternion values
//! - Shared and cyclic object graphs through [`Shared`]
//! - Deep eligibility check before any I/O
//! - LZ4 compression, SHA256 integrity trailer, atomic writes

// `Shape` is built from function pointers to allow recursive types
#![allow(clippy::type_complexity)]

pub mod codec;
pub mod format;
pub mod geometry;
pub mod schema;
pub mod shared;
pub mod store;

pub use codec::{decode_value, encode_value, registry, SpecialKind, SpecialValue, ValueCodec};
pub use format::{decode_record, encode_record, from_bytes, to_bytes, FormatError, RecordOptions};
pub use geometry::{Color, Quaternion, Vector2, Vector3, Vector4};
pub use schema::{check, EligibilityError, Persist, Shape};
pub use shared::Shared;
pub use store::{BinaryStore, SaveOutcome, StoreConfig, StoreError};
