//! Geometric value codec and its registry.
//!
//! The five special value types never go through the structural encoder.
//! Each one is written as a kind byte followed by its named `f32`
//! components, and read back by component name. The registry maps the serde
//! type name (encode side) and the kind byte (decode side) to the codec for
//! that type. Struct names `Vector2`, `Vector3`, `Vector4`, `Color` and
//! `Quaternion` are therefore reserved inside records.

use std::collections::HashMap;

use byteorder::WriteBytesExt;
use once_cell::sync::Lazy;

use crate::format::error::{FormatError, Result};
use crate::format::wire::{ByteReader, WriteUtils};

/// Kind byte written in front of a special value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SpecialKind {
    Vector2 = 1,
    Vector3 = 2,
    Vector4 = 3,
    Color = 4,
    Quaternion = 5,
}

impl SpecialKind {
    pub const ALL: [SpecialKind; 5] = [
        SpecialKind::Vector2,
        SpecialKind::Vector3,
        SpecialKind::Vector4,
        SpecialKind::Color,
        SpecialKind::Quaternion,
    ];

    pub fn from_byte(byte: u8) -> Option<SpecialKind> {
        SpecialKind::ALL.into_iter().find(|kind| *kind as u8 == byte)
    }
}

/// A value type handled by the geometric codec instead of the structural encoder.
pub trait SpecialValue: Sized {
    const KIND: SpecialKind;

    /// Components in the codec's canonical order.
    fn components(&self) -> Vec<f32>;

    /// Rebuilds the value from components in canonical order.
    fn from_components(values: &[f32]) -> Option<Self>;
}

/// Fixed-field encode/decode rules for one special value type.
#[derive(Debug)]
pub struct ValueCodec {
    pub kind: SpecialKind,
    pub type_name: &'static str,
    pub components: &'static [&'static str],
}

impl ValueCodec {
    /// Writes the kind byte and the named components in canonical order.
    ///
    /// `named` must hold every component exactly once, in any order.
    pub fn encode(&self, named: &[(&str, f32)], out: &mut Vec<u8>) -> Result<()> {
        for (position, (name, _)) in named.iter().enumerate() {
            let known = self.accepts(name);
            let repeated = named[..position].iter().any(|(earlier, _)| earlier == name);
            if !known || repeated {
                return Err(FormatError::UnexpectedComponent {
                    type_name: self.type_name,
                    component: name.to_string(),
                });
            }
        }

        // Nothing reaches `out` unless every component is present
        let values = self
            .components
            .iter()
            .map(|component| {
                named
                    .iter()
                    .find(|(name, _)| name == component)
                    .map(|(_, value)| *value)
                    .ok_or_else(|| FormatError::MissingComponent {
                        type_name: self.type_name,
                        component: component.to_string(),
                    })
            })
            .collect::<Result<Vec<f32>>>()?;

        out.write_u8(self.kind as u8)?;
        out.write_u8(self.components.len() as u8)?;
        for (component, value) in self.components.iter().zip(values) {
            out.write_string_7bit(component)?;
            out.write_f32_le(value)?;
        }
        Ok(())
    }

    fn accepts(&self, component: &str) -> bool {
        self.components.iter().any(|known| *known == component)
    }

    /// Reads the components that follow the kind byte.
    ///
    /// Lookup is by name. The recorded set must match the codec's set exactly.
    pub(crate) fn decode(&self, reader: &mut ByteReader<'_>) -> Result<Vec<f32>> {
        let count = reader.read_u8()? as usize;
        let mut recorded: Vec<(&str, f32)> = Vec::with_capacity(count);

        for _ in 0..count {
            let name = reader.read_str()?;
            let value = reader.read_f32()?;
            let known = self.accepts(name);
            if !known || recorded.iter().any(|(earlier, _)| *earlier == name) {
                return Err(FormatError::UnexpectedComponent {
                    type_name: self.type_name,
                    component: name.to_string(),
                });
            }
            recorded.push((name, value));
        }

        self.components
            .iter()
            .map(|component| {
                recorded
                    .iter()
                    .find(|(name, _)| name == component)
                    .map(|(_, value)| *value)
                    .ok_or_else(|| FormatError::MissingComponent {
                        type_name: self.type_name,
                        component: component.to_string(),
                    })
            })
            .collect()
    }
}

static CODECS: [ValueCodec; 5] = [
    ValueCodec { kind: SpecialKind::Vector2, type_name: "Vector2", components: &["x", "y"] },
    ValueCodec { kind: SpecialKind::Vector3, type_name: "Vector3", components: &["x", "y", "z"] },
    ValueCodec {
        kind: SpecialKind::Vector4,
        type_name: "Vector4",
        components: &["x", "y", "z", "w"],
    },
    ValueCodec { kind: SpecialKind::Color, type_name: "Color", components: &["r", "g", "b", "a"] },
    ValueCodec {
        kind: SpecialKind::Quaternion,
        type_name: "Quaternion",
        components: &["x", "y", "z", "w"],
    },
];

/// Immutable lookup table over the built-in codecs.
pub struct CodecRegistry {
    by_name: HashMap<&'static str, &'static ValueCodec>,
}

static REGISTRY: Lazy<CodecRegistry> = Lazy::new(|| {
    let by_name = CODECS.iter().map(|codec| (codec.type_name, codec)).collect();
    log::debug!("Codec registry built with {} special value types", CODECS.len());
    CodecRegistry { by_name }
});

/// Process-wide codec registry, built on first use and never mutated.
pub fn registry() -> &'static CodecRegistry {
    &REGISTRY
}

impl CodecRegistry {
    pub fn get(&self, kind: SpecialKind) -> &'static ValueCodec {
        &CODECS[kind as usize - 1]
    }

    pub fn by_name(&self, type_name: &str) -> Option<&'static ValueCodec> {
        self.by_name.get(type_name).copied()
    }

    pub fn by_kind_byte(&self, byte: u8) -> Option<&'static ValueCodec> {
        SpecialKind::from_byte(byte).map(|kind| self.get(kind))
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// Encodes a special value on its own, without a record around it.
pub fn encode_value<V: SpecialValue>(value: &V) -> Result<Vec<u8>> {
    let codec = registry().get(V::KIND);
    let values = value.components();
    let named: Vec<(&str, f32)> = codec.components.iter().copied().zip(values).collect();
    let mut out = Vec::with_capacity(2 + named.len() * 6);
    codec.encode(&named, &mut out)?;
    Ok(out)
}

/// Decodes bytes produced by [`encode_value`].
pub fn decode_value<V: SpecialValue>(bytes: &[u8]) -> Result<V> {
    let codec = registry().get(V::KIND);
    let mut reader = ByteReader::new(bytes);
    let kind = reader.read_u8()?;
    if kind != V::KIND as u8 {
        let found = registry()
            .by_kind_byte(kind)
            .map(|other| other.type_name.to_string())
            .unwrap_or_else(|| format!("kind {kind}"));
        return Err(FormatError::TypeMismatch { expected: codec.type_name.to_string(), found });
    }
    let values = codec.decode(&mut reader)?;
    if reader.remaining() > 0 {
        return Err(FormatError::TrailingBytes(reader.remaining()));
    }
    V::from_components(&values).ok_or_else(|| FormatError::MissingComponent {
        type_name: codec.type_name,
        component: codec.components.last().copied().unwrap_or_default().to_string(),
    })
}
