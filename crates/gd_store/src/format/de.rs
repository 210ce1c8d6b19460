//! Structural decoder, the mirror of [`super::ser`].

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use serde::de::value::{BorrowedStrDeserializer, MapDeserializer};
use serde::de::{self, DeserializeSeed, IgnoredAny, Visitor};
use serde::Deserialize;

use super::error::{FormatError, Result};
use super::wire::{ByteReader, Tag};
use crate::codec::registry;
use crate::shared::{self, IncomingScope};

/// Deepest nesting of compound values a payload may use.
pub const MAX_DEPTH: usize = 128;

/// Decodes a bare payload produced by [`super::to_bytes`].
pub fn from_bytes<'de, T: Deserialize<'de>>(bytes: &'de [u8]) -> Result<T> {
    let _scope = IncomingScope::enter();
    let mut deserializer = Deserializer::new(bytes);
    let value = T::deserialize(&mut deserializer)?;
    deserializer.end()?;
    Ok(value)
}

/// A struct shape announced by a definition header.
#[derive(Debug)]
struct TypeEntry<'de> {
    name: &'de str,
    fields: Vec<&'de str>,
}

pub struct Deserializer<'de> {
    input: &'de [u8],
    reader: ByteReader<'de>,
    types: Vec<Rc<TypeEntry<'de>>>,
    depth: usize,
    /// Shared objects first met where no `Shared` was expected, by id, with
    /// the offset of their body.
    skipped: HashMap<u32, usize>,
    /// Skipped objects later decoded from their recorded offset.
    replayed: HashSet<u32>,
    replaying: usize,
}

impl<'de> Deserializer<'de> {
    pub fn new(input: &'de [u8]) -> Self {
        Deserializer {
            input,
            reader: ByteReader::new(input),
            types: Vec::new(),
            depth: 0,
            skipped: HashMap::new(),
            replayed: HashSet::new(),
            replaying: 0,
        }
    }

    /// Fails if input is left after the root value.
    pub fn end(&self) -> Result<()> {
        match self.reader.remaining() {
            0 => Ok(()),
            left => Err(FormatError::TrailingBytes(left)),
        }
    }

    fn offset(&self) -> usize {
        self.input.len() - self.reader.remaining()
    }

    /// Runs `visit` one nesting level deeper.
    fn nested<R>(&mut self, visit: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        if self.depth >= MAX_DEPTH {
            return Err(FormatError::DepthLimit(MAX_DEPTH));
        }
        self.depth += 1;
        let result = visit(self);
        self.depth -= 1;
        result
    }

    /// Reads the next value tag. A shared object definition met outside a
    /// shared field is read through as its plain value; its body offset is
    /// kept so a later back-reference can still decode it.
    fn value_tag(&mut self) -> Result<Tag> {
        match self.reader.read_tag()? {
            Tag::ObjectDef => {
                let id = self.reader.read_id()?;
                if !self.replayed.contains(&id) {
                    let body = self.offset();
                    self.skipped.entry(id).or_insert(body);
                }
                self.reader.read_tag()
            }
            Tag::ObjectRef => Err(FormatError::UntypedBackReference(self.reader.read_id()?)),
            tag => Ok(tag),
        }
    }

    fn expect_tag(&mut self, expected: Tag) -> Result<()> {
        let found = self.value_tag()?;
        if found != expected {
            return Err(FormatError::UnexpectedTag { expected: expected.name(), found: found.name() });
        }
        Ok(())
    }

    fn struct_header(&mut self, tag: Tag) -> Result<Rc<TypeEntry<'de>>> {
        let id = self.reader.read_id()?;
        if tag != Tag::StructDef {
            return self.types.get(id as usize).cloned().ok_or(FormatError::UnknownTypeId(id));
        }

        let name = self.reader.read_str()?;
        let count = self.reader.read_len()?;
        let mut fields = Vec::with_capacity(count);
        for _ in 0..count {
            fields.push(self.reader.read_str()?);
        }

        match self.types.get(id as usize) {
            // A replayed object body repeats definitions read on the first pass.
            Some(known) if self.replaying > 0 && known.name == name && known.fields == fields => {
                Ok(Rc::clone(known))
            }
            // Definitions arrive in id order.
            None if id as usize == self.types.len() => {
                let entry = Rc::new(TypeEntry { name, fields });
                self.types.push(Rc::clone(&entry));
                Ok(entry)
            }
            _ => Err(FormatError::UnknownTypeId(id)),
        }
    }

    /// Decodes a skipped object body at `body` in place of a back-reference.
    fn replay<V: Visitor<'de>>(&mut self, id: u32, body: usize, visitor: V) -> Result<V::Value> {
        shared::stage_definition(id)?;
        self.replayed.insert(id);
        let input = self.input;
        let resume = std::mem::replace(&mut self.reader, ByteReader::new(&input[body..]));
        self.replaying += 1;
        let value = self.nested(|de| visitor.visit_newtype_struct(de));
        self.replaying -= 1;
        self.reader = resume;
        value
    }

    fn visit_special<V: Visitor<'de>>(&mut self, expected: Option<&str>, visitor: V) -> Result<V::Value> {
        let byte = self.reader.read_u8()?;
        let codec = registry().by_kind_byte(byte).ok_or(FormatError::UnknownSpecialKind(byte))?;
        if let Some(expected) = expected {
            if expected != codec.type_name {
                return Err(FormatError::TypeMismatch {
                    expected: expected.to_string(),
                    found: codec.type_name.to_string(),
                });
            }
        }
        let values = codec.decode(&mut self.reader)?;
        let pairs = codec.components.iter().copied().zip(values);
        visitor.visit_map(MapDeserializer::<_, FormatError>::new(pairs))
    }

    fn visit_tagged<V: Visitor<'de>>(&mut self, tag: Tag, visitor: V) -> Result<V::Value> {
        match tag {
            Tag::Unit => visitor.visit_unit(),
            Tag::Bool => match self.reader.read_u8()? {
                0 => visitor.visit_bool(false),
                1 => visitor.visit_bool(true),
                other => Err(FormatError::Message(format!("invalid bool byte {other:#04x}"))),
            },
            Tag::I8 => visitor.visit_i8(self.reader.read_i8()?),
            Tag::I16 => visitor.visit_i16(self.reader.read_i16()?),
            Tag::I32 => visitor.visit_i32(self.reader.read_i32()?),
            Tag::I64 => visitor.visit_i64(self.reader.read_i64()?),
            Tag::U8 => visitor.visit_u8(self.reader.read_u8()?),
            Tag::U16 => visitor.visit_u16(self.reader.read_u16()?),
            Tag::U32 => visitor.visit_u32(self.reader.read_u32()?),
            Tag::U64 => visitor.visit_u64(self.reader.read_u64()?),
            Tag::F32 => visitor.visit_f32(self.reader.read_f32()?),
            Tag::F64 => visitor.visit_f64(self.reader.read_f64()?),
            Tag::Char => {
                let raw = self.reader.read_u32()?;
                visitor.visit_char(char::from_u32(raw).ok_or(FormatError::InvalidChar(raw))?)
            }
            Tag::Str => visitor.visit_borrowed_str(self.reader.read_str()?),
            Tag::Bytes => {
                let len = self.reader.read_len()?;
                visitor.visit_borrowed_bytes(self.reader.read_bytes(len)?)
            }
            Tag::Some => self.nested(|de| visitor.visit_some(de)),
            Tag::Seq => {
                let remaining = self.reader.read_len()?;
                self.nested(|de| visitor.visit_seq(Elements { de, remaining }))
            }
            Tag::Map => {
                let remaining = self.reader.read_len()?;
                self.nested(|de| visitor.visit_map(Entries { de, remaining }))
            }
            Tag::StructDef | Tag::StructRef => {
                let entry = self.struct_header(tag)?;
                self.nested(|de| visitor.visit_map(Fields { de, entry, index: 0 }))
            }
            Tag::Special => self.visit_special(None, visitor),
            Tag::Variant => {
                let variant = self.reader.read_str()?;
                self.nested(|de| visitor.visit_enum(Enum { de, variant }))
            }
            Tag::Fields => {
                let remaining = self.reader.read_len()?;
                self.nested(|de| visitor.visit_map(NamedFields { de, remaining }))
            }
            Tag::ObjectDef | Tag::ObjectRef => Err(FormatError::UnexpectedTag {
                expected: "value",
                found: tag.name(),
            }),
        }
    }
}

impl<'de> de::Deserializer<'de> for &mut Deserializer<'de> {
    type Error = FormatError;

    fn is_human_readable(&self) -> bool {
        false
    }

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let tag = self.value_tag()?;
        self.visit_tagged(tag, visitor)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.value_tag()? {
            Tag::Unit => visitor.visit_none(),
            Tag::Some => self.nested(|de| visitor.visit_some(de)),
            other => Err(FormatError::UnexpectedTag { expected: "option", found: other.name() }),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        if name != shared::TOKEN {
            return visitor.visit_newtype_struct(self);
        }
        match self.reader.read_tag()? {
            Tag::ObjectDef => {
                let id = self.reader.read_id()?;
                if self.replayed.contains(&id) {
                    // Already decoded through an earlier back-reference.
                    IgnoredAny::deserialize(&mut *self)?;
                    shared::stage_reference(id)?;
                } else {
                    self.skipped.remove(&id);
                    shared::stage_definition(id)?;
                }
            }
            Tag::ObjectRef => {
                let id = self.reader.read_id()?;
                if !shared::is_registered(id) {
                    if let Some(body) = self.skipped.remove(&id) {
                        return self.replay(id, body, visitor);
                    }
                }
                shared::stage_reference(id)?;
            }
            other => {
                return Err(FormatError::UnexpectedTag {
                    expected: Tag::ObjectDef.name(),
                    found: other.name(),
                })
            }
        }
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.expect_tag(Tag::Seq)?;
        let remaining = self.reader.read_len()?;
        self.nested(|de| visitor.visit_seq(Elements { de, remaining }))
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, len: usize, visitor: V) -> Result<V::Value> {
        self.expect_tag(Tag::Seq)?;
        let remaining = self.reader.read_len()?;
        if remaining != len {
            return Err(FormatError::TypeMismatch {
                expected: format!("tuple of {len} elements"),
                found: format!("sequence of {remaining} elements"),
            });
        }
        self.nested(|de| visitor.visit_seq(Elements { de, remaining }))
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        len: usize,
        visitor: V,
    ) -> Result<V::Value> {
        self.deserialize_tuple(len, visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.expect_tag(Tag::Map)?;
        let remaining = self.reader.read_len()?;
        self.nested(|de| visitor.visit_map(Entries { de, remaining }))
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        match self.value_tag()? {
            Tag::Special => self.visit_special(Some(name), visitor),
            tag @ (Tag::StructDef | Tag::StructRef) => {
                let entry = self.struct_header(tag)?;
                if entry.name != name {
                    return Err(FormatError::TypeMismatch {
                        expected: name.to_string(),
                        found: entry.name.to_string(),
                    });
                }
                self.nested(|de| visitor.visit_map(Fields { de, entry, index: 0 }))
            }
            other => Err(FormatError::TypeMismatch {
                expected: name.to_string(),
                found: other.name().to_string(),
            }),
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        match self.value_tag()? {
            Tag::Variant => {
                let variant = self.reader.read_str()?;
                self.nested(|de| visitor.visit_enum(Enum { de, variant }))
            }
            other => Err(FormatError::TypeMismatch {
                expected: name.to_string(),
                found: other.name().to_string(),
            }),
        }
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct identifier ignored_any
    }
}

struct Elements<'a, 'de> {
    de: &'a mut Deserializer<'de>,
    remaining: usize,
}

impl<'de> de::SeqAccess<'de> for Elements<'_, 'de> {
    type Error = FormatError;

    fn next_element_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<Option<T::Value>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        seed.deserialize(&mut *self.de).map(Some)
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.remaining)
    }
}

struct Entries<'a, 'de> {
    de: &'a mut Deserializer<'de>,
    remaining: usize,
}

impl<'de> de::MapAccess<'de> for Entries<'_, 'de> {
    type Error = FormatError;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        seed.deserialize(&mut *self.de).map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value> {
        seed.deserialize(&mut *self.de)
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.remaining)
    }
}

/// Struct fields whose names come from the type table.
struct Fields<'a, 'de> {
    de: &'a mut Deserializer<'de>,
    entry: Rc<TypeEntry<'de>>,
    index: usize,
}

impl<'de> de::MapAccess<'de> for Fields<'_, 'de> {
    type Error = FormatError;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>> {
        match self.entry.fields.get(self.index) {
            Some(&field) => seed.deserialize(BorrowedStrDeserializer::<FormatError>::new(field)).map(Some),
            None => Ok(None),
        }
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value> {
        self.index += 1;
        seed.deserialize(&mut *self.de)
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.entry.fields.len() - self.index)
    }
}

/// Struct-variant fields, each written as a name followed by its value.
struct NamedFields<'a, 'de> {
    de: &'a mut Deserializer<'de>,
    remaining: usize,
}

impl<'de> de::MapAccess<'de> for NamedFields<'_, 'de> {
    type Error = FormatError;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        let name = self.de.reader.read_str()?;
        seed.deserialize(BorrowedStrDeserializer::<FormatError>::new(name)).map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value> {
        seed.deserialize(&mut *self.de)
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.remaining)
    }
}

struct Enum<'a, 'de> {
    de: &'a mut Deserializer<'de>,
    variant: &'de str,
}

impl<'de, 'a> de::EnumAccess<'de> for Enum<'a, 'de> {
    type Error = FormatError;
    type Variant = &'a mut Deserializer<'de>;

    fn variant_seed<V: DeserializeSeed<'de>>(self, seed: V) -> Result<(V::Value, Self::Variant)> {
        let value = seed.deserialize(BorrowedStrDeserializer::<FormatError>::new(self.variant))?;
        Ok((value, self.de))
    }
}

impl<'de> de::VariantAccess<'de> for &mut Deserializer<'de> {
    type Error = FormatError;

    fn unit_variant(self) -> Result<()> {
        self.expect_tag(Tag::Unit)
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(self, seed: T) -> Result<T::Value> {
        seed.deserialize(self)
    }

    fn tuple_variant<V: Visitor<'de>>(self, len: usize, visitor: V) -> Result<V::Value> {
        de::Deserializer::deserialize_tuple(self, len, visitor)
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        self.expect_tag(Tag::Fields)?;
        let remaining = self.reader.read_len()?;
        visitor.visit_map(NamedFields { de: self, remaining })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::format::to_bytes;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    enum Shape {
        Empty,
        Circle(f32),
        Pair(i32, i32),
        Rect { width: u16, height: u16 },
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Scene {
        title: String,
        points: Vec<Point>,
        shapes: Vec<Shape>,
        tags: BTreeMap<String, i64>,
        origin: Option<Point>,
        glyph: char,
        flag: bool,
        pair: (u8, f64),
    }

    fn sample_scene() -> Scene {
        let mut tags = BTreeMap::new();
        tags.insert("wave".to_string(), -4);
        tags.insert("level".to_string(), 12);
        Scene {
            title: "arena".into(),
            points: vec![Point { x: 1, y: -1 }, Point { x: 0, y: 9 }],
            shapes: vec![
                Shape::Empty,
                Shape::Circle(2.5),
                Shape::Pair(3, 4),
                Shape::Rect { width: 8, height: 6 },
            ],
            tags,
            origin: Some(Point { x: 5, y: 5 }),
            glyph: 'λ',
            flag: true,
            pair: (7, 0.125),
        }
    }

    #[test]
    fn test_nested_roundtrip() {
        let scene = sample_scene();
        let bytes = to_bytes(&scene).unwrap();
        let decoded: Scene = from_bytes(&bytes).unwrap();
        assert_eq!(decoded, scene);
    }

    #[test]
    fn test_struct_name_mismatch() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Other {
            x: i32,
            y: i32,
        }

        let bytes = to_bytes(&Point { x: 1, y: 2 }).unwrap();
        let result = from_bytes::<Other>(&bytes);
        assert!(matches!(result, Err(FormatError::TypeMismatch { .. })));
    }

    #[test]
    fn test_primitive_mismatch_is_type_mismatch() {
        let bytes = to_bytes("not a number").unwrap();
        assert!(matches!(from_bytes::<i32>(&bytes), Err(FormatError::TypeMismatch { .. })));
    }

    #[test]
    fn test_missing_field() {
        #[derive(Serialize)]
        #[serde(rename = "Point")]
        struct Partial {
            x: i32,
        }

        let bytes = to_bytes(&Partial { x: 3 }).unwrap();
        let result = from_bytes::<Point>(&bytes);
        assert!(matches!(result, Err(FormatError::MissingField(ref field)) if field == "y"));
    }

    #[test]
    fn test_extra_fields_are_skipped() {
        #[derive(Serialize)]
        #[serde(rename = "Point")]
        struct Wider {
            x: i32,
            label: Vec<String>,
            y: i32,
        }

        let bytes = to_bytes(&Wider { x: 3, label: vec!["a".into()], y: 4 }).unwrap();
        let decoded: Point = from_bytes(&bytes).unwrap();
        assert_eq!(decoded, Point { x: 3, y: 4 });
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = to_bytes(&1u8).unwrap();
        bytes.push(0);
        assert!(matches!(from_bytes::<u8>(&bytes), Err(FormatError::TrailingBytes(1))));
    }

    #[test]
    fn test_truncated_payload() {
        let bytes = to_bytes(&sample_scene()).unwrap();
        for cut in [1, bytes.len() / 2, bytes.len() - 1] {
            assert!(from_bytes::<Scene>(&bytes[..cut]).is_err());
        }
    }

    #[test]
    fn test_nesting_up_to_the_limit_decodes() {
        let mut bytes = vec![Tag::Some as u8; MAX_DEPTH];
        bytes.extend_from_slice(&[Tag::U8 as u8, 1]);
        assert!(from_bytes::<de::IgnoredAny>(&bytes).is_ok());

        bytes.insert(0, Tag::Some as u8);
        assert!(matches!(
            from_bytes::<de::IgnoredAny>(&bytes),
            Err(FormatError::DepthLimit(MAX_DEPTH))
        ));
    }

    #[test]
    fn test_deep_nesting_in_skipped_field_is_an_error() {
        // `Point { x, junk, y }` where `junk` nests far past the limit.
        let mut bytes = vec![Tag::StructDef as u8, 0, 5];
        bytes.extend_from_slice(b"Point");
        bytes.extend_from_slice(&[3, 1, b'x', 4]);
        bytes.extend_from_slice(b"junk");
        bytes.extend_from_slice(&[1, b'y']);
        bytes.extend_from_slice(&[Tag::I32 as u8, 1, 0, 0, 0]);
        bytes.extend(std::iter::repeat(Tag::Some as u8).take(200_000));
        bytes.push(Tag::Unit as u8);
        bytes.extend_from_slice(&[Tag::I32 as u8, 2, 0, 0, 0]);

        assert!(matches!(from_bytes::<Point>(&bytes), Err(FormatError::DepthLimit(_))));
    }

    #[test]
    fn test_unknown_type_reference() {
        let bytes = [Tag::StructRef as u8, 4];
        assert!(matches!(from_bytes::<Point>(&bytes), Err(FormatError::UnknownTypeId(4))));
    }

    #[test]
    fn test_special_kind_mismatch() {
        let bytes = to_bytes(&crate::geometry::Color::WHITE).unwrap();
        let result = from_bytes::<crate::geometry::Vector4>(&bytes);
        assert!(matches!(result, Err(FormatError::TypeMismatch { .. })));
    }
}
