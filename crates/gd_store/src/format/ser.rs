//! Structural encoder.
//!
//! Every value is written as a tag byte followed by its body. A struct gets a
//! header carrying its type name and field names the first time its shape
//! appears in a record; later structs of the same shape only carry the type
//! id. Lengths of sequences, maps and field lists, and struct headers, are
//! only known once the compound value ends, so they are recorded as slots at
//! the position where they belong and spliced in by [`Serializer::into_bytes`].

use std::collections::HashMap;

use serde::ser::{self, Serialize};

use super::error::{FormatError, Result};
use super::wire::{Tag, WriteUtils};
use crate::codec::{registry, ValueCodec};
use crate::shared::{self, OutgoingScope, Staged};

/// Encodes `value` into a bare payload, without the record envelope.
pub fn to_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let _scope = OutgoingScope::enter();
    let mut serializer = Serializer::new();
    value.serialize(&mut serializer)?;
    serializer.into_bytes()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TypeKey {
    name: &'static str,
    fields: Vec<&'static str>,
}

#[derive(Debug)]
enum Deferred {
    Header(TypeKey),
    Length(usize),
}

#[derive(Debug)]
struct Slot {
    at: usize,
    fill: Option<Deferred>,
}

#[derive(Debug, Default)]
pub struct Serializer {
    out: Vec<u8>,
    slots: Vec<Slot>,
}

impl Serializer {
    pub fn new() -> Self {
        Self::default()
    }

    fn open_slot(&mut self) -> usize {
        self.slots.push(Slot { at: self.out.len(), fill: None });
        self.slots.len() - 1
    }

    fn fill(&mut self, slot: usize, deferred: Deferred) {
        self.slots[slot].fill = Some(deferred);
    }

    fn tag(&mut self, tag: Tag) -> Result<()> {
        Ok(self.out.write_tag(tag)?)
    }

    /// Splices the deferred headers and lengths into the body.
    ///
    /// Slots are opened in stream order, so walking them in order assigns
    /// type ids in the order the decoder will meet them.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        let Serializer { out, slots } = self;
        let mut types: HashMap<TypeKey, usize> = HashMap::new();
        let mut assembled = Vec::with_capacity(out.len() + slots.len() * 4);
        let mut cursor = 0;

        for slot in slots {
            assembled.extend_from_slice(&out[cursor..slot.at]);
            cursor = slot.at;
            match slot.fill {
                Some(Deferred::Length(len)) => assembled.write_7bit_encoded_int(len)?,
                Some(Deferred::Header(key)) => match types.get(&key) {
                    Some(&id) => {
                        assembled.write_tag(Tag::StructRef)?;
                        assembled.write_7bit_encoded_int(id)?;
                    }
                    None => {
                        let id = types.len();
                        assembled.write_tag(Tag::StructDef)?;
                        assembled.write_7bit_encoded_int(id)?;
                        assembled.write_string_7bit(key.name)?;
                        assembled.write_7bit_encoded_int(key.fields.len())?;
                        for field in &key.fields {
                            assembled.write_string_7bit(field)?;
                        }
                        types.insert(key, id);
                    }
                },
                None => {
                    return Err(FormatError::Message("compound value was never closed".into()));
                }
            }
        }
        assembled.extend_from_slice(&out[cursor..]);

        log::trace!("Encoded payload: {} bytes, {} struct types", assembled.len(), types.len());
        Ok(assembled)
    }
}

/// Sequence, map or struct-variant body whose element count is deferred.
pub struct Counted<'a> {
    ser: &'a mut Serializer,
    slot: usize,
    count: usize,
}

impl Counted<'_> {
    fn close(self) -> Result<()> {
        self.ser.fill(self.slot, Deferred::Length(self.count));
        Ok(())
    }
}

pub enum StructFields<'a> {
    Record { ser: &'a mut Serializer, slot: usize, key: TypeKeyBuilder },
    Special { ser: &'a mut Serializer, codec: &'static ValueCodec, components: Vec<(&'static str, f32)> },
}

pub struct TypeKeyBuilder {
    name: &'static str,
    fields: Vec<&'static str>,
}

impl<'a> ser::Serializer for &'a mut Serializer {
    type Ok = ();
    type Error = FormatError;

    type SerializeSeq = Counted<'a>;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Counted<'a>;
    type SerializeStruct = StructFields<'a>;
    type SerializeStructVariant = Counted<'a>;

    fn is_human_readable(&self) -> bool {
        false
    }

    fn serialize_bool(self, v: bool) -> Result<()> {
        self.tag(Tag::Bool)?;
        self.out.push(u8::from(v));
        Ok(())
    }

    fn serialize_i8(self, v: i8) -> Result<()> {
        self.tag(Tag::I8)?;
        self.out.extend_from_slice(&v.to_le_bytes());
        Ok(())
    }

    fn serialize_i16(self, v: i16) -> Result<()> {
        self.tag(Tag::I16)?;
        self.out.extend_from_slice(&v.to_le_bytes());
        Ok(())
    }

    fn serialize_i32(self, v: i32) -> Result<()> {
        self.tag(Tag::I32)?;
        self.out.extend_from_slice(&v.to_le_bytes());
        Ok(())
    }

    fn serialize_i64(self, v: i64) -> Result<()> {
        self.tag(Tag::I64)?;
        self.out.extend_from_slice(&v.to_le_bytes());
        Ok(())
    }

    fn serialize_u8(self, v: u8) -> Result<()> {
        self.tag(Tag::U8)?;
        self.out.push(v);
        Ok(())
    }

    fn serialize_u16(self, v: u16) -> Result<()> {
        self.tag(Tag::U16)?;
        self.out.extend_from_slice(&v.to_le_bytes());
        Ok(())
    }

    fn serialize_u32(self, v: u32) -> Result<()> {
        self.tag(Tag::U32)?;
        self.out.extend_from_slice(&v.to_le_bytes());
        Ok(())
    }

    fn serialize_u64(self, v: u64) -> Result<()> {
        self.tag(Tag::U64)?;
        self.out.extend_from_slice(&v.to_le_bytes());
        Ok(())
    }

    fn serialize_f32(self, v: f32) -> Result<()> {
        self.tag(Tag::F32)?;
        self.out.write_f32_le(v)?;
        Ok(())
    }

    fn serialize_f64(self, v: f64) -> Result<()> {
        self.tag(Tag::F64)?;
        self.out.extend_from_slice(&v.to_le_bytes());
        Ok(())
    }

    fn serialize_char(self, v: char) -> Result<()> {
        self.tag(Tag::Char)?;
        self.out.extend_from_slice(&u32::from(v).to_le_bytes());
        Ok(())
    }

    fn serialize_str(self, v: &str) -> Result<()> {
        self.tag(Tag::Str)?;
        self.out.write_string_7bit(v)?;
        Ok(())
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<()> {
        self.tag(Tag::Bytes)?;
        self.out.write_7bit_encoded_int(v.len())?;
        self.out.extend_from_slice(v);
        Ok(())
    }

    fn serialize_none(self) -> Result<()> {
        self.tag(Tag::Unit)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<()> {
        self.tag(Tag::Some)?;
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<()> {
        self.tag(Tag::Unit)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<()> {
        self.tag(Tag::Unit)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<()> {
        self.tag(Tag::Variant)?;
        self.out.write_string_7bit(variant)?;
        self.tag(Tag::Unit)
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        name: &'static str,
        value: &T,
    ) -> Result<()> {
        if name != shared::TOKEN {
            return value.serialize(self);
        }
        match shared::take_outgoing() {
            Some(Staged::First(id)) => {
                self.tag(Tag::ObjectDef)?;
                self.out.write_7bit_encoded_int(id as usize)?;
                value.serialize(self)
            }
            Some(Staged::Back(id)) => {
                self.tag(Tag::ObjectRef)?;
                self.out.write_7bit_encoded_int(id as usize)?;
                Ok(())
            }
            None => Err(FormatError::Message("shared object boundary without an object id".into())),
        }
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<()> {
        self.tag(Tag::Variant)?;
        self.out.write_string_7bit(variant)?;
        value.serialize(self)
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Counted<'a>> {
        self.tag(Tag::Seq)?;
        let slot = self.open_slot();
        Ok(Counted { ser: self, slot, count: 0 })
    }

    fn serialize_tuple(self, len: usize) -> Result<Self> {
        self.tag(Tag::Seq)?;
        self.out.write_7bit_encoded_int(len)?;
        Ok(self)
    }

    fn serialize_tuple_struct(self, _name: &'static str, len: usize) -> Result<Self> {
        self.serialize_tuple(len)
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<Self> {
        self.tag(Tag::Variant)?;
        self.out.write_string_7bit(variant)?;
        self.serialize_tuple(len)
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Counted<'a>> {
        self.tag(Tag::Map)?;
        let slot = self.open_slot();
        Ok(Counted { ser: self, slot, count: 0 })
    }

    fn serialize_struct(self, name: &'static str, len: usize) -> Result<StructFields<'a>> {
        if let Some(codec) = registry().by_name(name) {
            return Ok(StructFields::Special {
                ser: self,
                codec,
                components: Vec::with_capacity(codec.components.len()),
            });
        }
        let slot = self.open_slot();
        Ok(StructFields::Record {
            ser: self,
            slot,
            key: TypeKeyBuilder { name, fields: Vec::with_capacity(len) },
        })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Counted<'a>> {
        self.tag(Tag::Variant)?;
        self.out.write_string_7bit(variant)?;
        self.tag(Tag::Fields)?;
        let slot = self.open_slot();
        Ok(Counted { ser: self, slot, count: 0 })
    }
}

impl ser::SerializeSeq for Counted<'_> {
    type Ok = ();
    type Error = FormatError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.count += 1;
        value.serialize(&mut *self.ser)
    }

    fn end(self) -> Result<()> {
        self.close()
    }
}

impl ser::SerializeMap for Counted<'_> {
    type Ok = ();
    type Error = FormatError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<()> {
        self.count += 1;
        key.serialize(&mut *self.ser)
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        value.serialize(&mut *self.ser)
    }

    fn end(self) -> Result<()> {
        self.close()
    }
}

impl ser::SerializeStructVariant for Counted<'_> {
    type Ok = ();
    type Error = FormatError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<()> {
        self.count += 1;
        self.ser.out.write_string_7bit(key)?;
        value.serialize(&mut *self.ser)
    }

    fn end(self) -> Result<()> {
        self.close()
    }
}

macro_rules! impl_fixed_length {
    ($($trait_name:ident :: $method:ident),*) => {
        $(
            impl ser::$trait_name for &mut Serializer {
                type Ok = ();
                type Error = FormatError;

                fn $method<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
                    value.serialize(&mut **self)
                }

                fn end(self) -> Result<()> {
                    Ok(())
                }
            }
        )*
    };
}

impl_fixed_length!(
    SerializeTuple::serialize_element,
    SerializeTupleStruct::serialize_field,
    SerializeTupleVariant::serialize_field
);

/// Captures a single `f32` component through a scratch encoder.
fn capture_component<T: Serialize + ?Sized>(
    codec: &ValueCodec,
    component: &'static str,
    value: &T,
) -> Result<f32> {
    let mut scratch = Serializer::new();
    value.serialize(&mut scratch)?;
    match scratch.out.as_slice() {
        [tag, a, b, c, d] if *tag == Tag::F32 as u8 && scratch.slots.is_empty() => {
            Ok(f32::from_le_bytes([*a, *b, *c, *d]))
        }
        _ => Err(FormatError::NonFloatComponent { type_name: codec.type_name, component }),
    }
}

impl ser::SerializeStruct for StructFields<'_> {
    type Ok = ();
    type Error = FormatError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<()> {
        match self {
            StructFields::Record { ser, key: builder, .. } => {
                builder.fields.push(key);
                value.serialize(&mut **ser)
            }
            StructFields::Special { codec, components, .. } => {
                let component = capture_component(codec, key, value)?;
                components.push((key, component));
                Ok(())
            }
        }
    }

    fn end(self) -> Result<()> {
        match self {
            StructFields::Record { ser, slot, key } => {
                ser.fill(slot, Deferred::Header(TypeKey { name: key.name, fields: key.fields }));
                Ok(())
            }
            StructFields::Special { ser, codec, components } => {
                ser.tag(Tag::Special)?;
                codec.encode(&components, &mut ser.out)
            }
        }
    }
}
