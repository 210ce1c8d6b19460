//! Wire primitives shared by the encoder and the decoder.
//!
//! Fixed-width numbers are little-endian. Lengths, type ids and object ids
//! are 7-bit variable-length unsigned integers (low group first, high bit set
//! on every byte but the last). Strings are a 7-bit length followed by UTF-8.

use std::io::{self, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};

use super::error::{FormatError, Result};

/// One byte in front of every encoded value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum Tag {
    Unit = 0x00,
    Bool = 0x01,
    I8 = 0x02,
    I16 = 0x03,
    I32 = 0x04,
    I64 = 0x05,
    U8 = 0x06,
    U16 = 0x07,
    U32 = 0x08,
    U64 = 0x09,
    F32 = 0x0A,
    F64 = 0x0B,
    Char = 0x0C,
    Str = 0x0D,
    Bytes = 0x0E,
    Some = 0x0F,
    Seq = 0x10,
    Map = 0x11,
    StructDef = 0x12,
    StructRef = 0x13,
    Special = 0x14,
    Variant = 0x15,
    Fields = 0x16,
    ObjectDef = 0x17,
    ObjectRef = 0x18,
}

impl Tag {
    pub(crate) fn from_byte(byte: u8) -> Option<Tag> {
        Some(match byte {
            0x00 => Tag::Unit,
            0x01 => Tag::Bool,
            0x02 => Tag::I8,
            0x03 => Tag::I16,
            0x04 => Tag::I32,
            0x05 => Tag::I64,
            0x06 => Tag::U8,
            0x07 => Tag::U16,
            0x08 => Tag::U32,
            0x09 => Tag::U64,
            0x0A => Tag::F32,
            0x0B => Tag::F64,
            0x0C => Tag::Char,
            0x0D => Tag::Str,
            0x0E => Tag::Bytes,
            0x0F => Tag::Some,
            0x10 => Tag::Seq,
            0x11 => Tag::Map,
            0x12 => Tag::StructDef,
            0x13 => Tag::StructRef,
            0x14 => Tag::Special,
            0x15 => Tag::Variant,
            0x16 => Tag::Fields,
            0x17 => Tag::ObjectDef,
            0x18 => Tag::ObjectRef,
            _ => return None,
        })
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            Tag::Unit => "unit",
            Tag::Bool => "bool",
            Tag::I8 => "i8",
            Tag::I16 => "i16",
            Tag::I32 => "i32",
            Tag::I64 => "i64",
            Tag::U8 => "u8",
            Tag::U16 => "u16",
            Tag::U32 => "u32",
            Tag::U64 => "u64",
            Tag::F32 => "f32",
            Tag::F64 => "f64",
            Tag::Char => "char",
            Tag::Str => "string",
            Tag::Bytes => "bytes",
            Tag::Some => "option",
            Tag::Seq => "sequence",
            Tag::Map => "map",
            Tag::StructDef => "struct definition",
            Tag::StructRef => "struct reference",
            Tag::Special => "special value",
            Tag::Variant => "enum variant",
            Tag::Fields => "field list",
            Tag::ObjectDef => "shared object",
            Tag::ObjectRef => "shared object reference",
        }
    }
}

pub(crate) trait WriteUtils: Write {
    fn write_tag(&mut self, tag: Tag) -> io::Result<()> {
        self.write_u8(tag as u8)
    }

    fn write_7bit_encoded_int(&mut self, mut value: usize) -> io::Result<()> {
        while value >= 0x80 {
            self.write_u8((value as u8 & 0x7F) | 0x80)?;
            value >>= 7;
        }
        self.write_u8(value as u8)
    }

    fn write_string_7bit(&mut self, s: &str) -> io::Result<()> {
        self.write_7bit_encoded_int(s.len())?;
        self.write_all(s.as_bytes())
    }

    fn write_f32_le(&mut self, value: f32) -> io::Result<()> {
        self.write_f32::<LE>(value)
    }
}

impl<W: Write + ?Sized> WriteUtils for W {}

macro_rules! impl_read_fixed {
    ($func_name:ident, $ty:ty, $read_fn:ident) => {
        pub(crate) fn $func_name(&mut self) -> Result<$ty> {
            Ok(self.input.$read_fn::<LE>()?)
        }
    };
}

/// Cursor over a borrowed record payload.
pub(crate) struct ByteReader<'de> {
    input: &'de [u8],
}

impl<'de> ByteReader<'de> {
    pub(crate) fn new(input: &'de [u8]) -> Self {
        ByteReader { input }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.input.len()
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8> {
        Ok(self.input.read_u8()?)
    }

    pub(crate) fn read_i8(&mut self) -> Result<i8> {
        Ok(self.input.read_i8()?)
    }

    impl_read_fixed!(read_i16, i16, read_i16);
    impl_read_fixed!(read_i32, i32, read_i32);
    impl_read_fixed!(read_i64, i64, read_i64);
    impl_read_fixed!(read_u16, u16, read_u16);
    impl_read_fixed!(read_u32, u32, read_u32);
    impl_read_fixed!(read_u64, u64, read_u64);
    impl_read_fixed!(read_f32, f32, read_f32);
    impl_read_fixed!(read_f64, f64, read_f64);

    pub(crate) fn read_tag(&mut self) -> Result<Tag> {
        let byte = self.read_u8()?;
        Tag::from_byte(byte).ok_or(FormatError::UnknownTag(byte))
    }

    pub(crate) fn read_7bit_encoded_int(&mut self) -> Result<usize> {
        let mut result: u64 = 0;
        let mut shift: u32 = 0;

        loop {
            let byte = self.read_u8()?;
            if shift > 63 || (shift == 63 && byte & 0x7E != 0) {
                return Err(FormatError::LengthOverflow);
            }
            result |= u64::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }

        usize::try_from(result).map_err(|_| FormatError::LengthOverflow)
    }

    /// Reads an element count. Every element takes at least one byte, so a
    /// count larger than what is left cannot be satisfied.
    pub(crate) fn read_len(&mut self) -> Result<usize> {
        let len = self.read_7bit_encoded_int()?;
        if len > self.remaining() {
            return Err(FormatError::Truncated);
        }
        Ok(len)
    }

    pub(crate) fn read_id(&mut self) -> Result<u32> {
        u32::try_from(self.read_7bit_encoded_int()?).map_err(|_| FormatError::LengthOverflow)
    }

    pub(crate) fn read_bytes(&mut self, len: usize) -> Result<&'de [u8]> {
        if len > self.input.len() {
            return Err(FormatError::Truncated);
        }
        let (head, tail) = self.input.split_at(len);
        self.input = tail;
        Ok(head)
    }

    pub(crate) fn read_str(&mut self) -> Result<&'de str> {
        let len = self.read_7bit_encoded_int()?;
        let bytes = self.read_bytes(len)?;
        std::str::from_utf8(bytes).map_err(|_| FormatError::InvalidUtf8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_7bit_roundtrip_boundaries() {
        for value in [0usize, 1, 0x7F, 0x80, 0x3FFF, 0x4000, u32::MAX as usize, usize::MAX] {
            let mut buffer = Vec::new();
            buffer.write_7bit_encoded_int(value).unwrap();
            let mut reader = ByteReader::new(&buffer);
            assert_eq!(reader.read_7bit_encoded_int().unwrap(), value);
            assert_eq!(reader.remaining(), 0);
        }
    }

    #[test]
    fn test_7bit_small_values_take_one_byte() {
        let mut buffer = Vec::new();
        buffer.write_7bit_encoded_int(0x7F).unwrap();
        assert_eq!(buffer, vec![0x7F]);

        buffer.clear();
        buffer.write_7bit_encoded_int(0x80).unwrap();
        assert_eq!(buffer, vec![0x80, 0x01]);
    }

    #[test]
    fn test_7bit_rejects_overlong_input() {
        let bytes = [0xFFu8; 11];
        let mut reader = ByteReader::new(&bytes);
        assert!(matches!(reader.read_7bit_encoded_int(), Err(FormatError::LengthOverflow)));
    }

    #[test]
    fn test_read_str_borrowed_and_truncated() {
        let mut buffer = Vec::new();
        buffer.write_string_7bit("coins").unwrap();
        let mut reader = ByteReader::new(&buffer);
        assert_eq!(reader.read_str().unwrap(), "coins");

        let mut reader = ByteReader::new(&buffer[..3]);
        assert!(matches!(reader.read_str(), Err(FormatError::Truncated)));
    }

    #[test]
    fn test_unknown_tag() {
        let mut reader = ByteReader::new(&[0xEE]);
        assert!(matches!(reader.read_tag(), Err(FormatError::UnknownTag(0xEE))));
    }

    #[test]
    fn test_fixed_width_reads_fail_on_short_input() {
        let mut reader = ByteReader::new(&[0x01, 0x02]);
        assert!(matches!(reader.read_i32(), Err(FormatError::Truncated)));
    }
}
