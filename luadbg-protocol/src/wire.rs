//! Primitive field encoding shared by all payloads
//!
//! Strings carry a u16 byte length, lists a u16 entry count. Everything is
//! big-endian.

use bytes::{Buf, BufMut, BytesMut};

use crate::codec::CodecError;
use crate::types::{LuaType, NameAndType, Scope, FILTER_SLOTS};

pub(crate) const U8: usize = 1;
pub(crate) const U16: usize = 2;
pub(crate) const U32: usize = 4;

pub(crate) fn str_len(s: &str) -> usize {
    U16 + s.len()
}

pub(crate) fn names_len(entries: &[NameAndType]) -> usize {
    U16 + entries
        .iter()
        .map(|e| str_len(&e.name) + U16)
        .sum::<usize>()
}

/// Append-only writer over a pre-sized buffer
pub(crate) struct Writer<'a> {
    dst: &'a mut BytesMut,
}

impl<'a> Writer<'a> {
    pub(crate) fn new(dst: &'a mut BytesMut) -> Self {
        Self { dst }
    }

    pub(crate) fn u8(&mut self, v: u8) {
        self.dst.put_u8(v);
    }

    pub(crate) fn u16(&mut self, v: u16) {
        self.dst.put_u16(v);
    }

    pub(crate) fn i16(&mut self, v: i16) {
        self.dst.put_i16(v);
    }

    pub(crate) fn u32(&mut self, v: u32) {
        self.dst.put_u32(v);
    }

    pub(crate) fn i32(&mut self, v: i32) {
        self.dst.put_i32(v);
    }

    pub(crate) fn f32(&mut self, v: f32) {
        self.dst.put_f32(v);
    }

    pub(crate) fn bool(&mut self, v: bool) {
        self.dst.put_u8(u8::from(v));
    }

    pub(crate) fn lua_type(&mut self, v: LuaType) {
        self.dst.put_i16(v.to_wire());
    }

    pub(crate) fn scope(&mut self, v: Scope) {
        self.dst.put_u8(v.to_wire());
    }

    pub(crate) fn string(&mut self, v: &str) -> Result<(), CodecError> {
        let len = u16::try_from(v.len()).map_err(|_| CodecError::StringTooLong { len: v.len() })?;
        self.dst.put_u16(len);
        self.dst.put_slice(v.as_bytes());
        Ok(())
    }

    pub(crate) fn names(&mut self, entries: &[NameAndType]) -> Result<(), CodecError> {
        let count = u16::try_from(entries.len())
            .map_err(|_| CodecError::TooManyEntries { count: entries.len() })?;
        self.dst.put_u16(count);
        for entry in entries {
            self.string(&entry.name)?;
            self.lua_type(entry.lua_type);
        }
        Ok(())
    }

    pub(crate) fn filter(&mut self, slots: &[bool; FILTER_SLOTS]) {
        for &slot in slots {
            self.bool(slot);
        }
    }
}

/// Bounds-checked reader over one frame's payload
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len()
    }

    fn need(&self, n: usize) -> Result<(), CodecError> {
        if self.buf.len() < n {
            return Err(CodecError::Truncated {
                needed: n,
                available: self.buf.len(),
            });
        }
        Ok(())
    }

    pub(crate) fn u8(&mut self) -> Result<u8, CodecError> {
        self.need(U8)?;
        Ok(self.buf.get_u8())
    }

    pub(crate) fn u16(&mut self) -> Result<u16, CodecError> {
        self.need(U16)?;
        Ok(self.buf.get_u16())
    }

    pub(crate) fn i16(&mut self) -> Result<i16, CodecError> {
        self.need(U16)?;
        Ok(self.buf.get_i16())
    }

    pub(crate) fn u32(&mut self) -> Result<u32, CodecError> {
        self.need(U32)?;
        Ok(self.buf.get_u32())
    }

    pub(crate) fn i32(&mut self) -> Result<i32, CodecError> {
        self.need(U32)?;
        Ok(self.buf.get_i32())
    }

    pub(crate) fn f32(&mut self) -> Result<f32, CodecError> {
        self.need(U32)?;
        Ok(self.buf.get_f32())
    }

    pub(crate) fn bool(&mut self) -> Result<bool, CodecError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::InvalidEnum {
                field: "bool",
                value: other as i32,
            }),
        }
    }

    pub(crate) fn lua_type(&mut self) -> Result<LuaType, CodecError> {
        let code = self.i16()?;
        LuaType::from_wire(code).ok_or(CodecError::InvalidLuaType(code))
    }

    pub(crate) fn scope(&mut self) -> Result<Scope, CodecError> {
        let code = self.u8()?;
        Scope::from_wire(code).ok_or(CodecError::InvalidEnum {
            field: "scope",
            value: code as i32,
        })
    }

    pub(crate) fn string(&mut self) -> Result<String, CodecError> {
        let len = self.u16()? as usize;
        self.need(len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        String::from_utf8(head.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }

    pub(crate) fn names(&mut self) -> Result<Vec<NameAndType>, CodecError> {
        let count = self.u16()? as usize;
        let mut entries = Vec::with_capacity(count.min(self.remaining() / (U16 * 2)));
        for _ in 0..count {
            let name = self.string()?;
            let lua_type = self.lua_type()?;
            entries.push(NameAndType { name, lua_type });
        }
        Ok(entries)
    }

    pub(crate) fn filter(&mut self) -> Result<[bool; FILTER_SLOTS], CodecError> {
        let mut slots = [false; FILTER_SLOTS];
        for slot in slots.iter_mut() {
            *slot = self.bool()?;
        }
        Ok(slots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_prefix_is_byte_length() {
        let mut buf = BytesMut::new();
        Writer::new(&mut buf).string("héllo").unwrap();
        assert_eq!(&buf[..2], &[0, 6]);
        assert_eq!(buf.len(), str_len("héllo"));
    }

    #[test]
    fn test_reader_truncated() {
        let mut reader = Reader::new(&[0, 5, b'a', b'b']);
        assert!(matches!(
            reader.string(),
            Err(CodecError::Truncated { needed: 5, available: 2 })
        ));
    }

    #[test]
    fn test_reader_rejects_bad_bool() {
        let mut reader = Reader::new(&[2]);
        assert!(matches!(reader.bool(), Err(CodecError::InvalidEnum { .. })));
    }

    #[test]
    fn test_string_too_long() {
        let mut buf = BytesMut::new();
        let long = "x".repeat(u16::MAX as usize + 1);
        assert!(matches!(
            Writer::new(&mut buf).string(&long),
            Err(CodecError::StringTooLong { .. })
        ));
    }
}
