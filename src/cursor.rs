//! Byte cursor over a fully-read file buffer, shared by the two loaders.
//! Reads are bounds-checked and fail with `Truncated` at the current offset.

use crate::error::ParseError;

pub(crate) struct Cursor<'a> {
    buffer: &'a [u8],
    pub(crate) pos: usize,
    pub(crate) little_endian: bool,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            pos: 0,
            little_endian: true,
        }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buffer.len() - self.pos
    }

    pub(crate) fn take(&mut self, len: usize) -> Result<&'a [u8], ParseError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.buffer.len())
            .ok_or(ParseError::Truncated { offset: self.pos })?;
        let slice = &self.buffer[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Consume `tag` or fail with its position in the message.
    pub(crate) fn expect(&mut self, tag: &'static [u8]) -> Result<(), ParseError> {
        let at = self.pos;
        let got = self.take(tag.len())?;
        if got != tag {
            return Err(ParseError::malformed(format!(
                "expected {} at byte {at}",
                String::from_utf8_lossy(tag)
            )));
        }
        Ok(())
    }

    /// Consume `tag` if it is next, returning whether it was.
    pub(crate) fn consume_if(&mut self, tag: &[u8]) -> bool {
        if self.buffer[self.pos..].starts_with(tag) {
            self.pos += tag.len();
            true
        } else {
            false
        }
    }

    pub(crate) fn fixed_fields(
        &mut self,
        count: usize,
        width: usize,
    ) -> Result<Vec<Vec<u8>>, ParseError> {
        let mut fields = Vec::with_capacity(count);
        for _ in 0..count {
            fields.push(self.take(width)?.to_vec());
        }
        Ok(fields)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, ParseError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn i8(&mut self) -> Result<i8, ParseError> {
        Ok(self.take(1)?[0] as i8)
    }

    pub(crate) fn u16(&mut self) -> Result<u16, ParseError> {
        let b = self.take(2)?;
        Ok(if self.little_endian {
            u16::from_le_bytes([b[0], b[1]])
        } else {
            u16::from_be_bytes([b[0], b[1]])
        })
    }

    pub(crate) fn i16(&mut self) -> Result<i16, ParseError> {
        Ok(self.u16()? as i16)
    }

    pub(crate) fn u32(&mut self) -> Result<u32, ParseError> {
        let b = self.take(4)?;
        Ok(if self.little_endian {
            u32::from_le_bytes([b[0], b[1], b[2], b[3]])
        } else {
            u32::from_be_bytes([b[0], b[1], b[2], b[3]])
        })
    }

    pub(crate) fn i32(&mut self) -> Result<i32, ParseError> {
        Ok(self.u32()? as i32)
    }

    pub(crate) fn u64(&mut self) -> Result<u64, ParseError> {
        let b = self.take(8)?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(b);
        Ok(if self.little_endian {
            u64::from_le_bytes(bytes)
        } else {
            u64::from_be_bytes(bytes)
        })
    }

    pub(crate) fn f32(&mut self) -> Result<f32, ParseError> {
        Ok(f32::from_bits(self.u32()?))
    }

    pub(crate) fn f64(&mut self) -> Result<f64, ParseError> {
        Ok(f64::from_bits(self.u64()?))
    }
}
