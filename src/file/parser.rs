//! Cursor-based reader over a class image.
//!
//! [`Parser`] tracks a position within a byte slice and offers bounds-checked, big-endian reads
//! for the primitive shapes of the class file format (`u1`, `u2`, `u4`, length-prefixed
//! tables and modified UTF-8 strings).
//!
//! # Usage Examples
//!
//! ```rust
//! use classweave::Parser;
//!
//! let data = [0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x34];
//! let mut parser = Parser::new(&data);
//!
//! assert_eq!(parser.read_be::<u32>()?, 0xCAFE_BABE);
//! assert_eq!(parser.read_be::<u16>()?, 52);
//! assert!(!parser.has_more_data());
//! # Ok::<(), classweave::Error>(())
//! ```

use crate::{
    file::io::{read_be_at, JvmIO},
    Result,
};

/// A position-tracking, bounds-checked big-endian reader.
pub struct Parser<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new parser positioned at the start of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Total length of the underlying data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the underlying data is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns true while unread bytes remain.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Move the cursor to an absolute position. Seeking to the end is allowed.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `pos` lies past the end of the data.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        self.position = pos;
        Ok(())
    }

    /// Skip `step` bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `step` bytes remain.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        match self.position.checked_add(step) {
            Some(end) if end <= self.data.len() => {
                self.position = end;
                Ok(())
            }
            _ => Err(out_of_bounds_error!()),
        }
    }

    /// Current cursor position.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// The complete underlying data.
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Peek at the byte under the cursor.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] at the end of the data.
    pub fn peek_byte(&self) -> Result<u8> {
        if self.position >= self.data.len() {
            return Err(out_of_bounds_error!());
        }
        Ok(self.data[self.position])
    }

    /// Run `f`, restoring the cursor if it fails.
    ///
    /// # Errors
    /// Returns whatever `f` returns.
    pub fn transactional<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let saved_position = self.position;
        let result = f(self);
        if result.is_err() {
            self.position = saved_position;
        }
        result
    }

    /// Advance to the next multiple of `alignment`, measured from `base`.
    ///
    /// `tableswitch` and `lookupswitch` pad relative to the start of the method body, which is
    /// not the start of the class image.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if padding runs past the end.
    pub fn align_from(&mut self, base: usize, alignment: usize) -> Result<()> {
        let relative = self.position - base;
        let padding = (alignment - (relative % alignment)) % alignment;
        self.advance_by(padding)
    }

    /// Read a big-endian primitive.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the value does not fit in the remaining data.
    pub fn read_be<T: JvmIO>(&mut self) -> Result<T> {
        read_be_at::<T>(self.data, &mut self.position)
    }

    /// Read `len` raw bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `len` bytes remain.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let start = self.position;
        self.advance_by(len)?;
        Ok(&self.data[start..self.position])
    }

    /// Read a `u4`-length-prefixed byte block, the framing of every attribute body.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the block is truncated.
    pub fn read_u4_block(&mut self) -> Result<&'a [u8]> {
        let len = self.read_be::<u32>()? as usize;
        self.read_bytes(len)
    }

    /// Read a `u2` count followed by that many elements produced by `element`.
    ///
    /// # Errors
    /// Returns the first error produced by `element`.
    pub fn read_u2_table<T, F>(&mut self, mut element: F) -> Result<Vec<T>>
    where
        F: FnMut(&mut Self) -> Result<T>,
    {
        let count = self.read_be::<u16>()?;
        let mut items = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            items.push(element(self)?);
        }
        Ok(items)
    }

    /// Read a `u2`-length-prefixed modified UTF-8 string.
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedArtifact`] if the encoding is invalid.
    pub fn read_modified_utf8(&mut self) -> Result<String> {
        let len = usize::from(self.read_be::<u16>()?);
        let bytes = self.read_bytes(len)?;
        decode_modified_utf8(bytes)
    }
}

/// Decode the class file flavour of UTF-8.
///
/// Differs from standard UTF-8 in two places: NUL is stored as `C0 80` and supplementary
/// characters are stored as surrogate pairs of three bytes each.
///
/// # Errors
/// Returns [`crate::Error::MalformedArtifact`] for truncated sequences or unpaired surrogates.
pub fn decode_modified_utf8(bytes: &[u8]) -> Result<String> {
    if let Ok(plain) = std::str::from_utf8(bytes) {
        if !plain.contains('\0') {
            return Ok(plain.to_string());
        }
    }

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b0 = u16::from(bytes[i]);
        if b0 & 0x80 == 0 {
            units.push(b0);
            i += 1;
        } else if b0 & 0xE0 == 0xC0 {
            let Some(&b1) = bytes.get(i + 1) else {
                return Err(malformed_error!("Truncated modified UTF-8 at byte {}", i));
            };
            units.push(((b0 & 0x1F) << 6) | (u16::from(b1) & 0x3F));
            i += 2;
        } else if b0 & 0xF0 == 0xE0 {
            let (Some(&b1), Some(&b2)) = (bytes.get(i + 1), bytes.get(i + 2)) else {
                return Err(malformed_error!("Truncated modified UTF-8 at byte {}", i));
            };
            units.push(((b0 & 0x0F) << 12) | ((u16::from(b1) & 0x3F) << 6) | (u16::from(b2) & 0x3F));
            i += 3;
        } else {
            return Err(malformed_error!("Invalid modified UTF-8 lead byte {:#x}", b0));
        }
    }

    String::from_utf16(&units).map_err(|_| malformed_error!("Unpaired surrogate in constant"))
}

/// Encode a string in the class file flavour of UTF-8.
#[must_use]
pub fn encode_modified_utf8(value: &str) -> Vec<u8> {
    if !value.contains('\0') && value.chars().all(|c| (c as u32) < 0x1_0000) {
        return value.as_bytes().to_vec();
    }

    let mut out = Vec::with_capacity(value.len() + 8);
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push((0xC0 | ((unit >> 6) & 0x1F)) as u8);
                out.push((0x80 | (unit & 0x3F)) as u8);
            }
            _ => {
                out.push((0xE0 | ((unit >> 12) & 0x0F)) as u8);
                out.push((0x80 | ((unit >> 6) & 0x3F)) as u8);
                out.push((0x80 | (unit & 0x3F)) as u8);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seek_and_read() {
        let data = [0x00, 0x01, 0x00, 0x02, 0xFF];
        let mut parser = Parser::new(&data);
        assert_eq!(parser.read_be::<u16>().unwrap(), 1);
        parser.seek(4).unwrap();
        assert_eq!(parser.peek_byte().unwrap(), 0xFF);
        parser.seek(5).unwrap();
        assert!(parser.peek_byte().is_err());
        assert!(parser.seek(6).is_err());
    }

    #[test]
    fn transactional_restores_on_error() {
        let data = [0x00, 0x01];
        let mut parser = Parser::new(&data);
        let result = parser.transactional(|p| {
            p.read_be::<u16>()?;
            p.read_be::<u16>()
        });
        assert!(result.is_err());
        assert_eq!(parser.pos(), 0);
    }

    #[test]
    fn u2_table() {
        let data = [0x00, 0x03, 0x0A, 0x0B, 0x0C];
        let mut parser = Parser::new(&data);
        let items = parser.read_u2_table(|p| p.read_be::<u8>()).unwrap();
        assert_eq!(items, vec![0x0A, 0x0B, 0x0C]);
    }

    #[test]
    fn align_relative_to_base() {
        let data = [0u8; 16];
        let mut parser = Parser::new(&data);
        parser.seek(5).unwrap();
        parser.align_from(2, 4).unwrap();
        assert_eq!(parser.pos(), 6);
    }

    #[test]
    fn modified_utf8_nul_and_supplementary() {
        let text = "a\0\u{1F600}";
        let encoded = encode_modified_utf8(text);
        assert_eq!(&encoded[..3], &[b'a', 0xC0, 0x80]);
        assert_eq!(encoded.len(), 3 + 6);
        assert_eq!(decode_modified_utf8(&encoded).unwrap(), text);
    }

    #[test]
    fn modified_utf8_truncated() {
        assert!(decode_modified_utf8(&[0xE0, 0x80]).is_err());
    }
}
