//! Reading bytes and PDF objects from data.

use crate::trivia::{is_eol_character, is_white_space_character};
use std::ops::Range;

/// A cursor over the bytes of a PDF file or a decoded stream.
#[derive(Clone, Debug)]
pub struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    /// Create a new reader at the start of the data.
    #[inline]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Create a new reader positioned at `offset`.
    #[inline]
    pub fn new_at(data: &'a [u8], offset: usize) -> Self {
        Self { data, offset }
    }

    #[inline]
    pub fn at_end(&self) -> bool {
        self.offset >= self.data.len()
    }

    #[inline]
    pub fn jump(&mut self, offset: usize) {
        self.offset = offset;
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn range(&self, range: Range<usize>) -> Option<&'a [u8]> {
        self.data.get(range)
    }

    /// The data from the current offset to the end.
    #[inline]
    pub fn tail(&self) -> Option<&'a [u8]> {
        self.data.get(self.offset..)
    }

    #[inline]
    pub fn read_bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        let v = self.peek_bytes(len)?;
        self.offset += len;

        Some(v)
    }

    #[inline]
    pub fn read_byte(&mut self) -> Option<u8> {
        let v = self.peek_byte()?;
        self.offset += 1;

        Some(v)
    }

    #[inline]
    pub fn peek_bytes(&self, len: usize) -> Option<&'a [u8]> {
        self.data.get(self.offset..self.offset.checked_add(len)?)
    }

    #[inline]
    pub fn peek_byte(&self) -> Option<u8> {
        self.data.get(self.offset).copied()
    }

    /// Eat the next byte if it satisfies the condition.
    #[inline]
    pub fn eat(&mut self, f: impl Fn(u8) -> bool) -> Option<u8> {
        let val = self.peek_byte()?;

        if f(val) {
            self.forward();
            Some(val)
        } else {
            None
        }
    }

    #[inline]
    pub fn forward(&mut self) {
        self.offset += 1;
    }

    /// Advances the offset while bytes satisfy the predicate.
    #[inline]
    pub fn forward_while(&mut self, f: impl Fn(u8) -> bool) {
        while let Some(b) = self.peek_byte() {
            if f(b) {
                self.forward();
            } else {
                break;
            }
        }
    }

    /// Advances the offset while bytes satisfy the predicate, at least one time.
    #[inline]
    pub fn forward_while_1(&mut self, f: impl Fn(u8) -> bool) -> Option<()> {
        self.eat(&f)?;
        self.forward_while(f);

        Some(())
    }

    /// Advances the offset if the next bytes match `tag`.
    #[inline]
    pub fn forward_tag(&mut self, tag: &[u8]) -> Option<()> {
        self.peek_tag(tag)?;
        self.offset += tag.len();

        Some(())
    }

    #[inline]
    pub fn peek_tag(&self, tag: &[u8]) -> Option<()> {
        (self.peek_bytes(tag.len())? == tag).then_some(())
    }

    /// Read an object of type `T`, restoring the offset if reading fails.
    #[inline]
    pub fn read<T: Readable>(&mut self) -> Option<T> {
        let old_offset = self.offset;

        T::read(self).or_else(|| {
            self.offset = old_offset;

            None
        })
    }

    /// Read an unsigned decimal integer, as used by cross-reference tables and
    /// object headers.
    pub fn read_unsigned(&mut self) -> Option<u64> {
        let start = self.offset;
        self.forward_while_1(|b| b.is_ascii_digit())?;
        let digits = self.range(start..self.offset)?;

        digits.iter().try_fold(0u64, |acc, d| {
            acc.checked_mul(10)?.checked_add(u64::from(d - b'0'))
        })
    }

    pub fn skip_white_spaces(&mut self) {
        self.forward_while(is_white_space_character);
    }

    /// Read exactly one end-of-line marker (`\n`, `\r` or `\r\n`).
    pub fn read_eol(&mut self) -> Option<()> {
        match self.read_byte()? {
            b'\n' => Some(()),
            b'\r' => {
                self.forward_tag(b"\n");
                Some(())
            }
            _ => None,
        }
    }

    pub fn skip_eol_characters(&mut self) {
        self.forward_while(is_eol_character);
    }

    pub fn skip_white_spaces_and_comments(&mut self) {
        while let Some(b) = self.peek_byte() {
            if is_white_space_character(b) {
                self.skip_white_spaces();
            } else if b == b'%' {
                self.forward_while(|b| !is_eol_character(b));
            } else {
                return;
            }
        }
    }
}

/// A type that can be parsed from the bytes of a PDF file.
pub trait Readable: Sized {
    /// Read the object at the current position. On failure the reader
    /// position is unspecified; use [`Reader::read`] to restore it.
    fn read(r: &mut Reader<'_>) -> Option<Self>;

    /// Parse the object from a standalone byte slice.
    fn from_bytes(b: &[u8]) -> Option<Self> {
        Reader::new(b).read::<Self>()
    }
}
