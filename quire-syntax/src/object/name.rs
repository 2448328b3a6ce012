//! Names.

use crate::reader::{Readable, Reader};
use crate::trivia::is_regular_character;
use smallvec::SmallVec;
use std::borrow::Borrow;
use std::fmt::{Debug, Formatter};
use std::ops::Deref;

/// A PDF name, stored without its leading solidus and with `#xx` escapes
/// already resolved.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Name(SmallVec<[u8; 23]>);

impl Name {
    /// Create a new name from unescaped bytes.
    pub fn new(data: &[u8]) -> Self {
        Self(SmallVec::from_slice(data))
    }

    /// Return a string representation of the name.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(self).unwrap_or("{non-ascii name}")
    }
}

impl Deref for Name {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Borrow<[u8]> for Name {
    fn borrow(&self) -> &[u8] {
        &self.0
    }
}

impl From<&[u8]> for Name {
    fn from(value: &[u8]) -> Self {
        Self::new(value)
    }
}

impl<const N: usize> From<&[u8; N]> for Name {
    fn from(value: &[u8; N]) -> Self {
        Self::new(value)
    }
}

impl From<&str> for Name {
    fn from(value: &str) -> Self {
        Self::new(value.as_bytes())
    }
}

impl PartialEq<[u8]> for Name {
    fn eq(&self, other: &[u8]) -> bool {
        self.0.as_slice() == other
    }
}

impl Debug for Name {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "/{}", self.as_str())
    }
}

impl Readable for Name {
    fn read(r: &mut Reader<'_>) -> Option<Self> {
        r.forward_tag(b"/")?;

        let mut name = SmallVec::new();

        while let Some(b) = r.eat(is_regular_character) {
            if b == b'#' {
                let hex = r.peek_bytes(2).filter(|h| h.iter().all(u8::is_ascii_hexdigit));

                if let Some(hex) = hex {
                    name.push(hex_value(hex[0]) << 4 | hex_value(hex[1]));
                    r.read_bytes(2)?;
                    continue;
                }
            }

            name.push(b);
        }

        Some(Self(name))
    }
}

fn hex_value(c: u8) -> u8 {
    match c {
        b'A'..=b'F' => c - b'A' + 10,
        b'a'..=b'f' => c - b'a' + 10,
        _ => c - b'0',
    }
}

#[cfg(test)]
mod tests {
    use super::Name;
    use crate::reader::{Readable, Reader};

    #[test]
    fn simple() {
        assert_eq!(Name::from_bytes(b"/Type").unwrap().as_str(), "Type");
    }

    #[test]
    fn empty() {
        assert_eq!(&*Name::from_bytes(b"/").unwrap(), b"");
    }

    #[test]
    fn escaped() {
        assert_eq!(
            Name::from_bytes(b"/A#20B#2f").unwrap().as_str(),
            "A B/"
        );
    }

    #[test]
    fn stops_at_delimiter() {
        let mut r = Reader::new(b"/Kids[1 0 R]");
        assert_eq!(r.read::<Name>().unwrap().as_str(), "Kids");
        assert_eq!(r.peek_byte(), Some(b'['));
    }
}
