//! Strings.

use crate::reader::{Readable, Reader};
use crate::trivia::is_white_space_character;
use log::warn;
use std::fmt::{Debug, Formatter};

/// A PDF string with its escapes resolved.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct String {
    bytes: Vec<u8>,
    hex: bool,
}

impl String {
    /// Create a new literal string.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            hex: false,
        }
    }

    /// Create a new string that is written in hexadecimal form.
    pub fn new_hex(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            hex: true,
        }
    }

    pub fn get(&self) -> &[u8] {
        &self.bytes
    }

    /// Replace the content of the string, keeping its form.
    pub fn set(&mut self, bytes: Vec<u8>) {
        self.bytes = bytes;
    }

    /// Whether the string was read from (and is written in) hexadecimal form.
    pub fn is_hex(&self) -> bool {
        self.hex
    }
}

impl Debug for String {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.hex {
            write!(f, "<{} bytes>", self.bytes.len())
        } else {
            write!(f, "({})", std::string::String::from_utf8_lossy(&self.bytes))
        }
    }
}

impl Readable for String {
    fn read(r: &mut Reader<'_>) -> Option<Self> {
        match r.peek_byte()? {
            b'<' => read_hex(r).map(Self::new_hex),
            b'(' => read_literal(r).map(Self::new),
            _ => None,
        }
    }
}

fn read_hex(r: &mut Reader<'_>) -> Option<Vec<u8>> {
    r.forward_tag(b"<")?;

    let mut nibbles = vec![];

    loop {
        let b = r.read_byte()?;

        match b {
            b'>' => break,
            b if b.is_ascii_hexdigit() => nibbles.push(hex_value(b)),
            b if is_white_space_character(b) => {}
            _ => return None,
        }
    }

    // A missing final digit is assumed to be zero.
    if nibbles.len() % 2 != 0 {
        nibbles.push(0);
    }

    Some(nibbles.chunks(2).map(|c| c[0] << 4 | c[1]).collect())
}

fn read_literal(r: &mut Reader<'_>) -> Option<Vec<u8>> {
    r.forward_tag(b"(")?;

    let mut out = vec![];
    let mut depth = 1usize;

    loop {
        let byte = r.read_byte()?;

        match byte {
            b'(' => {
                depth += 1;
                out.push(byte);
            }
            b')' => {
                depth -= 1;

                if depth == 0 {
                    break;
                }

                out.push(byte);
            }
            b'\\' => {
                let next = r.read_byte()?;

                match next {
                    b'n' => out.push(0x0A),
                    b'r' => out.push(0x0D),
                    b't' => out.push(0x09),
                    b'b' => out.push(0x08),
                    b'f' => out.push(0x0C),
                    // Line continuation.
                    b'\r' => {
                        r.forward_tag(b"\n");
                    }
                    b'\n' => {}
                    b'0'..=b'7' => {
                        let mut value = u32::from(next - b'0');

                        for _ in 0..2 {
                            match r.eat(|b| (b'0'..=b'7').contains(&b)) {
                                Some(d) => value = value * 8 + u32::from(d - b'0'),
                                None => break,
                            }
                        }

                        if value > 0xff {
                            warn!("octal escape in literal string overflows a byte");
                        }

                        out.push(value as u8);
                    }
                    other => out.push(other),
                }
            }
            // An unescaped end-of-line marker is read as a single line feed.
            b'\r' => {
                r.forward_tag(b"\n");
                out.push(b'\n');
            }
            other => out.push(other),
        }
    }

    Some(out)
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
    use super::String;
    use crate::reader::Readable;

    #[test]
    fn hex() {
        let s = String::from_bytes(b"<48 65 6C6C6F>").unwrap();
        assert_eq!(s.get(), b"Hello");
        assert!(s.is_hex());
    }

    #[test]
    fn hex_odd_length() {
        assert_eq!(String::from_bytes(b"<901FA>").unwrap().get(), &[0x90, 0x1F, 0xA0]);
    }

    #[test]
    fn literal_nested_parentheses() {
        assert_eq!(
            String::from_bytes(b"(a (nested) string)").unwrap().get(),
            b"a (nested) string"
        );
    }

    #[test]
    fn literal_escapes() {
        assert_eq!(
            String::from_bytes(b"(\\(x\\)\\n\\101\\7)").unwrap().get(),
            b"(x)\nA\x07"
        );
    }

    #[test]
    fn literal_line_continuation() {
        assert_eq!(
            String::from_bytes(b"(split \\\r\nline)").unwrap().get(),
            b"split line"
        );
    }

    #[test]
    fn unterminated() {
        assert!(String::from_bytes(b"(never closed").is_none());
    }
}
