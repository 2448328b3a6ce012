//! Number objects.

use crate::object::Object;
use crate::reader::{Readable, Reader};
use log::debug;
use std::str::FromStr;

/// A PDF number.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Number(pub(crate) InternalNumber);

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum InternalNumber {
    Real(f64),
    Integer(i64),
}

impl Number {
    /// Create a new integer number.
    pub const fn from_i64(num: i64) -> Self {
        Self(InternalNumber::Integer(num))
    }

    /// Create a new real number.
    pub const fn from_f64(num: f64) -> Self {
        Self(InternalNumber::Real(num))
    }

    pub fn is_integer(&self) -> bool {
        matches!(self.0, InternalNumber::Integer(_))
    }

    /// Returns the number as an integer, if it is one.
    pub fn as_i64(&self) -> Option<i64> {
        match self.0 {
            InternalNumber::Integer(i) => Some(i),
            InternalNumber::Real(r) => {
                if r.trunc() == r {
                    Some(r as i64)
                } else {
                    debug!("real {r} used where an integer was expected");

                    None
                }
            }
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self.0 {
            InternalNumber::Real(r) => r,
            InternalNumber::Integer(i) => i as f64,
        }
    }
}

impl From<i64> for Number {
    fn from(value: i64) -> Self {
        Self::from_i64(value)
    }
}

impl From<f64> for Number {
    fn from(value: f64) -> Self {
        Self::from_f64(value)
    }
}

impl Readable for Number {
    fn read(r: &mut Reader<'_>) -> Option<Self> {
        let start = r.offset();
        r.eat(|b| b == b'+' || b == b'-');

        let mut is_real = false;

        match r.peek_byte()? {
            b'.' => {
                r.forward();
                r.forward_while_1(|b| b.is_ascii_digit())?;
                is_real = true;
            }
            b'0'..=b'9' => {
                r.forward_while_1(|b| b.is_ascii_digit())?;

                if r.forward_tag(b".").is_some() {
                    r.forward_while(|b| b.is_ascii_digit());
                    is_real = true;
                }
            }
            _ => return None,
        }

        let text = std::str::from_utf8(r.range(start..r.offset())?).ok()?;

        if !is_real && let Ok(i) = i64::from_str(text) {
            return Some(Self::from_i64(i));
        }

        f64::from_str(text).ok().map(Self::from_f64)
    }
}

impl TryFrom<&Object> for i64 {
    type Error = ();

    fn try_from(value: &Object) -> Result<Self, Self::Error> {
        match value {
            Object::Number(n) => n.as_i64().ok_or(()),
            _ => Err(()),
        }
    }
}
