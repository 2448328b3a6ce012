//! The PDF object model.
//!
//! Unlike a zero-copy view, every object here owns its data, so that it can be
//! created, mutated and written back independently of the file it was read from.

use crate::reader::{Readable, Reader};
use std::fmt::Debug;

pub mod array;
pub mod dict;
pub mod flags;
pub mod name;
pub mod number;
pub mod r#ref;
pub mod stream;
pub mod string;

pub use array::Array;
pub use dict::{Dict, keys};
pub use flags::ObjectFlags;
pub use name::Name;
pub use number::Number;
pub use r#ref::ObjRef;
pub use stream::Stream;

/// The null object.
#[derive(Debug, Eq, PartialEq, Clone, Copy, Hash, Default)]
pub struct Null;

/// A PDF object.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// A null object.
    Null(Null),
    /// A boolean object.
    Boolean(bool),
    /// A number object.
    Number(Number),
    /// A string object.
    String(string::String),
    /// A name object.
    Name(Name),
    /// An array object.
    Array(Array),
    /// A dictionary object.
    Dict(Dict),
    /// A stream object. Streams can only be written as indirect objects.
    Stream(Stream),
    /// Pre-serialized bytes that are written verbatim.
    Literal(Vec<u8>),
    /// A reference to an indirect object.
    Reference(ObjRef),
}

impl Object {
    pub const NULL: Object = Object::Null(Null);

    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null(_))
    }

    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Object::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_dict_mut(&mut self) -> Option<&mut Dict> {
        match self {
            Object::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Returns the dictionary of a dictionary or stream object.
    pub fn dict_like(&self) -> Option<&Dict> {
        match self {
            Object::Dict(d) => Some(d),
            Object::Stream(s) => Some(s.dict()),
            _ => None,
        }
    }

    pub fn dict_like_mut(&mut self) -> Option<&mut Dict> {
        match self {
            Object::Dict(d) => Some(d),
            Object::Stream(s) => Some(s.dict_mut()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Object::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Array> {
        match self {
            Object::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&Stream> {
        match self {
            Object::Stream(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&Name> {
        match self {
            Object::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.try_into().ok()
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Object::Number(n) => Some(n.as_f64()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Object::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&string::String> {
        match self {
            Object::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<ObjRef> {
        match self {
            Object::Reference(r) => Some(*r),
            _ => None,
        }
    }

    /// Whether the object is a dictionary or stream whose `/Type` is `ty`.
    pub fn is_type(&self, ty: &[u8]) -> bool {
        self.dict_like().is_some_and(|d| d.is_type(ty))
    }

    /// The flags of a direct container, empty for every other kind of object.
    pub fn flags(&self) -> ObjectFlags {
        match self {
            Object::Dict(d) => d.flags(),
            Object::Stream(s) => s.dict().flags(),
            Object::Array(a) => a.flags(),
            _ => ObjectFlags::empty(),
        }
    }

    pub fn flags_mut(&mut self) -> Option<&mut ObjectFlags> {
        match self {
            Object::Dict(d) => Some(d.flags_mut()),
            Object::Stream(s) => Some(s.dict_mut().flags_mut()),
            Object::Array(a) => Some(a.flags_mut()),
            _ => None,
        }
    }

    /// Call `f` for every reference contained in the object, descending
    /// through direct containers.
    pub fn visit_refs(&self, f: &mut impl FnMut(ObjRef)) {
        match self {
            Object::Reference(r) => f(*r),
            Object::Array(a) => a.iter().for_each(|o| o.visit_refs(f)),
            Object::Dict(d) => d.iter().for_each(|(_, o)| o.visit_refs(f)),
            Object::Stream(s) => s.dict().iter().for_each(|(_, o)| o.visit_refs(f)),
            _ => {}
        }
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::NULL
    }
}

macro_rules! from_impl {
    ($t:ty, $variant:ident) => {
        impl From<$t> for Object {
            fn from(value: $t) -> Self {
                Object::$variant(value)
            }
        }
    };
}

from_impl!(bool, Boolean);
from_impl!(Number, Number);
from_impl!(string::String, String);
from_impl!(Name, Name);
from_impl!(Array, Array);
from_impl!(Dict, Dict);
from_impl!(Stream, Stream);
from_impl!(ObjRef, Reference);
from_impl!(Null, Null);

impl From<i64> for Object {
    fn from(value: i64) -> Self {
        Object::Number(Number::from_i64(value))
    }
}

impl From<i32> for Object {
    fn from(value: i32) -> Self {
        Object::Number(Number::from_i64(i64::from(value)))
    }
}

impl From<u32> for Object {
    fn from(value: u32) -> Self {
        Object::Number(Number::from_i64(i64::from(value)))
    }
}

impl From<usize> for Object {
    fn from(value: usize) -> Self {
        Object::Number(Number::from_i64(value as i64))
    }
}

impl From<f64> for Object {
    fn from(value: f64) -> Self {
        Object::Number(Number::from_f64(value))
    }
}

impl From<&[u8]> for Object {
    fn from(value: &[u8]) -> Self {
        Object::Name(Name::new(value))
    }
}

impl Readable for bool {
    fn read(r: &mut Reader<'_>) -> Option<Self> {
        if r.forward_tag(b"true").is_some() {
            Some(true)
        } else {
            r.forward_tag(b"false").map(|_| false)
        }
    }
}

impl Readable for Null {
    fn read(r: &mut Reader<'_>) -> Option<Self> {
        r.forward_tag(b"null").map(|_| Null)
    }
}

impl Readable for Object {
    fn read(r: &mut Reader<'_>) -> Option<Self> {
        let object = match r.peek_byte()? {
            b'n' => Self::Null(r.read::<Null>()?),
            b't' | b'f' => Self::Boolean(r.read::<bool>()?),
            b'/' => Self::Name(r.read::<Name>()?),
            b'<' => match r.peek_bytes(2)? {
                b"<<" => {
                    let mut cloned = r.clone();
                    let dict = cloned.read::<Dict>()?;
                    cloned.skip_white_spaces_and_comments();

                    if cloned.peek_tag(b"stream").is_some() {
                        Self::Stream(r.read::<Stream>()?)
                    } else {
                        r.jump(cloned.offset());

                        Self::Dict(dict)
                    }
                }
                _ => Self::String(r.read::<string::String>()?),
            },
            b'(' => Self::String(r.read::<string::String>()?),
            b'0'..=b'9' => match r.read::<ObjRef>() {
                Some(reference) => Self::Reference(reference),
                None => Self::Number(r.read::<Number>()?),
            },
            b'.' | b'+' | b'-' => Self::Number(r.read::<Number>()?),
            b'[' => Self::Array(r.read::<Array>()?),
            _ => return None,
        };

        Some(object)
    }
}

/// An indirect object as it appears in the body of a file.
#[derive(Debug, Clone, PartialEq)]
pub struct IndirectObject {
    pub id: ObjRef,
    pub object: Object,
}

impl Readable for IndirectObject {
    fn read(r: &mut Reader<'_>) -> Option<Self> {
        let id = r.read::<r#ref::ObjectHeader>()?.0;
        r.skip_white_spaces_and_comments();
        let object = r.read::<Object>()?;
        r.skip_white_spaces_and_comments();
        // We are lenient and don't require it.
        r.forward_tag(b"endobj");

        Some(Self { id, object })
    }
}
