//! Serializing objects back into PDF syntax.
//!
//! Names, literal strings and reals are encoded through `pdf-writer`, which
//! takes care of escaping. Containers and references are written here, since
//! indirect objects with a generation other than zero need to be expressible.

use crate::object::dict::keys::LENGTH;
use crate::object::number::InternalNumber;
use crate::object::{Array, Dict, Name, Number, ObjRef, Object, Stream, string};
use pdf_writer::{Content, Primitive};
use std::fmt::{Display, Formatter};

/// Return the PDF syntax of an object as a string.
pub fn display<T>(item: &T) -> String
where
    T: WriteDirect + ?Sized,
{
    let mut out = vec![];
    item.write_direct(&mut out);

    std::string::String::from_utf8_lossy(&out).into_owned()
}

/// Write `object` as the indirect object `id`, including its header and `endobj`.
pub fn write_indirect(id: ObjRef, object: &Object, out: &mut Vec<u8>) {
    out.extend_from_slice(format!("{} {} obj\n", id.obj_number, id.gen_number).as_bytes());
    object.write_direct(out);
    out.extend_from_slice(b"\nendobj\n");
}

/// A value that can be written as direct PDF syntax.
pub trait WriteDirect {
    fn write_direct(&self, out: &mut Vec<u8>);
}

/// Encode a leaf value with `pdf-writer`.
fn encode_primitive<T: Primitive>(value: T, out: &mut Vec<u8>) {
    // An empty content stream is the only public way to get a fresh buffer.
    let mut buf = Content::new().finish();
    value.write(&mut buf);

    out.extend_from_slice(buf.as_slice());
}

impl WriteDirect for Object {
    fn write_direct(&self, out: &mut Vec<u8>) {
        match self {
            Object::Null(_) => out.extend_from_slice(b"null"),
            Object::Boolean(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
            Object::Number(n) => n.write_direct(out),
            Object::String(s) => s.write_direct(out),
            Object::Name(n) => n.write_direct(out),
            Object::Array(a) => a.write_direct(out),
            Object::Dict(d) => d.write_direct(out),
            Object::Stream(s) => s.write_direct(out),
            Object::Literal(l) => out.extend_from_slice(l),
            Object::Reference(r) => r.write_direct(out),
        }
    }
}

impl WriteDirect for Number {
    fn write_direct(&self, out: &mut Vec<u8>) {
        match self.0 {
            InternalNumber::Integer(i) => out.extend_from_slice(i.to_string().as_bytes()),
            InternalNumber::Real(r) => {
                let single = r as f32;

                if f64::from(single) == r {
                    encode_primitive(single, out);
                } else {
                    out.extend_from_slice(format!("{r}").as_bytes());
                }
            }
        }
    }
}

impl WriteDirect for string::String {
    fn write_direct(&self, out: &mut Vec<u8>) {
        if self.is_hex() {
            out.push(b'<');

            for b in self.get() {
                out.extend_from_slice(format!("{b:02X}").as_bytes());
            }

            out.push(b'>');
        } else {
            encode_primitive(pdf_writer::Str(self.get()), out);
        }
    }
}

impl WriteDirect for Name {
    fn write_direct(&self, out: &mut Vec<u8>) {
        encode_primitive(pdf_writer::Name(&**self), out);
    }
}

impl WriteDirect for ObjRef {
    fn write_direct(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(format!("{} {} R", self.obj_number, self.gen_number).as_bytes());
    }
}

impl WriteDirect for Array {
    fn write_direct(&self, out: &mut Vec<u8>) {
        out.push(b'[');

        for (i, item) in self.iter().enumerate() {
            if i > 0 {
                out.push(b' ');
            }

            item.write_direct(out);
        }

        out.push(b']');
    }
}

fn write_entries<'a>(
    entries: impl Iterator<Item = (&'a Name, &'a Object)>,
    out: &mut Vec<u8>,
) -> usize {
    let mut count = 0;

    for (key, value) in entries {
        if count > 0 {
            out.push(b' ');
        }

        key.write_direct(out);
        out.push(b' ');
        value.write_direct(out);
        count += 1;
    }

    count
}

impl WriteDirect for Dict {
    fn write_direct(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(b"<<");
        write_entries(self.iter(), out);
        out.extend_from_slice(b">>");
    }
}

impl WriteDirect for Stream {
    /// Writes the dictionary with a `/Length` matching the data, followed by the data.
    fn write_direct(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(b"<<");
        if write_entries(self.dict().iter().filter(|(k, _)| ***k != *LENGTH), out) > 0 {
            out.push(b' ');
        }

        out.extend_from_slice(format!("/Length {}>>\nstream\n", self.raw_data().len()).as_bytes());
        out.extend_from_slice(self.raw_data());
        out.extend_from_slice(b"\nendstream");
    }
}

impl Display for Object {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&display(self))
    }
}
