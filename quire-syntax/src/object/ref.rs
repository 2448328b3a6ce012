use crate::reader::{Readable, Reader};
use std::fmt::{Debug, Display, Formatter};

/// The identity of an indirect object: its object number and generation.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub struct ObjRef {
    pub obj_number: u32,
    pub gen_number: u16,
}

impl ObjRef {
    pub const fn new(obj_number: u32, gen_number: u16) -> Self {
        Self {
            obj_number,
            gen_number,
        }
    }
}

impl Debug for ObjRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} R", self.obj_number, self.gen_number)
    }
}

impl Display for ObjRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.obj_number, self.gen_number)
    }
}

fn read_pair(r: &mut Reader<'_>) -> Option<ObjRef> {
    let obj_number = u32::try_from(r.read_unsigned()?).ok()?;
    r.skip_white_spaces_and_comments();
    let gen_number = u16::try_from(r.read_unsigned()?).ok()?;
    r.skip_white_spaces_and_comments();

    Some(ObjRef::new(obj_number, gen_number))
}

impl Readable for ObjRef {
    fn read(r: &mut Reader<'_>) -> Option<Self> {
        let id = read_pair(r)?;
        r.forward_tag(b"R")?;

        Some(id)
    }
}

/// The `N G obj` header that starts an indirect object.
pub(crate) struct ObjectHeader(pub(crate) ObjRef);

impl Readable for ObjectHeader {
    fn read(r: &mut Reader<'_>) -> Option<Self> {
        let id = read_pair(r)?;
        r.forward_tag(b"obj")?;

        Some(Self(id))
    }
}
