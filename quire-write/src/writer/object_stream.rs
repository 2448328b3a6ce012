use quire_syntax::filter::deflate_encode;
use quire_syntax::object::keys::{FILTER, FIRST, FLATE_DECODE, N, OBJ_STM};
use quire_syntax::object::{Dict, Name, ObjRef, Object, Stream};
use quire_syntax::write::WriteDirect;

/// Collects objects into an object stream.
#[derive(Debug)]
pub(crate) struct ObjectStreamBuilder {
    id: ObjRef,
    /// Pairs of object number and offset, as text.
    index: Vec<u8>,
    content: Vec<u8>,
    len: u32,
}

impl ObjectStreamBuilder {
    pub(crate) fn new(id: ObjRef) -> Self {
        Self {
            id,
            index: vec![],
            content: vec![],
            len: 0,
        }
    }

    pub(crate) fn id(&self) -> ObjRef {
        self.id
    }

    pub(crate) fn len(&self) -> u32 {
        self.len
    }

    /// Add an object and return its index within the stream.
    pub(crate) fn add(&mut self, obj_number: u32, object: &Object) -> u32 {
        if !self.index.is_empty() {
            self.index.push(b' ');
        }

        self.index
            .extend_from_slice(format!("{obj_number} {}", self.content.len()).as_bytes());
        object.write_direct(&mut self.content);
        self.content.push(b'\n');

        self.len += 1;

        self.len - 1
    }

    pub(crate) fn into_stream(self, compress: bool) -> std::io::Result<Stream> {
        let mut index = self.index;
        index.push(b'\n');
        let first = index.len();

        let mut data = index;
        data.extend_from_slice(&self.content);

        let mut dict = Dict::with_type(OBJ_STM);
        dict.insert(N, self.len);
        dict.insert(FIRST, first);

        if compress {
            data = deflate_encode(&data)?;
            dict.insert(FILTER, Name::new(FLATE_DECODE));
        }

        Ok(Stream::new(dict, data))
    }
}
