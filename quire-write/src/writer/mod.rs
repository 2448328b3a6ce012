//! Writing objects to the output.

mod object_stream;

use crate::copy::CopySession;
use crate::crypto::{EncryptionTarget, encrypt_strings};
use crate::error::Result;
use crate::settings::WriterProperties;
use crate::store::ObjectStore;
use crate::xref::Location;
use crate::xref::write::{TrailerInfo, XRefOptions, write_xref_and_trailer};
use log::{debug, info, warn};
use object_stream::ObjectStreamBuilder;
use quire_syntax::filter::deflate_encode;
use quire_syntax::object::keys::{FILTER, FLATE_DECODE};
use quire_syntax::object::{Name, ObjRef, Object, ObjectFlags};
use quire_syntax::write::write_indirect;
use quire_syntax::xref::XRefKind;
use std::io::{self, Write};

/// A writer that keeps track of the number of bytes written so far.
#[derive(Debug)]
pub(crate) struct CountingWriter<W> {
    inner: W,
    position: u64,
}

impl<W: Write> CountingWriter<W> {
    pub(crate) fn new(inner: W) -> Self {
        Self { inner, position: 0 }
    }

    /// The offset at which the next byte will be written.
    pub(crate) fn position(&self) -> u64 {
        self.position
    }

    pub(crate) fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.position += written as u64;

        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Serializes the indirect objects of a document.
pub(crate) struct Writer<W: Write> {
    output: CountingWriter<W>,
    properties: WriterProperties,
    object_stream: Option<ObjectStreamBuilder>,
    pub(crate) copied: CopySession,
}

impl<W: Write> Writer<W> {
    pub(crate) fn new(output: W, properties: WriterProperties) -> Self {
        Self {
            output: CountingWriter::new(output),
            properties,
            object_stream: None,
            copied: CopySession::default(),
        }
    }

    pub(crate) fn properties(&self) -> &WriterProperties {
        &self.properties
    }

    pub(crate) fn position(&self) -> u64 {
        self.output.position()
    }

    /// Write bytes that are not part of any object, like the file header.
    pub(crate) fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        self.output.write_all(data)?;

        Ok(())
    }

    /// The object stream that is currently being filled.
    pub(crate) fn pending_object_stream(&self) -> Option<ObjRef> {
        self.object_stream.as_ref().map(|s| s.id())
    }

    /// Write the object `id` and drop its content from memory.
    ///
    /// Direct streams and containers marked as indirect are moved into
    /// objects of their own first, and every object referenced by `id` is
    /// marked as one that must be written eventually. Flushing an object
    /// that was already written, or a free one, does nothing.
    pub(crate) fn flush_object(
        &mut self,
        store: &mut ObjectStore,
        id: ObjRef,
        allow_object_stream: bool,
    ) -> Result<()> {
        let Some(entry) = store.xref().lookup(id) else {
            warn!("can't flush object {id}, it doesn't exist");

            return Ok(());
        };

        if entry.is_free() || entry.is_flushed() || self.pending_object_stream() == Some(id) {
            return Ok(());
        }

        if self.properties.append_mode && !entry.is_modified() {
            info!("object {id} is unchanged, skipping it in the incremental update");

            return Ok(());
        }

        store.load(id)?;
        let mut object = store.take_payload(id).unwrap_or(Object::NULL);
        let flags = store.flags(id).unwrap_or_default();

        prepare(store, &mut object)?;

        if self.properties.compress_streams
            && let Object::Stream(stream) = &mut object
            && stream.dict().get(FILTER).is_none()
        {
            let compressed = deflate_encode(stream.raw_data())?;
            stream.set_raw_data(compressed);
            stream.dict_mut().insert(FILTER, Name::new(FLATE_DECODE));
        }

        let into_object_stream = self.properties.full_compression
            && allow_object_stream
            && id.gen_number == 0
            && !flags.contains(ObjectFlags::UNENCRYPTED)
            && !matches!(object, Object::Stream(_) | Object::Reference(_));

        if let Some(encryptor) = &self.properties.encryption
            && !flags.contains(ObjectFlags::UNENCRYPTED)
        {
            // Strings inside of object streams are covered by the stream itself.
            if !into_object_stream {
                encrypt_strings(&mut object, id, encryptor.as_ref());
            }

            if let Object::Stream(stream) = &mut object {
                let encrypted = encryptor.encrypt(id, EncryptionTarget::Stream, stream.raw_data());
                stream.set_raw_data(encrypted);
            }
        }

        if into_object_stream {
            self.add_to_object_stream(store, id, &object)
        } else {
            self.write_inline(store, id, &object)
        }
    }

    fn write_inline(&mut self, store: &mut ObjectStore, id: ObjRef, object: &Object) -> Result<()> {
        let offset = self.output.position();
        let mut buf = vec![];
        write_indirect(id, object, &mut buf);
        self.output.write_all(&buf)?;

        debug!("wrote object {id} at offset {offset}");
        store.mark_flushed(id, Location::ByteOffset(offset));

        Ok(())
    }

    fn add_to_object_stream(
        &mut self,
        store: &mut ObjectStore,
        id: ObjRef,
        object: &Object,
    ) -> Result<()> {
        let capacity = self.properties.object_stream_capacity.max(1);

        if self
            .object_stream
            .as_ref()
            .is_some_and(|s| s.len() as usize >= capacity)
        {
            self.finish_object_stream(store)?;
        }

        let builder = match self.object_stream.take() {
            Some(builder) => builder,
            None => ObjectStreamBuilder::new(store.xref_mut().create_next_reference()?),
        };
        let builder = self.object_stream.insert(builder);

        let index = builder.add(id.obj_number, object);
        let stream = builder.id().obj_number;
        store.mark_flushed(id, Location::InObjectStream { stream, index });

        Ok(())
    }

    /// Write the object stream that is currently being filled, if any.
    pub(crate) fn finish_object_stream(&mut self, store: &mut ObjectStore) -> Result<()> {
        let Some(builder) = self.object_stream.take() else {
            return Ok(());
        };

        let id = builder.id();
        let mut stream = builder.into_stream(self.properties.compress_streams)?;

        if let Some(encryptor) = &self.properties.encryption {
            let encrypted = encryptor.encrypt(id, EncryptionTarget::Stream, stream.raw_data());
            stream.set_raw_data(encrypted);
        }

        self.write_inline(store, id, &Object::Stream(stream))
    }

    /// Write the cross-reference information and the trailer, and return the
    /// underlying output.
    pub(crate) fn finish(
        mut self,
        store: &mut ObjectStore,
        trailer: &TrailerInfo,
        previous: Option<(u64, XRefKind)>,
    ) -> Result<W> {
        self.finish_object_stream(store)?;

        let options = XRefOptions {
            full_compression: self.properties.full_compression,
            compress: self.properties.compress_streams,
            append_mode: self.properties.append_mode,
            previous,
        };

        write_xref_and_trailer(store.xref_mut(), &mut self.output, &options, trailer)?;
        self.output.flush()?;

        Ok(self.output.into_inner())
    }
}

/// Move nested objects that must be indirect into objects of their own, and
/// mark everything `object` references as needing to be written.
fn prepare(store: &mut ObjectStore, object: &mut Object) -> Result<()> {
    match object {
        Object::Reference(r) => {
            let r = *r;

            match store.xref().lookup(r) {
                None => {
                    warn!("reference to missing object {r}, writing null");
                    *object = Object::NULL;
                }
                Some(entry) if entry.is_free() => {
                    warn!("reference to free object {r}, writing null");
                    *object = Object::NULL;
                }
                Some(entry) if !entry.is_flushed() => {
                    store.insert_flags(r, ObjectFlags::MUST_BE_FLUSHED);
                }
                Some(_) => {}
            }
        }
        Object::Array(array) => {
            for item in array.iter_mut() {
                promote(store, item)?;
            }
        }
        Object::Dict(dict) => {
            for (_, value) in dict.iter_mut() {
                promote(store, value)?;
            }
        }
        Object::Stream(stream) => {
            for (_, value) in stream.dict_mut().iter_mut() {
                promote(store, value)?;
            }
        }
        _ => {}
    }

    Ok(())
}

fn promote(store: &mut ObjectStore, child: &mut Object) -> Result<()> {
    if matches!(child, Object::Stream(_)) || child.flags().contains(ObjectFlags::MUST_BE_INDIRECT) {
        let id = store.allocate(std::mem::take(child))?;
        *child = Object::Reference(id);
    }

    prepare(store, child)
}

#[cfg(test)]
mod tests {
    use super::Writer;
    use crate::crypto::tests::XorEncryptor;
    use crate::settings::WriterProperties;
    use crate::state::Lifecycle;
    use crate::store::ObjectStore;
    use crate::xref::Location;
    use quire_syntax::object::{Array, Dict, ObjRef, Object, ObjectFlags, Stream, string};
    use std::sync::Arc;

    fn setup(properties: WriterProperties) -> (ObjectStore, Writer<Vec<u8>>) {
        (ObjectStore::new(1000), Writer::new(vec![], properties))
    }

    #[test]
    fn children_must_be_flushed() {
        let (mut store, mut writer) = setup(WriterProperties::default());
        let ids: Vec<_> = (0..6)
            .map(|i| store.allocate(Object::from(i as i64)).unwrap())
            .collect();
        let child = ids[5];
        assert_eq!(child, ObjRef::new(6, 0));

        let mut dict = Dict::new();
        dict.insert(b"Child", child);
        let parent = store.allocate(Object::Dict(dict)).unwrap();

        writer.flush_object(&mut store, parent, true).unwrap();

        assert_eq!(store.lifecycle(parent), Some(Lifecycle::Flushed));
        assert!(store.payload(parent).is_none());
        assert!(
            store
                .flags(child)
                .unwrap()
                .contains(ObjectFlags::MUST_BE_FLUSHED)
        );
        // Objects that must be written can't be freed anymore.
        assert!(!store.free(child));
    }

    #[test]
    fn flushing_twice_is_a_no_op() {
        let (mut store, mut writer) = setup(WriterProperties::default());
        let id = store.allocate(Object::from(1i64)).unwrap();

        writer.flush_object(&mut store, id, true).unwrap();
        let position = writer.position();
        writer.flush_object(&mut store, id, true).unwrap();

        assert_eq!(writer.position(), position);
        assert_eq!(store.xref().lookup(id).unwrap().location(), Location::ByteOffset(0));
    }

    #[test]
    fn nested_streams_are_promoted() {
        let (mut store, mut writer) = setup(WriterProperties::default());

        let mut indirect = Array::new();
        indirect.push(1);
        indirect.make_indirect_pending();

        let mut dict = Dict::new();
        dict.insert(b"S", Stream::new(Dict::new(), b"data".to_vec()));
        dict.insert(b"A", indirect);
        let id = store.allocate(Object::Dict(dict)).unwrap();

        writer.flush_object(&mut store, id, true).unwrap();

        let pending = store.xref().collect(|e| e.flags().contains(ObjectFlags::MUST_BE_FLUSHED));
        assert_eq!(pending.len(), 2);

        for id in pending {
            let object = store.payload(id).unwrap();
            assert!(!object.flags().contains(ObjectFlags::MUST_BE_INDIRECT));
        }
    }

    #[test]
    fn references_to_free_objects_become_null() {
        let (mut store, mut writer) = setup(WriterProperties::default());
        let freed = store.allocate(Object::from(1i64)).unwrap();
        store.free(freed);

        let mut array = Array::new();
        array.push(freed);
        let id = store.allocate(Object::Array(array)).unwrap();

        writer.flush_object(&mut store, id, true).unwrap();
        let out = writer.output.into_inner();

        assert!(String::from_utf8_lossy(&out).contains("[null]"));
    }

    #[test]
    fn streams_are_compressed() {
        let (mut store, mut writer) = setup(WriterProperties::default());
        let id = store
            .allocate(Object::Stream(Stream::new(Dict::new(), vec![b'a'; 100])))
            .unwrap();

        writer.flush_object(&mut store, id, true).unwrap();
        let out = writer.output.into_inner();

        assert!(String::from_utf8_lossy(&out).contains("/Filter /FlateDecode"));
    }

    #[test]
    fn object_streams_roll_over() {
        let (mut store, mut writer) = setup(WriterProperties {
            full_compression: true,
            object_stream_capacity: 2,
            ..WriterProperties::default()
        });

        let ids: Vec<_> = (0..5)
            .map(|i| store.allocate(Object::from(i as i64)).unwrap())
            .collect();

        for id in &ids {
            writer.flush_object(&mut store, *id, true).unwrap();
        }

        writer.finish_object_stream(&mut store).unwrap();

        let containers: Vec<_> = ids
            .iter()
            .map(|id| match store.xref().lookup(*id).unwrap().location() {
                Location::InObjectStream { stream, index } => (stream, index),
                other => panic!("unexpected location {other:?}"),
            })
            .collect();

        assert_eq!(containers[0].1, 0);
        assert_eq!(containers[1].1, 1);
        assert_eq!(containers[2].1, 0);
        assert_ne!(containers[0].0, containers[2].0);
        assert_eq!(containers[2].0, containers[3].0);
        assert_ne!(containers[3].0, containers[4].0);

        for (stream, _) in containers {
            assert!(store.xref().get(stream).unwrap().is_flushed());
        }
    }

    #[test]
    fn append_mode_skips_unmodified() {
        let (mut store, mut writer) = setup(WriterProperties::append());
        let id = store.allocate(Object::from(1i64)).unwrap();
        store.remove_flags(id, ObjectFlags::MODIFIED);

        writer.flush_object(&mut store, id, true).unwrap();

        assert_eq!(store.lifecycle(id), Some(Lifecycle::Loaded));
        assert_eq!(writer.position(), 0);
    }

    #[test]
    fn strings_are_encrypted() {
        let (mut store, mut writer) = setup(WriterProperties {
            encryption: Some(Arc::new(XorEncryptor)),
            ..WriterProperties::default()
        });

        let mut array = Array::new();
        array.push(string::String::new(b"abc".to_vec()));
        let id = store.allocate(Object::Array(array)).unwrap();
        let plain = store.allocate(Object::String(string::String::new(b"abc".to_vec()))).unwrap();
        store.insert_flags(plain, ObjectFlags::UNENCRYPTED);

        writer.flush_object(&mut store, id, true).unwrap();
        writer.flush_object(&mut store, plain, true).unwrap();
        let out = String::from_utf8_lossy(&writer.output.into_inner()).into_owned();

        // Object 1 xors with 1.
        assert!(out.contains("1 0 obj\n[(`cb)]"));
        assert!(out.contains("2 0 obj\n(abc)"));
    }
}
