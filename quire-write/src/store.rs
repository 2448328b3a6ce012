//! The in-memory store of indirect objects.
//!
//! Objects of a document that was read from a file are loaded lazily, the
//! first time they are accessed. Everything that changes the state of an
//! object goes through [`transition`].

use crate::error::{Error, Result};
use crate::state::{Event, Lifecycle, Transition, transition};
use crate::xref::{DocumentId, IndirectReference, Location, XRefTable};
use log::{debug, trace, warn};
use quire_syntax::object::{IndirectObject, ObjRef, Object, ObjectFlags};
use quire_syntax::reader::Reader;
use quire_syntax::xref::{ObjectStream, XRefEntry, XRefSections};
use quire_syntax::{OptionLog, PdfData};
use rustc_hash::{FxHashMap, FxHashSet};

/// The maximum number of references followed when resolving a chain of
/// references to references.
pub(crate) const MAX_RESOLVE_HOPS: usize = 31;

/// The file a document was read from.
struct Source {
    data: PdfData,
    /// Decoded object streams, by object number.
    object_streams: FxHashMap<u32, ObjectStream>,
}

pub(crate) struct ObjectStore {
    xref: XRefTable,
    source: Option<Source>,
}

impl ObjectStore {
    /// An empty store for a new document.
    pub(crate) fn new(max_size: usize) -> Self {
        Self {
            xref: XRefTable::new(DocumentId::next(), max_size),
            source: None,
        }
    }

    /// A store whose objects are read from `data` on demand.
    pub(crate) fn with_source(
        data: PdfData,
        sections: &XRefSections,
        max_size: usize,
        append_mode: bool,
    ) -> Result<Self> {
        let mut xref = XRefTable::new(DocumentId::next(), max_size);
        let doc = xref.document();
        let mut containers = FxHashSet::default();

        for (&obj_number, entry) in &sections.entries {
            let reference = match *entry {
                XRefEntry::Free { next, gen_number } => IndirectReference::new(
                    doc,
                    ObjRef::new(obj_number, gen_number),
                    Lifecycle::Free,
                    Location::FreeNext(next),
                ),
                XRefEntry::Normal { offset, gen_number } => IndirectReference::new(
                    doc,
                    ObjRef::new(obj_number, gen_number),
                    Lifecycle::Unloaded,
                    Location::ByteOffset(offset),
                ),
                XRefEntry::Compressed { stream, index } => {
                    containers.insert(stream);

                    IndirectReference::new(
                        doc,
                        ObjRef::new(obj_number, 0),
                        Lifecycle::Unloaded,
                        Location::InObjectStream { stream, index },
                    )
                }
            };

            xref.add(reference)?;
        }

        for stream in containers {
            if let Some(entry) = xref.get_mut(stream) {
                entry.flags.insert(ObjectFlags::ORIGINAL_OBJECT_STREAM);
            }
        }

        xref.init_free_references_list(append_mode);

        Ok(Self {
            xref,
            source: Some(Source {
                data,
                object_streams: FxHashMap::default(),
            }),
        })
    }

    pub(crate) fn xref(&self) -> &XRefTable {
        &self.xref
    }

    pub(crate) fn xref_mut(&mut self) -> &mut XRefTable {
        &mut self.xref
    }

    pub(crate) fn document(&self) -> DocumentId {
        self.xref.document()
    }

    pub(crate) fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// Make sure the object is in memory.
    ///
    /// Returns `false` if there is no such object, either because the slot is
    /// free or because it doesn't exist.
    pub(crate) fn load(&mut self, id: ObjRef) -> Result<bool> {
        let Some(entry) = self.xref.lookup_mut(id) else {
            return Ok(false);
        };

        let lifecycle = match transition(entry.lifecycle, entry.flags, Event::Load) {
            Transition::Move(lifecycle) => lifecycle,
            Transition::Ignore(_) => return Ok(!entry.is_free()),
            Transition::Reject => return Err(Error::NotAvailable(id)),
        };

        if entry.flags.contains(ObjectFlags::READING) {
            warn!("object {id} is needed while it is being read");

            return Ok(false);
        }

        entry.flags.insert(ObjectFlags::READING);
        let location = entry.location;

        let object = self.read(id, location).unwrap_or_else(|| {
            warn!("failed to read object {id}, treating it as null");

            Object::NULL
        });

        if let Some(entry) = self.xref.lookup_mut(id) {
            entry.flags.remove(ObjectFlags::READING);
            entry.lifecycle = lifecycle;
            entry.payload = Some(object);
        }

        trace!("loaded object {id}");

        Ok(true)
    }

    fn read(&mut self, id: ObjRef, location: Location) -> Option<Object> {
        let Self { xref, source } = self;
        let source = source.as_mut()?;

        match location {
            Location::ByteOffset(offset) => read_at(source.data.as_ref(), offset, id),
            Location::InObjectStream { stream, index } => {
                if !source.object_streams.contains_key(&stream) {
                    let container = xref.get(stream).warn_none("object stream is missing")?;

                    let Location::ByteOffset(offset) = container.location else {
                        warn!("object stream {stream} is not stored at an offset");

                        return None;
                    };

                    let object = read_at(source.data.as_ref(), offset, container.id)?;
                    let decoded = object
                        .as_stream()
                        .and_then(ObjectStream::new)
                        .warn_none("failed to decode object stream")?;
                    source.object_streams.insert(stream, decoded);
                }

                let (obj_number, object) = source.object_streams.get(&stream)?.get(index)?;

                if obj_number != id.obj_number {
                    warn!("object stream {stream} holds object {obj_number} instead of {id}");

                    return None;
                }

                Some(object)
            }
            Location::Undefined | Location::FreeNext(_) => None,
        }
    }

    /// Return the content of an object, loading it if necessary.
    pub(crate) fn get(&mut self, id: ObjRef) -> Result<Option<&Object>> {
        if !self.load(id)? {
            return Ok(None);
        }

        Ok(self.xref.lookup(id).and_then(|e| e.payload.as_ref()))
    }

    /// Return the content of an object for modification, marking it as modified.
    pub(crate) fn get_mut(&mut self, id: ObjRef) -> Result<Option<&mut Object>> {
        if !self.load(id)? {
            return Ok(None);
        }

        let Some(entry) = self.xref.lookup_mut(id) else {
            return Ok(None);
        };

        match transition(entry.lifecycle, entry.flags, Event::Modify) {
            Transition::Move(lifecycle) => {
                entry.lifecycle = lifecycle;
                entry.flags.insert(ObjectFlags::MODIFIED);

                Ok(entry.payload.as_mut())
            }
            Transition::Ignore(_) | Transition::Reject => Err(Error::NotAvailable(id)),
        }
    }

    /// The content of an object, without loading it.
    pub(crate) fn payload(&self, id: ObjRef) -> Option<&Object> {
        self.xref.lookup(id)?.payload.as_ref()
    }

    /// Follow a chain of references to references.
    ///
    /// At most [`MAX_RESOLVE_HOPS`] objects are looked up. If the chain is
    /// longer, whatever was reached last is returned, which may itself be a
    /// reference.
    pub(crate) fn resolve(&mut self, id: ObjRef) -> Result<Option<&Object>> {
        let mut current = id;

        for _ in 1..MAX_RESOLVE_HOPS {
            match self.get(current)? {
                Some(Object::Reference(next)) => current = *next,
                _ => break,
            }
        }

        self.get(current)
    }

    /// Store `object` in a new slot.
    pub(crate) fn allocate(&mut self, object: Object) -> Result<ObjRef> {
        if object.flags().contains(ObjectFlags::READ_ONLY) {
            return Err(Error::ReadOnly);
        }

        let id = self.xref.create_reference()?;
        self.install(id, object)?;

        Ok(id)
    }

    /// Create a slot whose content is provided later with [`Self::install`].
    pub(crate) fn reserve(&mut self) -> Result<ObjRef> {
        let id = self.xref.create_reference()?;
        self.insert_flags(id, ObjectFlags::FORBID_RELEASE);

        Ok(id)
    }

    /// Put `object` into the slot `id`, replacing what was there.
    pub(crate) fn install(&mut self, id: ObjRef, mut object: Object) -> Result<()> {
        let entry = self.xref.lookup_mut(id).ok_or(Error::NotAvailable(id))?;

        if entry.is_flushed() || entry.is_free() {
            return Err(Error::NotAvailable(id));
        }

        if object.flags().contains(ObjectFlags::READ_ONLY) {
            return Err(Error::ReadOnly);
        }

        if let Some(flags) = object.flags_mut() {
            flags.remove(ObjectFlags::MUST_BE_INDIRECT);
        }

        entry.payload = Some(object);
        entry.lifecycle = Lifecycle::Loaded;
        entry.flags
            .insert(ObjectFlags::MODIFIED | ObjectFlags::FORBID_RELEASE);

        Ok(())
    }

    pub(crate) fn take_payload(&mut self, id: ObjRef) -> Option<Object> {
        self.xref.lookup_mut(id)?.payload.take()
    }

    /// Record that the object was written to `location`.
    pub(crate) fn mark_flushed(&mut self, id: ObjRef, location: Location) {
        let Some(entry) = self.xref.lookup_mut(id) else {
            return;
        };

        match transition(entry.lifecycle, entry.flags, Event::Flush) {
            Transition::Move(lifecycle) => {
                entry.lifecycle = lifecycle;
                entry.location = location;
                entry.payload = None;
                entry.flags.remove(ObjectFlags::MUST_BE_FLUSHED);
            }
            Transition::Ignore(reason) => debug!("object {id} not marked as flushed: {reason}"),
            Transition::Reject => warn!("object {id} was written without being loaded"),
        }
    }

    pub(crate) fn flags(&self, id: ObjRef) -> Option<ObjectFlags> {
        self.xref.lookup(id).map(|e| e.flags)
    }

    pub(crate) fn insert_flags(&mut self, id: ObjRef, flags: ObjectFlags) {
        if let Some(entry) = self.xref.lookup_mut(id) {
            entry.flags.insert(flags);
        }
    }

    pub(crate) fn remove_flags(&mut self, id: ObjRef, flags: ObjectFlags) {
        if let Some(entry) = self.xref.lookup_mut(id) {
            entry.flags.remove(flags);
        }
    }

    pub(crate) fn lifecycle(&self, id: ObjRef) -> Option<Lifecycle> {
        self.xref.lookup(id).map(|e| e.lifecycle)
    }

    /// Put the slot on the free list.
    pub(crate) fn free(&mut self, id: ObjRef) -> bool {
        if self.xref.lookup(id).is_none() {
            return false;
        }

        self.xref.free_reference(id.obj_number)
    }

    /// Drop the content of an unmodified object from memory.
    ///
    /// The detached content is returned as a read-only snapshot, and the object
    /// is read again from the source file on the next access.
    pub(crate) fn release(&mut self, id: ObjRef) -> Option<Object> {
        let has_source = self.source.is_some();
        let entry = self.xref.lookup_mut(id)?;

        match transition(entry.lifecycle, entry.flags, Event::Release) {
            Transition::Move(lifecycle) => {
                let rereadable = matches!(
                    entry.location,
                    Location::ByteOffset(_) | Location::InObjectStream { .. }
                );

                if !(has_source && rereadable) {
                    warn!("object {id} can't be read again, not releasing it");

                    return None;
                }

                entry.lifecycle = lifecycle;
                let mut snapshot = entry.payload.take()?;

                if let Some(flags) = snapshot.flags_mut() {
                    flags.insert(ObjectFlags::READ_ONLY);
                }

                trace!("released object {id}");

                Some(snapshot)
            }
            Transition::Ignore(reason) => {
                if entry
                    .flags
                    .intersects(ObjectFlags::FORBID_RELEASE | ObjectFlags::MODIFIED)
                {
                    warn!("object {id} was not released: {reason}");
                } else {
                    debug!("object {id} was not released: {reason}");
                }

                None
            }
            Transition::Reject => None,
        }
    }
}

fn read_at(data: &[u8], offset: u64, id: ObjRef) -> Option<Object> {
    let offset = usize::try_from(offset).ok().filter(|o| *o < data.len())?;
    let mut r = Reader::new_at(data, offset);
    let object = r.read::<IndirectObject>()?;

    if object.id != id {
        warn!("expected object {id} at offset {offset}, found {}", object.id);

        return None;
    }

    Some(object.object)
}
