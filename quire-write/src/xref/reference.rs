use crate::state::Lifecycle;
use quire_syntax::object::{ObjRef, Object, ObjectFlags};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

/// The identity of a document.
///
/// Object numbers are only meaningful within one document, so references
/// compare equal only if they belong to the same one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentId(u32);

impl DocumentId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU32 = AtomicU32::new(1);

        Self(COUNTER.fetch_add(1, AtomicOrdering::Relaxed))
    }
}

/// Where the content of an indirect object can be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// Not known yet: the object was created in memory and hasn't been written.
    Undefined,
    /// At a byte offset in the file.
    ByteOffset(u64),
    /// At an index inside of an object stream.
    InObjectStream {
        /// The object number of the object stream.
        stream: u32,
        /// The index of the object within the stream.
        index: u32,
    },
    /// The slot is free. The value is the next free object number, `0` ending
    /// the list.
    FreeNext(u32),
}

impl Location {
    /// The value of the second field of a cross-reference entry.
    pub(crate) fn offset_field(&self) -> u64 {
        match self {
            Self::Undefined => 0,
            Self::ByteOffset(offset) => *offset,
            Self::InObjectStream { stream, .. } => u64::from(*stream),
            Self::FreeNext(next) => u64::from(*next),
        }
    }
}

/// A slot of the cross-reference table.
#[derive(Debug, Clone)]
pub struct IndirectReference {
    pub(crate) id: ObjRef,
    pub(crate) doc: DocumentId,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) flags: ObjectFlags,
    pub(crate) location: Location,
    pub(crate) payload: Option<Object>,
}

impl IndirectReference {
    pub(crate) fn new(doc: DocumentId, id: ObjRef, lifecycle: Lifecycle, location: Location) -> Self {
        Self {
            id,
            doc,
            lifecycle,
            flags: ObjectFlags::empty(),
            location,
            payload: None,
        }
    }

    /// A new free slot that ends the free list.
    pub(crate) fn free(doc: DocumentId, id: ObjRef) -> Self {
        Self::new(doc, id, Lifecycle::Free, Location::FreeNext(0))
    }

    pub fn id(&self) -> ObjRef {
        self.id
    }

    pub fn obj_number(&self) -> u32 {
        self.id.obj_number
    }

    pub fn gen_number(&self) -> u16 {
        self.id.gen_number
    }

    /// The document the reference belongs to.
    pub fn document(&self) -> DocumentId {
        self.doc
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn flags(&self) -> ObjectFlags {
        self.flags
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn is_free(&self) -> bool {
        self.lifecycle == Lifecycle::Free
    }

    pub fn is_flushed(&self) -> bool {
        self.lifecycle == Lifecycle::Flushed
    }

    pub fn is_modified(&self) -> bool {
        self.flags.contains(ObjectFlags::MODIFIED)
    }

    /// The in-memory content, if the object is loaded.
    pub fn payload(&self) -> Option<&Object> {
        self.payload.as_ref()
    }

    /// The next free object number, for free slots.
    pub(crate) fn free_next(&self) -> Option<u32> {
        match self.location {
            Location::FreeNext(next) => Some(next),
            _ => None,
        }
    }

    pub(crate) fn set_free_next(&mut self, next: u32) {
        self.location = Location::FreeNext(next);
        self.flags.insert(ObjectFlags::MODIFIED);
    }
}

impl PartialEq for IndirectReference {
    fn eq(&self, other: &Self) -> bool {
        self.doc == other.doc && self.id == other.id
    }
}

impl Eq for IndirectReference {}

impl Hash for IndirectReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.doc.hash(state);
        self.id.hash(state);
    }
}

impl PartialOrd for IndirectReference {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndirectReference {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.doc, self.id).cmp(&(other.doc, other.id))
    }
}

#[cfg(test)]
mod tests {
    use super::{DocumentId, IndirectReference, Location};
    use crate::state::Lifecycle;
    use quire_syntax::object::ObjRef;

    #[test]
    fn identity_includes_document() {
        let (a, b) = (DocumentId::next(), DocumentId::next());
        let id = ObjRef::new(4, 0);

        let first = IndirectReference::new(a, id, Lifecycle::Loaded, Location::Undefined);
        let mut same = IndirectReference::new(a, id, Lifecycle::Flushed, Location::ByteOffset(9));
        same.flags.insert(quire_syntax::object::ObjectFlags::MODIFIED);
        let other = IndirectReference::new(b, id, Lifecycle::Loaded, Location::Undefined);

        assert_eq!(first, same);
        assert_ne!(first, other);
    }

    #[test]
    fn offset_field() {
        assert_eq!(Location::ByteOffset(1234).offset_field(), 1234);
        assert_eq!(
            Location::InObjectStream {
                stream: 7,
                index: 2
            }
            .offset_field(),
            7
        );
        assert_eq!(Location::FreeNext(3).offset_field(), 3);
        assert_eq!(Location::Undefined.offset_field(), 0);
    }
}
