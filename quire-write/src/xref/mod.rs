//! The cross-reference table of a document.
//!
//! The table maps object numbers to [`IndirectReference`]s. Slot 0 is always
//! free and heads the free list, which is threaded through the free slots
//! themselves: every free slot stores the number of the next free one, and
//! the last one points back to 0. This is exactly how free entries are
//! encoded on disk.
//!
//! Next to the links stored in the slots, the table keeps a map from every
//! free object number to its predecessor in the list, so that a slot can be
//! unlinked without walking the list.

mod reference;
pub(crate) mod write;

pub use reference::{DocumentId, IndirectReference, Location};

use crate::error::{Error, Result};
use crate::state::{Event, Lifecycle, Transition, transition};
use log::{error, warn};
use quire_syntax::object::{ObjRef, ObjectFlags};
use std::collections::{BTreeMap, BTreeSet};

/// The highest generation number. Free slots that reached it are never reused.
pub const MAX_GENERATION: u16 = 65535;

/// The cross-reference table of a document.
#[derive(Debug)]
pub struct XRefTable {
    entries: Vec<Option<IndirectReference>>,
    /// The highest object number in use.
    count: u32,
    /// Free object number -> its predecessor in the free list. The entry for
    /// 0 holds the tail of the list.
    free_list: BTreeMap<u32, u32>,
    max_size: usize,
    doc: DocumentId,
}

impl XRefTable {
    pub(crate) fn new(doc: DocumentId, max_size: usize) -> Self {
        let zero = IndirectReference::free(doc, ObjRef::new(0, MAX_GENERATION));

        let mut free_list = BTreeMap::new();
        free_list.insert(0, 0);

        Self {
            entries: vec![Some(zero)],
            count: 0,
            free_list,
            max_size,
            doc,
        }
    }

    /// The document this table belongs to.
    pub fn document(&self) -> DocumentId {
        self.doc
    }

    /// The number of slots, which is one more than the highest object number.
    pub fn size(&self) -> u32 {
        self.count + 1
    }

    pub fn get(&self, obj_number: u32) -> Option<&IndirectReference> {
        self.entries.get(obj_number as usize)?.as_ref()
    }

    pub(crate) fn get_mut(&mut self, obj_number: u32) -> Option<&mut IndirectReference> {
        self.entries.get_mut(obj_number as usize)?.as_mut()
    }

    /// The slot with the given id, if its generation matches.
    pub fn lookup(&self, id: ObjRef) -> Option<&IndirectReference> {
        self.get(id.obj_number).filter(|e| e.id == id)
    }

    pub(crate) fn lookup_mut(&mut self, id: ObjRef) -> Option<&mut IndirectReference> {
        self.get_mut(id.obj_number).filter(|e| e.id == id)
    }

    /// Iterate over all existing slots.
    pub fn iter(&self) -> impl Iterator<Item = &IndirectReference> {
        self.entries
            .iter()
            .take(self.size() as usize)
            .filter_map(|e| e.as_ref())
    }

    /// The ids of all slots matching `f`.
    pub(crate) fn collect(&self, f: impl Fn(&IndirectReference) -> bool) -> Vec<ObjRef> {
        self.iter().filter(|e| f(e)).map(|e| e.id).collect()
    }

    /// Put `reference` into the slot of its object number.
    pub(crate) fn add(&mut self, reference: IndirectReference) -> Result<()> {
        let obj_number = reference.obj_number();
        self.ensure_capacity(obj_number as usize)?;

        self.entries[obj_number as usize] = Some(reference);
        self.count = self.count.max(obj_number);

        Ok(())
    }

    fn ensure_capacity(&mut self, index: usize) -> Result<()> {
        if index < self.entries.len() {
            return Ok(());
        }

        let requested = index + 1;

        if requested > self.max_size {
            error!("cross-reference table exceeds the limit of {}", self.max_size);

            return Err(Error::ResourceLimit {
                requested,
                limit: self.max_size,
            });
        }

        let new_len = requested.max(self.entries.len() * 2).min(self.max_size);
        self.entries.resize_with(new_len, || None);

        Ok(())
    }

    /// Create a reference for a new object, reusing the lowest free slot if
    /// one is available.
    ///
    /// A reused slot gets its generation number bumped by one.
    pub(crate) fn create_reference(&mut self) -> Result<ObjRef> {
        if let Some(obj_number) = self.remove_from_free_list(None)
            && let Some(entry) = self.get_mut(obj_number)
        {
            if let Transition::Move(lifecycle) =
                transition(entry.lifecycle, entry.flags, Event::Reuse)
            {
                entry.id.gen_number += 1;
                entry.lifecycle = lifecycle;
                entry.location = Location::Undefined;
                entry.flags = ObjectFlags::MODIFIED;
                entry.payload = None;

                return Ok(entry.id);
            }
        }

        self.create_next_reference()
    }

    /// Create a reference with an object number above all existing ones.
    pub(crate) fn create_next_reference(&mut self) -> Result<ObjRef> {
        let obj_number = self.count.checked_add(1).ok_or(Error::ResourceLimit {
            requested: usize::MAX,
            limit: self.max_size,
        })?;

        let id = ObjRef::new(obj_number, 0);
        let mut reference =
            IndirectReference::new(self.doc, id, Lifecycle::Loaded, Location::Undefined);
        reference.flags.insert(ObjectFlags::MODIFIED);
        self.add(reference)?;

        Ok(id)
    }

    /// Put the slot on the free list. Returns whether the slot was freed.
    ///
    /// Slots that were already written, or that are referenced by an object
    /// that was written, can't be freed.
    pub(crate) fn free_reference(&mut self, obj_number: u32) -> bool {
        if obj_number == 0 {
            return false;
        }

        let Some(entry) = self.get_mut(obj_number) else {
            return false;
        };

        match transition(entry.lifecycle, entry.flags, Event::Free) {
            Transition::Move(lifecycle) => {
                entry.lifecycle = lifecycle;
                entry.flags.insert(ObjectFlags::MODIFIED);
                entry.flags.remove(ObjectFlags::FORBID_RELEASE);
                entry.payload = None;
                self.append_to_free_list(obj_number);

                true
            }
            Transition::Ignore(reason) => {
                if !entry.is_free() {
                    warn!("object {} was not freed: {reason}", entry.id);
                }

                false
            }
            Transition::Reject => false,
        }
    }

    /// Make `obj_number` the new tail of the free list.
    pub(crate) fn append_to_free_list(&mut self, obj_number: u32) {
        let Some(&tail) = self.free_list.get(&0) else {
            return;
        };

        if let Some(entry) = self.get_mut(obj_number) {
            entry.location = Location::FreeNext(0);
        }

        if let Some(tail) = self.get_mut(tail) {
            tail.set_free_next(obj_number);
        }

        self.free_list.insert(obj_number, tail);
        self.free_list.insert(0, obj_number);
    }

    /// Unlink a slot from the free list.
    ///
    /// With `None`, the lowest free slot whose generation can still be bumped
    /// is unlinked. Returns the object number of the unlinked slot.
    pub(crate) fn remove_from_free_list(&mut self, target: Option<u32>) -> Option<u32> {
        let obj_number = match target {
            Some(n) => n,
            None => *self.free_list.keys().find(|n| {
                **n > 0
                    && self
                        .get(**n)
                        .is_some_and(|e| e.gen_number() < MAX_GENERATION)
            })?,
        };

        let next = self.get(obj_number).filter(|e| e.is_free())?.free_next()?;
        let prev = self.free_list.remove(&obj_number)?;

        self.free_list.insert(next, prev);

        if let Some(prev) = self.get_mut(prev) {
            prev.set_free_next(next);
        }

        Some(obj_number)
    }

    /// Rebuild the free list after the table was filled from a file.
    ///
    /// The list stored in the file is followed from slot 0 as long as every
    /// hop lands on a free slot. Free slots that can't be reached that way,
    /// as well as gaps in the table, are linked in afterwards.
    pub(crate) fn init_free_references_list(&mut self, append_mode: bool) {
        self.free_list.clear();

        match self.entries.first_mut().and_then(|e| e.as_mut()) {
            Some(zero) => {
                zero.lifecycle = Lifecycle::Free;

                if zero.free_next().is_none() {
                    zero.location = Location::FreeNext(0);
                }
            }
            None => {
                self.entries[0] = Some(IndirectReference::free(
                    self.doc,
                    ObjRef::new(0, MAX_GENERATION),
                ));
            }
        }

        let mut unlinked: BTreeSet<u32> = (1..self.size())
            .filter(|n| self.get(*n).is_none_or(|e| e.is_free()))
            .collect();

        let mut prev = 0;

        while !unlinked.is_empty() {
            let Some(current) = self.get(prev).and_then(|e| e.free_next()) else {
                break;
            };

            if !unlinked.contains(&current) || self.get(current).is_none() {
                break;
            }

            self.free_list.insert(current, prev);
            unlinked.remove(&current);
            prev = current;
        }

        while let Some(next) = unlinked.pop_first() {
            if self.get(next).is_none() {
                if append_mode {
                    continue;
                }

                let mut gap = IndirectReference::free(self.doc, ObjRef::new(next, 0));
                gap.flags.insert(ObjectFlags::MODIFIED);
                self.entries[next as usize] = Some(gap);
            }

            if let Some(prev) = self.get_mut(prev)
                && prev.free_next() != Some(next)
            {
                prev.set_free_next(next);
            }

            self.free_list.insert(next, prev);
            prev = next;
        }

        if let Some(tail) = self.get_mut(prev)
            && tail.free_next() != Some(0)
        {
            tail.set_free_next(0);
        }

        self.free_list.insert(0, prev);
    }

    /// The object numbers on the free list, in list order.
    pub fn free_list(&self) -> Vec<u32> {
        let mut list = vec![];
        let mut current = self.get(0).and_then(|e| e.free_next()).unwrap_or(0);

        while current != 0 && list.len() < self.size() as usize {
            list.push(current);
            current = self.get(current).and_then(|e| e.free_next()).unwrap_or(0);
        }

        list
    }

    /// Drop free slots and gaps at the end of the table.
    pub(crate) fn trim_trailing_free(&mut self) {
        while self.count > 0 {
            let obj_number = self.count;

            match self.get(obj_number) {
                None => {}
                Some(e) if e.is_free() => {
                    self.remove_from_free_list(Some(obj_number));
                }
                Some(_) => break,
            }

            self.entries[obj_number as usize] = None;
            self.count -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DocumentId, IndirectReference, Location, MAX_GENERATION, XRefTable};
    use crate::error::Error;
    use crate::state::Lifecycle;
    use quire_syntax::object::{ObjRef, ObjectFlags};

    fn table() -> XRefTable {
        XRefTable::new(DocumentId::next(), 1000)
    }

    fn table_with(n: u32) -> XRefTable {
        let mut xref = table();

        for _ in 0..n {
            xref.create_next_reference().unwrap();
        }

        xref
    }

    #[test]
    fn add_and_get() {
        let mut xref = table();
        let doc = xref.document();
        let id = ObjRef::new(12, 0);

        xref.add(IndirectReference::new(doc, id, Lifecycle::Unloaded, Location::ByteOffset(77)))
            .unwrap();

        let entry = xref.get(12).unwrap();
        assert_eq!(entry.id(), id);
        assert_eq!(entry.location(), Location::ByteOffset(77));
        assert_eq!(xref.size(), 13);
        assert!(xref.get(11).is_none());
    }

    #[test]
    fn slot_zero_heads_the_list() {
        let xref = table();
        let zero = xref.get(0).unwrap();

        assert!(zero.is_free());
        assert_eq!(zero.gen_number(), MAX_GENERATION);
        assert_eq!(xref.size(), 1);
        assert!(xref.free_list().is_empty());
    }

    #[test]
    fn freed_slot_is_reused_with_next_generation() {
        let mut xref = table_with(3);

        assert!(xref.free_reference(2));
        assert_eq!(xref.free_list(), vec![2]);

        let reused = xref.create_reference().unwrap();
        assert_eq!(reused, ObjRef::new(2, 1));
        assert!(xref.free_list().is_empty());
        assert!(xref.get(2).unwrap().is_modified());

        assert_eq!(xref.create_reference().unwrap(), ObjRef::new(4, 0));
    }

    #[test]
    fn lowest_free_slot_is_reused_first() {
        let mut xref = table_with(7);
        xref.free_reference(7);
        xref.free_reference(3);

        // The list keeps the order in which slots were freed.
        assert_eq!(xref.free_list(), vec![7, 3]);

        let reused = xref.create_reference().unwrap();
        assert_eq!(reused, ObjRef::new(3, 1));
        assert_eq!(xref.free_list(), vec![7]);
    }

    #[test]
    fn head_pointer_skips_reused_slot() {
        let mut xref = table_with(7);
        xref.free_reference(3);
        xref.free_reference(7);

        assert_eq!(xref.get(0).unwrap().free_next(), Some(3));
        assert_eq!(xref.create_reference().unwrap(), ObjRef::new(3, 1));
        assert_eq!(xref.get(0).unwrap().free_next(), Some(7));
        assert_eq!(xref.get(7).unwrap().free_next(), Some(0));
    }

    #[test]
    fn slot_at_max_generation_is_retired() {
        let mut xref = table_with(2);
        xref.get_mut(1).unwrap().id.gen_number = MAX_GENERATION;
        xref.free_reference(1);

        assert_eq!(xref.free_list(), vec![1]);
        assert_eq!(xref.create_reference().unwrap(), ObjRef::new(3, 0));
        assert_eq!(xref.free_list(), vec![1]);
    }

    #[test]
    fn flushed_slots_are_not_freed() {
        let mut xref = table_with(2);
        xref.get_mut(1).unwrap().lifecycle = Lifecycle::Flushed;
        xref.get_mut(2)
            .unwrap()
            .flags
            .insert(ObjectFlags::MUST_BE_FLUSHED);

        assert!(!xref.free_reference(1));
        assert!(!xref.free_reference(2));
        assert!(!xref.free_reference(0));
        assert!(xref.free_list().is_empty());
    }

    #[test]
    fn growth_is_limited() {
        let mut xref = XRefTable::new(DocumentId::next(), 4);

        for _ in 0..3 {
            xref.create_next_reference().unwrap();
        }

        assert!(matches!(
            xref.create_next_reference(),
            Err(Error::ResourceLimit {
                requested: 5,
                limit: 4
            })
        ));
    }

    #[test]
    fn rebuilds_free_list() {
        let mut xref = table();
        let doc = xref.document();

        // The file links 0 -> 4 -> 0, but 2 is free too and 5 is missing.
        let mut zero = IndirectReference::free(doc, ObjRef::new(0, MAX_GENERATION));
        zero.location = Location::FreeNext(4);
        xref.add(zero).unwrap();
        xref.add(IndirectReference::free(doc, ObjRef::new(2, 1))).unwrap();
        xref.add(IndirectReference::free(doc, ObjRef::new(4, 3))).unwrap();

        for n in [1, 3, 6] {
            xref.add(IndirectReference::new(
                doc,
                ObjRef::new(n, 0),
                Lifecycle::Unloaded,
                Location::ByteOffset(u64::from(n) * 10),
            ))
            .unwrap();
        }

        xref.init_free_references_list(false);

        assert_eq!(xref.free_list(), vec![4, 2, 5]);
        assert!(xref.get(5).unwrap().is_free());

        // The repaired list is usable.
        assert_eq!(xref.create_reference().unwrap(), ObjRef::new(2, 2));
        assert_eq!(xref.free_list(), vec![4, 5]);
    }

    #[test]
    fn rebuild_in_append_mode_skips_gaps() {
        let mut xref = table();
        let doc = xref.document();
        xref.add(IndirectReference::new(
            doc,
            ObjRef::new(3, 0),
            Lifecycle::Unloaded,
            Location::ByteOffset(10),
        ))
        .unwrap();

        xref.init_free_references_list(true);

        assert!(xref.free_list().is_empty());
        assert!(xref.get(1).is_none());
    }

    #[test]
    fn trims_trailing_free_slots() {
        let mut xref = table_with(5);
        xref.free_reference(2);
        xref.free_reference(5);
        xref.free_reference(4);

        xref.trim_trailing_free();

        assert_eq!(xref.size(), 4);
        assert_eq!(xref.free_list(), vec![2]);
        assert_eq!(xref.get(2).unwrap().free_next(), Some(0));
    }
}
