//! Arrays.

use crate::object::flags::ObjectFlags;
use crate::object::{Object, ObjRef};
use crate::reader::{Readable, Reader};
use std::fmt::{Debug, Formatter};
use std::ops::Deref;

/// An array of PDF objects.
#[derive(Clone, Default)]
pub struct Array {
    items: Vec<Object>,
    flags: ObjectFlags,
}

// Flags are bookkeeping and don't take part in equality.
impl PartialEq for Array {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl Array {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: impl Into<Object>) {
        self.items.push(item.into());
    }

    pub fn insert(&mut self, index: usize, item: impl Into<Object>) {
        self.items.insert(index, item.into());
    }

    pub fn remove(&mut self, index: usize) -> Object {
        self.items.remove(index)
    }

    /// Replace the item at `index`, returning the old one.
    pub fn set(&mut self, index: usize, item: impl Into<Object>) -> Option<Object> {
        let slot = self.items.get_mut(index)?;

        Some(std::mem::replace(slot, item.into()))
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Object> {
        self.items.get_mut(index)
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Object> {
        self.items.iter_mut()
    }

    /// Returns the position of the first reference to `target`.
    pub fn position_of_ref(&self, target: ObjRef) -> Option<usize> {
        self.items
            .iter()
            .position(|o| matches!(o, Object::Reference(r) if *r == target))
    }

    pub fn flags(&self) -> ObjectFlags {
        self.flags
    }

    pub fn flags_mut(&mut self) -> &mut ObjectFlags {
        &mut self.flags
    }

    /// Mark the array to be written as its own indirect object.
    pub fn make_indirect_pending(&mut self) {
        self.flags.insert(ObjectFlags::MUST_BE_INDIRECT);
    }

    pub fn into_vec(self) -> Vec<Object> {
        self.items
    }
}

impl Deref for Array {
    type Target = [Object];

    fn deref(&self) -> &Self::Target {
        &self.items
    }
}

impl From<Vec<Object>> for Array {
    fn from(items: Vec<Object>) -> Self {
        Self {
            items,
            flags: ObjectFlags::empty(),
        }
    }
}

impl FromIterator<Object> for Array {
    fn from_iter<T: IntoIterator<Item = Object>>(iter: T) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}

impl IntoIterator for Array {
    type Item = Object;
    type IntoIter = std::vec::IntoIter<Object>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Array {
    type Item = &'a Object;
    type IntoIter = std::slice::Iter<'a, Object>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl Debug for Array {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.items.iter()).finish()
    }
}

impl Readable for Array {
    fn read(r: &mut Reader<'_>) -> Option<Self> {
        r.forward_tag(b"[")?;

        let mut items = vec![];

        loop {
            r.skip_white_spaces_and_comments();

            if r.forward_tag(b"]").is_some() {
                return Some(Self::from(items));
            }

            items.push(r.read::<Object>()?);
        }
    }
}
