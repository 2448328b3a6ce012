//! Dictionaries.

use crate::object::flags::ObjectFlags;
use crate::object::{Array, Name, Object, ObjRef};
use crate::reader::{Readable, Reader};
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt::{Debug, Formatter};

/// A dictionary, which is a key-value map, keys being names, and values being any direct
/// PDF object or a reference to an indirect one.
///
/// Entries are kept sorted by key, which keeps serialization deterministic.
#[derive(Clone, Default)]
pub struct Dict {
    entries: BTreeMap<Name, Object>,
    flags: ObjectFlags,
}

// Flags are bookkeeping and don't take part in equality.
impl PartialEq for Dict {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a dictionary with a `/Type` entry.
    pub fn with_type(ty: &[u8]) -> Self {
        let mut dict = Self::new();
        dict.insert(keys::TYPE, Name::new(ty));

        dict
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &[u8]) -> Option<&Object> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut Object> {
        self.entries.get_mut(key)
    }

    pub fn insert(&mut self, key: impl Into<Name>, value: impl Into<Object>) -> Option<Object> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<Object> {
        self.entries.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &Name> {
        self.entries.keys()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, Name, Object> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> btree_map::IterMut<'_, Name, Object> {
        self.entries.iter_mut()
    }

    /// Returns the name stored under `key`, if it is a direct name.
    pub fn get_name(&self, key: &[u8]) -> Option<&Name> {
        self.get(key)?.as_name()
    }

    pub fn get_i64(&self, key: &[u8]) -> Option<i64> {
        self.get(key)?.as_i64()
    }

    pub fn get_ref(&self, key: &[u8]) -> Option<ObjRef> {
        self.get(key)?.as_reference()
    }

    pub fn get_array(&self, key: &[u8]) -> Option<&Array> {
        self.get(key)?.as_array()
    }

    pub fn get_array_mut(&mut self, key: &[u8]) -> Option<&mut Array> {
        match self.get_mut(key)? {
            Object::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn get_dict(&self, key: &[u8]) -> Option<&Dict> {
        self.get(key)?.as_dict()
    }

    /// Whether the `/Type` entry of the dictionary equals `ty`.
    pub fn is_type(&self, ty: &[u8]) -> bool {
        self.get_name(keys::TYPE).is_some_and(|n| **n == *ty)
    }

    pub fn flags(&self) -> ObjectFlags {
        self.flags
    }

    pub fn flags_mut(&mut self) -> &mut ObjectFlags {
        &mut self.flags
    }

    /// Mark the dictionary to be written as its own indirect object.
    pub fn make_indirect_pending(&mut self) {
        self.flags.insert(ObjectFlags::MUST_BE_INDIRECT);
    }
}

impl<'a> IntoIterator for &'a Dict {
    type Item = (&'a Name, &'a Object);
    type IntoIter = btree_map::Iter<'a, Name, Object>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl IntoIterator for Dict {
    type Item = (Name, Object);
    type IntoIter = btree_map::IntoIter<Name, Object>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl FromIterator<(Name, Object)> for Dict {
    fn from_iter<T: IntoIterator<Item = (Name, Object)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
            flags: ObjectFlags::empty(),
        }
    }
}

impl Debug for Dict {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}

impl Readable for Dict {
    fn read(r: &mut Reader<'_>) -> Option<Self> {
        r.forward_tag(b"<<")?;

        let mut dict = Self::new();

        loop {
            r.skip_white_spaces_and_comments();

            if r.forward_tag(b">>").is_some() {
                return Some(dict);
            }

            let key = r.read::<Name>()?;
            r.skip_white_spaces_and_comments();
            let value = r.read::<Object>()?;

            // A null value is equivalent to a missing entry.
            if value != Object::NULL {
                dict.entries.insert(key, value);
            }
        }
    }
}

/// A collection of dictionary keys and name values used throughout the crate.
#[allow(missing_docs)]
pub mod keys {
    macro_rules! key {
        ($i:ident, $e:expr) => {
            pub const $i: &'static [u8] = $e;
        };
    }

    key!(A, b"A");
    key!(AA, b"AA");
    key!(ANNOT, b"Annot");
    key!(ANNOTS, b"Annots");
    key!(B, b"B");
    key!(BITS_PER_COMPONENT, b"BitsPerComponent");
    key!(CATALOG, b"Catalog");
    key!(COLORS, b"Colors");
    key!(COLUMNS, b"Columns");
    key!(CONTENTS, b"Contents");
    key!(COUNT, b"Count");
    key!(CREATION_DATE, b"CreationDate");
    key!(D, b"D");
    key!(DECODE_PARMS, b"DecodeParms");
    key!(DEST, b"Dest");
    key!(DPART, b"DPart");
    key!(ENCRYPT, b"Encrypt");
    key!(EXTENDS, b"Extends");
    key!(FILTER, b"Filter");
    key!(FIRST, b"First");
    key!(FL, b"Fl");
    key!(FLATE_DECODE, b"FlateDecode");
    key!(ID, b"ID");
    key!(INDEX, b"Index");
    key!(INFO, b"Info");
    key!(KIDS, b"Kids");
    key!(LENGTH, b"Length");
    key!(MEDIA_BOX, b"MediaBox");
    key!(MOD_DATE, b"ModDate");
    key!(N, b"N");
    key!(NEXT, b"Next");
    key!(OBJ_STM, b"ObjStm");
    key!(OCG, b"OCG");
    key!(OCMD, b"OCMD");
    key!(P, b"P");
    key!(PA, b"PA");
    key!(PAGE, b"Page");
    key!(PAGES, b"Pages");
    key!(PARENT, b"Parent");
    key!(POPUP, b"Popup");
    key!(PREDICTOR, b"Predictor");
    key!(PREV, b"Prev");
    key!(PRODUCER, b"Producer");
    key!(RESOURCES, b"Resources");
    key!(ROOT, b"Root");
    key!(SD, b"SD");
    key!(SIZE, b"Size");
    key!(STRUCT_PARENTS, b"StructParents");
    key!(TYPE, b"Type");
    key!(V, b"V");
    key!(W, b"W");
    key!(XREF, b"XRef");
    key!(XREF_STM, b"XRefStm");
}
