//! Copying objects between documents.
//!
//! Copying an object copies everything it references, too. Each source
//! object is copied at most once per target document, unless duplication
//! is requested for the object that is copied explicitly. In smart mode,
//! dictionaries and streams whose resolved content was copied before are
//! shared instead of being copied again, even if they are different objects
//! in the source.

use crate::error::{Error, Result};
use crate::store::ObjectStore;
use crate::xref::DocumentId;
use log::{trace, warn};
use quire_syntax::object::keys::{B, CATALOG, OCG, OCMD, PAGE, PARENT, STRUCT_PARENTS};
use quire_syntax::object::{ObjRef, Object};
use rustc_hash::FxHashMap;
use siphasher::sip128::{Hasher128, SipHasher13};
use std::hash::Hasher;

/// Keys of a page that are not copied along with it.
pub(crate) const PAGE_EXCLUDED_KEYS: &[&[u8]] = &[PARENT, B, STRUCT_PARENTS];

/// What was copied into a document so far.
#[derive(Debug, Default)]
pub(crate) struct CopySession {
    copied: FxHashMap<(DocumentId, ObjRef), ObjRef>,
    /// Copies by the hash of their source content.
    smart: FxHashMap<u128, ObjRef>,
}

pub(crate) struct Copier<'a> {
    source: &'a mut ObjectStore,
    target: &'a mut ObjectStore,
    session: &'a mut CopySession,
    smart_mode: bool,
    to_visit: Vec<(ObjRef, Object)>,
}

impl<'a> Copier<'a> {
    pub(crate) fn new(
        source: &'a mut ObjectStore,
        target: &'a mut ObjectStore,
        session: &'a mut CopySession,
        smart_mode: bool,
    ) -> Self {
        Self {
            source,
            target,
            session,
            smart_mode,
            to_visit: vec![],
        }
    }

    /// Copy the object `id` and everything it references, and return the id
    /// of the copy.
    pub(crate) fn copy_object(&mut self, id: ObjRef, allow_duplicating: bool) -> Result<ObjRef> {
        let copy = match self.map_ref(id, allow_duplicating)? {
            Some(copy) => copy,
            None => {
                warn!("object {id} doesn't exist, copying null");

                self.target.allocate(Object::NULL)?
            }
        };

        self.write_dependencies()?;

        Ok(copy)
    }

    /// Copy a page without the keys that tie it to its old document.
    ///
    /// The copy is known before anything the page references is copied, so
    /// back-references to the page, as in annotations, point to the copy.
    pub(crate) fn copy_page(&mut self, id: ObjRef) -> Result<ObjRef> {
        let mut page = self.source.resolve(id)?.cloned().unwrap_or(Object::NULL);

        if let Some(dict) = page.as_dict_mut() {
            for key in PAGE_EXCLUDED_KEYS {
                dict.remove(key);
            }
        }

        let copy = self.target.reserve()?;
        self.session
            .copied
            .insert((self.source.document(), id), copy);
        self.to_visit.push((copy, page));

        self.write_dependencies()?;

        Ok(copy)
    }

    /// Find or create the copy of the source object `id`.
    ///
    /// Returns `None` if there is no such object.
    fn map_ref(&mut self, id: ObjRef, allow_duplicating: bool) -> Result<Option<ObjRef>> {
        let key = (self.source.document(), id);

        if !allow_duplicating && let Some(copy) = self.session.copied.get(&key) {
            return Ok(Some(*copy));
        }

        let Some(mut object) = self.source.get(id)?.cloned() else {
            return Ok(None);
        };

        if object.is_type(CATALOG) {
            warn!("copying a catalog is not allowed, copying null instead");

            object = Object::NULL;
        }

        let hash = if self.smart_mode
            && !allow_duplicating
            && matches!(object, Object::Dict(_) | Object::Stream(_))
            && ![PAGE, OCG, OCMD].iter().any(|ty| object.is_type(ty))
        {
            let hash = ContentHasher::new(self.source).hash_ref(id)?;

            if let Some(copy) = self.session.smart.get(&hash) {
                trace!("object {id} has the same content as {copy}");
                self.session.copied.insert(key, *copy);

                return Ok(Some(*copy));
            }

            Some(hash)
        } else {
            None
        };

        let copy = self.target.reserve()?;
        self.session.copied.insert(key, copy);

        if let Some(hash) = hash {
            self.session.smart.insert(hash, copy);
        }

        self.to_visit.push((copy, object));

        Ok(Some(copy))
    }

    fn write_dependencies(&mut self) -> Result<()> {
        while let Some((copy, mut object)) = self.to_visit.pop() {
            self.map_refs(&mut object)?;
            self.target.install(copy, object)?;
        }

        Ok(())
    }

    /// Replace every reference in `object` by a reference to its copy.
    fn map_refs(&mut self, object: &mut Object) -> Result<()> {
        match object {
            Object::Reference(r) => {
                *object = match self.map_ref(*r, false)? {
                    Some(copy) => Object::Reference(copy),
                    None => Object::NULL,
                };
            }
            Object::Array(array) => {
                for item in array.iter_mut() {
                    self.map_refs(item)?;
                }
            }
            Object::Dict(dict) => {
                for (_, value) in dict.iter_mut() {
                    self.map_refs(value)?;
                }
            }
            Object::Stream(stream) => {
                for (_, value) in stream.dict_mut().iter_mut() {
                    self.map_refs(value)?;
                }
            }
            _ => {}
        }

        Ok(())
    }
}

/// Computes hashes of the content of objects with all references resolved.
struct ContentHasher<'a> {
    source: &'a mut ObjectStore,
    memo: FxHashMap<ObjRef, u128>,
    path: Vec<ObjRef>,
    back_references: usize,
}

impl<'a> ContentHasher<'a> {
    fn new(source: &'a mut ObjectStore) -> Self {
        Self {
            source,
            memo: FxHashMap::default(),
            path: vec![],
            back_references: 0,
        }
    }

    fn hash_ref(&mut self, id: ObjRef) -> Result<u128> {
        if let Some(hash) = self.memo.get(&id) {
            return Ok(*hash);
        }

        let object = match self.source.get(id) {
            Ok(object) => object.cloned(),
            Err(Error::NotAvailable(_)) => {
                warn!("object {id} was flushed and can't be compared");
                None
            }
            Err(e) => return Err(e),
        };

        let back_references = self.back_references;
        self.path.push(id);

        let mut hasher = SipHasher13::new();

        match &object {
            Some(object) => self.hash_object(object, &mut hasher)?,
            None => hasher.write(b"null"),
        }

        self.path.pop();
        let hash = hasher.finish128().as_u128();

        // A hash that depends on where the cycle was entered can't be reused.
        if self.back_references == back_references {
            self.memo.insert(id, hash);
        }

        Ok(hash)
    }

    fn hash_object(&mut self, object: &Object, hasher: &mut SipHasher13) -> Result<()> {
        match object {
            Object::Null(_) => hasher.write(b"n"),
            Object::Boolean(b) => hasher.write(if *b { b"t" } else { b"f" }),
            Object::Number(n) => {
                hasher.write(b"#");
                hasher.write(&n.as_f64().to_be_bytes());
            }
            Object::String(s) => {
                hasher.write(b"(");
                hasher.write_usize(s.get().len());
                hasher.write(s.get());
            }
            Object::Name(n) => {
                hasher.write(b"/");
                hasher.write_usize(n.len());
                hasher.write(n);
            }
            Object::Literal(bytes) => {
                hasher.write(b"L");
                hasher.write_usize(bytes.len());
                hasher.write(bytes);
            }
            Object::Array(array) => {
                hasher.write(b"[");
                hasher.write_usize(array.len());

                for item in array.iter() {
                    self.hash_object(item, hasher)?;
                }
            }
            Object::Dict(dict) => {
                hasher.write(b"<");

                for (key, value) in dict.iter().filter(|(k, _)| ***k != *PARENT) {
                    hasher.write_usize(key.len());
                    hasher.write(key);
                    self.hash_object(value, hasher)?;
                }

                hasher.write(b">");
            }
            Object::Stream(stream) => {
                self.hash_object(&Object::Dict(stream.dict().clone()), hasher)?;
                hasher.write(b"S");
                hasher.write_usize(stream.raw_data().len());
                hasher.write(stream.raw_data());
            }
            Object::Reference(r) => {
                if let Some(position) = self.path.iter().position(|p| p == r) {
                    self.back_references += 1;
                    hasher.write(b"^");
                    hasher.write_usize(self.path.len() - position);
                } else {
                    let hash = self.hash_ref(*r)?;
                    hasher.write(b"R");
                    hasher.write(&hash.to_be_bytes());
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ContentHasher, Copier, CopySession};
    use crate::error::Error;
    use crate::store::ObjectStore;
    use crate::xref::Location;
    use quire_syntax::object::keys::{CATALOG, PAGE, PARENT};
    use quire_syntax::object::{Dict, ObjRef, Object, Stream};

    fn font_stream(store: &mut ObjectStore) -> ObjRef {
        store
            .allocate(Object::Stream(Stream::new(Dict::new(), b"font program".to_vec())))
            .unwrap()
    }

    #[test]
    fn copies_are_shared() {
        let mut source = ObjectStore::new(100);
        let mut target = ObjectStore::new(100);
        let mut session = CopySession::default();
        let font = font_stream(&mut source);

        let mut copier = Copier::new(&mut source, &mut target, &mut session, false);
        let first = copier.copy_object(font, false).unwrap();
        let second = copier.copy_object(font, false).unwrap();
        let duplicate = copier.copy_object(font, true).unwrap();

        assert_eq!(first, second);
        assert_ne!(first, duplicate);
        let original = target.get(first).unwrap().cloned();
        assert_eq!(target.get(duplicate).unwrap().cloned(), original);
    }

    #[test]
    fn smart_mode_deduplicates_by_content() {
        let mut source = ObjectStore::new(100);
        let mut target = ObjectStore::new(100);
        let mut session = CopySession::default();
        let a = font_stream(&mut source);
        let b = font_stream(&mut source);

        let mut copier = Copier::new(&mut source, &mut target, &mut session, true);
        let first = copier.copy_object(a, false).unwrap();
        let second = copier.copy_object(b, false).unwrap();
        assert_eq!(first, second);

        let duplicate = copier.copy_object(b, true).unwrap();
        assert_ne!(first, duplicate);

        // Without smart mode, different objects stay different.
        let mut session = CopySession::default();
        let mut target = ObjectStore::new(100);
        let mut copier = Copier::new(&mut source, &mut target, &mut session, false);
        assert_ne!(
            copier.copy_object(a, false).unwrap(),
            copier.copy_object(b, false).unwrap()
        );
    }

    #[test]
    fn pages_are_not_merged() {
        let mut source = ObjectStore::new(100);
        let mut target = ObjectStore::new(100);
        let mut session = CopySession::default();
        let a = source.allocate(Object::Dict(Dict::with_type(PAGE))).unwrap();
        let b = source.allocate(Object::Dict(Dict::with_type(PAGE))).unwrap();

        let mut copier = Copier::new(&mut source, &mut target, &mut session, true);
        assert_ne!(
            copier.copy_object(a, false).unwrap(),
            copier.copy_object(b, false).unwrap()
        );
    }

    #[test]
    fn references_are_rewritten() {
        let mut source = ObjectStore::new(100);
        let mut target = ObjectStore::new(100);
        let mut session = CopySession::default();

        // Occupy some slots, so that numbers differ between the documents.
        target.allocate(Object::NULL).unwrap();
        target.allocate(Object::NULL).unwrap();

        let font = font_stream(&mut source);
        let mut dict = Dict::new();
        dict.insert(b"Font", font);
        dict.insert(b"Missing", ObjRef::new(50, 0));
        let resources = source.allocate(Object::Dict(dict)).unwrap();

        let mut copier = Copier::new(&mut source, &mut target, &mut session, false);
        let copy = copier.copy_object(resources, false).unwrap();

        let dict = target.get(copy).unwrap().unwrap().as_dict().unwrap().clone();
        let font_copy = dict.get_ref(b"Font").unwrap();
        assert_ne!(font_copy, font);
        assert!(target.get(font_copy).unwrap().unwrap().as_stream().is_some());
        assert_eq!(dict.get(b"Missing"), Some(&Object::NULL));
    }

    #[test]
    fn catalogs_become_null() {
        let mut source = ObjectStore::new(100);
        let mut target = ObjectStore::new(100);
        let mut session = CopySession::default();
        let catalog = source.allocate(Object::Dict(Dict::with_type(CATALOG))).unwrap();

        let copy = Copier::new(&mut source, &mut target, &mut session, false)
            .copy_object(catalog, false)
            .unwrap();

        assert_eq!(target.get(copy).unwrap(), Some(&Object::NULL));
    }

    #[test]
    fn flushed_objects_cant_be_copied() {
        let mut source = ObjectStore::new(100);
        let mut target = ObjectStore::new(100);
        let mut session = CopySession::default();
        let font = font_stream(&mut source);
        source.mark_flushed(font, Location::ByteOffset(0));

        let result = Copier::new(&mut source, &mut target, &mut session, false).copy_object(font, false);
        assert!(matches!(result, Err(Error::NotAvailable(_))));
    }

    #[test]
    fn cyclic_content_hashes() {
        let mut store = ObjectStore::new(100);
        let a = store.reserve().unwrap();
        let b = store.reserve().unwrap();

        let mut dict = Dict::new();
        dict.insert(b"Next", b);
        store.install(a, Object::Dict(dict)).unwrap();

        let mut dict = Dict::new();
        dict.insert(b"Next", a);
        dict.insert(PARENT, a);
        store.install(b, Object::Dict(dict)).unwrap();

        let mut hasher = ContentHasher::new(&mut store);
        assert_eq!(hasher.hash_ref(a).unwrap(), hasher.hash_ref(a).unwrap());

        let first = ContentHasher::new(&mut store).hash_ref(a).unwrap();
        let second = ContentHasher::new(&mut store).hash_ref(b).unwrap();
        assert_eq!(first, second);
    }
}
