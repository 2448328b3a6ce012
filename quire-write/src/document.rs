use crate::copy::Copier;
use crate::error::{Error, Result};
use crate::pages::{Page, PageTree};
use crate::settings::{ReaderSettings, WriterProperties};
use crate::state::Lifecycle;
use crate::store::ObjectStore;
use crate::traversal::{Policy, process_page};
use crate::writer::Writer;
use crate::xref::XRefTable;
use crate::xref::write::TrailerInfo;
use log::{debug, warn};
use quire_syntax::object::keys::{
    CATALOG, ENCRYPT, ID, INFO, MEDIA_BOX, PAGE, PAGES, PRODUCER, ROOT,
};
use quire_syntax::object::{Array, Dict, ObjRef, Object, ObjectFlags, string};
use quire_syntax::xref::{XRefKind, read_xref};
use quire_syntax::PdfData;
use siphasher::sip128::{Hasher128, SipHasher13};
use std::hash::Hasher;
use std::io::Write;

const HEADER: &[u8] = b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n";
const PRODUCER_NAME: &[u8] = b"quire";

/// A document whose objects can be read, modified and written.
///
/// A document is either read-only, in which case nothing is ever written, or
/// has an output that objects are written to as they are flushed. The output
/// is complete once the document is [closed](Document::close).
pub struct Document<W: Write = Vec<u8>> {
    store: ObjectStore,
    pages: PageTree,
    writer: Option<Writer<W>>,
    catalog: ObjRef,
    info: Option<ObjRef>,
    original_id: Option<Vec<u8>>,
    /// The last cross-reference section of the source file.
    previous: Option<(u64, XRefKind)>,
}

impl Document {
    /// Open a document for reading only.
    pub fn open(data: impl Into<PdfData>, settings: ReaderSettings) -> Result<Self> {
        Self::read(data.into(), settings, None, 10)
    }
}

impl<W: Write> Document<W> {
    /// Create a new, empty document that is written to `output`.
    pub fn create(output: W, properties: WriterProperties) -> Result<Self> {
        let mut store = ObjectStore::new(ReaderSettings::default().max_xref_size);
        let leaf_size = properties.leaf_size;

        let mut writer = Writer::new(output, properties);
        writer.write_raw(HEADER)?;

        let catalog = store.allocate(Object::Dict(Dict::with_type(CATALOG)))?;

        let mut info = Dict::new();
        info.insert(PRODUCER, string::String::new(PRODUCER_NAME.to_vec()));
        let info = store.allocate(Object::Dict(info))?;

        Ok(Self {
            store,
            pages: PageTree::new(leaf_size),
            writer: Some(writer),
            catalog,
            info: Some(info),
            original_id: None,
            previous: None,
        })
    }

    /// Open an existing document and write a modified version of it to
    /// `output`.
    ///
    /// In append mode, the original bytes are copied to the output, and only
    /// objects that change are written after them. Otherwise the document
    /// is written anew.
    pub fn stamp(
        data: impl Into<PdfData>,
        settings: ReaderSettings,
        output: W,
        properties: WriterProperties,
    ) -> Result<Self> {
        let data = data.into();
        let leaf_size = properties.leaf_size;
        let append_mode = properties.append_mode;
        let mut writer = Writer::new(output, properties);

        if append_mode {
            let bytes = data.as_ref();
            writer.write_raw(bytes)?;

            if !bytes.ends_with(b"\n") && !bytes.ends_with(b"\r") {
                writer.write_raw(b"\n")?;
            }
        } else {
            writer.write_raw(HEADER)?;
        }

        Self::read(data, settings, Some(writer), leaf_size)
    }

    fn read(
        data: PdfData,
        settings: ReaderSettings,
        writer: Option<Writer<W>>,
        leaf_size: usize,
    ) -> Result<Self> {
        let sections = read_xref(data.as_ref(), settings.max_xref_size)?;
        let trailer = &sections.trailer;

        if trailer.contains_key(ENCRYPT) {
            return Err(Error::InvalidStructure("encrypted documents are not supported"));
        }

        let catalog = trailer
            .get_ref(ROOT)
            .ok_or(Error::InvalidStructure("the trailer has no /Root"))?;
        let info = trailer.get_ref(INFO);
        let original_id = trailer
            .get_array(ID)
            .and_then(|a| a.first())
            .and_then(|o| o.as_string())
            .map(|s| s.get().to_vec());
        let previous = Some((sections.startxref, sections.kind));

        let append_mode = writer
            .as_ref()
            .is_some_and(|w| w.properties().append_mode);
        let mut store = ObjectStore::with_source(
            data,
            &sections,
            settings.max_xref_size,
            append_mode,
        )?;

        let root = store
            .get(catalog)?
            .and_then(|o| o.as_dict())
            .ok_or(Error::InvalidStructure("the catalog is not a dictionary"))?
            .get_ref(PAGES);
        store.insert_flags(catalog, ObjectFlags::FORBID_RELEASE);

        let pages = match root {
            Some(root) => PageTree::open(&mut store, root, leaf_size, settings.max_xref_size)?,
            None => {
                warn!("the catalog has no page tree");

                PageTree::new(leaf_size)
            }
        };

        debug!(
            "opened document with {} objects and {} pages",
            store.xref().size(),
            pages.count()
        );

        Ok(Self {
            store,
            pages,
            writer,
            catalog,
            info,
            original_id,
            previous,
        })
    }

    /// The id of the document catalog.
    pub fn catalog(&self) -> ObjRef {
        self.catalog
    }

    /// The id of the document information dictionary, if there is one.
    pub fn info(&self) -> Option<ObjRef> {
        self.info
    }

    /// The cross-reference table of the document.
    pub fn xref(&self) -> &XRefTable {
        self.store.xref()
    }

    /// The properties the document is written with, if it has an output.
    pub fn properties(&self) -> Option<&WriterProperties> {
        self.writer.as_ref().map(|w| w.properties())
    }

    /// Return the content of the object `id`.
    ///
    /// Returns `None` if the object doesn't exist or is free, and an error if
    /// it was already flushed.
    pub fn get(&mut self, id: ObjRef) -> Result<Option<&Object>> {
        self.store.get(id)
    }

    /// Return the content of the object `id` for modification.
    pub fn get_mut(&mut self, id: ObjRef) -> Result<Option<&mut Object>> {
        self.store.get_mut(id)
    }

    /// Return the content of the object `id`, following references to
    /// references.
    pub fn resolve(&mut self, id: ObjRef) -> Result<Option<&Object>> {
        self.store.resolve(id)
    }

    /// Store `object` as a new indirect object.
    pub fn add_object(&mut self, object: impl Into<Object>) -> Result<ObjRef> {
        self.require_writer()?;
        self.store.allocate(object.into())
    }

    /// Reserve an object number whose content is provided later with
    /// [`Document::make_indirect_at`].
    pub fn reserve(&mut self) -> Result<ObjRef> {
        self.require_writer()?;
        self.store.reserve()
    }

    /// Store `object` in the slot `id`, replacing its content.
    pub fn make_indirect_at(&mut self, id: ObjRef, object: impl Into<Object>) -> Result<()> {
        self.require_writer()?;
        self.store.install(id, object.into())
    }

    /// Write the object `id` to the output and drop it from memory.
    ///
    /// Everything the object references is written when the document is
    /// closed, at the latest.
    pub fn flush_object(&mut self, id: ObjRef) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(Error::NoWriter)?;
        writer.flush_object(&mut self.store, id, true)
    }

    /// Drop an unmodified object from memory. It is read again from the
    /// source file the next time it is needed.
    ///
    /// Returns the released content as a read-only snapshot. Objects that
    /// are modified or must stay in memory are not released.
    pub fn release(&mut self, id: ObjRef) -> Option<Object> {
        self.store.release(id)
    }

    /// Put the object `id` on the free list. Returns whether the slot was
    /// freed.
    pub fn free(&mut self, id: ObjRef) -> bool {
        self.store.free(id)
    }

    /// The number of pages.
    pub fn page_count(&self) -> usize {
        self.pages.count()
    }

    /// Return the page with the given 1-based number.
    pub fn get_page(&mut self, number: usize) -> Result<Page> {
        self.pages.get_page(&mut self.store, number)
    }

    /// Append a blank page.
    pub fn new_page(&mut self) -> Result<Page> {
        let mut dict = Dict::with_type(PAGE);
        dict.insert(
            MEDIA_BOX,
            Array::from_iter([0, 0, 595, 842].map(Object::from)),
        );

        let id = self.add_object(dict)?;
        self.add_page(id)
    }

    /// Append the page dictionary `id` to the document.
    pub fn add_page(&mut self, id: ObjRef) -> Result<Page> {
        self.pages.add_page(&mut self.store, id)?;
        self.get_page(self.page_count())
    }

    /// Insert the page dictionary `id`, so that it becomes page `number`.
    pub fn insert_page(&mut self, number: usize, id: ObjRef) -> Result<Page> {
        self.pages.insert_page(&mut self.store, number, id)?;
        self.get_page(number)
    }

    /// Remove page `number` from the page tree and return the id of its
    /// dictionary.
    pub fn remove_page(&mut self, number: usize) -> Result<ObjRef> {
        self.pages.remove_page(&mut self.store, number)
    }

    /// Write page `number` and everything it references.
    pub fn flush_page_deep(&mut self, number: usize) -> Result<()> {
        self.process_page(number, Policy::FlushAll)
    }

    /// Release page `number` and everything it references that is unmodified.
    pub fn release_page_deep(&mut self, number: usize) -> Result<()> {
        self.process_page(number, Policy::ReleaseOnly)
    }

    /// Write whatever is modified on page `number` and release the rest.
    pub fn flush_page_modified(&mut self, number: usize) -> Result<()> {
        self.process_page(number, Policy::FlushModified)
    }

    fn process_page(&mut self, number: usize, policy: Policy) -> Result<()> {
        process_page(
            &mut self.store,
            &mut self.pages,
            self.writer.as_mut(),
            number,
            policy,
        )
    }

    /// Copy the object `id` and everything it references into `target`.
    ///
    /// Copying the same object again yields the same copy, unless
    /// `allow_duplicating` is set.
    pub fn copy_object_to<T: Write>(
        &mut self,
        id: ObjRef,
        target: &mut Document<T>,
        allow_duplicating: bool,
    ) -> Result<ObjRef> {
        let writer = target.writer.as_mut().ok_or(Error::NoWriter)?;
        let smart_mode = writer.properties().smart_mode;

        Copier::new(&mut self.store, &mut target.store, &mut writer.copied, smart_mode)
            .copy_object(id, allow_duplicating)
    }

    /// Copy page `number` to the end of `target`.
    pub fn copy_page_to<T: Write>(
        &mut self,
        number: usize,
        target: &mut Document<T>,
    ) -> Result<Page> {
        let page = self.get_page(number)?;
        let writer = target.writer.as_mut().ok_or(Error::NoWriter)?;
        let smart_mode = writer.properties().smart_mode;

        let copy = Copier::new(&mut self.store, &mut target.store, &mut writer.copied, smart_mode)
            .copy_page(page.id())?;

        target.add_page(copy)
    }

    /// Finish the document and return the output.
    ///
    /// Everything that wasn't written yet is written now, followed by the
    /// cross-reference information and the trailer. Objects that can't be
    /// reached from the catalog are freed instead, unless the properties ask
    /// for them to be written.
    pub fn close(mut self) -> Result<W> {
        let mut writer = self.writer.take().ok_or(Error::NoWriter)?;
        let store = &mut self.store;

        let root = self.pages.generate_tree(store)?;
        let current_root = store
            .get(self.catalog)?
            .and_then(|o| o.as_dict())
            .and_then(|d| d.get_ref(PAGES));

        if current_root != Some(root) {
            store
                .get_mut(self.catalog)?
                .and_then(|o| o.as_dict_mut())
                .ok_or(Error::InvalidStructure("the catalog is not a dictionary"))?
                .insert(PAGES, root);
        }

        let encryption_dict = writer
            .properties()
            .encryption
            .as_ref()
            .and_then(|e| e.encryption_dict());

        let encrypt = match encryption_dict {
            Some(dict) => {
                let id = store.allocate(Object::Dict(dict))?;
                store.insert_flags(id, ObjectFlags::UNENCRYPTED);
                writer.flush_object(store, id, false)?;

                Some(id)
            }
            None => None,
        };

        if writer.properties().append_mode {
            flush_while(store, &mut writer, |e| {
                e.is_modified() && e.lifecycle() == Lifecycle::Loaded
            })?;
        } else {
            writer.flush_object(store, self.catalog, false)?;

            if let Some(info) = self.info {
                writer.flush_object(store, info, false)?;
            }

            if writer.properties().flush_unused_objects {
                flush_while(store, &mut writer, |e| {
                    !e.is_free()
                        && !e.is_flushed()
                        && !e.flags().contains(ObjectFlags::ORIGINAL_OBJECT_STREAM)
                })?;
            }

            flush_while(store, &mut writer, |e| {
                e.flags().contains(ObjectFlags::MUST_BE_FLUSHED) && !e.is_flushed() && !e.is_free()
            })?;

            writer.finish_object_stream(store)?;

            for id in store.xref().collect(|e| !e.is_free() && !e.is_flushed()) {
                debug!("freeing unreachable object {id}");
                store.free(id);
            }
        }

        let new_id = document_id(
            writer.position(),
            store.xref().size(),
            self.original_id.as_deref(),
        );
        let trailer = TrailerInfo {
            root: self.catalog,
            info: self.info,
            id: [self.original_id.take().unwrap_or_else(|| new_id.clone()), new_id],
            encrypt,
        };

        writer.finish(store, &trailer, self.previous)
    }

    fn require_writer(&self) -> Result<()> {
        if self.writer.is_none() {
            return Err(Error::NoWriter);
        }

        Ok(())
    }
}

/// Flush all objects matching `f` until there are none left. Flushing can
/// produce more matching objects.
fn flush_while<W: Write>(
    store: &mut ObjectStore,
    writer: &mut Writer<W>,
    f: impl Fn(&crate::xref::IndirectReference) -> bool,
) -> Result<()> {
    loop {
        let pending = writer.pending_object_stream();
        let ids = store.xref().collect(|e| Some(e.id()) != pending && f(e));

        if ids.is_empty() {
            return Ok(());
        }

        for id in ids {
            writer.flush_object(store, id, true)?;
        }
    }
}

fn document_id(position: u64, size: u32, original: Option<&[u8]>) -> Vec<u8> {
    let mut hasher = SipHasher13::new();
    hasher.write_u64(position);
    hasher.write_u32(size);

    if let Some(original) = original {
        hasher.write(original);
    }

    hasher.finish128().as_u128().to_be_bytes().to_vec()
}
