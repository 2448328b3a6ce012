use quire_tests::{FixtureBuilder, markers, numbered_pages, set_marker};
use quire_write::{
    Document, Error, Lifecycle, ObjRef, Object, ReaderSettings, WriterProperties,
};

fn fixture() -> Vec<u8> {
    FixtureBuilder::new()
        .object(1, "<</Type /Catalog /Pages 2 0 R>>")
        .object(2, "<</Type /Pages /Kids [3 0 R] /Count 1>>")
        .object(
            3,
            "<</Type /Page /Parent 2 0 R /Contents 4 0 R /Annots [5 0 R]>>",
        )
        .object(4, "<</Length 3>>\nstream\nq Q\nendstream")
        .object(5, "<</Type /Annot /P 3 0 R /Contents (note)>>")
        .object(6, "7 0 R")
        .object(7, "42")
        .free(8)
        .build()
}

fn lifecycle(doc: &Document, num: u32) -> Option<Lifecycle> {
    doc.xref().get(num).map(|e| e.lifecycle())
}

#[test]
fn objects_are_loaded_on_demand() {
    let mut doc = Document::open(fixture(), ReaderSettings::default()).unwrap();

    assert_eq!(lifecycle(&doc, 4), Some(Lifecycle::Unloaded));
    assert!(doc.get(ObjRef::new(4, 0)).unwrap().is_some());
    assert_eq!(lifecycle(&doc, 4), Some(Lifecycle::Loaded));

    assert!(doc.get(ObjRef::new(8, 0)).unwrap().is_none());
    assert!(doc.get(ObjRef::new(100, 0)).unwrap().is_none());
}

#[test]
fn released_objects_are_read_again() {
    let mut doc = Document::open(fixture(), ReaderSettings::default()).unwrap();
    let id = ObjRef::new(5, 0);

    let before = doc.get(id).unwrap().cloned();
    let snapshot = doc.release(id);
    assert_eq!(lifecycle(&doc, 5), Some(Lifecycle::Released));
    assert_eq!(snapshot, before);

    assert_eq!(doc.get(id).unwrap().cloned(), before);
    assert_eq!(lifecycle(&doc, 5), Some(Lifecycle::Loaded));
}

#[test]
fn modified_objects_are_not_released() {
    let mut doc = Document::open(fixture(), ReaderSettings::default()).unwrap();
    let id = ObjRef::new(7, 0);

    *doc.get_mut(id).unwrap().unwrap() = Object::from(43i64);
    assert_eq!(doc.release(id), None);
    assert_eq!(doc.get(id).unwrap(), Some(&Object::from(43i64)));
}

#[test]
fn references_are_resolved() {
    let mut doc = Document::open(fixture(), ReaderSettings::default()).unwrap();

    assert_eq!(
        doc.resolve(ObjRef::new(6, 0)).unwrap(),
        Some(&Object::from(42i64))
    );
}

#[test]
fn flushed_objects_are_gone() {
    let mut doc = Document::create(vec![], WriterProperties::default()).unwrap();
    let id = doc.add_object(Object::from(1i64)).unwrap();

    doc.flush_object(id).unwrap();

    assert!(matches!(doc.get(id), Err(Error::NotAvailable(r)) if r == id));
    assert!(!doc.free(id));
}

#[test]
fn free_slots_are_reused_with_a_new_generation() {
    let mut doc = Document::stamp(
        fixture(),
        ReaderSettings::default(),
        vec![],
        WriterProperties::default(),
    )
    .unwrap();

    let id = doc.add_object(Object::from(1i64)).unwrap();
    assert_eq!(id.obj_number, 8);
    assert_eq!(id.gen_number, 1);
}

#[test]
fn reserved_slots_are_filled_later() {
    let mut doc = Document::create(vec![], WriterProperties::default()).unwrap();
    let id = doc.reserve().unwrap();

    let mut page = quire_syntax::object::Dict::with_type(b"Page");
    page.insert(b"Marker", 7);
    doc.make_indirect_at(id, page).unwrap();
    doc.add_page(id).unwrap();

    let pdf = doc.close().unwrap();
    let mut doc = Document::open(pdf, ReaderSettings::default()).unwrap();
    assert_eq!(markers(&mut doc), vec![Some(7)]);
}

#[test]
fn release_page_deep() {
    let mut doc = Document::open(fixture(), ReaderSettings::default()).unwrap();

    let page = doc.get_page(1).unwrap().id();
    doc.get(ObjRef::new(4, 0)).unwrap();
    doc.get(ObjRef::new(5, 0)).unwrap();

    doc.release_page_deep(1).unwrap();

    assert_eq!(lifecycle(&doc, 4), Some(Lifecycle::Released));
    assert_eq!(lifecycle(&doc, 5), Some(Lifecycle::Released));
    assert_eq!(lifecycle(&doc, page.obj_number), Some(Lifecycle::Released));
    // The tree node is not part of the page.
    assert_eq!(lifecycle(&doc, 2), Some(Lifecycle::Loaded));
}

#[test]
fn flush_page_modified_in_an_update() {
    let original = numbered_pages(3, WriterProperties::default());
    let mut doc = Document::stamp(
        original,
        ReaderSettings::default(),
        vec![],
        WriterProperties::append(),
    )
    .unwrap();

    let second = doc.get_page(2).unwrap().id();
    set_marker(&mut doc, second, 20);

    for n in 1..=3 {
        doc.flush_page_modified(n).unwrap();
    }

    assert_eq!(
        doc.xref().get(second.obj_number).map(|e| e.lifecycle()),
        Some(Lifecycle::Flushed)
    );

    let first = doc.get_page(1).unwrap().id();
    assert_ne!(
        doc.xref().get(first.obj_number).map(|e| e.lifecycle()),
        Some(Lifecycle::Flushed)
    );

    let pdf = doc.close().unwrap();
    let mut doc = Document::open(pdf, ReaderSettings::default()).unwrap();
    assert_eq!(markers(&mut doc), vec![Some(1), Some(20), Some(3)]);
}
