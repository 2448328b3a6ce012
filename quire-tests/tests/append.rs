use quire_syntax::xref::{XRefEntry, XRefKind, read_xref};
use quire_tests::{FixtureBuilder, markers, numbered_pages};
use quire_write::{Document, ObjRef, Object, ReaderSettings, WriterProperties};

fn fixture() -> Vec<u8> {
    FixtureBuilder::new()
        .object(1, "<</Type /Catalog /Pages 2 0 R>>")
        .object(2, "<</Type /Pages /Kids [3 0 R 4 0 R] /Count 2>>")
        .object(
            3,
            "<</Type /Page /Parent 2 0 R /MediaBox [0 0 100 100] /Contents 5 0 R>>",
        )
        .object(4, "<</Type /Page /Parent 2 0 R /MediaBox [0 0 100 100]>>")
        .object(5, "<</Length 3>>\nstream\nq Q\nendstream")
        .object(6, "(unused)")
        .build()
}

fn stamp(pdf: &[u8]) -> Document {
    Document::stamp(
        pdf.to_vec(),
        ReaderSettings::default(),
        vec![],
        WriterProperties::append(),
    )
    .unwrap()
}

#[test]
fn only_modified_objects_are_appended() {
    let original = fixture();
    let previous = read_xref(&original, 1000).unwrap().startxref;

    let mut doc = stamp(&original);
    let page = doc.get_page(1).unwrap().id();
    doc.get_mut(page)
        .unwrap()
        .and_then(|o| o.as_dict_mut())
        .unwrap()
        .insert(b"Rotate", 90);
    let out = doc.close().unwrap();

    assert!(out.starts_with(&original));

    let update = String::from_utf8_lossy(&out[original.len()..]).into_owned();
    assert!(update.contains("3 0 obj"));
    assert!(!update.contains("4 0 obj"));
    assert!(!update.contains("5 0 obj"));
    assert!(update.contains(&format!("/Prev {previous}")));

    let mut doc = Document::open(out, ReaderSettings::default()).unwrap();
    let page = doc.get_page(1).unwrap().id();
    let rotate = doc
        .get(page)
        .unwrap()
        .and_then(Object::as_dict)
        .and_then(|d| d.get_i64(b"Rotate"));
    assert_eq!(rotate, Some(90));
    assert!(matches!(
        doc.get(ObjRef::new(5, 0)).unwrap(),
        Some(Object::Stream(_))
    ));
}

#[test]
fn unchanged_document() {
    let original = fixture();
    let out = stamp(&original).close().unwrap();

    let update = String::from_utf8_lossy(&out[original.len()..]).into_owned();
    assert!(!update.contains(" obj"));
    assert_eq!(read_xref(&out, 1000).unwrap().entries.len(), 7);

    let doc = Document::open(out, ReaderSettings::default()).unwrap();
    assert_eq!(doc.page_count(), 2);
}

#[test]
fn reading_pages_adds_no_objects() {
    let original = numbered_pages(25, WriterProperties::default());

    let mut doc = stamp(&original);
    doc.get_page(5).unwrap();
    doc.get_page(25).unwrap();
    let out = doc.close().unwrap();

    let update = String::from_utf8_lossy(&out[original.len()..]).into_owned();
    assert!(!update.contains(" obj"), "{update}");

    let mut doc = Document::open(out, ReaderSettings::default()).unwrap();
    assert_eq!(markers(&mut doc), (1..=25).map(Some).collect::<Vec<_>>());
}

#[test]
fn freed_objects_are_recorded() {
    let original = fixture();

    let mut doc = stamp(&original);
    assert!(doc.free(ObjRef::new(6, 0)));
    let out = doc.close().unwrap();

    let sections = read_xref(&out, 1000).unwrap();
    assert!(matches!(
        sections.entries.get(&6),
        Some(XRefEntry::Free { .. })
    ));
    assert!(matches!(
        sections.entries.get(&5),
        Some(XRefEntry::Normal { .. })
    ));
}

#[test]
fn pages_added_in_an_update() {
    let original = fixture();

    let mut doc = stamp(&original);
    let page = doc.new_page().unwrap();
    quire_tests::set_marker(&mut doc, page.id(), 3);
    let out = doc.close().unwrap();

    let mut doc = Document::open(out, ReaderSettings::default()).unwrap();
    assert_eq!(markers(&mut doc), vec![None, None, Some(3)]);
}

#[test]
fn updates_to_compressed_files() {
    let properties = WriterProperties {
        full_compression: true,
        ..WriterProperties::default()
    };
    let original = numbered_pages(3, properties.clone());
    assert_eq!(read_xref(&original, 1000).unwrap().kind, XRefKind::Stream);

    let mut doc = Document::stamp(
        original.clone(),
        ReaderSettings::default(),
        vec![],
        WriterProperties {
            append_mode: true,
            ..properties
        },
    )
    .unwrap();
    let page = doc.get_page(2).unwrap().id();
    quire_tests::set_marker(&mut doc, page, 20);
    let out = doc.close().unwrap();

    assert!(out.starts_with(&original));
    assert_eq!(read_xref(&out, 1000).unwrap().kind, XRefKind::Stream);

    let mut doc = Document::open(out, ReaderSettings::default()).unwrap();
    assert_eq!(markers(&mut doc), vec![Some(1), Some(20), Some(3)]);
}

#[test]
fn compressed_update_on_a_classic_file() {
    let original = fixture();
    let mut doc = stamp(&original);
    let page = doc.get_page(2).unwrap().id();
    quire_tests::set_marker(&mut doc, page, 2);
    let base = doc.close().unwrap();

    let mut doc = Document::stamp(
        base.clone(),
        ReaderSettings::default(),
        vec![],
        WriterProperties {
            append_mode: true,
            full_compression: true,
            ..WriterProperties::default()
        },
    )
    .unwrap();
    let page = doc.get_page(1).unwrap().id();
    quire_tests::set_marker(&mut doc, page, 1);
    let out = doc.close().unwrap();

    let update = String::from_utf8_lossy(&out[base.len()..]).into_owned();
    assert!(update.contains("/Type /XRef"));
    assert_eq!(read_xref(&out, 1000).unwrap().kind, XRefKind::Stream);

    let mut doc = Document::open(out, ReaderSettings::default()).unwrap();
    assert_eq!(markers(&mut doc), vec![Some(1), Some(2)]);
}
