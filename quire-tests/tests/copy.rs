use quire_tests::FixtureBuilder;
use quire_write::{Document, Object, ReaderSettings, WriterProperties};

fn source() -> Document {
    let pdf = FixtureBuilder::new()
        .object(1, "<</Type /Catalog /Pages 2 0 R>>")
        .object(2, "<</Type /Pages /Kids [3 0 R 4 0 R] /Count 2>>")
        .object(
            3,
            "<</Type /Page /Parent 2 0 R /Resources <</Font <</F1 5 0 R>>>> /Contents 6 0 R>>",
        )
        .object(
            4,
            "<</Type /Page /Parent 2 0 R /Resources <</Font <</F1 5 0 R>>>>>>",
        )
        .object(5, "<</Type /Font /Subtype /Type1 /BaseFont /Helvetica>>")
        .object(6, "<</Length 3>>\nstream\nq Q\nendstream")
        .build();

    Document::open(pdf, ReaderSettings::default()).unwrap()
}

fn target(smart_mode: bool) -> Document {
    Document::create(
        vec![],
        WriterProperties {
            smart_mode,
            ..WriterProperties::default()
        },
    )
    .unwrap()
}

fn font_count(doc: &Document) -> usize {
    doc.xref()
        .iter()
        .filter_map(|e| e.payload())
        .filter_map(Object::as_dict)
        .filter(|d| d.contains_key(b"BaseFont"))
        .count()
}

#[test]
fn shared_objects_are_copied_once() {
    let mut source = source();
    let mut target = target(false);

    source.copy_page_to(1, &mut target).unwrap();
    source.copy_page_to(2, &mut target).unwrap();

    assert_eq!(target.page_count(), 2);
    assert_eq!(font_count(&target), 1);
}

#[test]
fn smart_mode_merges_equal_objects_across_documents() {
    let mut first = source();
    let mut second = source();

    let mut target = target(false);
    first.copy_page_to(1, &mut target).unwrap();
    second.copy_page_to(1, &mut target).unwrap();
    assert_eq!(font_count(&target), 2);

    let mut target = self::target(true);
    first.copy_page_to(1, &mut target).unwrap();
    second.copy_page_to(1, &mut target).unwrap();
    assert_eq!(font_count(&target), 1);

    // Pages themselves are never merged.
    let one = target.get_page(1).unwrap();
    let two = target.get_page(2).unwrap();
    assert_ne!(one, two);
}

#[test]
fn copied_pages_belong_to_the_target() {
    let mut source = source();
    let mut target = target(false);

    let page = source.copy_page_to(1, &mut target).unwrap();
    let pdf = target.close().unwrap();

    let mut doc = Document::open(pdf, ReaderSettings::default()).unwrap();
    assert_eq!(doc.page_count(), 1);

    let parent = doc
        .get(page.id())
        .unwrap()
        .and_then(Object::as_dict)
        .and_then(|d| d.get_ref(b"Parent"));
    assert!(parent.is_some());

    let contents = doc
        .get(page.id())
        .unwrap()
        .and_then(Object::as_dict)
        .and_then(|d| d.get_ref(b"Contents"))
        .unwrap();
    assert!(matches!(doc.get(contents).unwrap(), Some(Object::Stream(_))));
}

#[test]
fn duplicating_copies() {
    let mut source = source();
    let mut target = target(false);
    let font = quire_write::ObjRef::new(5, 0);

    let a = source.copy_object_to(font, &mut target, false).unwrap();
    let b = source.copy_object_to(font, &mut target, false).unwrap();
    let c = source.copy_object_to(font, &mut target, true).unwrap();

    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn read_only_targets_are_rejected() {
    let mut source = source();
    let mut target = self::source();

    assert!(source.copy_page_to(1, &mut target).is_err());
}
