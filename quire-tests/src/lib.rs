//! Helpers shared by the integration tests.

use quire_write::{Document, ObjRef, Object, WriterProperties};
use std::fmt::Write;

/// Assembles a small file with a classic cross-reference table from object
/// bodies given as text.
#[derive(Default)]
pub struct FixtureBuilder {
    objects: Vec<(u32, String)>,
    free: Vec<u32>,
}

impl FixtureBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add object `num` (generation 0) with the given body.
    pub fn object(mut self, num: u32, body: &str) -> Self {
        self.objects.push((num, body.to_string()));
        self
    }

    /// Mark slot `num` as free.
    pub fn free(mut self, num: u32) -> Self {
        self.free.push(num);
        self
    }

    /// Write the file. Object 1 is used as the catalog.
    pub fn build(mut self) -> Vec<u8> {
        self.objects.sort_by_key(|(n, _)| *n);

        let mut out = b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n".to_vec();
        let mut offsets = vec![];

        for (num, body) in &self.objects {
            offsets.push((*num, out.len()));
            out.extend_from_slice(format!("{num} 0 obj\n{body}\nendobj\n").as_bytes());
        }

        let size = self
            .objects
            .iter()
            .map(|(n, _)| *n)
            .chain(self.free.iter().copied())
            .max()
            .unwrap_or(0)
            + 1;

        let startxref = out.len();
        let mut table = format!("xref\n0 {size}\n");

        for num in 0..size {
            match offsets.iter().find(|(n, _)| *n == num) {
                Some((_, offset)) => writeln!(table, "{offset:010} 00000 n\r").unwrap(),
                None if num == 0 => writeln!(table, "0000000000 65535 f\r").unwrap(),
                None => writeln!(table, "0000000000 00000 f\r").unwrap(),
            }
        }

        write!(
            table,
            "trailer\n<</Size {size} /Root 1 0 R>>\nstartxref\n{startxref}\n%%EOF\n"
        )
        .unwrap();
        out.extend_from_slice(table.as_bytes());

        out
    }
}

/// A document with `count` pages whose dictionaries carry their 1-based
/// number under `/Marker`.
pub fn numbered_pages(count: usize, properties: WriterProperties) -> Vec<u8> {
    let mut doc = Document::create(vec![], properties).unwrap();

    for i in 1..=count {
        let page = doc.new_page().unwrap();
        set_marker(&mut doc, page.id(), i as i64);
    }

    doc.close().unwrap()
}

/// Set the `/Marker` entry of the page dictionary `id`.
pub fn set_marker<W: std::io::Write>(doc: &mut Document<W>, id: ObjRef, value: i64) {
    doc.get_mut(id)
        .unwrap()
        .and_then(|o| o.as_dict_mut())
        .unwrap()
        .insert(b"Marker", value);
}

/// The `/Marker` entries of all pages, in page order.
pub fn markers<W: std::io::Write>(doc: &mut Document<W>) -> Vec<Option<i64>> {
    (1..=doc.page_count())
        .map(|n| {
            let id = doc.get_page(n).unwrap().id();
            doc.get(id)
                .unwrap()
                .and_then(Object::as_dict)
                .and_then(|d| d.get_i64(b"Marker"))
        })
        .collect()
}
