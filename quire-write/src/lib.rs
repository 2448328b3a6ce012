/*!
A persistence engine for the indirect objects of PDF documents.

Objects are read lazily from an existing file, tracked through a small
lifecycle (loaded, modified, flushed, released or freed), and written
either as a complete new file or as an incremental update appended to the
original bytes. Written objects are dropped from memory, so large
documents can be processed page by page.

# Example
```
use quire_write::{Document, ReaderSettings, WriterProperties};

let mut doc = Document::create(vec![], WriterProperties::default()).unwrap();
doc.new_page().unwrap();
doc.flush_page_deep(1).unwrap();
let pdf = doc.close().unwrap();

let doc = Document::open(pdf, ReaderSettings::default()).unwrap();
assert_eq!(doc.page_count(), 1);
```
*/

#![forbid(unsafe_code)]

mod copy;
mod crypto;
mod document;
mod error;
mod pages;
mod settings;
mod state;
mod store;
mod traversal;
mod writer;
pub mod xref;

pub use crypto::{EncryptionTarget, Encryptor};
pub use document::Document;
pub use error::{Error, Result};
pub use pages::Page;
pub use settings::{ReaderSettings, WriterProperties};
pub use state::Lifecycle;
pub use traversal::Policy;
pub use xref::{DocumentId, IndirectReference, Location, MAX_GENERATION, XRefTable};

pub use quire_syntax::PdfData;
pub use quire_syntax::object::{ObjRef, Object};
