/*!
The syntax layer of quire: an owned PDF object model, a parser for objects and
cross-reference sections, and a serializer that writes objects back.

This crate knows nothing about object lifecycles or incremental saving. It
reads what a file contains and writes what it is given; `quire-write` builds
the document model on top of it.

# Example
```
use quire_syntax::object::{Dict, Object};
use quire_syntax::reader::Readable;
use quire_syntax::write::display;

let dict = Dict::from_bytes(b"<< /Type /Page /Rotate 90 >>").unwrap();
assert_eq!(dict.get_i64(b"Rotate"), Some(90));
assert_eq!(display(&Object::Dict(dict)), "<</Rotate 90 /Type /Page>>");
```
*/

#![forbid(unsafe_code)]

mod data;
pub mod filter;
#[allow(missing_docs)]
pub mod object;
#[allow(missing_docs)]
pub mod reader;
mod trivia;
mod util;
#[allow(missing_docs)]
pub mod write;
pub mod xref;

pub use data::PdfData;
pub use util::OptionLog;
