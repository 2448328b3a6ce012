//! Error types for document operations.

use quire_syntax::object::ObjRef;
use quire_syntax::xref::XRefError;
use std::fmt;

/// A specialized [`Result`] type for document operations.
pub type Result<T> = core::result::Result<T, Error>;

/// An error encountered while reading, modifying or writing a document.
#[derive(Debug)]
pub enum Error {
    /// The source file could not be read.
    InvalidFile(XRefError),
    /// A structural requirement of the file format was violated.
    InvalidStructure(&'static str),
    /// The page tree is malformed, detected while loading the given 1-based page.
    InvalidPageStructure(usize),
    /// A page number outside of `1..=count` was requested.
    PageOutOfBounds {
        /// The requested page.
        page: usize,
        /// The number of pages in the document.
        count: usize,
    },
    /// The object was already written and is no longer accessible.
    NotAvailable(ObjRef),
    /// A snapshot returned by `release` was passed where a writable object
    /// is needed.
    ReadOnly,
    /// The operation needs a document that was opened for writing.
    NoWriter,
    /// The cross-reference table would grow beyond the configured limit.
    ResourceLimit {
        /// The number of slots that were requested.
        requested: usize,
        /// The configured maximum.
        limit: usize,
    },
    /// An object was written at an offset that can't be expressed in a
    /// cross-reference table.
    OffsetTooLarge(u64),
    /// The output sink failed.
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFile(e) => write!(f, "invalid file: {e}"),
            Self::InvalidStructure(what) => write!(f, "invalid document structure: {what}"),
            Self::InvalidPageStructure(page) => {
                write!(f, "invalid page tree structure while loading page {page}")
            }
            Self::PageOutOfBounds { page, count } => {
                write!(f, "requested page {page}, but the document has {count} pages")
            }
            Self::NotAvailable(r) => write!(f, "object {r} was already flushed"),
            Self::ReadOnly => f.write_str("released objects are read-only"),
            Self::NoWriter => f.write_str("document was not opened for writing"),
            Self::ResourceLimit { requested, limit } => write!(
                f,
                "cross-reference table size {requested} exceeds the limit of {limit}"
            ),
            Self::OffsetTooLarge(offset) => {
                write!(f, "offset {offset} does not fit into a cross-reference table")
            }
            Self::Io(e) => write!(f, "i/o error: {e}"),
        }
    }
}

impl core::error::Error for Error {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::InvalidFile(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<XRefError> for Error {
    fn from(e: XRefError) -> Self {
        match e {
            XRefError::TooManyObjects { declared, limit } => Self::ResourceLimit {
                requested: usize::try_from(declared).unwrap_or(usize::MAX),
                limit,
            },
            other => Self::InvalidFile(other),
        }
    }
}
