use crate::crypto::Encryptor;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Settings that apply when reading an existing file.
#[derive(Debug, Clone, Copy)]
pub struct ReaderSettings {
    /// The maximum number of slots the cross-reference table may hold.
    ///
    /// Files whose cross-reference sections declare more objects are rejected,
    /// and tables that would grow past this value while editing a document
    /// yield a resource-limit error.
    pub max_xref_size: usize,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            max_xref_size: 50_000_000,
        }
    }
}

/// Settings that control how a document is written.
#[derive(Clone)]
pub struct WriterProperties {
    /// Store eligible objects in object streams and write a cross-reference
    /// stream instead of a classic table.
    pub full_compression: bool,
    /// Compress streams that don't have a filter yet with `FlateDecode`.
    pub compress_streams: bool,
    /// Write an incremental update: the original bytes are kept and only
    /// modified objects are appended.
    pub append_mode: bool,
    /// Deduplicate objects copied from other documents by their content.
    pub smart_mode: bool,
    /// Write objects that are unreachable from the catalog instead of freeing
    /// them when the document is closed.
    pub flush_unused_objects: bool,
    /// The number of pages in a leaf of a newly generated page tree.
    pub leaf_size: usize,
    /// The number of objects stored in one object stream.
    pub object_stream_capacity: usize,
    /// The transform applied to strings and streams, if the output is encrypted.
    pub encryption: Option<Arc<dyn Encryptor + Send + Sync>>,
}

impl WriterProperties {
    /// Properties for an incremental update of an existing file.
    pub fn append() -> Self {
        Self {
            append_mode: true,
            ..Self::default()
        }
    }
}

impl Default for WriterProperties {
    fn default() -> Self {
        Self {
            full_compression: false,
            compress_streams: true,
            append_mode: false,
            smart_mode: false,
            flush_unused_objects: false,
            leaf_size: 10,
            object_stream_capacity: 200,
            encryption: None,
        }
    }
}

impl Debug for WriterProperties {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterProperties")
            .field("full_compression", &self.full_compression)
            .field("compress_streams", &self.compress_streams)
            .field("append_mode", &self.append_mode)
            .field("smart_mode", &self.smart_mode)
            .field("flush_unused_objects", &self.flush_unused_objects)
            .field("leaf_size", &self.leaf_size)
            .field("object_stream_capacity", &self.object_stream_capacity)
            .field("encryption", &self.encryption.is_some())
            .finish()
    }
}
