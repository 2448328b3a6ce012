use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// A cheaply cloneable container for the bytes of a PDF file.
#[derive(Clone)]
pub struct PdfData {
    inner: Arc<dyn AsRef<[u8]> + Send + Sync>,
}

impl Debug for PdfData {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "PdfData {{ {} bytes }}", self.as_ref().len())
    }
}

impl AsRef<[u8]> for PdfData {
    fn as_ref(&self) -> &[u8] {
        (*self.inner).as_ref()
    }
}

impl<T: AsRef<[u8]> + Send + Sync + 'static> From<Arc<T>> for PdfData {
    fn from(data: Arc<T>) -> Self {
        Self { inner: data }
    }
}

impl From<Vec<u8>> for PdfData {
    fn from(data: Vec<u8>) -> Self {
        Self {
            inner: Arc::new(data),
        }
    }
}

impl From<&'static [u8]> for PdfData {
    fn from(data: &'static [u8]) -> Self {
        Self {
            inner: Arc::new(data),
        }
    }
}
