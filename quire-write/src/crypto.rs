//! The hook through which output can be encrypted.
//!
//! The cipher itself is not part of this crate. An [`Encryptor`] is handed the
//! plaintext of every string and stream together with the id of the indirect
//! object that contains it, which is all that the standard security handlers
//! need to derive their per-object keys.

use quire_syntax::object::{Dict, ObjRef, Object};

/// What kind of data is being encrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionTarget {
    /// The bytes of a string object.
    String,
    /// The (already compressed) data of a stream.
    Stream,
}

/// A transform applied to strings and stream data before they are written.
pub trait Encryptor {
    /// Encrypt `data`, which belongs to the indirect object `id`.
    fn encrypt(&self, id: ObjRef, target: EncryptionTarget, data: &[u8]) -> Vec<u8>;

    /// The encryption dictionary referenced by the trailer's `/Encrypt` entry.
    fn encryption_dict(&self) -> Option<Dict> {
        None
    }
}

/// Encrypt all strings contained in `object`, descending through direct containers.
pub(crate) fn encrypt_strings(object: &mut Object, id: ObjRef, encryptor: &dyn Encryptor) {
    match object {
        Object::String(s) => {
            let encrypted = encryptor.encrypt(id, EncryptionTarget::String, s.get());
            s.set(encrypted);
        }
        Object::Array(a) => a
            .iter_mut()
            .for_each(|o| encrypt_strings(o, id, encryptor)),
        Object::Dict(d) => d
            .iter_mut()
            .for_each(|(_, o)| encrypt_strings(o, id, encryptor)),
        Object::Stream(s) => s
            .dict_mut()
            .iter_mut()
            .for_each(|(_, o)| encrypt_strings(o, id, encryptor)),
        _ => {}
    }
}
