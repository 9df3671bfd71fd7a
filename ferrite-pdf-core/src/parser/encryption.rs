//! Encryption gate.
//!
//! The core never implements cryptography. It validates the shape of the
//! encryption dictionary, then hands it to an [`Authenticator`] supplied by
//! the caller; the resulting session wraps each object with a per-reference
//! [`Decryptor`] used when strings and stream bodies are materialized. The
//! encryption dictionary itself and xref streams are always parsed
//! unencrypted.

use crate::error::{ErrorKind, PdfError, Result};
use crate::parser::objects::{ObjectId, PdfDictionary, PdfObject};
use bitflags::bitflags;

bitflags! {
    /// User-access permission bits from the encryption dictionary's `/P`
    /// value (bit positions per the standard security handler).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Permissions: u32 {
        const PRINT = 1 << 2;
        const MODIFY_CONTENTS = 1 << 3;
        const COPY_CONTENTS = 1 << 4;
        const MODIFY_ANNOTATIONS = 1 << 5;
        const FILL_FORMS = 1 << 8;
        const EXTRACT_FOR_ACCESSIBILITY = 1 << 9;
        const ASSEMBLE_DOCUMENT = 1 << 10;
        const PRINT_HIGH_QUALITY = 1 << 11;
    }
}

/// Which password unlocked the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordKind {
    Owner,
    User,
    Failed,
}

/// Per-object decryption handle produced by [`EncryptSession::wrap_object`].
pub trait Decryptor {
    fn decrypt_string(&self, data: &[u8]) -> Vec<u8>;
    fn decrypt_stream(&self, data: &[u8]) -> Vec<u8>;
}

/// An authenticated (or not yet authenticated) encryption session.
pub trait EncryptSession {
    /// Check a password against the document. May be called repeatedly
    /// with different passwords.
    fn authenticate(&mut self, password: &[u8], document_id: Option<&[u8]>) -> PasswordKind;

    /// Decryption handle for one indirect object.
    fn wrap_object(&self, id: ObjectId) -> Box<dyn Decryptor>;

    fn permissions(&self) -> Permissions {
        Permissions::all()
    }
}

/// External collaborator that turns an encryption dictionary into a
/// session. Implementations own all cryptographic primitives.
pub trait Authenticator {
    fn open_session(&self, encrypt: &PdfDictionary) -> Result<Box<dyn EncryptSession>>;
}

/// Fields of the standard encryption dictionary, validated by the core
/// before any authenticator sees them.
#[derive(Debug, Clone)]
pub struct EncryptionInfo {
    pub filter: String,
    pub version: i32,
    pub revision: i32,
    pub owner_hash: Vec<u8>,
    pub user_hash: Vec<u8>,
    pub permissions: Permissions,
    pub key_length: Option<i32>,
}

impl EncryptionInfo {
    pub fn from_dict(dict: &PdfDictionary) -> Result<Self> {
        let filter = dict
            .get("Filter")
            .and_then(PdfObject::as_name)
            .map(|name| name.as_str().to_string())
            .ok_or_else(|| {
                PdfError::with_message(ErrorKind::InvalidEncryptionDict, "missing /Filter")
            })?;

        let version = dict
            .get("V")
            .and_then(PdfObject::as_integer)
            .unwrap_or(0) as i32;

        let revision = dict
            .get("R")
            .and_then(PdfObject::as_integer)
            .ok_or_else(|| {
                PdfError::with_message(ErrorKind::InvalidEncryptionDict, "missing /R")
            })? as i32;

        let owner_hash = dict
            .get("O")
            .and_then(PdfObject::as_string)
            .map(|s| s.as_bytes().to_vec())
            .ok_or_else(|| {
                PdfError::with_message(ErrorKind::InvalidEncryptionDict, "missing /O")
            })?;

        let user_hash = dict
            .get("U")
            .and_then(PdfObject::as_string)
            .map(|s| s.as_bytes().to_vec())
            .ok_or_else(|| {
                PdfError::with_message(ErrorKind::InvalidEncryptionDict, "missing /U")
            })?;

        let permissions = dict
            .get("P")
            .and_then(PdfObject::as_integer)
            .map(|p| Permissions::from_bits_truncate(p as i32 as u32))
            .ok_or_else(|| {
                PdfError::with_message(ErrorKind::InvalidEncryptionDict, "missing /P")
            })?;

        let key_length = dict
            .get("Length")
            .and_then(PdfObject::as_integer)
            .map(|l| l as i32);

        Ok(EncryptionInfo {
            filter,
            version,
            revision,
            owner_hash,
            user_hash,
            permissions,
            key_length,
        })
    }
}

/// Walk a parsed value and decrypt every string in place.
pub(crate) fn decrypt_strings(value: &mut PdfObject, decryptor: &dyn Decryptor) {
    match value {
        PdfObject::String(string) => {
            let clear = decryptor.decrypt_string(string.as_bytes());
            string.replace_data(clear);
        }
        PdfObject::Array(array) => {
            for element in &mut array.0 {
                decrypt_strings(element, decryptor);
            }
        }
        PdfObject::Dictionary(dict) => {
            for (_, element) in dict.0.iter_mut() {
                decrypt_strings(element, decryptor);
            }
        }
        _ => {}
    }
}
