//! Effective trailer dictionary.
//!
//! Each revision of an incrementally updated file carries its own trailer.
//! The effective trailer is their newest-first merge: walking revisions
//! newest to oldest, a key is copied only if no newer revision already
//! supplied it.

use crate::error::{ErrorKind, PdfError, Result};
use crate::parser::objects::{ObjectId, PdfDictionary, PdfObject};

/// Keys that take part in the newest-first merge. `Prev` and `XRefStm`
/// steer traversal and never land in the effective dictionary.
const MERGED_KEYS: [&str; 5] = ["Size", "Root", "Encrypt", "Info", "ID"];

/// The merged trailer of all revisions.
#[derive(Debug, Clone, Default)]
pub struct Trailer {
    dict: PdfDictionary,
}

impl Trailer {
    pub fn new() -> Self {
        Trailer {
            dict: PdfDictionary::new(),
        }
    }

    /// Merge one revision's trailer, newest first: only keys not yet
    /// present are copied.
    pub fn merge_newest_first(&mut self, revision: &PdfDictionary) {
        for key in MERGED_KEYS {
            if !self.dict.contains_key(key) {
                if let Some(value) = revision.get(key) {
                    self.dict.insert(key, value.clone());
                }
            }
        }
    }

    pub fn dict(&self) -> &PdfDictionary {
        &self.dict
    }

    /// Hand the merged dictionary to the caller.
    pub fn take(self) -> PdfDictionary {
        self.dict
    }

    pub fn size(&self) -> Option<i64> {
        self.dict.get("Size").and_then(PdfObject::as_integer)
    }

    pub fn root(&self) -> Option<ObjectId> {
        self.dict.get("Root").and_then(PdfObject::as_reference)
    }

    pub fn info(&self) -> Option<ObjectId> {
        self.dict.get("Info").and_then(PdfObject::as_reference)
    }

    pub fn is_encrypted(&self) -> bool {
        self.dict.contains_key("Encrypt")
    }

    pub fn encrypt(&self) -> Option<&PdfObject> {
        self.dict.get("Encrypt")
    }

    /// First element of the `/ID` array, used as the document identifier
    /// during authentication.
    pub fn document_id(&self) -> Option<&[u8]> {
        self.dict
            .get("ID")
            .and_then(PdfObject::as_array)
            .and_then(|array| array.get(0))
            .and_then(PdfObject::as_string)
            .map(|s| s.as_bytes())
    }

    /// `Size` and `Root` are mandatory in a conforming file.
    pub fn validate(&self) -> Result<()> {
        if self.size().is_none() {
            return Err(PdfError::with_message(
                ErrorKind::InvalidTrailer,
                "missing /Size",
            ));
        }
        if self.root().is_none() {
            return Err(PdfError::with_message(
                ErrorKind::InvalidTrailer,
                "missing /Root",
            ));
        }
        Ok(())
    }
}
