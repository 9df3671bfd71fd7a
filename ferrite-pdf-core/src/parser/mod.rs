//! PDF parser: input device, tokenizer, object parser, xref resolver and
//! the document front-end.
//!
//! The entry point is [`parse`] (or [`DocumentParser`] when authentication
//! retries or custom authenticators are needed). Parsing is synchronous and
//! single-threaded; parallel parses of distinct files are safe as long as
//! each owns its device, store and tokenizer.

pub mod encryption;
pub mod filters;
pub mod header;
pub mod input;
pub mod lexer;
pub mod object_stream;
pub mod objects;
pub mod reader;
pub mod stack_safe;
pub mod trailer;
pub mod xref;
pub mod xref_stream;

pub use self::encryption::{Authenticator, Decryptor, EncryptSession, PasswordKind, Permissions};
pub use self::header::PdfVersion;
pub use self::objects::{
    Object, ObjectId, PdfArray, PdfDictionary, PdfName, PdfObject, PdfStream, PdfString,
    StreamBody, StringFormat,
};
pub use self::reader::{parse, DocumentParser, ParsedDocument};
pub use self::stack_safe::DEFAULT_RECURSION_LIMIT;

use self::objects::ObjectId as Id;

/// Which side wins when a hybrid file's classical table and its `/XRefStm`
/// disagree about a slot. Committing happens in precedence order, so the
/// outcome does not depend on traversal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HybridPrecedence {
    /// The xref stream's entries shadow the classical ones (what PDF 1.5
    /// aware readers do).
    #[default]
    XRefStmWins,
    /// The classical table shadows the stream.
    TableWins,
}

/// Per-parse configuration. No global state: every knob travels here.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Abort on any deviation from the specification instead of degrading
    /// to warnings.
    pub strict: bool,
    /// Defer object and stream-body materialization until first access.
    pub load_on_demand: bool,
    /// Password tried during authentication (an empty password is tried
    /// when none is given).
    pub password: Option<Vec<u8>>,
    /// Allocation cap for object numbers.
    pub max_object_count: u32,
    /// Depth cap for every recursive descent.
    pub recursion_limit: u16,
    /// Free the slot of an unparsable object and continue instead of
    /// failing the parse (lenient mode only).
    pub ignore_broken_objects: bool,
    /// Fail when a section carries more entries than its `/Size` declares,
    /// instead of warning.
    pub reject_oversized_sections: bool,
    pub hybrid_precedence: HybridPrecedence,
    /// Collect [`ParseWarning`]s for later inspection.
    pub collect_warnings: bool,
}

impl ParseOptions {
    /// Spec-conforming input only; any deviation is an error.
    pub fn strict() -> Self {
        ParseOptions {
            strict: true,
            load_on_demand: false,
            password: None,
            max_object_count: crate::store::DEFAULT_OBJECT_CAP,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            ignore_broken_objects: false,
            reject_oversized_sections: false,
            hybrid_precedence: HybridPrecedence::default(),
            collect_warnings: false,
        }
    }

    /// Maximum compatibility: known deviations degrade to warnings.
    pub fn lenient() -> Self {
        ParseOptions {
            strict: false,
            ..Self::strict()
        }
    }

    pub fn with_password(mut self, password: impl Into<Vec<u8>>) -> Self {
        self.password = Some(password.into());
        self
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::lenient()
    }
}

/// A deviation recovered from in lenient mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseWarning {
    GarbageAfterEofMarker { offset: u64 },
    StartxrefMisspelled { offset: u64 },
    StartxrefOffsetInvalid { claimed: u64, recovered: u64 },
    MissingTrailerKeyword { offset: u64 },
    XRefSubsectionTruncated { expected: u32, parsed: u32 },
    XRefSizeMismatch { declared: i64, actual: u32 },
    XRefEntryTypeUnknown { object_number: u32, entry_type: u8 },
    XRefReconstructed { objects_found: u32 },
    InvalidPrevIgnored { value: i64 },
    InUseEntryTreatedAsFree { object_number: u32 },
    ObjectIdMismatch { expected: Id, found: Id },
    MissingEndobj { id: Id },
    BrokenObjectFreed { id: Id },
    StreamLengthMismatch { id: Id, declared: u64, actual: u64 },
    DictionaryKeyRedefined { key: String },
    UnterminatedString { offset: u64 },
    InvalidHexDigit { offset: u64, byte: u8 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_are_lenient() {
        let options = ParseOptions::default();
        assert!(!options.strict);
        assert_eq!(options.recursion_limit, DEFAULT_RECURSION_LIMIT);
        assert_eq!(options.max_object_count, crate::store::DEFAULT_OBJECT_CAP);
        assert_eq!(options.hybrid_precedence, HybridPrecedence::XRefStmWins);
    }

    #[test]
    fn test_strict_options() {
        let options = ParseOptions::strict();
        assert!(options.strict);
        assert!(!options.ignore_broken_objects);
    }

    #[test]
    fn test_with_password() {
        let options = ParseOptions::lenient().with_password(b"hunter2".to_vec());
        assert_eq!(options.password.as_deref(), Some(&b"hunter2"[..]));
    }
}
