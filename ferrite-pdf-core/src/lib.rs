//! # ferrite-pdf
//!
//! A pure Rust PDF cross-reference resolver, indirect-object store and
//! parser front-end. Given a byte offset or an indirect reference, it
//! produces the parsed object, transparently following incremental
//! updates, hybrid xref streams, compressed object streams and (through a
//! pluggable authenticator) encryption.
//!
//! ## Reading a document
//!
//! ```rust,no_run
//! use ferrite_pdf::{parse, ParseOptions};
//! use std::fs::File;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let file = File::open("document.pdf")?;
//! let mut document = parse(file, ParseOptions::lenient())?;
//!
//! println!("version: {}", document.version());
//! println!("updates: {}", document.incremental_update_count());
//!
//! let catalog = document.trailer().root().expect("catalog reference");
//! let object = document.object(catalog)?;
//! println!("catalog: {:?}", object.value);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`parser`] - input device, tokenizer, object parser, xref resolver
//!   and the document front-end
//! - [`store`] - the indirect-object store with the PDF free-list
//!   protocol and reachability garbage collection
//! - [`error`] - the crate-wide error type with propagation frames
//!
//! Out of scope by design: rendering, fonts, content-stream painting, the
//! full filter set and cryptographic primitives. Filters beyond Flate and
//! encryption algorithms are external collaborators behind small
//! interfaces.

pub mod error;
pub mod parser;
pub mod store;

pub use error::{ErrorKind, PdfError, Result};
pub use parser::{
    parse, Authenticator, Decryptor, DocumentParser, EncryptSession, HybridPrecedence, Object,
    ObjectId, ParseOptions, ParseWarning, ParsedDocument, PasswordKind, PdfArray, PdfDictionary,
    PdfName, PdfObject, PdfStream, PdfString, PdfVersion, Permissions, StreamBody, StringFormat,
};
pub use parser::reader::parse_with_authenticator;
pub use store::{ObjectStore, StoreObserver};
