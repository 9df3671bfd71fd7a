//! Document front-end.
//!
//! [`DocumentParser`] drives the structural phases (header, xref chain,
//! effective trailer, encryption setup) and loads objects into the store;
//! [`ParsedDocument`] is the caller-facing result. A failed password
//! attempt leaves the structural state intact, so authentication can be
//! retried without re-reading the xref.

use crate::error::{ErrorKind, PdfError, Result, ResultExt};
use crate::parser::encryption::{decrypt_strings, Authenticator, EncryptSession, PasswordKind, Permissions};
use crate::parser::header::{parse_header, PdfHeader, PdfVersion};
use crate::parser::input::PdfInput;
use crate::parser::lexer::Lexer;
use crate::parser::object_stream::ObjectStreamReader;
use crate::parser::objects::{
    read_indirect_object, Object, ObjectId, PdfDictionary, PdfObject, StreamBody, MAX_GENERATION,
};
use crate::parser::stack_safe::ParseContext;
use crate::parser::trailer::Trailer;
use crate::parser::xref::{XRefEntryKind, XRefParser, XRefTable};
use crate::parser::{filters, ParseOptions, ParseWarning};
use crate::store::ObjectStore;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

/// Parse a document from any random-access device.
pub fn parse<R: Read + Seek>(device: R, options: ParseOptions) -> Result<ParsedDocument<R>> {
    let mut parser = DocumentParser::new(device, options)?;
    parser.parse()?;
    Ok(parser.into_document())
}

/// Like [`parse`], with an authenticator for encrypted documents.
pub fn parse_with_authenticator<R: Read + Seek>(
    device: R,
    options: ParseOptions,
    authenticator: Box<dyn Authenticator>,
) -> Result<ParsedDocument<R>> {
    let mut parser = DocumentParser::new(device, options)?.with_authenticator(authenticator);
    parser.parse()?;
    Ok(parser.into_document())
}

/// Phased document parser. Construction performs the structural parse;
/// [`DocumentParser::parse`] authenticates and populates the store.
pub struct DocumentParser<R: Read + Seek> {
    lexer: Lexer<R>,
    options: ParseOptions,
    header: PdfHeader,
    table: XRefTable,
    trailer: Trailer,
    incremental_updates: u32,
    uses_xref_streams: bool,
    reconstructed: bool,
    store: ObjectStore,
    object_streams: HashMap<u32, ObjectStreamReader>,
    authenticator: Option<Box<dyn Authenticator>>,
    encrypt_dict: Option<PdfDictionary>,
    encrypt_id: Option<ObjectId>,
    session: Option<Box<dyn EncryptSession>>,
    authenticated: bool,
    populated: bool,
}

impl<R: Read + Seek> std::fmt::Debug for DocumentParser<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentParser").finish_non_exhaustive()
    }
}

impl DocumentParser<File> {
    pub fn open<P: AsRef<Path>>(path: P, options: ParseOptions) -> Result<Self> {
        Self::new(File::open(path)?, options)
    }
}

impl<R: Read + Seek> DocumentParser<R> {
    /// Structural parse: header, xref chain, effective trailer and the
    /// encryption dictionary. No object content is materialized yet.
    pub fn new(device: R, options: ParseOptions) -> Result<Self> {
        let input = PdfInput::new(device)?;
        if input.size() == 0 {
            return Err(PdfError::with_message(ErrorKind::InvalidPdf, "empty file"));
        }
        let mut input = input;
        let header = parse_header(&mut input)?;
        let mut lexer = Lexer::new(input, options.clone());

        let outcome = match XRefParser::new(&mut lexer, header.magic_offset)
            .read_document_structure()
        {
            Ok(outcome) => outcome,
            Err(err) => {
                if options.strict {
                    return Err(err);
                }
                tracing::warn!(%err, "xref walk failed, reconstructing");
                match XRefParser::new(&mut lexer, header.magic_offset).reconstruct() {
                    Ok(outcome) => outcome,
                    // The original failure is the interesting one.
                    Err(_) => return Err(err.push_frame("reconstruction failed as well")),
                }
            }
        };

        let store = ObjectStore::with_object_cap(options.max_object_count);
        let mut parser = DocumentParser {
            lexer,
            options,
            header,
            table: outcome.table,
            trailer: outcome.trailer,
            incremental_updates: outcome.incremental_updates,
            uses_xref_streams: outcome.uses_xref_streams,
            reconstructed: outcome.reconstructed,
            store,
            object_streams: HashMap::new(),
            authenticator: None,
            encrypt_dict: None,
            encrypt_id: None,
            session: None,
            authenticated: false,
            populated: false,
        };

        if parser.options.strict {
            parser.trailer.validate()?;
        }
        parser.seed_store_from_table();
        parser.setup_encryption()?;
        Ok(parser)
    }

    pub fn with_authenticator(mut self, authenticator: Box<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    pub fn set_password(&mut self, password: impl Into<Vec<u8>>) {
        self.options.password = Some(password.into());
    }

    /// Authenticate (when encrypted) and populate the store. On
    /// `InvalidPassword` all structural state survives: set a new password
    /// and call again. Any other failure resets the store to empty.
    pub fn parse(&mut self) -> Result<()> {
        match self.parse_inner() {
            Ok(()) => Ok(()),
            Err(err) => {
                if !err.is_recoverable() {
                    self.store.clear();
                    self.object_streams.clear();
                    self.populated = false;
                    self.seed_store_from_table();
                }
                Err(err)
            }
        }
    }

    fn parse_inner(&mut self) -> Result<()> {
        if self.encrypt_dict.is_some() && !self.authenticated {
            let password = self.options.password.clone().unwrap_or_default();
            self.authenticate(&password)?;
        }
        if !self.populated && !self.options.load_on_demand {
            self.populate_store()?;
        }
        self.populated = true;
        Ok(())
    }

    /// Try a password against the document. Returns which password class
    /// matched; `Failed` becomes the recoverable `InvalidPassword`.
    pub fn authenticate(&mut self, password: &[u8]) -> Result<PasswordKind> {
        let Some(encrypt_dict) = self.encrypt_dict.clone() else {
            return Ok(PasswordKind::Owner);
        };
        if self.session.is_none() {
            let authenticator = self.authenticator.as_ref().ok_or_else(|| {
                PdfError::with_message(
                    ErrorKind::InvalidEncryptionDict,
                    "document is encrypted and no authenticator is installed",
                )
            })?;
            self.session = Some(authenticator.open_session(&encrypt_dict)?);
        }
        let document_id = self.trailer.document_id().map(|id| id.to_vec());
        let session = self.session.as_mut().ok_or_else(|| {
            PdfError::new(ErrorKind::InternalLogic)
        })?;
        match session.authenticate(password, document_id.as_deref()) {
            PasswordKind::Failed => Err(PdfError::with_message(
                ErrorKind::InvalidPassword,
                "neither user nor owner password matched",
            )),
            kind => {
                self.authenticated = true;
                Ok(kind)
            }
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypt_dict.is_some()
    }

    pub fn into_document(self) -> ParsedDocument<R> {
        ParsedDocument { parser: self }
    }

    fn seed_store_from_table(&mut self) {
        if !self.table.is_empty() {
            self.store.bump_max_object(self.table.len() as u32 - 1);
        }
        let free_entries: Vec<(u32, u32, u16)> = self
            .table
            .iter()
            .filter_map(|(number, kind)| match kind {
                XRefEntryKind::Free {
                    next_free,
                    next_generation,
                } => Some((number, *next_free, *next_generation)),
                _ => None,
            })
            .collect();
        for (number, _, next_generation) in free_entries {
            if number == 0 {
                continue;
            }
            if next_generation >= MAX_GENERATION {
                self.store.retire(number);
            } else {
                self.store.add_free(ObjectId::new(number, next_generation));
            }
        }
    }

    /// Resolve the trailer's `/Encrypt` entry. The encryption dictionary
    /// itself is always parsed unencrypted.
    fn setup_encryption(&mut self) -> Result<()> {
        let Some(encrypt) = self.trailer.encrypt().cloned() else {
            return Ok(());
        };
        let dict = match encrypt {
            PdfObject::Dictionary(dict) => dict,
            PdfObject::Reference(id) => {
                self.encrypt_id = Some(id);
                self.ensure_loaded(id).frame("loading /Encrypt")?;
                self.store
                    .must_get(id)?
                    .dict()
                    .cloned()
                    .ok_or_else(|| {
                        PdfError::with_message(
                            ErrorKind::InvalidEncryptionDict,
                            format!("/Encrypt {id} is not a dictionary"),
                        )
                    })?
            }
            other => {
                return Err(PdfError::with_message(
                    ErrorKind::InvalidEncryptionDict,
                    format!("/Encrypt is {other:?}"),
                ));
            }
        };
        // Shape check happens here so a broken dictionary surfaces before
        // any authenticator runs.
        crate::parser::encryption::EncryptionInfo::from_dict(&dict)?;
        self.encrypt_dict = Some(dict);
        Ok(())
    }

    fn decryption_active(&self) -> bool {
        self.session.is_some() && self.authenticated
    }

    /// Materialize every in-use and compressed entry of the table.
    fn populate_store(&mut self) -> Result<()> {
        let entries: Vec<(u32, XRefEntryKind)> = self
            .table
            .iter()
            .map(|(number, kind)| (number, *kind))
            .collect();
        for (number, kind) in entries {
            let result = match kind {
                XRefEntryKind::Free { .. } => continue,
                XRefEntryKind::InUse { offset, generation } => {
                    if self.store.contains(ObjectId::new(number, generation)) {
                        continue;
                    }
                    self.load_object_at(number, generation, offset)
                }
                XRefEntryKind::Compressed {
                    stream_number,
                    index,
                } => {
                    if self.store.contains(ObjectId::new(number, 0)) {
                        continue;
                    }
                    self.load_compressed(number, stream_number, index)
                }
            };
            if let Err(err) = result {
                if !self.options.strict && self.options.ignore_broken_objects {
                    let id = ObjectId::new(number, 0);
                    self.lexer.warn(ParseWarning::BrokenObjectFreed { id });
                    self.table.overwrite(
                        number,
                        XRefEntryKind::Free {
                            next_free: 0,
                            next_generation: 0,
                        },
                    );
                    continue;
                }
                return Err(err.push_frame(format!("loading object {number}")));
            }
        }
        self.populated = true;
        Ok(())
    }

    /// Make sure an object is present in the store, loading it through its
    /// xref entry if needed.
    fn ensure_loaded(&mut self, id: ObjectId) -> Result<()> {
        if self.store.contains(id) {
            return Ok(());
        }
        // A number freed after parsing (removal, garbage collection) stays
        // freed; the xref entry does not resurrect it.
        if self.store.is_free(id.number()) || self.store.is_unavailable(id.number()) {
            return Err(PdfError::with_message(
                ErrorKind::ObjectNotFound,
                format!("{id} has been freed"),
            ));
        }
        let kind = self.table.get(id.number()).copied().ok_or_else(|| {
            PdfError::with_message(
                ErrorKind::ObjectNotFound,
                format!("{id} has no cross-reference entry"),
            )
        })?;
        match kind {
            XRefEntryKind::Free { .. } => Err(PdfError::with_message(
                ErrorKind::ObjectNotFound,
                format!("{id} is free"),
            )),
            XRefEntryKind::InUse { offset, generation } => {
                if generation != id.generation() {
                    return Err(PdfError::with_message(
                        ErrorKind::ObjectNotFound,
                        format!(
                            "{id}: entry carries generation {generation}"
                        ),
                    ));
                }
                self.load_object_at(id.number(), generation, offset)
            }
            XRefEntryKind::Compressed {
                stream_number,
                index,
            } => {
                if id.generation() != 0 {
                    return Err(PdfError::with_message(
                        ErrorKind::ObjectNotFound,
                        format!("{id}: compressed objects have generation 0"),
                    ));
                }
                self.load_compressed(id.number(), stream_number, index)?;
                if !self.store.contains(id) {
                    return Err(PdfError::with_message(
                        ErrorKind::ObjectNotFound,
                        format!("{id} is not the object stored at its stream slot"),
                    ));
                }
                Ok(())
            }
        }
    }

    fn load_object_at(&mut self, number: u32, generation: u16, offset: u64) -> Result<()> {
        let expected = ObjectId::new(number, generation);
        self.lexer.seek(offset)?;
        let mut ctx = ParseContext::new(self.options.recursion_limit);
        let mut object = read_indirect_object(&mut self.lexer, &mut ctx, Some(expected))
            .frame(format!("object {expected} at offset {offset}"))?;

        if self.decryption_active()
            && Some(object.id) != self.encrypt_id
            && !object.is_xref_stream()
        {
            if let Some(session) = self.session.as_ref() {
                let decryptor = session.wrap_object(object.id);
                decrypt_strings(&mut object.value, &*decryptor);
            }
        }

        let id = object.id;
        let has_stream = object.stream.is_some();
        self.store.push(object);
        // Mutation bookkeeping: a freshly parsed object is clean.
        if let Some(stored) = self.store.get_mut_untracked(id) {
            stored.dirty = false;
        }
        if has_stream && !self.options.load_on_demand {
            self.stream_bytes(id)?;
        }
        Ok(())
    }

    /// Expand one compressed entry out of its object stream.
    fn load_compressed(&mut self, number: u32, stream_number: u32, index: u32) -> Result<()> {
        let container_id = ObjectId::new(stream_number, 0);
        if !self.object_streams.contains_key(&stream_number) {
            self.ensure_loaded(container_id)
                .frame(format!("object stream container {stream_number}"))?;
            let body = self.stream_bytes(container_id)?;
            let dict = self
                .store
                .must_get(container_id)?
                .dict()
                .cloned()
                .ok_or_else(|| {
                    PdfError::with_message(
                        ErrorKind::InvalidObject,
                        format!("container {container_id} has no dictionary"),
                    )
                })?;
            let decoded = filters::decode_stream(&body, &dict, &self.options)
                .frame(format!("decoding object stream {stream_number}"))?;
            let reader = ObjectStreamReader::new(&dict, decoded, &self.options)?;
            self.store.add_compressed_stream(stream_number);
            self.object_streams.insert(stream_number, reader);
        }

        let reader = self.object_streams.get(&stream_number).ok_or_else(|| {
            PdfError::new(ErrorKind::InternalLogic)
        })?;
        let mut ctx = ParseContext::new(self.options.recursion_limit);
        let (member_number, value) = reader.read_at(index, &mut ctx)?;
        if member_number != number {
            if self.options.strict {
                return Err(PdfError::with_message(
                    ErrorKind::InvalidObject,
                    format!(
                        "stream {stream_number} index {index} holds object {member_number}, expected {number}"
                    ),
                ));
            }
            self.lexer.warn(ParseWarning::ObjectIdMismatch {
                expected: ObjectId::new(number, 0),
                found: ObjectId::new(member_number, 0),
            });
        }
        // Members always live at generation 0.
        let id = ObjectId::new(member_number, 0);
        self.store.push(Object {
            id,
            value,
            stream: None,
            dirty: false,
        });
        Ok(())
    }

    /// Raw stream body of an object, decrypted, with the Range to Owned
    /// transition applied. Resolves a deferred `/Length` on the way.
    fn stream_bytes(&mut self, id: ObjectId) -> Result<Vec<u8>> {
        self.ensure_loaded(id)?;
        let (range, deferred) = {
            let object = self.store.must_get(id)?;
            let stream = object.stream.as_ref().ok_or_else(|| {
                PdfError::with_message(
                    ErrorKind::InvalidDataType,
                    format!("{id} has no stream"),
                )
            })?;
            match &stream.body {
                StreamBody::Owned(data) => return Ok(data.clone()),
                StreamBody::Range { start, end } => ((*start, *end), stream.deferred_length),
            }
        };

        let (start, mut end) = range;
        if deferred {
            if let Some(resolved) = self.resolve_deferred_length(id)? {
                let declared_end = start.saturating_add(resolved);
                if declared_end <= end {
                    end = declared_end;
                } else {
                    self.lexer.warn(ParseWarning::StreamLengthMismatch {
                        id,
                        declared: resolved,
                        actual: end - start,
                    });
                }
            }
        }

        let bytes = self
            .lexer
            .input_mut()
            .read_at(start, (end - start) as usize)?;
        let is_xref_stream = self
            .store
            .must_get(id)
            .map(|object| object.is_xref_stream())
            .unwrap_or(false);
        let bytes = if self.decryption_active() && Some(id) != self.encrypt_id && !is_xref_stream
        {
            match self.session.as_ref() {
                Some(session) => session.wrap_object(id).decrypt_stream(&bytes),
                None => bytes,
            }
        } else {
            bytes
        };

        if let Some(object) = self.store.get_mut_untracked(id) {
            if let Some(stream) = object.stream.as_mut() {
                stream.body = StreamBody::Owned(bytes.clone());
                stream.deferred_length = false;
            }
        }
        Ok(bytes)
    }

    /// `/Length` given as a reference: resolve it against the store on
    /// first read.
    fn resolve_deferred_length(&mut self, id: ObjectId) -> Result<Option<u64>> {
        let length_ref = self
            .store
            .must_get(id)?
            .dict()
            .and_then(|dict| dict.get("Length"))
            .and_then(PdfObject::as_reference);
        let Some(length_ref) = length_ref else {
            return Ok(None);
        };
        if length_ref == id {
            return Err(PdfError::with_message(
                ErrorKind::InvalidObject,
                format!("{id}: /Length references its own stream"),
            ));
        }
        match self.ensure_loaded(length_ref) {
            Ok(()) => {}
            Err(err) => {
                if self.options.strict {
                    return Err(err.push_frame(format!("{id}: resolving /Length")));
                }
                return Ok(None);
            }
        }
        let length = self
            .store
            .must_get(length_ref)?
            .value
            .as_integer()
            .filter(|len| *len >= 0);
        match length {
            Some(len) => Ok(Some(len as u64)),
            None if self.options.strict => Err(PdfError::with_message(
                ErrorKind::InvalidDataType,
                format!("{id}: /Length target is not a non-negative integer"),
            )),
            None => Ok(None),
        }
    }
}

/// A parsed document: the store plus everything the xref walk learned.
pub struct ParsedDocument<R: Read + Seek> {
    parser: DocumentParser<R>,
}

impl<R: Read + Seek> std::fmt::Debug for ParsedDocument<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsedDocument").finish_non_exhaustive()
    }
}

impl<R: Read + Seek> ParsedDocument<R> {
    /// Immutable view of the object store.
    pub fn store(&self) -> &ObjectStore {
        &self.parser.store
    }

    pub fn store_mut(&mut self) -> &mut ObjectStore {
        &mut self.parser.store
    }

    /// Resolve a reference, loading on demand. The returned borrow is
    /// valid until the next mutating call on this document.
    pub fn object(&mut self, id: ObjectId) -> Result<&Object> {
        self.parser.ensure_loaded(id)?;
        self.parser.store.must_get(id)
    }

    /// Hand the effective trailer dictionary to the caller.
    pub fn take_trailer(&mut self) -> PdfDictionary {
        std::mem::take(&mut self.parser.trailer).take()
    }

    pub fn trailer(&self) -> &Trailer {
        &self.parser.trailer
    }

    pub fn version(&self) -> PdfVersion {
        self.parser.header.version
    }

    pub fn incremental_update_count(&self) -> u32 {
        self.parser.incremental_updates
    }

    pub fn uses_xref_streams(&self) -> bool {
        self.parser.uses_xref_streams
    }

    pub fn was_reconstructed(&self) -> bool {
        self.parser.reconstructed
    }

    pub fn is_encrypted(&self) -> bool {
        self.parser.is_encrypted()
    }

    /// Permission bits granted by the encryption session; full access for
    /// unencrypted documents.
    pub fn permissions(&self) -> Permissions {
        self.parser
            .session
            .as_ref()
            .map(|session| session.permissions())
            .unwrap_or(Permissions::all())
    }

    pub fn warnings(&self) -> &[ParseWarning] {
        self.parser.lexer.warnings()
    }

    /// Raw (undecoded) stream body, decrypted and cached.
    pub fn stream_data(&mut self, id: ObjectId) -> Result<Vec<u8>> {
        self.parser.stream_bytes(id)
    }

    /// Stream body after the `/Filter` chain.
    pub fn decoded_stream_data(&mut self, id: ObjectId) -> Result<Vec<u8>> {
        let bytes = self.parser.stream_bytes(id)?;
        let dict = self
            .parser
            .store
            .must_get(id)?
            .dict()
            .cloned()
            .unwrap_or_default();
        filters::decode_stream(&bytes, &dict, &self.parser.options)
            .frame(format!("decoding stream of {id}"))
    }

    /// Free every object unreachable from the trailer.
    pub fn collect_garbage(&mut self) -> Result<usize> {
        let trailer = self.parser.trailer.dict().clone();
        self.parser
            .store
            .collect_garbage(&trailer, self.parser.options.recursion_limit)
    }

    /// Byte offset bounding the revision that starts at `offset`: the
    /// lowest in-use offset of that revision's entries.
    pub fn previous_revision_eof(&mut self, offset: u64) -> Result<Option<u64>> {
        let magic_offset = self.parser.header.magic_offset;
        let outcome =
            XRefParser::new(&mut self.parser.lexer, magic_offset).read_revision(offset)?;
        Ok(outcome.table.min_in_use_offset())
    }
}
