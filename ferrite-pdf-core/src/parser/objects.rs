//! PDF value model and recursive-descent object parser.
//!
//! Values are materialized from the token stream produced by the lexer.
//! Streams only exist at indirect-object granularity, so the stream capture
//! lives in the indirect-object reader rather than in `read_value`.

use crate::error::{ErrorKind, PdfError, Result, ResultExt};
use crate::parser::lexer::{classify_number, Lexer, Number, TokenKind};
use crate::parser::stack_safe::ParseContext;
use crate::parser::ParseWarning;
use indexmap::IndexMap;
use std::fmt;
use std::io::{Read, Seek};

/// Generation numbers saturate here; a number whose generation reached this
/// value is never reused.
pub const MAX_GENERATION: u16 = 65535;

/// Identifier of an indirect object: `(object number, generation)`.
/// Ordering is lexicographic on the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId {
    number: u32,
    generation: u16,
}

impl ObjectId {
    /// Head of the free list.
    pub const FREE_LIST_HEAD: ObjectId = ObjectId {
        number: 0,
        generation: MAX_GENERATION,
    };

    pub const fn new(number: u32, generation: u16) -> Self {
        ObjectId { number, generation }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn generation(&self) -> u16 {
        self.generation
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R", self.number, self.generation)
    }
}

/// PDF name object (e.g. `/Type`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PdfName(pub String);

impl PdfName {
    pub fn new(name: impl Into<String>) -> Self {
        PdfName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for PdfName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Whether a string was written in literal or hexadecimal form. The flavor
/// is preserved so a later writer can round-trip it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringFormat {
    Literal,
    Hexadecimal,
}

/// PDF string object: raw bytes plus the source flavor.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfString {
    data: Vec<u8>,
    format: StringFormat,
}

impl PdfString {
    pub fn new(data: Vec<u8>, format: StringFormat) -> Self {
        PdfString { data, format }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn format(&self) -> StringFormat {
        self.format
    }

    pub fn as_str(&self) -> std::result::Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.data)
    }

    pub(crate) fn replace_data(&mut self, data: Vec<u8>) {
        self.data = data;
    }
}

/// PDF array object. Insertion order is preserved.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PdfArray(pub Vec<PdfObject>);

impl PdfArray {
    pub fn new() -> Self {
        PdfArray(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PdfObject> {
        self.0.get(index)
    }

    pub fn push(&mut self, object: PdfObject) {
        self.0.push(object);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PdfObject> {
        self.0.iter()
    }
}

/// PDF dictionary object. Keys are unique names; iteration order equals
/// insertion order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PdfDictionary(pub IndexMap<PdfName, PdfObject>);

impl PdfDictionary {
    pub fn new() -> Self {
        PdfDictionary(IndexMap::new())
    }

    pub fn get(&self, key: &str) -> Option<&PdfObject> {
        self.0.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut PdfObject> {
        self.0.get_mut(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: PdfObject) -> Option<PdfObject> {
        self.0.insert(PdfName(key.into()), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<PdfObject> {
        self.0.shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, PdfName, PdfObject> {
        self.0.iter()
    }

    /// Value of the `/Type` key, when present and a name.
    pub fn get_type(&self) -> Option<&str> {
        self.get("Type").and_then(|obj| obj.as_name()).map(|n| n.as_str())
    }
}

/// Stream body in its two load states. `Range` is the header-only state (a
/// byte span into the source device); the transition to `Owned` happens on
/// first body read and is monotonic.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamBody {
    Range { start: u64, end: u64 },
    Owned(Vec<u8>),
}

/// Stream attached to an indirect object. The header is the owning
/// dictionary's entries; only the body lives here.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfStream {
    pub body: StreamBody,
    /// Set when `/Length` was an indirect reference that still has to be
    /// resolved against the store on first read.
    pub deferred_length: bool,
}

impl PdfStream {
    pub fn is_loaded(&self) -> bool {
        matches!(self.body, StreamBody::Owned(_))
    }

    /// Byte length of the captured span or owned buffer.
    pub fn raw_len(&self) -> u64 {
        match &self.body {
            StreamBody::Range { start, end } => end.saturating_sub(*start),
            StreamBody::Owned(data) => data.len() as u64,
        }
    }
}

/// PDF value.
#[derive(Debug, Clone, PartialEq)]
pub enum PdfObject {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Name(PdfName),
    String(PdfString),
    Array(PdfArray),
    Dictionary(PdfDictionary),
    Reference(ObjectId),
    /// Opaque content-stream payload; never produced by the parser itself.
    Raw(Vec<u8>),
}

impl PdfObject {
    pub fn is_null(&self) -> bool {
        matches!(self, PdfObject::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PdfObject::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            PdfObject::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            PdfObject::Real(value) => Some(*value),
            PdfObject::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&PdfString> {
        match self {
            PdfObject::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&PdfName> {
        match self {
            PdfObject::Name(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&PdfArray> {
        match self {
            PdfObject::Array(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&PdfDictionary> {
        match self {
            PdfObject::Dictionary(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_dict_mut(&mut self) -> Option<&mut PdfDictionary> {
        match self {
            PdfObject::Dictionary(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<ObjectId> {
        match self {
            PdfObject::Reference(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_raw(&self) -> Option<&[u8]> {
        match self {
            PdfObject::Raw(data) => Some(data),
            _ => None,
        }
    }
}

/// An indirect object as held by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub id: ObjectId,
    pub value: PdfObject,
    pub stream: Option<PdfStream>,
    pub dirty: bool,
}

impl Object {
    pub fn new(id: ObjectId, value: PdfObject) -> Self {
        Object {
            id,
            value,
            stream: None,
            dirty: false,
        }
    }

    pub fn dict(&self) -> Option<&PdfDictionary> {
        self.value.as_dict()
    }

    pub fn is_stream(&self) -> bool {
        self.stream.is_some()
    }

    /// True for cross-reference stream objects, which are always parsed
    /// outside any encryption session.
    pub fn is_xref_stream(&self) -> bool {
        self.stream.is_some() && self.dict().and_then(PdfDictionary::get_type) == Some("XRef")
    }
}

/// Read one value from the token stream.
pub fn read_value<R: Read + Seek>(
    lexer: &mut Lexer<R>,
    ctx: &mut ParseContext,
) -> Result<PdfObject> {
    ctx.enter()?;
    let result = read_value_inner(lexer, ctx);
    ctx.exit();
    result
}

fn read_value_inner<R: Read + Seek>(
    lexer: &mut Lexer<R>,
    ctx: &mut ParseContext,
) -> Result<PdfObject> {
    let position = lexer.position();
    let (kind, literal) = match lexer.try_read_token()? {
        None => return Err(PdfError::with_message(ErrorKind::UnexpectedEof, "expected a value")),
        Some((TokenKind::Literal, view)) => (TokenKind::Literal, view.to_vec()),
        Some((kind, _)) => (kind, Vec::new()),
    };
    match kind {
        TokenKind::Slash => Ok(PdfObject::Name(lexer.read_name_body()?)),
        TokenKind::ParenOpen => Ok(PdfObject::String(lexer.read_literal_string_body()?)),
        TokenKind::AngleOpen => Ok(PdfObject::String(lexer.read_hex_string_body()?)),
        TokenKind::SquareOpen => read_array(lexer, ctx),
        TokenKind::DoubleAngleOpen => Ok(PdfObject::Dictionary(read_dictionary(lexer, ctx)?)),
        TokenKind::Literal => read_literal_value(lexer, &literal, position),
        other => Err(PdfError::with_message(
            ErrorKind::InvalidDataType,
            format!("unexpected {other:?} at offset {position}"),
        )),
    }
}

fn read_array<R: Read + Seek>(
    lexer: &mut Lexer<R>,
    ctx: &mut ParseContext,
) -> Result<PdfObject> {
    let mut elements = Vec::new();
    loop {
        match lexer.try_peek_token()? {
            None => {
                return Err(PdfError::with_message(
                    ErrorKind::UnexpectedEof,
                    "unterminated array",
                ))
            }
            Some((TokenKind::SquareClose, _)) => {
                lexer.try_read_token()?;
                break;
            }
            Some(_) => elements.push(read_value(lexer, ctx)?),
        }
    }
    Ok(PdfObject::Array(PdfArray(elements)))
}

/// Dictionary body; the opening `<<` is already consumed.
pub(crate) fn read_dictionary<R: Read + Seek>(
    lexer: &mut Lexer<R>,
    ctx: &mut ParseContext,
) -> Result<PdfDictionary> {
    let mut dict = PdfDictionary::new();
    loop {
        let kind = match lexer.try_read_token()? {
            None => {
                return Err(PdfError::with_message(
                    ErrorKind::UnexpectedEof,
                    "unterminated dictionary",
                ))
            }
            Some((kind, _)) => kind,
        };
        match kind {
            TokenKind::DoubleAngleClose => break,
            TokenKind::Slash => {
                let key = lexer.read_name_body()?;
                let value = read_value(lexer, ctx)
                    .frame(format!("value of /{}", key.as_str()))?;
                if dict.0.insert(key.clone(), value).is_some() {
                    lexer.warn(ParseWarning::DictionaryKeyRedefined {
                        key: key.as_str().to_string(),
                    });
                }
            }
            other => {
                return Err(PdfError::with_message(
                    ErrorKind::InvalidDataType,
                    format!("dictionary key must be a name, found {other:?}"),
                ));
            }
        }
    }
    Ok(dict)
}

fn read_literal_value<R: Read + Seek>(
    lexer: &mut Lexer<R>,
    literal: &[u8],
    position: u64,
) -> Result<PdfObject> {
    match literal {
        b"true" => return Ok(PdfObject::Boolean(true)),
        b"false" => return Ok(PdfObject::Boolean(false)),
        b"null" => return Ok(PdfObject::Null),
        _ => {}
    }
    match classify_number(literal) {
        Some(Number::Integer(value)) => {
            // `<int> <int> R` is an indirect reference; anything else rewinds.
            if (1..=u32::MAX as i64).contains(&value) {
                let saved = lexer.position();
                if let Some(id) = try_reference_tail(lexer, value as u32)? {
                    return Ok(PdfObject::Reference(id));
                }
                lexer.seek(saved)?;
            }
            Ok(PdfObject::Integer(value))
        }
        Some(Number::Real(value)) => Ok(PdfObject::Real(value)),
        None => Err(PdfError::with_message(
            ErrorKind::InvalidDataType,
            format!(
                "unexpected keyword '{}' at offset {position}",
                String::from_utf8_lossy(literal)
            ),
        )),
    }
}

fn try_reference_tail<R: Read + Seek>(
    lexer: &mut Lexer<R>,
    number: u32,
) -> Result<Option<ObjectId>> {
    let generation = match lexer.try_read_token()? {
        Some((TokenKind::Literal, view)) => match classify_number(view) {
            Some(Number::Integer(g)) if (0..=MAX_GENERATION as i64).contains(&g) => g as u16,
            _ => return Ok(None),
        },
        _ => return Ok(None),
    };
    let is_reference = matches!(
        lexer.try_read_token()?,
        Some((TokenKind::Literal, view)) if view == b"R"
    );
    Ok(is_reference.then(|| ObjectId::new(number, generation)))
}

/// Read an indirect object: `<num> <gen> obj … endobj`, with optional
/// stream capture. The body is recorded as a byte span; loading and
/// decryption happen on first read.
pub(crate) fn read_indirect_object<R: Read + Seek>(
    lexer: &mut Lexer<R>,
    ctx: &mut ParseContext,
    expected: Option<ObjectId>,
) -> Result<Object> {
    let strict = lexer.options().strict;
    let header_offset = lexer.position();
    let number = lexer
        .read_integer()
        .frame(format!("object header at offset {header_offset}"))?;
    if !(1..=u32::MAX as i64).contains(&number) {
        return Err(PdfError::with_message(
            ErrorKind::InvalidObject,
            format!("object number {number} out of range"),
        ));
    }
    let generation = lexer.read_integer().frame("object header generation")?;
    if !(0..=MAX_GENERATION as i64).contains(&generation) {
        return Err(PdfError::with_message(
            ErrorKind::InvalidObject,
            format!("generation {generation} out of range"),
        ));
    }
    let id = ObjectId::new(number as u32, generation as u16);
    if let Some(expected) = expected {
        if expected != id {
            if strict {
                return Err(PdfError::with_message(
                    ErrorKind::InvalidObject,
                    format!("expected {expected}, found {id}"),
                ));
            }
            lexer.warn(ParseWarning::ObjectIdMismatch { expected, found: id });
        }
    }
    let has_obj = matches!(
        lexer.try_read_token()?,
        Some((TokenKind::Literal, view)) if view == b"obj"
    );
    if !has_obj {
        return Err(PdfError::with_message(
            ErrorKind::InvalidObject,
            format!("missing 'obj' keyword for {id}"),
        ));
    }

    let value = read_value(lexer, ctx).frame(format!("body of {id}"))?;

    let mut stream = None;
    let at_stream = matches!(
        lexer.try_peek_token()?,
        Some((TokenKind::Literal, view)) if view == b"stream"
    );
    if at_stream {
        lexer.try_read_token()?;
        stream = Some(read_stream_extent(lexer, &value, id)?);
    }

    let at_endobj = matches!(
        lexer.try_peek_token()?,
        Some((TokenKind::Literal, view)) if view == b"endobj"
    );
    if at_endobj {
        lexer.try_read_token()?;
    } else if strict {
        return Err(PdfError::with_message(
            ErrorKind::InvalidObject,
            format!("missing 'endobj' after {id}"),
        ));
    } else {
        lexer.warn(ParseWarning::MissingEndobj { id });
    }

    Ok(Object {
        id,
        value,
        stream,
        dirty: false,
    })
}

fn read_stream_extent<R: Read + Seek>(
    lexer: &mut Lexer<R>,
    value: &PdfObject,
    id: ObjectId,
) -> Result<PdfStream> {
    let strict = lexer.options().strict;
    lexer.read_stream_eol()?;
    let start = lexer.position();
    let dict = value.as_dict().ok_or_else(|| {
        PdfError::with_message(ErrorKind::InvalidObject, format!("{id}: stream without dictionary"))
    })?;

    let (end, deferred_length) = match dict.get("Length") {
        Some(PdfObject::Integer(len)) if *len >= 0 => {
            let declared_end = start + *len as u64;
            lexer.seek(declared_end)?;
            let at_endstream = matches!(
                lexer.try_peek_token()?,
                Some((TokenKind::Literal, view)) if view == b"endstream"
            );
            if at_endstream {
                (declared_end, false)
            } else if strict {
                return Err(PdfError::with_message(
                    ErrorKind::InvalidObject,
                    format!("{id}: /Length {len} does not reach 'endstream'"),
                ));
            } else {
                let scanned = scan_endstream(lexer, start)?;
                lexer.warn(ParseWarning::StreamLengthMismatch {
                    id,
                    declared: *len as u64,
                    actual: scanned - start,
                });
                (scanned, false)
            }
        }
        Some(PdfObject::Reference(_)) => {
            // Resolution is deferred until first read; for now the span is
            // bounded by a lenient scan for the closing keyword.
            (scan_endstream(lexer, start)?, true)
        }
        other => {
            if strict {
                return Err(PdfError::with_message(
                    ErrorKind::InvalidObject,
                    format!("{id}: missing or non-numeric /Length ({other:?})"),
                ));
            }
            (scan_endstream(lexer, start)?, false)
        }
    };

    lexer.seek(end)?;
    let at_endstream = matches!(
        lexer.try_read_token()?,
        Some((TokenKind::Literal, view)) if view == b"endstream"
    );
    if !at_endstream {
        return Err(PdfError::with_message(
            ErrorKind::InvalidObject,
            format!("{id}: missing 'endstream'"),
        ));
    }

    Ok(PdfStream {
        body: StreamBody::Range { start, end },
        deferred_length,
    })
}

/// Find the end of a stream body by scanning for `endstream`; the end of
/// line framing the keyword is not part of the body.
fn scan_endstream<R: Read + Seek>(lexer: &mut Lexer<R>, start: u64) -> Result<u64> {
    lexer.seek(start)?;
    let found = lexer.find_sequence_forward(b"endstream")?.ok_or_else(|| {
        PdfError::with_message(ErrorKind::UnexpectedEof, "'endstream' not found")
    })?;
    let lookback = found.saturating_sub(2).max(start);
    let tail = lexer.input_mut().read_at(lookback, (found - lookback) as usize)?;
    let mut end = found;
    if tail.ends_with(b"\r\n") {
        end -= 2;
    } else if tail.ends_with(b"\n") || tail.ends_with(b"\r") {
        end -= 1;
    }
    Ok(end)
}
