//! Cross-reference table and the xref section parser.
//!
//! The parser starts at the `startxref` anchor near the end of the file and
//! walks the `Prev` chain newest-first, merging classical tables and xref
//! streams into one entry table. A slot written by a newer revision shadows
//! every older one, which with newest-first traversal means the first
//! writer wins.

use crate::error::{ErrorKind, PdfError, Result, ResultExt};
use crate::parser::header::{find_subsequence, rfind_subsequence};
use crate::parser::lexer::{Lexer, TokenKind};
use crate::parser::objects::{
    read_dictionary, read_indirect_object, PdfDictionary, PdfObject, StreamBody, MAX_GENERATION,
};
use crate::parser::stack_safe::ParseContext;
use crate::parser::trailer::Trailer;
use crate::parser::{filters, object_stream, xref_stream};
use crate::parser::{HybridPrecedence, ParseOptions, ParseWarning};
use std::collections::HashSet;
use std::io::{Read, Seek};

/// A classical xref section may not carry more subsections than this.
const MAX_SUBSECTIONS: u32 = 512;

/// Backward search window for the `%%EOF` marker, quadrupled on failure.
const EOF_SCAN_WINDOW: u64 = 512;

/// One slot of the cross-reference table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntryKind {
    /// Object number is free; `next_free` links the free list.
    Free { next_free: u32, next_generation: u16 },
    /// Object lives at an absolute byte offset.
    InUse { offset: u64, generation: u16 },
    /// Object is packed inside an object stream.
    Compressed { stream_number: u32, index: u32 },
}

/// Sparse per-object-number entry table. A `None` slot exists but was never
/// filled by any revision.
#[derive(Debug, Clone, Default)]
pub struct XRefTable {
    entries: Vec<Option<XRefEntryKind>>,
}

impl XRefTable {
    pub fn new() -> Self {
        XRefTable::default()
    }

    /// Number of slots (highest object number seen + 1).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Grow the backing to at least `new_len` slots; never shrinks.
    pub fn enlarge(&mut self, new_len: usize) {
        if new_len > self.entries.len() {
            self.entries.resize(new_len, None);
        }
    }

    /// Fill a slot. Returns false when the slot was already parsed by a
    /// newer revision, in which case the write is a no-op.
    pub fn set(&mut self, object_number: u32, kind: XRefEntryKind) -> bool {
        self.enlarge(object_number as usize + 1);
        let slot = &mut self.entries[object_number as usize];
        if slot.is_some() {
            return false;
        }
        *slot = Some(kind);
        true
    }

    /// Replace a slot unconditionally (recovery paths).
    pub fn overwrite(&mut self, object_number: u32, kind: XRefEntryKind) {
        self.enlarge(object_number as usize + 1);
        self.entries[object_number as usize] = Some(kind);
    }

    pub fn get(&self, object_number: u32) -> Option<&XRefEntryKind> {
        self.entries.get(object_number as usize)?.as_ref()
    }

    /// Slots filled by some revision, in object-number order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &XRefEntryKind)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(number, slot)| slot.as_ref().map(|kind| (number as u32, kind)))
    }

    pub fn parsed_count(&self) -> usize {
        self.entries.iter().filter(|slot| slot.is_some()).count()
    }

    /// Lowest in-use byte offset, which bounds the previous revision.
    pub fn min_in_use_offset(&self) -> Option<u64> {
        self.iter()
            .filter_map(|(_, kind)| match kind {
                XRefEntryKind::InUse { offset, .. } => Some(*offset),
                _ => None,
            })
            .min()
    }
}

/// Product of a finished xref walk.
#[derive(Debug)]
pub struct XRefOutcome {
    pub table: XRefTable,
    pub trailer: Trailer,
    pub incremental_updates: u32,
    pub uses_xref_streams: bool,
    pub reconstructed: bool,
}

/// Walks the chain of xref sections of one document.
pub struct XRefParser<'a, R: Read + Seek> {
    lexer: &'a mut Lexer<R>,
    options: ParseOptions,
    magic_offset: u64,
    follow_prev: bool,
    visited: HashSet<u64>,
    table: XRefTable,
    trailer: Trailer,
    incremental_updates: u32,
    uses_xref_streams: bool,
}

impl<'a, R: Read + Seek> XRefParser<'a, R> {
    pub fn new(lexer: &'a mut Lexer<R>, magic_offset: u64) -> Self {
        let options = lexer.options().clone();
        XRefParser {
            lexer,
            options,
            magic_offset,
            follow_prev: true,
            visited: HashSet::new(),
            table: XRefTable::new(),
            trailer: Trailer::new(),
            incremental_updates: 0,
            uses_xref_streams: false,
        }
    }

    /// Discover the last xref section and walk the whole `Prev` chain.
    pub fn read_document_structure(mut self) -> Result<XRefOutcome> {
        let anchor = self.locate_startxref()?;
        let mut next = Some(anchor);
        while let Some(offset) = next {
            next = self
                .read_section(offset)
                .frame(format!("xref section at offset {offset}"))?;
        }
        self.finish()
    }

    /// Read exactly one revision (no `Prev` following). The revision's EOF
    /// boundary is the minimum in-use offset of the resulting table.
    pub fn read_revision(mut self, offset: u64) -> Result<XRefOutcome> {
        self.follow_prev = false;
        self.read_section(offset)
            .frame(format!("revision at offset {offset}"))?;
        self.finish()
    }

    fn finish(self) -> Result<XRefOutcome> {
        if self.follow_prev {
            if let Some(declared) = self.trailer.size() {
                let actual = self.table.len() as i64;
                if actual > declared {
                    if self.options.strict || self.options.reject_oversized_sections {
                        return Err(PdfError::with_message(
                            ErrorKind::InvalidXRef,
                            format!("{actual} entries exceed /Size {declared}"),
                        ));
                    }
                    self.lexer.warn(ParseWarning::XRefSizeMismatch {
                        declared,
                        actual: actual as u32,
                    });
                }
            }
        }
        Ok(XRefOutcome {
            table: self.table,
            trailer: self.trailer,
            incremental_updates: self.incremental_updates,
            uses_xref_streams: self.uses_xref_streams,
            reconstructed: false,
        })
    }

    /// Find the `%%EOF` marker, searching a 512-byte tail window first and
    /// a 4x window on failure.
    fn locate_eof_marker(&mut self) -> Result<u64> {
        let size = self.lexer.input().size();
        for window in [EOF_SCAN_WINDOW, EOF_SCAN_WINDOW * 4] {
            let len = window.min(size);
            let start = size - len;
            let buf = self.lexer.input_mut().read_at(start, len as usize)?;
            if let Some(pos) = rfind_subsequence(&buf, b"%%EOF") {
                let marker = start + pos as u64;
                let tail = &buf[pos + 5..];
                let eol_only = tail.iter().all(|byte| matches!(byte, b'\r' | b'\n'));
                if !eol_only || tail.len() > 2 {
                    if self.options.strict {
                        return Err(PdfError::with_message(
                            ErrorKind::InvalidEofToken,
                            format!("{} bytes after %%EOF", tail.len()),
                        ));
                    }
                    self.lexer
                        .warn(ParseWarning::GarbageAfterEofMarker { offset: marker });
                }
                return Ok(marker);
            }
            if len == size {
                break;
            }
        }
        Err(PdfError::with_message(
            ErrorKind::InvalidEofToken,
            "%%EOF marker not found",
        ))
    }

    /// Locate `startxref` backward from the EOF marker and return the xref
    /// anchor (declared offset plus the magic offset).
    fn locate_startxref(&mut self) -> Result<u64> {
        let marker = self.locate_eof_marker()?;
        let window_start = marker.saturating_sub(EOF_SCAN_WINDOW);
        let buf = self
            .lexer
            .input_mut()
            .read_at(window_start, (marker - window_start) as usize)?;
        let keyword = match rfind_subsequence(&buf, b"startxref") {
            Some(pos) => window_start + pos as u64 + b"startxref".len() as u64,
            None => {
                let fallback = if self.options.strict {
                    None
                } else {
                    rfind_subsequence(&buf, b"startref")
                };
                match fallback {
                    Some(pos) => {
                        let at = window_start + pos as u64;
                        self.lexer
                            .warn(ParseWarning::StartxrefMisspelled { offset: at });
                        at + b"startref".len() as u64
                    }
                    None => {
                        return Err(PdfError::with_message(
                            ErrorKind::InvalidXRef,
                            "no startxref before %%EOF",
                        ));
                    }
                }
            }
        };
        self.lexer.seek(keyword)?;
        let declared = self.lexer.read_integer().frame("startxref offset")?;
        if declared < 0 {
            return Err(PdfError::with_message(
                ErrorKind::InvalidXRef,
                format!("negative startxref offset {declared}"),
            ));
        }
        Ok(declared as u64 + self.magic_offset)
    }

    /// Read one xref section. Returns the next (`Prev`) offset to visit.
    fn read_section(&mut self, offset: u64) -> Result<Option<u64>> {
        if !self.visited.insert(offset) {
            return Err(PdfError::with_message(
                ErrorKind::InvalidXRef,
                format!("cycle in xref chain at offset {offset}"),
            ));
        }
        let size = self.lexer.input().size();
        let offset = if offset >= size {
            if self.options.strict {
                return Err(PdfError::with_message(
                    ErrorKind::InvalidXRef,
                    format!("xref offset {offset} is beyond the file size {size}"),
                ));
            }
            let recovered = self.find_nearest_xref_before(offset)?;
            self.lexer.warn(ParseWarning::StartxrefOffsetInvalid {
                claimed: offset,
                recovered,
            });
            if !self.visited.insert(recovered) {
                return Err(PdfError::with_message(
                    ErrorKind::InvalidXRef,
                    format!("cycle in xref chain at recovered offset {recovered}"),
                ));
            }
            recovered
        } else {
            offset
        };

        self.lexer.seek(offset)?;
        let classical = matches!(
            self.lexer.try_peek_token()?,
            Some((TokenKind::Literal, view)) if view == b"xref"
        );
        let (section_dict, hybrid_dict) = if classical {
            self.read_classical_section()?
        } else {
            (self.read_stream_section()?, None)
        };

        self.trailer.merge_newest_first(&section_dict);
        if let Some(hybrid) = hybrid_dict {
            self.trailer.merge_newest_first(&hybrid);
        }

        if self.follow_prev {
            if let Some(prev) = section_dict.get("Prev").and_then(PdfObject::as_integer) {
                if prev > 0 {
                    self.incremental_updates += 1;
                    return Ok(Some(prev as u64 + self.magic_offset));
                }
                self.lexer.warn(ParseWarning::InvalidPrevIgnored { value: prev });
            }
        }
        Ok(None)
    }

    /// Classical `xref … trailer` section. Returns the trailer dictionary
    /// plus the dictionary of a hybrid `XRefStm`, when present.
    fn read_classical_section(&mut self) -> Result<(PdfDictionary, Option<PdfDictionary>)> {
        self.lexer.try_read_token()?; // the "xref" keyword
        let pending = self.read_classical_entries()?;

        let mut ctx = ParseContext::new(self.options.recursion_limit);
        let dict = read_dictionary_value(self.lexer, &mut ctx).frame("trailer dictionary")?;

        let xref_stm = dict
            .get("XRefStm")
            .and_then(PdfObject::as_integer)
            .filter(|value| *value > 0)
            .map(|value| value as u64 + self.magic_offset);

        let hybrid_dict = match xref_stm {
            Some(stream_offset) => match self.options.hybrid_precedence {
                HybridPrecedence::XRefStmWins => {
                    let hybrid = self.read_hybrid_stream(stream_offset)?;
                    self.commit(pending);
                    Some(hybrid)
                }
                HybridPrecedence::TableWins => {
                    self.commit(pending);
                    Some(self.read_hybrid_stream(stream_offset)?)
                }
            },
            None => {
                self.commit(pending);
                None
            }
        };
        Ok((dict, hybrid_dict))
    }

    fn read_hybrid_stream(&mut self, offset: u64) -> Result<PdfDictionary> {
        if !self.visited.insert(offset) {
            return Err(PdfError::with_message(
                ErrorKind::InvalidXRef,
                format!("cycle through /XRefStm at offset {offset}"),
            ));
        }
        let resume = self.lexer.position();
        self.lexer.seek(offset)?;
        let dict = self
            .read_stream_section()
            .frame(format!("hybrid xref stream at offset {offset}"))?;
        self.lexer.seek(resume)?;
        Ok(dict)
    }

    fn commit(&mut self, pending: Vec<(u32, XRefEntryKind)>) {
        for (object_number, kind) in pending {
            self.table.set(object_number, kind);
        }
    }

    /// Subsection loop of a classical table. Stops at the `trailer` keyword
    /// and leaves the lexer positioned on the trailer dictionary.
    fn read_classical_entries(&mut self) -> Result<Vec<(u32, XRefEntryKind)>> {
        let mut pending = Vec::new();
        let mut subsections = 0u32;
        'subsections: loop {
            match self.lexer.try_peek_token()? {
                None => {
                    return Err(PdfError::with_message(
                        ErrorKind::UnexpectedEof,
                        "inside xref subsections",
                    ));
                }
                Some((TokenKind::Literal, view)) if view == b"trailer" => {
                    self.lexer.try_read_token()?;
                    break;
                }
                // Some writers forget the keyword and start the dictionary
                // directly.
                Some((TokenKind::DoubleAngleOpen, _)) => {
                    if self.options.strict {
                        return Err(PdfError::with_message(
                            ErrorKind::InvalidXRef,
                            "missing 'trailer' keyword",
                        ));
                    }
                    self.lexer.warn(ParseWarning::MissingTrailerKeyword {
                        offset: self.lexer.position(),
                    });
                    break;
                }
                _ => {}
            }

            subsections += 1;
            if subsections > MAX_SUBSECTIONS {
                return Err(PdfError::with_message(
                    ErrorKind::InvalidXRef,
                    format!("more than {MAX_SUBSECTIONS} subsections"),
                ));
            }

            let header = self.read_subsection_header();
            let (first, count) = match header {
                Ok(pair) => pair,
                Err(err) => {
                    if self.options.strict {
                        return Err(err.push_frame("xref subsection header"));
                    }
                    self.lexer.warn(ParseWarning::XRefSubsectionTruncated {
                        expected: 0,
                        parsed: 0,
                    });
                    self.skip_to_trailer()?;
                    break;
                }
            };

            for i in 0..count {
                let object_number = first.checked_add(i).ok_or_else(|| {
                    PdfError::with_message(ErrorKind::InvalidXRef, "object number overflow")
                })?;
                match self.read_classical_entry(object_number) {
                    Ok(entry) => pending.push(entry),
                    Err(err) => {
                        if self.options.strict {
                            return Err(err
                                .push_frame(format!("xref entry for object {object_number}")));
                        }
                        self.lexer.warn(ParseWarning::XRefSubsectionTruncated {
                            expected: count,
                            parsed: i,
                        });
                        self.skip_to_trailer()?;
                        break 'subsections;
                    }
                }
            }
        }
        Ok(pending)
    }

    fn read_subsection_header(&mut self) -> Result<(u32, u32)> {
        let first = self.lexer.read_integer()?;
        let count = self.lexer.read_integer()?;
        if first < 0 || first > u32::MAX as i64 || count < 0 || count > u32::MAX as i64 {
            return Err(PdfError::with_message(
                ErrorKind::InvalidXRef,
                format!("subsection header {first} {count} out of range"),
            ));
        }
        Ok((first as u32, count as u32))
    }

    /// One 20-byte entry `nnnnnnnnnn ggggg t`. Strict mode enforces the
    /// fixed-width layout; lenient mode tokenizes flexibly.
    fn read_classical_entry(&mut self, object_number: u32) -> Result<(u32, XRefEntryKind)> {
        let (offset, generation, in_use) = if self.options.strict {
            self.lexer.skip_whitespace()?;
            let raw = self.lexer.input_mut().read_exact_vec(18)?;
            let offset = parse_fixed_digits(&raw[0..10])?;
            if raw[10] != b' ' {
                return Err(PdfError::with_message(
                    ErrorKind::InvalidXRef,
                    "missing separator after offset",
                ));
            }
            let generation = parse_fixed_digits(&raw[11..16])?;
            if raw[16] != b' ' {
                return Err(PdfError::with_message(
                    ErrorKind::InvalidXRef,
                    "missing separator after generation",
                ));
            }
            let in_use = match raw[17] {
                b'n' => true,
                b'f' => false,
                other => {
                    return Err(PdfError::with_message(
                        ErrorKind::InvalidXRef,
                        format!("entry type '{}'", other as char),
                    ));
                }
            };
            let terminator = self.lexer.input_mut().read_exact_vec(2)?;
            if !matches!(terminator.as_slice(), b"\r\n" | b" \r" | b" \n") {
                return Err(PdfError::with_message(
                    ErrorKind::InvalidXRef,
                    "entry is not 20 bytes",
                ));
            }
            (offset, generation, in_use)
        } else {
            let offset = self.lexer.read_integer()?;
            let generation = self.lexer.read_integer()?;
            let in_use = match self.lexer.try_read_token()? {
                Some((TokenKind::Literal, view)) if view.starts_with(b"n") => true,
                Some((TokenKind::Literal, view)) if view.starts_with(b"f") => false,
                other => {
                    return Err(PdfError::with_message(
                        ErrorKind::InvalidXRef,
                        format!("entry type token {other:?}"),
                    ));
                }
            };
            (offset, generation, in_use)
        };

        if offset < 0 || !(0..=MAX_GENERATION as i64).contains(&generation) {
            return Err(PdfError::with_message(
                ErrorKind::InvalidXRef,
                format!("entry fields {offset} {generation} out of range"),
            ));
        }
        let generation = generation as u16;

        let kind = if in_use {
            let treat_as_free = object_number == 0 || (offset == 0 && generation == 0);
            if treat_as_free {
                if self.options.strict {
                    return Err(PdfError::with_message(
                        ErrorKind::InvalidXRef,
                        format!("in-use entry for object {object_number} at offset {offset}"),
                    ));
                }
                self.lexer
                    .warn(ParseWarning::InUseEntryTreatedAsFree { object_number });
                XRefEntryKind::Free {
                    next_free: 0,
                    next_generation: generation,
                }
            } else {
                XRefEntryKind::InUse {
                    offset: offset as u64 + self.magic_offset,
                    generation,
                }
            }
        } else {
            XRefEntryKind::Free {
                next_free: offset as u32,
                next_generation: generation,
            }
        };
        Ok((object_number, kind))
    }

    fn skip_to_trailer(&mut self) -> Result<()> {
        loop {
            match self.lexer.try_read_token()? {
                None => {
                    return Err(PdfError::with_message(
                        ErrorKind::UnexpectedEof,
                        "no trailer after damaged subsection",
                    ));
                }
                Some((TokenKind::Literal, view)) if view == b"trailer" => return Ok(()),
                Some(_) => {}
            }
        }
    }

    /// An xref stream section: `<num> <gen> obj` with a `/Type /XRef`
    /// stream. Always parsed outside any encryption session.
    fn read_stream_section(&mut self) -> Result<PdfDictionary> {
        let mut ctx = ParseContext::new(self.options.recursion_limit);
        let object = read_indirect_object(self.lexer, &mut ctx, None)
            .frame("xref stream object")?;
        let stream = object.stream.ok_or_else(|| {
            PdfError::with_message(ErrorKind::InvalidXRef, "xref section object has no stream")
        })?;
        let dict = match object.value {
            PdfObject::Dictionary(dict) => dict,
            _ => {
                return Err(PdfError::with_message(
                    ErrorKind::InvalidXRef,
                    "xref stream without dictionary",
                ));
            }
        };
        if dict.get_type() != Some("XRef") {
            return Err(PdfError::with_message(
                ErrorKind::InvalidXRef,
                format!("expected /Type /XRef, found {:?}", dict.get_type()),
            ));
        }

        let raw = match stream.body {
            StreamBody::Range { start, end } => self
                .lexer
                .input_mut()
                .read_at(start, (end - start) as usize)?,
            StreamBody::Owned(data) => data,
        };
        let decoded =
            filters::decode_stream(&raw, &dict, &self.options).frame("decoding xref stream")?;

        let mut warnings = Vec::new();
        let entries = xref_stream::decode_entries(
            &dict,
            &decoded,
            self.magic_offset,
            &self.options,
            &mut warnings,
        )?;
        for warning in warnings {
            self.lexer.warn(warning);
        }
        self.commit(entries);
        self.uses_xref_streams = true;
        Ok(dict)
    }

    /// Lenient fallback for a `startxref` offset beyond the file: the
    /// nearest `xref` keyword before the claimed position.
    fn find_nearest_xref_before(&mut self, claimed: u64) -> Result<u64> {
        let size = self.lexer.input().size();
        let buf = self.lexer.input_mut().read_at(0, size as usize)?;
        let limit = claimed.min(size) as usize;
        let mut best = None;
        let mut cursor = 0usize;
        while let Some(pos) = find_subsequence(&buf[cursor..], b"xref").map(|p| p + cursor) {
            if pos >= limit {
                break;
            }
            let part_of_startxref = pos >= 5 && &buf[pos - 5..pos] == b"start";
            if !part_of_startxref {
                best = Some(pos as u64);
            }
            cursor = pos + 1;
        }
        best.ok_or_else(|| {
            PdfError::with_message(
                ErrorKind::InvalidXRef,
                format!("no xref keyword before claimed offset {claimed}"),
            )
        })
    }

    /// Last-resort reconstruction: scan the whole file for `N G obj`
    /// headers and rebuild the table from what is found. Objects packed in
    /// object streams are recovered through the stream prologues.
    pub fn reconstruct(mut self) -> Result<XRefOutcome> {
        let size = self.lexer.input().size();
        let buf = self.lexer.input_mut().read_at(0, size as usize)?;

        let mut containers = Vec::new();
        let mut found = 0u32;
        let mut cursor = 0usize;
        while let Some(pos) = find_subsequence(&buf[cursor..], b"obj").map(|p| p + cursor) {
            cursor = pos + 3;
            let line_start = buf[..pos]
                .iter()
                .rposition(|byte| matches!(byte, b'\n' | b'\r'))
                .map(|p| p + 1)
                .unwrap_or(0);
            let header = &buf[line_start..pos + 3];
            let Some((object_number, generation)) = parse_object_header(header) else {
                continue;
            };
            // Newer copies appear later in the file and win.
            self.table.overwrite(
                object_number,
                XRefEntryKind::InUse {
                    offset: line_start as u64,
                    generation,
                },
            );
            found += 1;

            let probe_end = (pos + 512).min(buf.len());
            let probe = &buf[pos..probe_end];
            if find_subsequence(probe, b"/ObjStm").is_some() {
                containers.push((object_number, line_start as u64));
            }
        }

        if found == 0 {
            return Err(PdfError::with_message(
                ErrorKind::InvalidXRef,
                "reconstruction found no objects",
            ));
        }
        self.lexer
            .warn(ParseWarning::XRefReconstructed { objects_found: found });

        for (container, offset) in containers {
            if let Err(err) = self.recover_object_stream(container, offset) {
                tracing::warn!(container, %err, "object stream recovery failed");
            }
        }

        // The last trailer dictionary in the file still names the catalog.
        let mut merged_trailer = false;
        if let Some(pos) = rfind_subsequence(&buf, b"trailer") {
            self.lexer.seek(pos as u64 + b"trailer".len() as u64)?;
            let mut ctx = ParseContext::new(self.options.recursion_limit);
            if let Ok(dict) = read_dictionary_value(self.lexer, &mut ctx) {
                self.trailer.merge_newest_first(&dict);
                merged_trailer = true;
            }
        }
        if !merged_trailer {
            let mut dict = PdfDictionary::new();
            dict.insert("Size", PdfObject::Integer(self.table.len() as i64));
            if let Some(root) = self.find_catalog(&buf) {
                dict.insert(
                    "Root",
                    PdfObject::Reference(crate::parser::objects::ObjectId::new(root, 0)),
                );
            }
            self.trailer.merge_newest_first(&dict);
        }

        let mut outcome = self.finish()?;
        outcome.reconstructed = true;
        Ok(outcome)
    }

    /// Re-list the members of a recovered object stream so compressed
    /// entries resolve again.
    fn recover_object_stream(&mut self, container: u32, offset: u64) -> Result<()> {
        self.lexer.seek(offset)?;
        let mut ctx = ParseContext::new(self.options.recursion_limit);
        let object = read_indirect_object(self.lexer, &mut ctx, None)?;
        let stream = object.stream.ok_or_else(|| {
            PdfError::with_message(ErrorKind::InvalidObject, "container without stream")
        })?;
        let dict = object.value.as_dict().ok_or_else(|| {
            PdfError::with_message(ErrorKind::InvalidObject, "container without dictionary")
        })?;
        let raw = match stream.body {
            StreamBody::Range { start, end } => self
                .lexer
                .input_mut()
                .read_at(start, (end - start) as usize)?,
            StreamBody::Owned(data) => data,
        };
        let decoded = filters::decode_stream(&raw, dict, &self.options)?;
        let reader = object_stream::ObjectStreamReader::new(dict, decoded, &self.options)?;
        for (index, member) in reader.object_numbers().enumerate() {
            // A member shadowed by a later full object keeps that entry.
            if self.table.get(member).is_none() {
                self.table.overwrite(
                    member,
                    XRefEntryKind::Compressed {
                        stream_number: container,
                        index: index as u32,
                    },
                );
            }
        }
        Ok(())
    }

    fn find_catalog(&self, buf: &[u8]) -> Option<u32> {
        let pos = find_subsequence(buf, b"/Catalog")?;
        let header_end = rfind_subsequence(&buf[..pos], b"obj")?;
        let header_start = buf[..header_end]
            .iter()
            .rposition(|byte| matches!(byte, b'\n' | b'\r'))
            .map(|p| p + 1)
            .unwrap_or(0);
        parse_object_header(&buf[header_start..header_end + 3]).map(|(number, _)| number)
    }
}

/// Read a value and require it to be a dictionary.
fn read_dictionary_value<R: Read + Seek>(
    lexer: &mut Lexer<R>,
    ctx: &mut ParseContext,
) -> Result<PdfDictionary> {
    lexer.skip_whitespace()?;
    let opened = matches!(
        lexer.try_read_token()?,
        Some((TokenKind::DoubleAngleOpen, _))
    );
    if !opened {
        return Err(PdfError::with_message(
            ErrorKind::InvalidTrailer,
            "expected a dictionary",
        ));
    }
    read_dictionary(lexer, ctx)
}

fn parse_fixed_digits(bytes: &[u8]) -> Result<i64> {
    if !bytes.iter().all(u8::is_ascii_digit) {
        return Err(PdfError::with_message(
            ErrorKind::InvalidXRef,
            format!("'{}' is not a digit run", String::from_utf8_lossy(bytes)),
        ));
    }
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|text| text.parse::<i64>().ok())
        .ok_or_else(|| PdfError::new(ErrorKind::InvalidXRef))
}

/// Parse `N G obj` from a header line.
fn parse_object_header(line: &[u8]) -> Option<(u32, u16)> {
    let text = std::str::from_utf8(line).ok()?;
    let parts: Vec<&str> = text.split_whitespace().collect();
    if parts.len() == 3 && parts[2] == "obj" {
        Some((parts[0].parse().ok()?, parts[1].parse().ok()?))
    } else {
        None
    }
}
