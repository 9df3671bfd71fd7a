//! Object streams (PDF 1.5+): objects packed inside a compressed stream.
//!
//! The decoded stream starts with `N` pairs `(object number, relative
//! offset)`; the object data region begins at `/First`. Members carry no
//! `obj`/`endobj` wrappers and generation 0 by definition. Members are
//! never individually encrypted; only the container stream may be.

use crate::error::{ErrorKind, PdfError, Result, ResultExt};
use crate::parser::input::PdfInput;
use crate::parser::lexer::Lexer;
use crate::parser::objects::{read_value, PdfDictionary, PdfObject};
use crate::parser::stack_safe::ParseContext;
use crate::parser::ParseOptions;
use std::io::Cursor;

/// A decoded object stream addressed by `(stream object number, index)`.
#[derive(Debug)]
pub struct ObjectStreamReader {
    /// `(object number, offset relative to /First)` prologue pairs.
    pairs: Vec<(u32, u32)>,
    first: u32,
    data: Vec<u8>,
    options: ParseOptions,
}

impl ObjectStreamReader {
    /// Build a reader over the already-decoded stream bytes.
    pub fn new(dict: &PdfDictionary, data: Vec<u8>, options: &ParseOptions) -> Result<Self> {
        if dict.get_type() != Some("ObjStm") {
            return Err(PdfError::with_message(
                ErrorKind::InvalidObject,
                format!("expected /Type /ObjStm, found {:?}", dict.get_type()),
            ));
        }
        let count = dict
            .get("N")
            .and_then(PdfObject::as_integer)
            .filter(|n| (0..=i64::from(u32::MAX)).contains(n))
            .ok_or_else(|| {
                PdfError::with_message(ErrorKind::InvalidObject, "object stream missing /N")
            })? as u32;
        let first = dict
            .get("First")
            .and_then(PdfObject::as_integer)
            .filter(|n| (0..=i64::from(u32::MAX)).contains(n))
            .ok_or_else(|| {
                PdfError::with_message(ErrorKind::InvalidObject, "object stream missing /First")
            })? as u32;

        let mut lexer = Lexer::new(PdfInput::new(Cursor::new(data.as_slice()))?, options.clone());
        let mut pairs = Vec::with_capacity(count as usize);
        for i in 0..count {
            let object_number = lexer
                .read_integer()
                .frame(format!("prologue pair {i}"))?;
            let offset = lexer
                .read_integer()
                .frame(format!("prologue pair {i}"))?;
            if object_number < 0 || offset < 0 {
                return Err(PdfError::with_message(
                    ErrorKind::InvalidObject,
                    format!("negative prologue entry {object_number} {offset}"),
                ));
            }
            let absolute = first as u64 + offset as u64;
            if absolute > data.len() as u64 {
                return Err(PdfError::with_message(
                    ErrorKind::InvalidObject,
                    format!("member offset {absolute} beyond decoded length {}", data.len()),
                ));
            }
            pairs.push((object_number as u32, offset as u32));
        }

        Ok(ObjectStreamReader {
            pairs,
            first,
            data,
            options: options.clone(),
        })
    }

    /// Number of packed objects (`/N`).
    pub fn count(&self) -> u32 {
        self.pairs.len() as u32
    }

    /// Object numbers in prologue order.
    pub fn object_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.pairs.iter().map(|(number, _)| *number)
    }

    /// Object number stored at `index`.
    pub fn object_number_at(&self, index: u32) -> Option<u32> {
        self.pairs.get(index as usize).map(|(number, _)| *number)
    }

    /// Parse the member at `index`. Returns its object number and value.
    pub fn read_at(&self, index: u32, ctx: &mut ParseContext) -> Result<(u32, PdfObject)> {
        let (object_number, offset) = *self.pairs.get(index as usize).ok_or_else(|| {
            PdfError::with_message(
                ErrorKind::ObjectNotFound,
                format!("index {index} not in object stream of {} members", self.pairs.len()),
            )
        })?;
        let mut lexer = Lexer::new(
            PdfInput::new(Cursor::new(self.data.as_slice()))?,
            self.options.clone(),
        );
        lexer.seek(self.first as u64 + offset as u64)?;
        let value = read_value(&mut lexer, ctx)
            .frame(format!("member {object_number} at index {index}"))?;
        Ok((object_number, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::objects::ObjectId;

    fn objstm_dict(n: i64, first: i64) -> PdfDictionary {
        use crate::parser::objects::PdfName;
        let mut dict = PdfDictionary::new();
        dict.insert("Type", PdfObject::Name(PdfName::new("ObjStm")));
        dict.insert("N", PdfObject::Integer(n));
        dict.insert("First", PdfObject::Integer(first));
        dict
    }

    fn sample() -> (PdfDictionary, Vec<u8>) {
        // Three members: 11 -> dict, 12 -> integer, 13 -> array.
        let body = b"<< /Kind /First >> 42 [1 2 3]";
        let prologue = b"11 0 12 19 13 22 ";
        let first = prologue.len() as i64;
        let mut data = prologue.to_vec();
        data.extend_from_slice(body);
        (objstm_dict(3, first), data)
    }

    #[test]
    fn test_prologue_pairs() {
        let (dict, data) = sample();
        let reader = ObjectStreamReader::new(&dict, data, &ParseOptions::lenient()).unwrap();
        assert_eq!(reader.count(), 3);
        assert_eq!(reader.object_numbers().collect::<Vec<_>>(), vec![11, 12, 13]);
        assert_eq!(reader.object_number_at(1), Some(12));
        assert_eq!(reader.object_number_at(3), None);
    }

    #[test]
    fn test_read_members_by_index() {
        let (dict, data) = sample();
        let reader = ObjectStreamReader::new(&dict, data, &ParseOptions::lenient()).unwrap();
        let mut ctx = ParseContext::default();

        let (number, value) = reader.read_at(0, &mut ctx).unwrap();
        assert_eq!(number, 11);
        assert_eq!(
            value.as_dict().unwrap().get("Kind").unwrap().as_name().unwrap().as_str(),
            "First"
        );

        let (number, value) = reader.read_at(1, &mut ctx).unwrap();
        assert_eq!((number, value.as_integer()), (12, Some(42)));

        let (number, value) = reader.read_at(2, &mut ctx).unwrap();
        assert_eq!(number, 13);
        assert_eq!(value.as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_index_out_of_bounds() {
        let (dict, data) = sample();
        let reader = ObjectStreamReader::new(&dict, data, &ParseOptions::lenient()).unwrap();
        let mut ctx = ParseContext::default();
        let err = reader.read_at(3, &mut ctx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ObjectNotFound);
    }

    #[test]
    fn test_wrong_type_rejected() {
        let mut dict = objstm_dict(1, 4);
        dict.insert(
            "Type",
            PdfObject::Name(crate::parser::objects::PdfName::new("XRef")),
        );
        let err = ObjectStreamReader::new(&dict, b"1 0 2".to_vec(), &ParseOptions::lenient())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidObject);
    }

    #[test]
    fn test_missing_n_or_first() {
        let mut dict = objstm_dict(1, 4);
        dict.remove("N");
        assert!(ObjectStreamReader::new(&dict, Vec::new(), &ParseOptions::lenient()).is_err());

        let mut dict = objstm_dict(1, 4);
        dict.remove("First");
        assert!(ObjectStreamReader::new(&dict, Vec::new(), &ParseOptions::lenient()).is_err());
    }

    #[test]
    fn test_member_offset_beyond_data() {
        let dict = objstm_dict(1, 4);
        let err = ObjectStreamReader::new(&dict, b"9 99".to_vec(), &ParseOptions::lenient())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidObject);
    }

    #[test]
    fn test_members_get_generation_zero() {
        // The store key for a member is always (number, 0); this is just a
        // reminder that the id type enforces what the caller inserts.
        assert_eq!(ObjectId::new(11, 0).generation(), 0);
    }
}
