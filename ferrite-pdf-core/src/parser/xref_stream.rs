//! Cross-reference stream records (PDF 1.5+).
//!
//! An xref stream packs the table into fixed-width binary rows described by
//! `W = [w1 w2 w3]` and addressed by `Index = [first count …]` ranges.

use crate::error::{ErrorKind, PdfError, Result};
use crate::parser::objects::{PdfDictionary, PdfObject};
use crate::parser::xref::XRefEntryKind;
use crate::parser::{ParseOptions, ParseWarning};

/// Decode the rows of an xref stream into entry kinds. `base_offset` is the
/// magic offset added to every in-use byte offset. Warnings are appended to
/// `warnings` in lenient mode.
pub(crate) fn decode_entries(
    dict: &PdfDictionary,
    data: &[u8],
    base_offset: u64,
    options: &ParseOptions,
    warnings: &mut Vec<ParseWarning>,
) -> Result<Vec<(u32, XRefEntryKind)>> {
    let size = dict
        .get("Size")
        .and_then(PdfObject::as_integer)
        .ok_or_else(|| {
            PdfError::with_message(ErrorKind::InvalidXRef, "xref stream missing /Size")
        })?;

    let widths = read_widths(dict)?;
    let ranges = read_index(dict, size)?;
    let row_len: usize = widths.iter().sum();
    if row_len == 0 {
        return Err(PdfError::with_message(
            ErrorKind::InvalidXRef,
            "/W adds up to zero",
        ));
    }

    let mut entries = Vec::new();
    let mut cursor = 0usize;
    'ranges: for (first, count) in ranges {
        for i in 0..count {
            if cursor + row_len > data.len() {
                if options.strict {
                    return Err(PdfError::with_message(
                        ErrorKind::InvalidXRef,
                        "xref stream data truncated",
                    ));
                }
                warnings.push(ParseWarning::XRefSubsectionTruncated {
                    expected: count,
                    parsed: i,
                });
                break 'ranges;
            }
            let field1 = read_field(&data[cursor..], widths[0]);
            let field2 = read_field(&data[cursor + widths[0]..], widths[1]);
            let field3 = read_field(&data[cursor + widths[0] + widths[1]..], widths[2]);
            cursor += row_len;

            let object_number = first
                .checked_add(i)
                .ok_or_else(|| {
                    PdfError::with_message(ErrorKind::InvalidXRef, "object number overflow")
                })?;

            // A zero-width type field defaults to type 1.
            let entry_type = if widths[0] == 0 { 1 } else { field1 };
            let kind = match entry_type {
                0 => XRefEntryKind::Free {
                    next_free: field2 as u32,
                    next_generation: if widths[2] == 0 { 65535 } else { field3 as u16 },
                },
                1 => XRefEntryKind::InUse {
                    offset: field2 + base_offset,
                    generation: if widths[2] == 0 { 0 } else { field3 as u16 },
                },
                2 => XRefEntryKind::Compressed {
                    stream_number: field2 as u32,
                    index: field3 as u32,
                },
                other => {
                    warnings.push(ParseWarning::XRefEntryTypeUnknown {
                        object_number,
                        entry_type: other.min(u8::MAX as u64) as u8,
                    });
                    continue;
                }
            };
            entries.push((object_number, kind));
        }
    }
    Ok(entries)
}

fn read_widths(dict: &PdfDictionary) -> Result<[usize; 3]> {
    let array = dict
        .get("W")
        .and_then(PdfObject::as_array)
        .ok_or_else(|| PdfError::with_message(ErrorKind::InvalidXRef, "xref stream missing /W"))?;
    if array.len() != 3 {
        return Err(PdfError::with_message(
            ErrorKind::InvalidXRef,
            format!("/W must have 3 elements, found {}", array.len()),
        ));
    }
    let mut widths = [0usize; 3];
    let mut total = 0i64;
    for (slot, entry) in widths.iter_mut().zip(array.iter()) {
        let value = entry.as_integer().ok_or_else(|| {
            PdfError::with_message(ErrorKind::InvalidXRef, "non-integer /W entry")
        })?;
        if !(0..=8).contains(&value) {
            return Err(PdfError::with_message(
                ErrorKind::InvalidXRef,
                format!("/W entry {value} out of range"),
            ));
        }
        total += value;
        *slot = value as usize;
    }
    if total > 255 {
        return Err(PdfError::with_message(
            ErrorKind::InvalidXRef,
            format!("/W sums to {total}"),
        ));
    }
    Ok(widths)
}

fn read_index(dict: &PdfDictionary, size: i64) -> Result<Vec<(u32, u32)>> {
    match dict.get("Index") {
        None => Ok(vec![(0, size.max(0) as u32)]),
        Some(PdfObject::Array(array)) => {
            if array.len() % 2 != 0 {
                return Err(PdfError::with_message(
                    ErrorKind::InvalidXRef,
                    "/Index must hold pairs",
                ));
            }
            let mut ranges = Vec::with_capacity(array.len() / 2);
            for pair in array.0.chunks_exact(2) {
                let first = pair[0].as_integer();
                let count = pair[1].as_integer();
                match (first, count) {
                    (Some(first), Some(count)) if first >= 0 && count >= 0 => {
                        ranges.push((first as u32, count as u32));
                    }
                    _ => {
                        return Err(PdfError::with_message(
                            ErrorKind::InvalidXRef,
                            "non-integer /Index entry",
                        ));
                    }
                }
            }
            Ok(ranges)
        }
        Some(_) => Err(PdfError::with_message(
            ErrorKind::InvalidXRef,
            "/Index must be an array",
        )),
    }
}

/// Big-endian field of `width` bytes; a zero-width field reads as zero.
fn read_field(data: &[u8], width: usize) -> u64 {
    let mut value = 0u64;
    for &byte in &data[..width] {
        value = value << 8 | byte as u64;
    }
    value
}
