//! Stream filter boundary.
//!
//! The xref machinery consumes decoded bytes; everything it needs in
//! practice is the identity filter and FlateDecode with the PNG/TIFF
//! predictors. All other filters belong to the external filter pipeline
//! and are reported as unsupported here.

use crate::error::{ErrorKind, PdfError, Result, ResultExt};
use crate::parser::objects::{PdfDictionary, PdfObject};
use crate::parser::ParseOptions;

#[cfg(feature = "compression")]
use flate2::read::{DeflateDecoder, ZlibDecoder};
#[cfg(feature = "compression")]
use std::io::Read;

/// Decode a stream body according to its dictionary's `/Filter` chain.
pub fn decode_stream(
    data: &[u8],
    dict: &PdfDictionary,
    options: &ParseOptions,
) -> Result<Vec<u8>> {
    let filters = filter_names(dict)?;
    if filters.is_empty() {
        return Ok(data.to_vec());
    }
    let parms = decode_parms(dict);
    let mut result = data.to_vec();
    for (index, name) in filters.iter().enumerate() {
        let parm = parms.get(index).copied().flatten();
        result = apply_filter(&result, name, parm, options)
            .frame(format!("applying /{name}"))?;
    }
    Ok(result)
}

fn filter_names(dict: &PdfDictionary) -> Result<Vec<String>> {
    match dict.get("Filter") {
        None => Ok(Vec::new()),
        Some(PdfObject::Name(name)) => Ok(vec![name.as_str().to_string()]),
        Some(PdfObject::Array(array)) => array
            .iter()
            .map(|entry| {
                entry
                    .as_name()
                    .map(|n| n.as_str().to_string())
                    .ok_or_else(|| {
                        PdfError::with_message(
                            ErrorKind::InvalidDataType,
                            "non-name entry in /Filter array",
                        )
                    })
            })
            .collect(),
        Some(_) => Err(PdfError::with_message(
            ErrorKind::InvalidDataType,
            "/Filter must be a name or an array of names",
        )),
    }
}

fn decode_parms(dict: &PdfDictionary) -> Vec<Option<&PdfDictionary>> {
    match dict.get("DecodeParms").or_else(|| dict.get("DP")) {
        Some(PdfObject::Dictionary(parm)) => vec![Some(parm)],
        Some(PdfObject::Array(array)) => array.iter().map(PdfObject::as_dict).collect(),
        _ => Vec::new(),
    }
}

fn apply_filter(
    data: &[u8],
    name: &str,
    parm: Option<&PdfDictionary>,
    options: &ParseOptions,
) -> Result<Vec<u8>> {
    match name {
        "FlateDecode" | "Fl" => {
            let inflated = decode_flate(data, options)?;
            apply_predictor(inflated, parm)
        }
        other => Err(PdfError::with_message(
            ErrorKind::InvalidDataType,
            format!("filter /{other} is not handled by the xref core"),
        )),
    }
}

#[cfg(feature = "compression")]
fn decode_flate(data: &[u8], options: &ParseOptions) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut result = Vec::new();
    match decoder.read_to_end(&mut result) {
        Ok(_) => Ok(result),
        Err(zlib_err) => {
            if options.strict {
                return Err(PdfError::with_message(
                    ErrorKind::InvalidDataType,
                    format!("flate decode failed: {zlib_err}"),
                ));
            }
            // Some producers emit raw deflate without the zlib wrapper.
            let mut raw = DeflateDecoder::new(data);
            let mut result = Vec::new();
            match raw.read_to_end(&mut result) {
                Ok(_) => Ok(result),
                Err(_) => Err(PdfError::with_message(
                    ErrorKind::InvalidDataType,
                    format!("flate decode failed: {zlib_err}"),
                )),
            }
        }
    }
}

#[cfg(not(feature = "compression"))]
fn decode_flate(_data: &[u8], _options: &ParseOptions) -> Result<Vec<u8>> {
    Err(PdfError::with_message(
        ErrorKind::InvalidDataType,
        "FlateDecode requires the 'compression' feature",
    ))
}

/// Predictor parameters from a `/DecodeParms` dictionary.
#[derive(Debug, Clone, Copy)]
struct PredictorParams {
    predictor: i64,
    columns: usize,
    colors: usize,
    bits_per_component: usize,
}

impl PredictorParams {
    fn from_dict(parm: Option<&PdfDictionary>) -> Self {
        let get = |key: &str, default: i64| {
            parm.and_then(|d| d.get(key))
                .and_then(PdfObject::as_integer)
                .unwrap_or(default)
        };
        PredictorParams {
            predictor: get("Predictor", 1),
            columns: get("Columns", 1).max(1) as usize,
            colors: get("Colors", 1).max(1) as usize,
            bits_per_component: get("BitsPerComponent", 8).max(1) as usize,
        }
    }

    fn bytes_per_pixel(&self) -> usize {
        (self.colors * self.bits_per_component).div_ceil(8)
    }

    fn row_len(&self) -> usize {
        (self.columns * self.colors * self.bits_per_component).div_ceil(8)
    }
}

fn apply_predictor(data: Vec<u8>, parm: Option<&PdfDictionary>) -> Result<Vec<u8>> {
    let params = PredictorParams::from_dict(parm);
    match params.predictor {
        1 => Ok(data),
        2 => Ok(tiff_predictor(data, &params)),
        10..=15 => png_predictor(data, &params),
        other => Err(PdfError::with_message(
            ErrorKind::InvalidDataType,
            format!("unknown predictor {other}"),
        )),
    }
}

/// TIFF predictor 2: horizontal differencing. Only the 8-bit case matters
/// in practice; other depths pass through unchanged.
fn tiff_predictor(mut data: Vec<u8>, params: &PredictorParams) -> Vec<u8> {
    if params.bits_per_component != 8 {
        return data;
    }
    let row_len = params.row_len();
    let colors = params.colors;
    for row in data.chunks_mut(row_len) {
        for i in colors..row.len() {
            row[i] = row[i].wrapping_add(row[i - colors]);
        }
    }
    data
}

/// PNG predictors 10-15: every row starts with a tag byte selecting the
/// per-row algorithm.
fn png_predictor(data: Vec<u8>, params: &PredictorParams) -> Result<Vec<u8>> {
    let row_len = params.row_len();
    let bpp = params.bytes_per_pixel();
    let stride = row_len + 1;
    if data.len() % stride != 0 {
        return Err(PdfError::with_message(
            ErrorKind::InvalidDataType,
            format!(
                "predicted data length {} is not a multiple of row stride {stride}",
                data.len()
            ),
        ));
    }
    let rows = data.len() / stride;
    let mut output = Vec::with_capacity(rows * row_len);
    let mut previous = vec![0u8; row_len];
    for row_index in 0..rows {
        let row = &data[row_index * stride..(row_index + 1) * stride];
        let tag = row[0];
        let mut current = row[1..].to_vec();
        match tag {
            0 => {}
            1 => {
                for i in bpp..row_len {
                    current[i] = current[i].wrapping_add(current[i - bpp]);
                }
            }
            2 => {
                for i in 0..row_len {
                    current[i] = current[i].wrapping_add(previous[i]);
                }
            }
            3 => {
                for i in 0..row_len {
                    let left = if i >= bpp { current[i - bpp] as u16 } else { 0 };
                    let up = previous[i] as u16;
                    current[i] = current[i].wrapping_add(((left + up) / 2) as u8);
                }
            }
            4 => {
                for i in 0..row_len {
                    let left = if i >= bpp { current[i - bpp] } else { 0 };
                    let up = previous[i];
                    let up_left = if i >= bpp { previous[i - bpp] } else { 0 };
                    current[i] = current[i].wrapping_add(paeth(left, up, up_left));
                }
            }
            other => {
                return Err(PdfError::with_message(
                    ErrorKind::InvalidDataType,
                    format!("unknown PNG row tag {other}"),
                ));
            }
        }
        output.extend_from_slice(&current);
        previous = current;
    }
    Ok(output)
}

fn paeth(left: u8, up: u8, up_left: u8) -> u8 {
    let p = left as i16 + up as i16 - up_left as i16;
    let pa = (p - left as i16).abs();
    let pb = (p - up as i16).abs();
    let pc = (p - up_left as i16).abs();
    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        up
    } else {
        up_left
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::objects::{PdfArray, PdfName};

    #[cfg(feature = "compression")]
    fn flate(data: &[u8]) -> Vec<u8> {
        use flate2::write::ZlibEncoder;
        use flate2::Compression;
        use std::io::Write;
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_no_filter_is_identity() {
        let dict = PdfDictionary::new();
        let decoded = decode_stream(b"plain bytes", &dict, &ParseOptions::lenient()).unwrap();
        assert_eq!(decoded, b"plain bytes");
    }

    #[cfg(feature = "compression")]
    #[test]
    fn test_flate_roundtrip() {
        let mut dict = PdfDictionary::new();
        dict.insert("Filter", PdfObject::Name(PdfName::new("FlateDecode")));
        let packed = flate(b"the decoded payload");
        let decoded = decode_stream(&packed, &dict, &ParseOptions::lenient()).unwrap();
        assert_eq!(decoded, b"the decoded payload");
    }

    #[cfg(feature = "compression")]
    #[test]
    fn test_filter_array() {
        let mut dict = PdfDictionary::new();
        dict.insert(
            "Filter",
            PdfObject::Array(PdfArray(vec![PdfObject::Name(PdfName::new(
                "FlateDecode",
            ))])),
        );
        let packed = flate(b"abc");
        assert_eq!(
            decode_stream(&packed, &dict, &ParseOptions::lenient()).unwrap(),
            b"abc"
        );
    }

    #[test]
    fn test_unsupported_filter() {
        let mut dict = PdfDictionary::new();
        dict.insert("Filter", PdfObject::Name(PdfName::new("JPXDecode")));
        let err = decode_stream(b"...", &dict, &ParseOptions::lenient()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidDataType);
    }

    #[cfg(feature = "compression")]
    #[test]
    fn test_corrupt_flate_strict() {
        let mut dict = PdfDictionary::new();
        dict.insert("Filter", PdfObject::Name(PdfName::new("FlateDecode")));
        let err = decode_stream(b"\xFF\xFFnot flate", &dict, &ParseOptions::strict()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidDataType);
    }

    #[test]
    fn test_png_up_predictor() {
        // Two rows of four bytes, predictor 12 (PNG Up).
        let rows: [[u8; 4]; 2] = [[10, 20, 30, 40], [11, 22, 33, 44]];
        let mut predicted = Vec::new();
        let mut previous = [0u8; 4];
        for row in rows {
            predicted.push(2u8);
            for i in 0..4 {
                predicted.push(row[i].wrapping_sub(previous[i]));
            }
            previous = row;
        }

        let mut parm = PdfDictionary::new();
        parm.insert("Predictor", PdfObject::Integer(12));
        parm.insert("Columns", PdfObject::Integer(4));
        let decoded = apply_predictor(predicted, Some(&parm)).unwrap();
        assert_eq!(decoded, [10, 20, 30, 40, 11, 22, 33, 44]);
    }

    #[test]
    fn test_png_sub_and_paeth_predictors() {
        let original: [u8; 6] = [5, 9, 14, 20, 27, 35];
        // Encode with the Sub filter, one row of six bytes.
        let mut predicted = vec![1u8];
        for i in 0..6 {
            let left = if i > 0 { original[i - 1] } else { 0 };
            predicted.push(original[i].wrapping_sub(left));
        }
        let mut parm = PdfDictionary::new();
        parm.insert("Predictor", PdfObject::Integer(11));
        parm.insert("Columns", PdfObject::Integer(6));
        assert_eq!(apply_predictor(predicted, Some(&parm)).unwrap(), original);

        // Paeth with a zero previous row degenerates to Sub.
        let mut predicted = vec![4u8];
        for i in 0..6 {
            let left = if i > 0 { original[i - 1] } else { 0 };
            predicted.push(original[i].wrapping_sub(paeth(left, 0, 0)));
        }
        assert_eq!(
            {
                let mut parm = PdfDictionary::new();
                parm.insert("Predictor", PdfObject::Integer(14));
                parm.insert("Columns", PdfObject::Integer(6));
                apply_predictor(predicted, Some(&parm)).unwrap()
            },
            original
        );
    }

    #[test]
    fn test_png_predictor_rejects_ragged_data() {
        let mut parm = PdfDictionary::new();
        parm.insert("Predictor", PdfObject::Integer(12));
        parm.insert("Columns", PdfObject::Integer(4));
        let err = apply_predictor(vec![2, 1, 1], Some(&parm)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidDataType);
    }

    #[test]
    fn test_tiff_predictor() {
        let mut parm = PdfDictionary::new();
        parm.insert("Predictor", PdfObject::Integer(2));
        parm.insert("Columns", PdfObject::Integer(4));
        // Original row [3, 7, 12, 18] differenced to [3, 4, 5, 6].
        assert_eq!(
            apply_predictor(vec![3, 4, 5, 6], Some(&parm)).unwrap(),
            [3, 7, 12, 18]
        );
    }
}
