//! PDF header: magic marker and version.
//!
//! The `%PDF-X.Y` marker must appear within the first 1024 bytes. Its byte
//! offset becomes the `magic_offset` that every file offset in the document
//! is relative to, which is what makes files with leading garbage readable.

use crate::error::{ErrorKind, PdfError, Result};
use crate::parser::input::PdfInput;
use std::fmt;
use std::io::{Read, Seek};

/// How far into the file the header marker may start.
const HEADER_SCAN_WINDOW: usize = 1024;

/// PDF version as declared by the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdfVersion {
    pub major: u8,
    pub minor: u8,
}

impl PdfVersion {
    pub fn new(major: u8, minor: u8) -> Self {
        PdfVersion { major, minor }
    }

    /// PDF 1.0 through 1.7 and 2.0.
    pub fn is_supported(&self) -> bool {
        matches!((self.major, self.minor), (1, 0..=7) | (2, 0))
    }
}

impl fmt::Display for PdfVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Parsed header information.
#[derive(Debug, Clone, Copy)]
pub struct PdfHeader {
    pub version: PdfVersion,
    /// Byte offset of the `%` of `%PDF-`; nonzero for files with leading
    /// garbage. All in-file offsets are relative to this.
    pub magic_offset: u64,
}

/// Locate and parse the header marker.
pub fn parse_header<R: Read + Seek>(input: &mut PdfInput<R>) -> Result<PdfHeader> {
    let window = input.read_at(0, HEADER_SCAN_WINDOW)?;
    let magic_offset = find_subsequence(&window, b"%PDF-").ok_or_else(|| {
        PdfError::with_message(
            ErrorKind::InvalidPdf,
            "no %PDF- marker in the first 1024 bytes",
        )
    })? as u64;

    let after_magic = &window[magic_offset as usize + 5..];
    let version = parse_version(after_magic).ok_or_else(|| {
        PdfError::with_message(ErrorKind::InvalidPdf, "malformed version in header")
    })?;
    if !version.is_supported() {
        return Err(PdfError::with_message(
            ErrorKind::InvalidPdf,
            format!("unsupported PDF version {version}"),
        ));
    }
    Ok(PdfHeader {
        version,
        magic_offset,
    })
}

fn parse_version(bytes: &[u8]) -> Option<PdfVersion> {
    match bytes {
        [major @ b'0'..=b'9', b'.', minor @ b'0'..=b'9', ..] => {
            Some(PdfVersion::new(major - b'0', minor - b'0'))
        }
        _ => None,
    }
}

pub(crate) fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

pub(crate) fn rfind_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .rposition(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn header(bytes: &[u8]) -> Result<PdfHeader> {
        let mut input = PdfInput::new(Cursor::new(bytes.to_vec())).unwrap();
        parse_header(&mut input)
    }

    #[test]
    fn test_plain_header() {
        let parsed = header(b"%PDF-1.4\nrest of file").unwrap();
        assert_eq!(parsed.version, PdfVersion::new(1, 4));
        assert_eq!(parsed.magic_offset, 0);
    }

    #[test]
    fn test_header_with_leading_garbage() {
        let parsed = header(b"\xEF\xBB\xBFsome junk bytes\n%PDF-1.7\n").unwrap();
        assert_eq!(parsed.version, PdfVersion::new(1, 7));
        assert_eq!(parsed.magic_offset, 19);
    }

    #[test]
    fn test_supported_versions() {
        for minor in 0..=7 {
            assert!(PdfVersion::new(1, minor).is_supported());
        }
        assert!(PdfVersion::new(2, 0).is_supported());
        assert!(!PdfVersion::new(2, 1).is_supported());
        assert!(!PdfVersion::new(0, 9).is_supported());
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let err = header(b"%PDF-3.1\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPdf);
    }

    #[test]
    fn test_missing_marker() {
        let err = header(b"not a pdf at all").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPdf);
    }

    #[test]
    fn test_marker_outside_window_is_rejected() {
        let mut bytes = vec![b' '; 2000];
        bytes.extend_from_slice(b"%PDF-1.4\n");
        let err = header(&bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPdf);
    }

    #[test]
    fn test_malformed_version() {
        let err = header(b"%PDF-x.y\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPdf);
    }
}
