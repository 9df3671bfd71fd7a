//! Crate-wide error type.
//!
//! Every fallible operation returns [`PdfError`], a typed kind plus the
//! propagation path it travelled. Each parsing layer pushes one frame so a
//! failed parse can be traced back to the byte that caused it.

use std::fmt;
use std::panic::Location;
use thiserror::Error;

/// Error kinds surfaced at the crate boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("not a valid PDF file")]
    InvalidPdf,

    #[error("invalid cross-reference section")]
    InvalidXRef,

    #[error("invalid trailer dictionary")]
    InvalidTrailer,

    #[error("missing or misplaced %%EOF marker")]
    InvalidEofToken,

    #[error("malformed number")]
    InvalidNumber,

    #[error("malformed name")]
    InvalidName,

    #[error("unexpected data type")]
    InvalidDataType,

    #[error("malformed indirect object")]
    InvalidObject,

    #[error("malformed encryption dictionary")]
    InvalidEncryptionDict,

    #[error("password does not unlock this document")]
    InvalidPassword,

    #[error("unsupported font format")]
    UnsupportedFontFormat,

    #[error("object not found")]
    ObjectNotFound,

    #[error("recursion limit exceeded")]
    RecursionLimit,

    #[error("value out of range")]
    ValueOutOfRange,

    #[error("unexpected end of file")]
    UnexpectedEof,

    #[error("internal logic error")]
    InternalLogic,
}

/// One step in an error's propagation path.
#[derive(Debug, Clone)]
pub struct ErrorFrame {
    pub message: String,
    pub file: &'static str,
    pub line: u32,
}

/// A typed parse error carrying the frames pushed on its way up.
#[derive(Debug)]
pub struct PdfError {
    kind: ErrorKind,
    frames: Vec<ErrorFrame>,
}

pub type Result<T> = std::result::Result<T, PdfError>;

impl PdfError {
    #[track_caller]
    pub fn new(kind: ErrorKind) -> Self {
        let location = Location::caller();
        PdfError {
            kind,
            frames: vec![ErrorFrame {
                message: String::new(),
                file: location.file(),
                line: location.line(),
            }],
        }
    }

    #[track_caller]
    pub fn with_message(kind: ErrorKind, message: impl Into<String>) -> Self {
        let location = Location::caller();
        PdfError {
            kind,
            frames: vec![ErrorFrame {
                message: message.into(),
                file: location.file(),
                line: location.line(),
            }],
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Propagation frames, origin first.
    pub fn frames(&self) -> &[ErrorFrame] {
        &self.frames
    }

    /// Push a context frame while the error travels up a layer.
    #[track_caller]
    pub fn push_frame(self, message: impl Into<String>) -> Self {
        let location = Location::caller();
        self.push_frame_at(message.into(), location.file(), location.line())
    }

    fn push_frame_at(mut self, message: String, file: &'static str, line: u32) -> Self {
        self.frames.push(ErrorFrame {
            message,
            file,
            line,
        });
        self
    }

    /// Only [`ErrorKind::InvalidPassword`] is recoverable: the caller may
    /// retry authentication without restarting the parse.
    pub fn is_recoverable(&self) -> bool {
        self.kind == ErrorKind::InvalidPassword
    }
}

impl fmt::Display for PdfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        let mut separator = ": ";
        for frame in self.frames.iter().rev() {
            if !frame.message.is_empty() {
                write!(f, "{separator}{}", frame.message)?;
                separator = " <- ";
            }
        }
        Ok(())
    }
}

impl std::error::Error for PdfError {}

impl From<std::io::Error> for PdfError {
    #[track_caller]
    fn from(err: std::io::Error) -> Self {
        let kind = if err.kind() == std::io::ErrorKind::UnexpectedEof {
            ErrorKind::UnexpectedEof
        } else {
            ErrorKind::InvalidPdf
        };
        PdfError::with_message(kind, err.to_string())
    }
}

/// Frame-pushing shorthand for `Result` chains at layer boundaries.
pub trait ResultExt<T> {
    fn frame(self, message: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    #[track_caller]
    fn frame(self, message: impl Into<String>) -> Result<T> {
        match self {
            Ok(value) => Ok(value),
            Err(err) => {
                let location = Location::caller();
                Err(err.push_frame_at(message.into(), location.file(), location.line()))
            }
        }
    }
}
