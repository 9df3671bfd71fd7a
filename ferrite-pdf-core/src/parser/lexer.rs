//! PDF tokenizer.
//!
//! Splits the byte stream into the twelve low-level PDF token kinds and
//! provides the dedicated readers for numbers, strings and names. Every
//! reader leaves the device positioned immediately after the last byte it
//! consumed; a token view borrows the lexer's scratch buffer and is valid
//! until the next call.

use crate::error::{ErrorKind, PdfError, Result};
use crate::parser::input::PdfInput;
use crate::parser::objects::{PdfName, PdfString, StringFormat};
use crate::parser::{ParseOptions, ParseWarning};
use std::io::{Read, Seek, SeekFrom};

/// PDF whitespace: NUL, tab, line feed, form feed, carriage return, space.
pub fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b'\0' | b'\t' | b'\n' | b'\x0C' | b'\r' | b' ')
}

/// PDF delimiters terminate literal tokens.
pub fn is_delimiter(byte: u8) -> bool {
    matches!(
        byte,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

fn is_regular(byte: u8) -> bool {
    !is_whitespace(byte) && !is_delimiter(byte)
}

/// Low-level token kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Contiguous run of regular characters (keywords, numbers).
    Literal,
    ParenOpen,
    ParenClose,
    BraceOpen,
    BraceClose,
    AngleOpen,
    AngleClose,
    DoubleAngleOpen,
    DoubleAngleClose,
    SquareOpen,
    SquareClose,
    Slash,
}

/// A parsed numeric token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Integer(i64),
    Real(f64),
}

/// Classify a literal token as a number, if it is one.
pub(crate) fn classify_number(bytes: &[u8]) -> Option<Number> {
    let mut rest = bytes;
    if let [b'+' | b'-', tail @ ..] = rest {
        rest = tail;
    }
    if rest.is_empty() || !rest.iter().all(|b| b.is_ascii_digit() || *b == b'.') {
        return None;
    }
    let dots = rest.iter().filter(|b| **b == b'.').count();
    if dots > 1 || rest.len() == dots {
        return None;
    }
    let text = std::str::from_utf8(bytes).ok()?;
    if dots == 0 {
        text.parse::<i64>().ok().map(Number::Integer)
    } else {
        text.parse::<f64>().ok().map(Number::Real)
    }
}

/// PDF tokenizer over a random-access input device.
pub struct Lexer<R: Read + Seek> {
    input: PdfInput<R>,
    scratch: Vec<u8>,
    options: ParseOptions,
    warnings: Vec<ParseWarning>,
}

impl<R: Read + Seek> Lexer<R> {
    pub fn new(input: PdfInput<R>, options: ParseOptions) -> Self {
        Lexer {
            input,
            scratch: Vec::with_capacity(128),
            options,
            warnings: Vec::new(),
        }
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    pub fn input(&self) -> &PdfInput<R> {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut PdfInput<R> {
        &mut self.input
    }

    pub fn into_input(self) -> PdfInput<R> {
        self.input
    }

    pub fn position(&self) -> u64 {
        self.input.position()
    }

    pub fn seek(&mut self, offset: u64) -> Result<()> {
        self.input.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    /// Warnings collected during lexing (lenient-mode recoveries).
    pub fn warnings(&self) -> &[ParseWarning] {
        &self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<ParseWarning> {
        std::mem::take(&mut self.warnings)
    }

    pub(crate) fn warn(&mut self, warning: ParseWarning) {
        tracing::warn!(?warning, "parse deviation recovered");
        if self.options.collect_warnings {
            self.warnings.push(warning);
        }
    }

    /// Skip whitespace and comments. A `%` outside a string opens a comment
    /// running to the next end of line.
    pub fn skip_whitespace(&mut self) -> Result<()> {
        loop {
            match self.input.peek_byte()? {
                Some(byte) if is_whitespace(byte) => {
                    self.input.read_byte()?;
                }
                Some(b'%') => {
                    self.skip_comment()?;
                }
                _ => return Ok(()),
            }
        }
    }

    fn skip_comment(&mut self) -> Result<()> {
        self.input.read_byte()?;
        while let Some(byte) = self.input.peek_byte()? {
            if byte == b'\r' || byte == b'\n' {
                break;
            }
            self.input.read_byte()?;
        }
        Ok(())
    }

    /// Read the next token. Returns `None` at end of input. The byte view
    /// borrows the shared scratch buffer and is valid until the next call.
    pub fn try_read_token(&mut self) -> Result<Option<(TokenKind, &[u8])>> {
        self.skip_whitespace()?;
        self.scratch.clear();
        let first = match self.input.peek_byte()? {
            Some(byte) => byte,
            None => return Ok(None),
        };
        let kind = match first {
            b'(' => self.single_byte_token(TokenKind::ParenOpen)?,
            b')' => self.single_byte_token(TokenKind::ParenClose)?,
            b'{' => self.single_byte_token(TokenKind::BraceOpen)?,
            b'}' => self.single_byte_token(TokenKind::BraceClose)?,
            b'[' => self.single_byte_token(TokenKind::SquareOpen)?,
            b']' => self.single_byte_token(TokenKind::SquareClose)?,
            b'/' => self.single_byte_token(TokenKind::Slash)?,
            b'<' => {
                self.consume_into_scratch()?;
                if self.input.peek_byte()? == Some(b'<') {
                    self.consume_into_scratch()?;
                    TokenKind::DoubleAngleOpen
                } else {
                    TokenKind::AngleOpen
                }
            }
            b'>' => {
                self.consume_into_scratch()?;
                if self.input.peek_byte()? == Some(b'>') {
                    self.consume_into_scratch()?;
                    TokenKind::DoubleAngleClose
                } else {
                    TokenKind::AngleClose
                }
            }
            _ => {
                while let Some(byte) = self.input.peek_byte()? {
                    if !is_regular(byte) {
                        break;
                    }
                    self.consume_into_scratch()?;
                }
                TokenKind::Literal
            }
        };
        Ok(Some((kind, self.scratch.as_slice())))
    }

    /// Non-consuming variant of [`try_read_token`]: reads a token, then
    /// restores the device position.
    pub fn try_peek_token(&mut self) -> Result<Option<(TokenKind, &[u8])>> {
        let saved = self.input.position();
        let kind = self.try_read_token()?.map(|(kind, _)| kind);
        self.input.seek(SeekFrom::Start(saved))?;
        Ok(kind.map(|kind| (kind, self.scratch.as_slice())))
    }

    fn single_byte_token(&mut self, kind: TokenKind) -> Result<TokenKind> {
        self.consume_into_scratch()?;
        Ok(kind)
    }

    fn consume_into_scratch(&mut self) -> Result<u8> {
        match self.input.read_byte()? {
            Some(byte) => {
                self.scratch.push(byte);
                Ok(byte)
            }
            None => Err(PdfError::new(ErrorKind::UnexpectedEof)),
        }
    }

    /// Read a number. Fails with `InvalidNumber` when the first
    /// non-whitespace byte is not a sign, digit or dot.
    pub fn read_number(&mut self) -> Result<Number> {
        self.skip_whitespace()?;
        let position = self.input.position();
        match self.input.peek_byte()? {
            None => return Err(PdfError::new(ErrorKind::UnexpectedEof)),
            Some(byte) if !matches!(byte, b'+' | b'-' | b'0'..=b'9' | b'.') => {
                return Err(PdfError::with_message(
                    ErrorKind::InvalidNumber,
                    format!("unexpected byte 0x{byte:02X} at offset {position}"),
                ));
            }
            _ => {}
        }
        self.scratch.clear();
        if matches!(self.input.peek_byte()?, Some(b'+' | b'-')) {
            self.consume_into_scratch()?;
        }
        let mut saw_dot = false;
        while let Some(byte) = self.input.peek_byte()? {
            match byte {
                b'0'..=b'9' => {
                    self.consume_into_scratch()?;
                }
                b'.' if !saw_dot => {
                    saw_dot = true;
                    self.consume_into_scratch()?;
                }
                _ => break,
            }
        }
        classify_number(&self.scratch).ok_or_else(|| {
            PdfError::with_message(
                ErrorKind::InvalidNumber,
                format!(
                    "'{}' at offset {position}",
                    String::from_utf8_lossy(&self.scratch)
                ),
            )
        })
    }

    /// Read a number and require it to be an integer.
    pub fn read_integer(&mut self) -> Result<i64> {
        match self.read_number()? {
            Number::Integer(value) => Ok(value),
            Number::Real(value) => Err(PdfError::with_message(
                ErrorKind::InvalidDataType,
                format!("expected integer, found real {value}"),
            )),
        }
    }

    /// Read a string in either form: `(…)` literal or `<…>` hexadecimal.
    pub fn read_string(&mut self) -> Result<PdfString> {
        self.skip_whitespace()?;
        match self.input.peek_byte()? {
            Some(b'(') => {
                self.input.read_byte()?;
                self.read_literal_string_body()
            }
            Some(b'<') => {
                self.input.read_byte()?;
                self.read_hex_string_body()
            }
            Some(byte) => Err(PdfError::with_message(
                ErrorKind::InvalidDataType,
                format!("expected string, found byte 0x{byte:02X}"),
            )),
            None => Err(PdfError::new(ErrorKind::UnexpectedEof)),
        }
    }

    /// Literal string body; the opening `(` is already consumed.
    pub(crate) fn read_literal_string_body(&mut self) -> Result<PdfString> {
        let mut data = Vec::new();
        let mut depth = 1u32;
        loop {
            let byte = match self.input.read_byte()? {
                Some(byte) => byte,
                None => {
                    if self.options.strict {
                        return Err(PdfError::with_message(
                            ErrorKind::UnexpectedEof,
                            "unterminated literal string",
                        ));
                    }
                    self.warn(ParseWarning::UnterminatedString {
                        offset: self.input.position(),
                    });
                    break;
                }
            };
            match byte {
                b'\\' => {
                    let Some(escaped) = self.input.read_byte()? else {
                        if self.options.strict {
                            return Err(PdfError::with_message(
                                ErrorKind::UnexpectedEof,
                                "escape at end of input",
                            ));
                        }
                        break;
                    };
                    match escaped {
                        b'n' => data.push(b'\n'),
                        b'r' => data.push(b'\r'),
                        b't' => data.push(b'\t'),
                        b'b' => data.push(b'\x08'),
                        b'f' => data.push(b'\x0C'),
                        b'(' => data.push(b'('),
                        b')' => data.push(b')'),
                        b'\\' => data.push(b'\\'),
                        b'0'..=b'7' => {
                            let mut value = (escaped - b'0') as u16;
                            for _ in 0..2 {
                                match self.input.peek_byte()? {
                                    Some(digit @ b'0'..=b'7') => {
                                        self.input.read_byte()?;
                                        value = value * 8 + (digit - b'0') as u16;
                                    }
                                    _ => break,
                                }
                            }
                            data.push((value & 0xFF) as u8);
                        }
                        // Backslash before an end of line joins the lines.
                        b'\r' => {
                            if self.input.peek_byte()? == Some(b'\n') {
                                self.input.read_byte()?;
                            }
                        }
                        b'\n' => {}
                        other => data.push(other),
                    }
                }
                b'(' => {
                    depth += 1;
                    data.push(byte);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    data.push(byte);
                }
                _ => data.push(byte),
            }
        }
        Ok(PdfString::new(data, StringFormat::Literal))
    }

    /// Hex string body; the opening `<` is already consumed. An odd final
    /// digit is padded with zero.
    pub(crate) fn read_hex_string_body(&mut self) -> Result<PdfString> {
        let mut digits = Vec::new();
        loop {
            let byte = match self.input.read_byte()? {
                Some(byte) => byte,
                None => {
                    if self.options.strict {
                        return Err(PdfError::with_message(
                            ErrorKind::UnexpectedEof,
                            "unterminated hex string",
                        ));
                    }
                    self.warn(ParseWarning::UnterminatedString {
                        offset: self.input.position(),
                    });
                    break;
                }
            };
            match byte {
                b'>' => break,
                byte if byte.is_ascii_hexdigit() => digits.push(byte),
                byte if is_whitespace(byte) => {}
                byte => {
                    if self.options.strict {
                        return Err(PdfError::with_message(
                            ErrorKind::InvalidDataType,
                            format!("byte 0x{byte:02X} in hex string"),
                        ));
                    }
                    self.warn(ParseWarning::InvalidHexDigit {
                        offset: self.input.position(),
                        byte,
                    });
                }
            }
        }
        if digits.len() % 2 != 0 {
            digits.push(b'0');
        }
        let mut data = Vec::with_capacity(digits.len() / 2);
        for pair in digits.chunks_exact(2) {
            let high = hex_value(pair[0]);
            let low = hex_value(pair[1]);
            data.push(high << 4 | low);
        }
        Ok(PdfString::new(data, StringFormat::Hexadecimal))
    }

    /// Read a name: `/` then regular characters with `#hh` escapes.
    pub fn read_name(&mut self) -> Result<PdfName> {
        self.skip_whitespace()?;
        match self.input.peek_byte()? {
            Some(b'/') => {
                self.input.read_byte()?;
                self.read_name_body()
            }
            Some(byte) => Err(PdfError::with_message(
                ErrorKind::InvalidName,
                format!("expected '/', found byte 0x{byte:02X}"),
            )),
            None => Err(PdfError::new(ErrorKind::UnexpectedEof)),
        }
    }

    /// Name body; the leading `/` is already consumed.
    pub(crate) fn read_name_body(&mut self) -> Result<PdfName> {
        let mut bytes = Vec::new();
        while let Some(byte) = self.input.peek_byte()? {
            if !is_regular(byte) {
                break;
            }
            self.input.read_byte()?;
            if byte == b'#' {
                let high = self.input.read_byte()?;
                let low = self.input.read_byte()?;
                match (high, low) {
                    (Some(high), Some(low))
                        if high.is_ascii_hexdigit() && low.is_ascii_hexdigit() =>
                    {
                        bytes.push(hex_value(high) << 4 | hex_value(low));
                    }
                    _ => {
                        return Err(PdfError::with_message(
                            ErrorKind::InvalidName,
                            format!("malformed #hh escape at offset {}", self.input.position()),
                        ));
                    }
                }
            } else {
                bytes.push(byte);
            }
        }
        Ok(PdfName::new(String::from_utf8_lossy(&bytes).into_owned()))
    }

    /// Consume the end of line that must follow the `stream` keyword:
    /// `\r\n` or `\n`. Lenient mode also accepts a bare `\r`.
    pub fn read_stream_eol(&mut self) -> Result<()> {
        match self.input.peek_byte()? {
            Some(b'\n') => {
                self.input.read_byte()?;
                Ok(())
            }
            Some(b'\r') => {
                self.input.read_byte()?;
                if self.input.peek_byte()? == Some(b'\n') {
                    self.input.read_byte()?;
                    Ok(())
                } else if self.options.strict {
                    Err(PdfError::with_message(
                        ErrorKind::InvalidObject,
                        "bare carriage return after 'stream'",
                    ))
                } else {
                    Ok(())
                }
            }
            _ => Err(PdfError::with_message(
                ErrorKind::InvalidObject,
                format!("missing end of line after 'stream' at offset {}", self.input.position()),
            )),
        }
    }

    /// Scan forward for a byte sequence. Returns the absolute offset of the
    /// first match at or after the current position; the device ends up
    /// right after the match (or at EOF when absent).
    pub fn find_sequence_forward(&mut self, needle: &[u8]) -> Result<Option<u64>> {
        debug_assert!(!needle.is_empty());
        let mut window: Vec<u8> = Vec::with_capacity(needle.len());
        while let Some(byte) = self.input.read_byte()? {
            if window.len() == needle.len() {
                window.remove(0);
            }
            window.push(byte);
            if window == needle {
                return Ok(Some(self.input.position() - needle.len() as u64));
            }
        }
        Ok(None)
    }
}

fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        _ => digit - b'A' + 10,
    }
}
