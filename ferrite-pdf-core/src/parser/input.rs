//! Random-access input device.
//!
//! Xref discovery seeks from the end of the file and reads backward, so the
//! device exposes absolute positioning on top of any `Read + Seek` source.

use crate::error::{ErrorKind, PdfError, Result};
use std::io::{BufReader, Read, Seek, SeekFrom};

/// Buffered random-access byte source with a one-byte peek window.
pub struct PdfInput<R: Read + Seek> {
    inner: BufReader<R>,
    size: u64,
    position: u64,
    peeked: Option<u8>,
}

impl<R: Read + Seek> PdfInput<R> {
    pub fn new(device: R) -> Result<Self> {
        let mut inner = BufReader::new(device);
        let size = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(PdfInput {
            inner,
            size,
            position: 0,
            peeked: None,
        })
    }

    /// Total size of the underlying device in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Absolute position of the next byte to be read.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn seek(&mut self, target: SeekFrom) -> Result<u64> {
        let absolute = match target {
            SeekFrom::Start(offset) => offset,
            SeekFrom::Current(delta) => add_signed(self.position, delta)?,
            SeekFrom::End(delta) => add_signed(self.size, delta)?,
        };
        self.peeked = None;
        self.inner.seek(SeekFrom::Start(absolute))?;
        self.position = absolute;
        Ok(absolute)
    }

    /// Look at the next byte without consuming it.
    pub fn peek_byte(&mut self) -> Result<Option<u8>> {
        if let Some(byte) = self.peeked {
            return Ok(Some(byte));
        }
        let mut buf = [0u8; 1];
        match self.inner.read(&mut buf)? {
            0 => Ok(None),
            _ => {
                self.peeked = Some(buf[0]);
                Ok(Some(buf[0]))
            }
        }
    }

    pub fn read_byte(&mut self) -> Result<Option<u8>> {
        if let Some(byte) = self.peeked.take() {
            self.position += 1;
            return Ok(Some(byte));
        }
        let mut buf = [0u8; 1];
        match self.inner.read(&mut buf)? {
            0 => Ok(None),
            _ => {
                self.position += 1;
                Ok(Some(buf[0]))
            }
        }
    }

    /// Fill `buf` as far as the device allows, returning the byte count.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut filled = 0;
        if let Some(byte) = self.peeked.take() {
            buf[0] = byte;
            filled = 1;
            self.position += 1;
        }
        while filled < buf.len() {
            let n = self.inner.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
            self.position += n as u64;
        }
        Ok(filled)
    }

    /// Read exactly `len` bytes or fail with `UnexpectedEof`.
    pub fn read_exact_vec(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        let n = self.read(&mut buf)?;
        if n < len {
            return Err(PdfError::with_message(
                ErrorKind::UnexpectedEof,
                format!("wanted {len} bytes at offset {}, got {n}", self.position - n as u64),
            ));
        }
        Ok(buf)
    }

    /// Window read used by end-of-file discovery. The window is clamped to
    /// the device size; the position afterwards is the end of the window.
    pub fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let offset = offset.min(self.size);
        let available = (self.size - offset) as usize;
        self.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len.min(available)];
        let n = self.read(&mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }
}

fn add_signed(base: u64, delta: i64) -> Result<u64> {
    base.checked_add_signed(delta).ok_or_else(|| {
        PdfError::with_message(ErrorKind::ValueOutOfRange, format!("seek to {base}{delta:+}"))
    })
}
