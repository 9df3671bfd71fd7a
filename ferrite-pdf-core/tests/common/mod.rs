//! Shared fixtures: an in-memory PDF builder with offset tracking, a
//! minimal value serializer for round-trip checks, and a toy XOR
//! authenticator standing in for a real security handler.

#![allow(dead_code)]

use ferrite_pdf::{
    Authenticator, Decryptor, EncryptSession, ObjectId, PasswordKind, PdfDictionary, PdfObject,
    Result, StringFormat,
};
use std::collections::HashMap;
use std::io::Cursor;

/// Builds PDF bytes while tracking object offsets, so xref tables in the
/// fixtures are always consistent.
pub struct PdfBuilder {
    bytes: Vec<u8>,
    /// Offset of the `%` of `%PDF-`; nonzero with leading garbage.
    base: u64,
    offsets: HashMap<u32, u64>,
}

impl PdfBuilder {
    pub fn new(version: &str) -> Self {
        Self::with_leading_garbage(version, b"")
    }

    pub fn with_leading_garbage(version: &str, garbage: &[u8]) -> Self {
        let mut bytes = garbage.to_vec();
        let base = bytes.len() as u64;
        bytes.extend_from_slice(format!("%PDF-{version}\n").as_bytes());
        PdfBuilder {
            bytes,
            base,
            offsets: HashMap::new(),
        }
    }

    /// Continue appending an incremental update to finished bytes.
    pub fn resume(bytes: Vec<u8>) -> Self {
        PdfBuilder {
            bytes,
            base: 0,
            offsets: HashMap::new(),
        }
    }

    /// Current offset relative to the header magic (what xref entries and
    /// startxref must carry).
    pub fn pos(&self) -> u64 {
        self.bytes.len() as u64 - self.base
    }

    pub fn append(&mut self, text: &str) -> &mut Self {
        self.bytes.extend_from_slice(text.as_bytes());
        self
    }

    pub fn append_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    /// Write `N G obj <body> endobj`, recording the offset.
    pub fn obj(&mut self, number: u32, generation: u16, body: &str) -> u64 {
        let offset = self.pos();
        self.offsets.insert(number, offset);
        self.append(&format!("{number} {generation} obj\n{body}\nendobj\n"));
        offset
    }

    /// Write a stream object; `/Length` is appended to the dictionary.
    pub fn stream_obj(
        &mut self,
        number: u32,
        generation: u16,
        dict_entries: &str,
        data: &[u8],
    ) -> u64 {
        let offset = self.pos();
        self.offsets.insert(number, offset);
        self.append(&format!(
            "{number} {generation} obj\n<< {dict_entries} /Length {} >>\nstream\n",
            data.len()
        ));
        self.append_bytes(data);
        self.append("\nendstream\nendobj\n");
        offset
    }

    pub fn offset_of(&self, number: u32) -> u64 {
        self.offsets[&number]
    }

    /// Record an offset for an object written through `append` directly.
    pub fn register(&mut self, number: u32, offset: u64) {
        self.offsets.insert(number, offset);
    }

    /// 20-byte in-use entry for a previously written object.
    pub fn entry_for(&self, number: u32, generation: u16) -> String {
        in_use_entry(self.offset_of(number), generation)
    }

    /// Classical xref with one subsection starting at 0: the free head
    /// plus the given entries. Returns the section offset.
    pub fn xref_table(&mut self, entries: &[String], trailer: &str) -> u64 {
        let offset = self.pos();
        self.append(&format!("xref\n0 {}\n", entries.len() + 1));
        self.append(&free_entry(0, 65535));
        for entry in entries {
            self.append(entry);
        }
        self.append(&format!("trailer\n{trailer}\n"));
        offset
    }

    pub fn finish(mut self, startxref: u64) -> Vec<u8> {
        self.append(&format!("startxref\n{startxref}\n%%EOF\n"));
        self.bytes
    }

    pub fn finish_raw(self) -> Vec<u8> {
        self.bytes
    }
}

pub fn in_use_entry(offset: u64, generation: u16) -> String {
    format!("{offset:010} {generation:05} n \n")
}

pub fn free_entry(next_free: u32, generation: u16) -> String {
    format!("{next_free:010} {generation:05} f \n")
}

pub fn cursor(bytes: Vec<u8>) -> Cursor<Vec<u8>> {
    Cursor::new(bytes)
}

/// The minimal one-page document: Catalog -> Pages -> Page with empty
/// Contents, classical xref, `<< /Size 4 /Root 1 0 R >>` trailer.
pub fn minimal_doc() -> Vec<u8> {
    minimal_builder().0
}

/// Same, returning the xref offset for tests that append an update.
pub fn minimal_builder() -> (Vec<u8>, u64) {
    let mut builder = PdfBuilder::new("1.4");
    builder.obj(1, 0, "<< /Type /Catalog /Pages 2 0 R >>");
    builder.obj(2, 0, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>");
    builder.obj(3, 0, "<< /Type /Page /Parent 2 0 R /Contents [] >>");
    let entries = [
        builder.entry_for(1, 0),
        builder.entry_for(2, 0),
        builder.entry_for(3, 0),
    ];
    let xref = builder.xref_table(&entries, "<< /Size 4 /Root 1 0 R >>");
    (builder.finish(xref), xref)
}

/// Serialize a value back to PDF syntax (test-side inverse of the parser).
pub fn write_value(value: &PdfObject, out: &mut Vec<u8>) {
    match value {
        PdfObject::Null => out.extend_from_slice(b"null"),
        PdfObject::Boolean(true) => out.extend_from_slice(b"true"),
        PdfObject::Boolean(false) => out.extend_from_slice(b"false"),
        PdfObject::Integer(value) => out.extend_from_slice(value.to_string().as_bytes()),
        PdfObject::Real(value) => {
            // Keep the decimal point so the value reads back as a real.
            if value.fract() == 0.0 {
                out.extend_from_slice(format!("{value:.1}").as_bytes());
            } else {
                out.extend_from_slice(format!("{value}").as_bytes());
            }
        }
        PdfObject::Name(name) => {
            out.push(b'/');
            for byte in name.as_str().bytes() {
                let delimiter = matches!(
                    byte,
                    b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
                );
                if byte <= b' ' || byte == b'#' || delimiter {
                    out.extend_from_slice(format!("#{byte:02X}").as_bytes());
                } else {
                    out.push(byte);
                }
            }
        }
        PdfObject::String(string) => match string.format() {
            StringFormat::Literal => {
                out.push(b'(');
                for byte in string.as_bytes() {
                    match byte {
                        b'(' | b')' | b'\\' => {
                            out.push(b'\\');
                            out.push(*byte);
                        }
                        b'\r' => out.extend_from_slice(b"\\r"),
                        other => out.push(*other),
                    }
                }
                out.push(b')');
            }
            StringFormat::Hexadecimal => {
                out.push(b'<');
                for byte in string.as_bytes() {
                    out.extend_from_slice(format!("{byte:02X}").as_bytes());
                }
                out.push(b'>');
            }
        },
        PdfObject::Array(array) => {
            out.push(b'[');
            for (index, element) in array.iter().enumerate() {
                if index > 0 {
                    out.push(b' ');
                }
                write_value(element, out);
            }
            out.push(b']');
        }
        PdfObject::Dictionary(dict) => {
            out.extend_from_slice(b"<< ");
            for (key, element) in dict.iter() {
                write_value(&PdfObject::Name(key.clone()), out);
                out.push(b' ');
                write_value(element, out);
                out.push(b' ');
            }
            out.extend_from_slice(b">>");
        }
        PdfObject::Reference(id) => {
            out.extend_from_slice(format!("{} {} R", id.number(), id.generation()).as_bytes());
        }
        PdfObject::Raw(bytes) => out.extend_from_slice(bytes),
    }
}

/// XOR "encryption": a stand-in security handler for gate tests. Real
/// cryptography lives outside the core by contract.
pub struct XorAuthenticator {
    pub password: Vec<u8>,
    pub key: u8,
}

impl XorAuthenticator {
    pub fn new(password: &[u8], key: u8) -> Box<Self> {
        Box::new(XorAuthenticator {
            password: password.to_vec(),
            key,
        })
    }
}

impl Authenticator for XorAuthenticator {
    fn open_session(&self, _encrypt: &PdfDictionary) -> Result<Box<dyn EncryptSession>> {
        Ok(Box::new(XorSession {
            password: self.password.clone(),
            key: self.key,
        }))
    }
}

struct XorSession {
    password: Vec<u8>,
    key: u8,
}

impl EncryptSession for XorSession {
    fn authenticate(&mut self, password: &[u8], _document_id: Option<&[u8]>) -> PasswordKind {
        if password == self.password.as_slice() {
            PasswordKind::User
        } else {
            PasswordKind::Failed
        }
    }

    fn wrap_object(&self, _id: ObjectId) -> Box<dyn Decryptor> {
        Box::new(XorDecryptor { key: self.key })
    }
}

struct XorDecryptor {
    key: u8,
}

impl Decryptor for XorDecryptor {
    fn decrypt_string(&self, data: &[u8]) -> Vec<u8> {
        data.iter().map(|byte| byte ^ self.key).collect()
    }

    fn decrypt_stream(&self, data: &[u8]) -> Vec<u8> {
        self.decrypt_string(data)
    }
}

/// Hex-string form of XOR-enciphered text, safe to embed in fixtures.
pub fn xor_hex_string(clear: &[u8], key: u8) -> String {
    let mut out = String::from("<");
    for byte in clear {
        out.push_str(&format!("{:02X}", byte ^ key));
    }
    out.push('>');
    out
}
