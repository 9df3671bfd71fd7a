//! Encryption gate: authentication, retry without reparsing, and the
//! unencrypted parsing of the encryption dictionary itself.

mod common;

use common::{cursor, xor_hex_string, PdfBuilder, XorAuthenticator};
use ferrite_pdf::parser::reader::parse_with_authenticator;
use ferrite_pdf::{parse, DocumentParser, ErrorKind, ObjectId, ParseOptions, Permissions};

const KEY: u8 = 0x5A;

fn encrypted_doc() -> Vec<u8> {
    let mut builder = PdfBuilder::new("1.4");
    builder.obj(1, 0, "<< /Type /Catalog /Pages 2 0 R >>");
    builder.obj(2, 0, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>");
    builder.obj(
        3,
        0,
        &format!(
            "<< /Type /Page /Parent 2 0 R /Note {} >>",
            xor_hex_string(b"page three", KEY)
        ),
    );
    let owner_hash: String = "01".repeat(32);
    let user_hash: String = "02".repeat(32);
    builder.obj(
        5,
        0,
        &format!(
            "<< /Filter /Standard /V 2 /R 3 /O <{owner_hash}> /U <{user_hash}> /P -44 /Length 128 >>"
        ),
    );
    let payload: Vec<u8> = b"clear payload".iter().map(|b| b ^ KEY).collect();
    builder.stream_obj(6, 0, "", &payload);

    let xref = builder.pos();
    builder.append("xref\n0 4\n");
    builder.append(&common::free_entry(0, 65535));
    for number in [1, 2, 3] {
        let entry = builder.entry_for(number, 0);
        builder.append(&entry);
    }
    builder.append("5 2\n");
    for number in [5, 6] {
        let entry = builder.entry_for(number, 0);
        builder.append(&entry);
    }
    builder.append("trailer\n<< /Size 7 /Root 1 0 R /Encrypt 5 0 R >>\n");
    builder.finish(xref)
}

#[test]
fn test_encrypted_without_authenticator() {
    let err = parse(cursor(encrypted_doc()), ParseOptions::lenient()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidEncryptionDict);
}

#[test]
fn test_wrong_password_is_recoverable() {
    let options = ParseOptions::lenient().with_password(b"wrong".to_vec());
    let err = parse_with_authenticator(
        cursor(encrypted_doc()),
        options,
        XorAuthenticator::new(b"secret", KEY),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPassword);
    assert!(err.is_recoverable());

    // A fresh parse of the same input with the right password succeeds.
    let options = ParseOptions::lenient().with_password(b"secret".to_vec());
    let mut document = parse_with_authenticator(
        cursor(encrypted_doc()),
        options,
        XorAuthenticator::new(b"secret", KEY),
    )
    .unwrap();
    let page = document.object(ObjectId::new(3, 0)).unwrap();
    assert_eq!(
        page.dict().unwrap().get("Note").unwrap().as_string().unwrap().as_bytes(),
        b"page three"
    );
}

#[test]
fn test_password_retry_reuses_parse_state() {
    let mut parser = DocumentParser::new(cursor(encrypted_doc()), ParseOptions::lenient())
        .unwrap()
        .with_authenticator(XorAuthenticator::new(b"secret", KEY));

    let err = parser.parse().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPassword);

    // No reparse: set a new password on the same parser and continue.
    parser.set_password(b"secret".to_vec());
    parser.parse().unwrap();

    let mut document = parser.into_document();
    let page = document.object(ObjectId::new(3, 0)).unwrap();
    assert_eq!(
        page.dict().unwrap().get("Note").unwrap().as_string().unwrap().as_bytes(),
        b"page three"
    );
}

#[test]
fn test_stream_bodies_are_decrypted() {
    let options = ParseOptions::lenient().with_password(b"secret".to_vec());
    let mut document = parse_with_authenticator(
        cursor(encrypted_doc()),
        options,
        XorAuthenticator::new(b"secret", KEY),
    )
    .unwrap();
    assert_eq!(
        document.stream_data(ObjectId::new(6, 0)).unwrap(),
        b"clear payload"
    );
}

#[test]
fn test_encryption_dictionary_is_not_decrypted() {
    let options = ParseOptions::lenient().with_password(b"secret".to_vec());
    let mut document = parse_with_authenticator(
        cursor(encrypted_doc()),
        options,
        XorAuthenticator::new(b"secret", KEY),
    )
    .unwrap();
    assert!(document.is_encrypted());
    assert_eq!(document.permissions(), Permissions::all());

    // /O must still hold the raw hash bytes, not an XOR of them.
    let encrypt = document.object(ObjectId::new(5, 0)).unwrap();
    assert_eq!(
        encrypt.dict().unwrap().get("O").unwrap().as_string().unwrap().as_bytes(),
        vec![0x01; 32].as_slice()
    );
}

#[test]
fn test_malformed_encryption_dictionary() {
    // /O missing: the shape check fires before any authenticator runs.
    let mut builder = PdfBuilder::new("1.4");
    builder.obj(1, 0, "<< /Type /Catalog >>");
    builder.obj(5, 0, "<< /Filter /Standard /V 2 /R 3 /U <00> /P -1 >>");
    let xref = builder.pos();
    builder.append("xref\n0 2\n");
    builder.append(&common::free_entry(0, 65535));
    let entry1 = builder.entry_for(1, 0);
    builder.append(&entry1);
    builder.append("5 1\n");
    let entry5 = builder.entry_for(5, 0);
    builder.append(&entry5);
    builder.append("trailer\n<< /Size 6 /Root 1 0 R /Encrypt 5 0 R >>\n");
    let bytes = builder.finish(xref);

    let err = DocumentParser::new(cursor(bytes), ParseOptions::lenient()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidEncryptionDict);
}
