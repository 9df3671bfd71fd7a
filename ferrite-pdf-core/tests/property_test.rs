//! Property tests: free-list discipline, the generation cap and value
//! round-trips through the serializer in `common`.

mod common;

use common::write_value;
use ferrite_pdf::parser::input::PdfInput;
use ferrite_pdf::parser::lexer::Lexer;
use ferrite_pdf::parser::objects::{read_value, MAX_GENERATION};
use ferrite_pdf::parser::stack_safe::ParseContext;
use ferrite_pdf::{
    Object, ObjectId, ObjectStore, ParseOptions, PdfArray, PdfDictionary, PdfName, PdfObject,
    PdfString, StringFormat,
};
use proptest::prelude::*;
use std::io::Cursor;

fn parse_value(bytes: &[u8]) -> PdfObject {
    let input = PdfInput::new(Cursor::new(bytes.to_vec())).unwrap();
    let mut lexer = Lexer::new(input, ParseOptions::strict());
    let mut ctx = ParseContext::default();
    read_value(&mut lexer, &mut ctx).unwrap()
}

/// Structural equality modulo real-number precision.
fn value_approx_eq(a: &PdfObject, b: &PdfObject) -> bool {
    match (a, b) {
        (PdfObject::Real(x), PdfObject::Real(y)) => (x - y).abs() < 1e-9,
        (PdfObject::Array(x), PdfObject::Array(y)) => {
            x.len() == y.len()
                && x.iter().zip(y.iter()).all(|(a, b)| value_approx_eq(a, b))
        }
        (PdfObject::Dictionary(x), PdfObject::Dictionary(y)) => {
            x.len() == y.len()
                && x.iter().all(|(key, a)| {
                    y.get(key.as_str()).is_some_and(|b| value_approx_eq(a, b))
                })
        }
        (a, b) => a == b,
    }
}

fn value_strategy() -> impl Strategy<Value = PdfObject> {
    let leaf = prop_oneof![
        Just(PdfObject::Null),
        any::<bool>().prop_map(PdfObject::Boolean),
        any::<i64>().prop_map(PdfObject::Integer),
        (-1_000_000i64..1_000_000i64).prop_map(|n| PdfObject::Real(n as f64 / 1000.0)),
        "[A-Za-z0-9]{0,12}".prop_map(|name| PdfObject::Name(PdfName::new(name))),
        proptest::collection::vec(any::<u8>(), 0..24).prop_map(|bytes| {
            PdfObject::String(PdfString::new(bytes, StringFormat::Literal))
        }),
        proptest::collection::vec(any::<u8>(), 0..24).prop_map(|bytes| {
            PdfObject::String(PdfString::new(bytes, StringFormat::Hexadecimal))
        }),
        (1u32..100_000, 0u16..16).prop_map(|(number, generation)| {
            PdfObject::Reference(ObjectId::new(number, generation))
        }),
    ];
    leaf.prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..6)
                .prop_map(|elements| PdfObject::Array(PdfArray(elements))),
            proptest::collection::vec(("[A-Za-z][A-Za-z0-9]{0,7}", inner), 0..6).prop_map(
                |pairs| {
                    let mut dict = PdfDictionary::new();
                    for (key, value) in pairs {
                        dict.insert(key, value);
                    }
                    PdfObject::Dictionary(dict)
                }
            ),
        ]
    })
}

proptest! {
    /// Every constructible value survives serialize-then-parse, modulo
    /// real precision and duplicate dictionary keys.
    #[test]
    fn prop_value_round_trip(value in value_strategy()) {
        let mut bytes = Vec::new();
        write_value(&value, &mut bytes);
        let parsed = parse_value(&bytes);
        prop_assert!(
            value_approx_eq(&value, &parsed),
            "{value:?} -> {} -> {parsed:?}",
            String::from_utf8_lossy(&bytes)
        );
    }

    /// The free list stays sorted and duplicate-free under any mix of
    /// allocations and removals.
    #[test]
    fn prop_free_list_monotone(ops in proptest::collection::vec((any::<u8>(), any::<u8>()), 0..60)) {
        let mut store = ObjectStore::new();
        let mut live: Vec<ObjectId> = Vec::new();
        for (action, pick) in ops {
            if action % 3 < 2 || live.is_empty() {
                let id = store.insert_value(PdfObject::Null).unwrap().id;
                live.push(id);
            } else {
                let id = live.remove(pick as usize % live.len());
                store.remove(id, true).unwrap();
            }

            let numbers: Vec<u32> = store.free_list().iter().map(|id| id.number()).collect();
            let mut sorted = numbers.clone();
            sorted.sort_unstable();
            sorted.dedup();
            prop_assert_eq!(&numbers, &sorted, "free list must stay sorted and unique");
        }
    }

    /// Numbers whose generation reaches 65535 are retired, never
    /// reallocated.
    #[test]
    fn prop_generation_cap(generation in 0u16..MAX_GENERATION) {
        let mut store = ObjectStore::new();
        let id = ObjectId::new(1, generation);
        store.push(Object::new(id, PdfObject::Null));
        store.remove(id, true).unwrap();

        if generation == MAX_GENERATION - 1 {
            prop_assert!(store.is_unavailable(1));
            // The retired number is skipped by the allocator.
            let fresh = store.allocate().unwrap();
            prop_assert_eq!(fresh, ObjectId::new(2, 0));
        } else {
            prop_assert_eq!(store.free_list(), &[ObjectId::new(1, generation + 1)]);
            let fresh = store.allocate().unwrap();
            prop_assert_eq!(fresh, ObjectId::new(1, generation + 1));
        }
    }
}
