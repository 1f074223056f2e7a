//! Flat-text encoding of the record set.
//!
//! Each card is written as `name,number,cvv,month,year;`. A backslash escapes
//! the next character, so labels may contain `,`, `;` or `\` without breaking
//! the framing; data without those characters encodes exactly as the unescaped
//! legacy layout. Decoding feeds every field back through the card setters so
//! persisted data is re-validated on load.

use thiserror::Error;
use zeroize::Zeroizing;

use crate::card::{Card, CardError, CardField};

const FIELD_SEP: char = ',';
const RECORD_SEP: char = ';';
const ESCAPE: char = '\\';

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("record set is not valid UTF-8")]
    Utf8,
    #[error("record {record} ends inside an escape sequence")]
    DanglingEscape { record: usize },
    #[error("record {record} has {found} fields, expected {}", CardField::ALL.len())]
    FieldCount { record: usize, found: usize },
    #[error("record {record}: {source}")]
    InvalidField {
        record: usize,
        #[source]
        source: CardError,
    },
}

/// Serialize one card, including its trailing record separator.
pub fn encode_card(card: &Card, out: &mut String) {
    for (i, field) in CardField::ALL.iter().enumerate() {
        if i > 0 {
            out.push(FIELD_SEP);
        }
        escape_into(card.field(*field), out);
    }
    out.push(RECORD_SEP);
}

fn escape_into(value: &str, out: &mut String) {
    for c in value.chars() {
        if matches!(c, FIELD_SEP | RECORD_SEP | ESCAPE) {
            out.push(ESCAPE);
        }
        out.push(c);
    }
}

/// Serialize the whole record set in order. The buffer is wiped on drop.
pub fn encode(cards: &[Card]) -> Zeroizing<String> {
    let mut out = Zeroizing::new(String::new());
    for card in cards {
        encode_card(card, &mut out);
    }
    out
}

pub fn decode_bytes(bytes: &[u8]) -> Result<Vec<Card>, CodecError> {
    let text = std::str::from_utf8(bytes).map_err(|_| CodecError::Utf8)?;
    decode(text)
}

/// Parse a record set. A trailing separator is optional and empty records are skipped.
pub fn decode(text: &str) -> Result<Vec<Card>, CodecError> {
    split_records(text)?
        .iter()
        .enumerate()
        .map(|(record, fields)| decode_card(record, fields))
        .collect()
}

fn decode_card(record: usize, fields: &[Zeroizing<String>]) -> Result<Card, CodecError> {
    if fields.len() != CardField::ALL.len() {
        return Err(CodecError::FieldCount {
            record,
            found: fields.len(),
        });
    }

    let mut card = Card::new();
    for (field, value) in CardField::ALL.iter().zip(fields) {
        if *field == CardField::Name && value.is_empty() {
            continue;
        }
        card.set_field(*field, value)
            .map_err(|source| CodecError::InvalidField { record, source })?;
    }
    Ok(card)
}

type Record = Vec<Zeroizing<String>>;

fn split_records(text: &str) -> Result<Vec<Record>, CodecError> {
    let mut records: Vec<Record> = Vec::new();
    let mut fields: Record = Vec::new();
    let mut current = Zeroizing::new(String::new());
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        match c {
            ESCAPE => match chars.next() {
                Some(next) => current.push(next),
                None => {
                    return Err(CodecError::DanglingEscape {
                        record: records.len(),
                    })
                }
            },
            FIELD_SEP => fields.push(std::mem::replace(
                &mut current,
                Zeroizing::new(String::new()),
            )),
            RECORD_SEP => {
                fields.push(std::mem::replace(
                    &mut current,
                    Zeroizing::new(String::new()),
                ));
                push_record(&mut records, std::mem::take(&mut fields));
            }
            _ => current.push(c),
        }
    }

    if !current.is_empty() || !fields.is_empty() {
        fields.push(current);
        push_record(&mut records, fields);
    }
    Ok(records)
}

fn push_record(records: &mut Vec<Record>, fields: Record) {
    let blank = fields.len() == 1 && fields[0].is_empty();
    if !blank {
        records.push(fields);
    }
}
