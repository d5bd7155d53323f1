//! Stream Codec
//!
//! Wire format for quote results in flight: newline-delimited JSON, one
//! self-contained record per line. Each record is an `Indexed` envelope
//! (`{"index": n, "result": {...}}`) so a consumer can observe completion
//! order and still recover request order.
//!
//! Arbitrary-precision integers are written as `"bigint:<decimal>"` strings.
//! Typed decoding goes through serde; schema-free decoding (`decode_dynamic`)
//! restores integers purely by spotting the prefix.

pub mod bigint;

use alloy_primitives::U256;
use bytes::{Buf, Bytes};
use futures::stream::{BoxStream, Stream, StreamExt};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::io::StreamReader;

use crate::aggregator::{Indexed, QuoteSet};
use crate::errors::CodecError;

/// Upper bound on a single record; guards against a peer that never sends a newline
pub const MAX_RECORD_BYTES: usize = 4 * 1024 * 1024;

/// Content type used for proxy responses
pub const CONTENT_TYPE: &str = "application/x-ndjson";

// ============================================
// SINGLE RECORDS
// ============================================

/// Serialize one record, newline included
pub fn encode_record<T: Serialize>(record: &T) -> Result<String, CodecError> {
    let mut line = serde_json::to_string(record)?;
    line.push('\n');
    Ok(line)
}

pub fn decode_record<T: DeserializeOwned>(line: &str) -> Result<T, CodecError> {
    Ok(serde_json::from_str(line.trim_end())?)
}

// ============================================
// STREAMS
// ============================================

/// Encode a quote set as it resolves, one line per result in completion order
pub fn encode_stream<T>(set: QuoteSet<T>) -> BoxStream<'static, Result<Bytes, CodecError>>
where
    T: Serialize + Send + 'static,
{
    set.into_stream()
        .map(|item| encode_record(&item).map(Bytes::from))
        .boxed()
}

/// Decode a byte stream of records. Chunk boundaries need not align with lines.
pub fn decode_stream<T, S, B>(body: S) -> BoxStream<'static, Result<Indexed<T>, CodecError>>
where
    T: DeserializeOwned + Send + 'static,
    S: Stream<Item = io::Result<B>> + Send + 'static,
    B: Buf + Send + 'static,
{
    let reader = StreamReader::new(body);
    FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_RECORD_BYTES))
        .filter_map(|line| async move {
            match line {
                Ok(line) if line.trim().is_empty() => None,
                Ok(line) => Some(decode_record(&line)),
                Err(e) => Some(Err(CodecError::from(e))),
            }
        })
        .boxed()
}

// ============================================
// SCHEMA-FREE DECODING
// ============================================

/// A JSON value with big integers restored
#[derive(Debug, Clone, PartialEq)]
pub enum Revived {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    BigInt(U256),
    Array(Vec<Revived>),
    Object(BTreeMap<String, Revived>),
}

impl Revived {
    pub fn get(&self, key: &str) -> Option<&Revived> {
        match self {
            Revived::Object(map) => map.get(key),
            _ => None,
        }
    }

    pub fn as_bigint(&self) -> Option<U256> {
        match self {
            Revived::BigInt(v) => Some(*v),
            _ => None,
        }
    }
}

/// Walk a JSON tree, turning every prefixed string into a `BigInt`
pub fn revive(value: Value) -> Revived {
    match value {
        Value::Null => Revived::Null,
        Value::Bool(b) => Revived::Bool(b),
        Value::Number(n) => Revived::Number(n),
        Value::String(s) => match bigint::decode(&s) {
            Some(v) => Revived::BigInt(v),
            None => Revived::String(s),
        },
        Value::Array(items) => Revived::Array(items.into_iter().map(revive).collect()),
        Value::Object(map) => Revived::Object(map.into_iter().map(|(k, v)| (k, revive(v))).collect()),
    }
}

/// Decode a record without knowing its type
pub fn decode_dynamic(line: &str) -> Result<Revived, CodecError> {
    let value: Value = serde_json::from_str(line.trim_end())?;
    Ok(revive(value))
}
