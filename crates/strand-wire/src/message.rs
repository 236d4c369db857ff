//! Typed messages and the slash-delimited framer.
//!
//! Every datagram on the wire is a single message of the form
//! `/type/field1/field2/.../` - a leading and a trailing slash, fields
//! separated by unescaped slashes. A slash is unescaped when it is
//! preceded by an even number of consecutive backslashes (so `\\/` is an
//! escaped backslash followed by a field separator).
//!
//! ```text
//! /connect/SESSION/            open a session
//! /data/SESSION/POS/DATA/      payload bytes starting at offset POS
//! /ack/SESSION/LENGTH/         LENGTH bytes received from offset 0
//! /close/SESSION/              tear the session down
//! ```
//!
//! Numeric fields are decimal ASCII and must fit in a non-negative 32-bit
//! signed integer. The DATA field is the only escaped field; [`parse`]
//! hands back the raw payload and [`encode`] applies the escaping.
//!
//! [`parse`]: Message::parse
//! [`encode`]: Message::encode

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, WireError};
use crate::escape::{escape, unescape};

/// Maximum datagram size. Datagrams of this size or larger are rejected
/// outright, before any parsing.
pub const MAX_DATAGRAM: usize = 1000;

/// Maximum raw payload bytes per data message.
///
/// Half the datagram limit, leaving room for the frame fields and for
/// escaping expansion of the payload.
pub const MAX_CHUNK: usize = MAX_DATAGRAM / 2;

/// Session identifier chosen by the peer at connect time.
pub type SessionId = u32;

/// A single protocol datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Open (or re-acknowledge) a session.
    Connect { session: SessionId },
    /// Payload bytes starting at stream offset `pos`.
    ///
    /// `data` is the raw payload; escaping is applied on encode and
    /// removed on parse.
    Data {
        session: SessionId,
        pos: u32,
        data: Bytes,
    },
    /// Total bytes received from offset 0.
    Ack { session: SessionId, length: u32 },
    /// Tear the session down.
    Close { session: SessionId },
}

impl Message {
    /// Parse a raw datagram into a typed message.
    ///
    /// Rejections are total: an oversized, non-ASCII, unframed, unknown or
    /// wrongly-shaped datagram yields a [`WireError`] and must be dropped
    /// without a reply.
    pub fn parse(datagram: &[u8]) -> Result<Message> {
        if datagram.len() >= MAX_DATAGRAM {
            return Err(WireError::Oversized(datagram.len()));
        }
        if !datagram.is_ascii() {
            return Err(WireError::NotAscii);
        }
        // ASCII is valid UTF-8.
        let text = std::str::from_utf8(datagram).map_err(|_| WireError::NotAscii)?;
        if !text.starts_with('/') || !text.ends_with('/') {
            return Err(WireError::Unframed);
        }

        let fields = split_unescaped(text);
        if fields.is_empty() {
            return Err(WireError::Empty);
        }

        match fields[0] {
            "connect" => {
                expect_fields("connect", &fields, 2)?;
                Ok(Message::Connect {
                    session: parse_num(fields[1])?,
                })
            }
            "data" => {
                expect_fields("data", &fields, 4)?;
                Ok(Message::Data {
                    session: parse_num(fields[1])?,
                    pos: parse_num(fields[2])?,
                    data: Bytes::from(unescape(fields[3].as_bytes())),
                })
            }
            "ack" => {
                expect_fields("ack", &fields, 3)?;
                Ok(Message::Ack {
                    session: parse_num(fields[1])?,
                    length: parse_num(fields[2])?,
                })
            }
            "close" => {
                expect_fields("close", &fields, 2)?;
                Ok(Message::Close {
                    session: parse_num(fields[1])?,
                })
            }
            other => Err(WireError::UnknownKind(other.to_string())),
        }
    }

    /// Encode this message as a wire frame.
    ///
    /// Payloads no larger than [`MAX_CHUNK`] always encode below the
    /// datagram limit; keeping chunks small is the sender's job.
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(32);
        match self {
            Message::Connect { session } => {
                out.put_slice(format!("/connect/{session}/").as_bytes());
            }
            Message::Data { session, pos, data } => {
                out.put_slice(format!("/data/{session}/{pos}/").as_bytes());
                out.put_slice(&escape(data));
                out.put_u8(b'/');
            }
            Message::Ack { session, length } => {
                out.put_slice(format!("/ack/{session}/{length}/").as_bytes());
            }
            Message::Close { session } => {
                out.put_slice(format!("/close/{session}/").as_bytes());
            }
        }
        out.freeze()
    }

    /// The session id this message refers to.
    pub fn session(&self) -> SessionId {
        match *self {
            Message::Connect { session }
            | Message::Data { session, .. }
            | Message::Ack { session, .. }
            | Message::Close { session } => session,
        }
    }
}

/// Split on unescaped slashes, dropping empty fields.
///
/// Tracks escape state byte by byte: a backslash flips the next byte into
/// "escaped content", so `\/` stays inside a field while `\\/` contributes
/// an escaped backslash and then splits.
fn split_unescaped(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut fields = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' => escaped = true,
            b'/' => {
                if i > start {
                    fields.push(&text[start..i]);
                }
                start = i + 1;
            }
            _ => {}
        }
    }
    // Unreachable for well-framed input (the frame ends with an unescaped
    // slash) but an escaped trailing slash leaves a final field behind.
    if start < bytes.len() {
        fields.push(&text[start..]);
    }
    fields
}

fn expect_fields(kind: &'static str, fields: &[&str], want: usize) -> Result<()> {
    if fields.len() != want {
        return Err(WireError::FieldCount {
            kind,
            want,
            got: fields.len(),
        });
    }
    Ok(())
}

/// Numeric fields must parse as a non-negative 32-bit signed integer;
/// anything larger, negative or non-decimal makes the datagram malformed.
fn parse_num(field: &str) -> Result<u32> {
    field
        .parse::<i32>()
        .ok()
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| WireError::InvalidNumber(field.to_string()))
}
