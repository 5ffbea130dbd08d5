//! FIX 4.2 tag=value framing.
//!
//! A frame is `8=<begin>|9=<body length>|<body>|10=<checksum>|` where `|` is
//! SOH, the body length counts the bytes between the `9=` field and `10=`,
//! and the checksum is the byte sum of everything before `10=` modulo 256.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;

/// Field delimiter.
pub const SOH: u8 = 0x01;
/// Protocol version.
pub const BEGIN_STRING: &str = "FIX.4.2";

/// Tag numbers used by the session and order flow.
pub mod tag {
    pub const CL_ORD_ID: u32 = 11;
    pub const HANDL_INST: u32 = 21;
    pub const LAST_PX: u32 = 31;
    pub const LAST_SHARES: u32 = 32;
    pub const MSG_SEQ_NUM: u32 = 34;
    pub const MSG_TYPE: u32 = 35;
    pub const ORDER_ID: u32 = 37;
    pub const ORDER_QTY: u32 = 38;
    pub const ORD_TYPE: u32 = 40;
    pub const ORIG_CL_ORD_ID: u32 = 41;
    pub const PRICE: u32 = 44;
    pub const REF_SEQ_NUM: u32 = 45;
    pub const SENDER_COMP_ID: u32 = 49;
    pub const SENDING_TIME: u32 = 52;
    pub const SIDE: u32 = 54;
    pub const SYMBOL: u32 = 55;
    pub const TARGET_COMP_ID: u32 = 56;
    pub const TEXT: u32 = 58;
    pub const TIME_IN_FORCE: u32 = 59;
    pub const TRANSACT_TIME: u32 = 60;
    pub const ENCRYPT_METHOD: u32 = 98;
    pub const HEART_BT_INT: u32 = 108;
    pub const TEST_REQ_ID: u32 = 112;
    pub const RESET_SEQ_NUM_FLAG: u32 = 141;
    pub const EXEC_TYPE: u32 = 150;
    pub const USERNAME: u32 = 553;
    pub const PASSWORD: u32 = 554;
}

/// Message types handled by the session.
pub mod msg_type {
    pub const HEARTBEAT: &str = "0";
    pub const TEST_REQUEST: &str = "1";
    pub const REJECT: &str = "3";
    pub const LOGOUT: &str = "5";
    pub const EXECUTION_REPORT: &str = "8";
    pub const LOGON: &str = "A";
    pub const NEW_ORDER_SINGLE: &str = "D";
    pub const ORDER_CANCEL_REQUEST: &str = "F";
}

/// Upper bound on BodyLength accepted from the wire.
const MAX_BODY_LEN: usize = 64 * 1024;

const UTC_TIMESTAMP: &str = "%Y%m%d-%H:%M:%S%.3f";

/// Format a FIX `UTCTimestamp` with milliseconds.
pub fn format_timestamp(time: DateTime<Utc>) -> String {
    time.format(UTC_TIMESTAMP).to_string()
}

/// Parse a FIX `UTCTimestamp`, with or without milliseconds.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, UTC_TIMESTAMP)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y%m%d-%H:%M:%S"))
        .ok()
        .map(|naive| naive.and_utc())
}

/// Framing error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Frame does not follow the tag=value layout.
    #[error("Malformed FIX frame: {0}")]
    Malformed(String),

    /// Trailer checksum mismatch.
    #[error("Checksum mismatch: expected {expected:03}, got {actual:03}")]
    Checksum {
        /// Checksum computed over the frame.
        expected: u8,
        /// Checksum carried in the trailer.
        actual: u8,
    },
}

/// One FIX message: the `MsgType` plus the remaining fields in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixMessage {
    msg_type: String,
    fields: Vec<(u32, String)>,
}

impl FixMessage {
    /// Empty message of a type.
    pub fn new(msg_type: impl Into<String>) -> Self {
        Self {
            msg_type: msg_type.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field.
    #[must_use]
    pub fn with(mut self, tag: u32, value: impl fmt::Display) -> Self {
        self.fields.push((tag, value.to_string()));
        self
    }

    /// Append a field in place.
    pub fn push(&mut self, tag: u32, value: impl fmt::Display) {
        self.fields.push((tag, value.to_string()));
    }

    /// `MsgType` (tag 35).
    pub fn msg_type(&self) -> &str {
        &self.msg_type
    }

    /// Fields after `MsgType`, in wire order.
    pub fn fields(&self) -> &[(u32, String)] {
        &self.fields
    }

    /// First value of a tag.
    pub fn get(&self, tag: u32) -> Option<&str> {
        self.fields
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, v)| v.as_str())
    }

    /// Encode with the standard trailer. Header fields must already be
    /// present in `fields` in the order they should appear after tag 35.
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(128);
        push_field(&mut body, tag::MSG_TYPE, &self.msg_type);
        for (t, v) in &self.fields {
            push_field(&mut body, *t, v);
        }

        let mut frame = Vec::with_capacity(body.len() + 32);
        push_field(&mut frame, 8, BEGIN_STRING);
        push_field(&mut frame, 9, &body.len().to_string());
        frame.extend_from_slice(&body);
        let sum = checksum(&frame);
        push_field(&mut frame, 10, &format!("{sum:03}"));
        frame
    }
}

fn push_field(buf: &mut Vec<u8>, tag: u32, value: &str) {
    buf.extend_from_slice(tag.to_string().as_bytes());
    buf.push(b'=');
    buf.extend_from_slice(value.as_bytes());
    buf.push(SOH);
}

fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

fn find_soh(buf: &[u8], from: usize) -> Option<usize> {
    buf.get(from..)?
        .iter()
        .position(|b| *b == SOH)
        .map(|p| from + p)
}

fn parse_field(raw: &[u8]) -> Result<(u32, String), CodecError> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| CodecError::Malformed("field is not UTF-8".to_string()))?;
    let (tag, value) = text
        .split_once('=')
        .ok_or_else(|| CodecError::Malformed(format!("field without '=': {text}")))?;
    let tag = tag
        .parse::<u32>()
        .map_err(|_| CodecError::Malformed(format!("invalid tag: {tag}")))?;
    Ok((tag, value.to_string()))
}

fn parse_body_length(raw: &[u8]) -> Result<usize, CodecError> {
    let (tag, value) = parse_field(raw)?;
    if tag != 9 {
        return Err(CodecError::Malformed(
            "BodyLength must follow BeginString".to_string(),
        ));
    }
    match value.parse::<usize>() {
        Ok(len) if len <= MAX_BODY_LEN => Ok(len),
        _ => Err(CodecError::Malformed(format!("invalid BodyLength: {value}"))),
    }
}

/// Take one complete frame off the front of `buf`.
///
/// Returns `Ok(None)` when more bytes are needed. Consumed bytes are removed
/// from `buf` even when the frame fails validation.
pub fn decode_frame(buf: &mut Vec<u8>) -> Result<Option<FixMessage>, CodecError> {
    // Skip garbage before the next BeginString.
    match buf.windows(2).position(|w| w == b"8=") {
        Some(0) => {}
        Some(start) => {
            buf.drain(..start);
        }
        None => {
            let keep = usize::from(buf.last() == Some(&b'8'));
            buf.drain(..buf.len() - keep);
            return Ok(None);
        }
    }

    let Some(begin_end) = find_soh(buf, 0) else {
        return Ok(None);
    };
    let Some(len_end) = find_soh(buf, begin_end + 1) else {
        return Ok(None);
    };
    let body_len = match parse_body_length(&buf[begin_end + 1..len_end]) {
        Ok(len) => len,
        Err(e) => {
            buf.drain(..=len_end);
            return Err(e);
        }
    };

    let body_start = len_end + 1;
    let trailer_start = body_start + body_len;
    // "10=NNN" + SOH
    let frame_end = trailer_start + 7;
    if buf.len() < frame_end {
        return Ok(None);
    }

    let frame: Vec<u8> = buf.drain(..frame_end).collect();
    let (trailer_tag, trailer_value) = parse_field(&frame[trailer_start..frame_end - 1])?;
    if trailer_tag != 10 || frame[frame_end - 1] != SOH {
        return Err(CodecError::Malformed("missing CheckSum trailer".to_string()));
    }
    let actual = trailer_value
        .parse::<u8>()
        .map_err(|_| CodecError::Malformed(format!("invalid CheckSum: {trailer_value}")))?;
    let expected = checksum(&frame[..trailer_start]);
    if expected != actual {
        return Err(CodecError::Checksum { expected, actual });
    }

    let mut fields = frame[body_start..trailer_start]
        .split(|b| *b == SOH)
        .filter(|f| !f.is_empty())
        .map(parse_field);
    let msg_type = match fields.next() {
        Some(Ok((tag::MSG_TYPE, v))) => v,
        Some(Err(e)) => return Err(e),
        _ => return Err(CodecError::Malformed("MsgType must open the body".to_string())),
    };
    Ok(Some(FixMessage {
        msg_type,
        fields: fields.collect::<Result<_, _>>()?,
    }))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn wire(s: &str) -> Vec<u8> {
        s.replace('|', "\u{1}").into_bytes()
    }

    #[test]
    fn encodes_length_and_checksum() {
        let msg = FixMessage::new(msg_type::HEARTBEAT)
            .with(tag::SENDER_COMP_ID, "CLIENT")
            .with(tag::TARGET_COMP_ID, "BROKER")
            .with(tag::MSG_SEQ_NUM, 2);
        let frame = msg.encode();
        let text = String::from_utf8(frame.clone()).unwrap().replace('\u{1}', "|");

        assert!(text.starts_with("8=FIX.4.2|9=30|35=0|49=CLIENT|56=BROKER|34=2|10="));
        let trailer_start = frame.len() - 7;
        assert_eq!(
            format!("10={:03}\u{1}", checksum(&frame[..trailer_start])).as_bytes(),
            &frame[trailer_start..]
        );
    }

    #[test]
    fn decodes_frames_split_across_reads() {
        let frame = FixMessage::new(msg_type::TEST_REQUEST)
            .with(tag::TEST_REQ_ID, "probe")
            .encode();
        let (head, tail) = frame.split_at(10);

        let mut buf = head.to_vec();
        assert_eq!(decode_frame(&mut buf).unwrap(), None);
        buf.extend_from_slice(tail);
        let msg = decode_frame(&mut buf).unwrap().unwrap();
        assert_eq!(msg.msg_type(), "1");
        assert_eq!(msg.get(tag::TEST_REQ_ID), Some("probe"));
        assert!(buf.is_empty());
    }

    #[test]
    fn rejects_bad_checksum_and_resyncs() {
        let mut frame = FixMessage::new(msg_type::HEARTBEAT).encode();
        let len = frame.len();
        frame[len - 2] = if frame[len - 2] == b'0' { b'1' } else { b'0' };
        let good = FixMessage::new(msg_type::LOGOUT).encode();

        let mut buf = frame;
        buf.extend_from_slice(&good);
        assert!(matches!(decode_frame(&mut buf), Err(CodecError::Checksum { .. })));
        assert_eq!(decode_frame(&mut buf).unwrap().unwrap().msg_type(), "5");
    }

    #[test]
    fn skips_leading_garbage() {
        let mut buf = wire("xx|");
        buf.extend_from_slice(&FixMessage::new(msg_type::LOGON).encode());
        assert_eq!(decode_frame(&mut buf).unwrap().unwrap().msg_type(), "A");
    }

    #[test]
    fn timestamps_round_trip_to_millis() {
        let parsed = parse_timestamp("20240102-03:04:05.678").unwrap();
        assert_eq!(format_timestamp(parsed), "20240102-03:04:05.678");
        assert!(parse_timestamp("20240102-03:04:05").is_some());
    }

    proptest! {
        #[test]
        fn any_printable_fields_survive_framing(
            values in proptest::collection::vec("[a-zA-Z0-9 .:-]{0,20}", 0..8)
        ) {
            let mut msg = FixMessage::new(msg_type::EXECUTION_REPORT);
            for (i, v) in values.iter().enumerate() {
                msg.push(1000 + i as u32, v);
            }
            let mut buf = msg.encode();
            let decoded = decode_frame(&mut buf).unwrap().unwrap();
            prop_assert_eq!(decoded, msg);
        }
    }
}
