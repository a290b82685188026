//! The three JSON shapes exchanged between two natty peers.
//!
//! ```text
//! {"type":"offer","sdp":"v=0\r\n..."}
//! {"sdpMid":"0","sdpMLineIndex":0,"candidate":"candidate:1 1 udp ..."}
//! {"type":"error","message":"..."}
//! ```
//!
//! Every message travels as a single line of compact JSON. A message with a
//! non-empty `type` is a session description (or an error report); anything
//! else is expected to be an ICE candidate.

use crate::error::{Error, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

pub const TYPE_FIELD: &str = "type";
pub const SDP_FIELD: &str = "sdp";
pub const SDP_MID_FIELD: &str = "sdpMid";
pub const SDP_MLINE_INDEX_FIELD: &str = "sdpMLineIndex";
pub const CANDIDATE_FIELD: &str = "candidate";
pub const MESSAGE_FIELD: &str = "message";

const SDP_TYPE_OFFER_STR: &str = "offer";
const SDP_TYPE_ANSWER_STR: &str = "answer";
const ERROR_TYPE_STR: &str = "error";

/// Kind of session description carried in a `type`/`sdp` message.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

impl fmt::Display for SdpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            SdpType::Offer => SDP_TYPE_OFFER_STR,
            SdpType::Answer => SDP_TYPE_ANSWER_STR,
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IceCandidate {
    #[serde(rename = "sdpMid")]
    pub sdp_mid: String,
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: u16,
    pub candidate: String,
}

/// Reported to the remote side when the local peer gives up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename = "error")]
pub struct ErrorMessage {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SignalMessage {
    Description(SessionDescription),
    Candidate(IceCandidate),
    Error(ErrorMessage),
}

impl SignalMessage {
    pub fn offer(sdp: impl Into<String>) -> Self {
        SignalMessage::Description(SessionDescription {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        })
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        SignalMessage::Description(SessionDescription {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        })
    }

    pub fn candidate(
        sdp_mid: impl Into<String>,
        sdp_mline_index: u16,
        candidate: impl Into<String>,
    ) -> Self {
        SignalMessage::Candidate(IceCandidate {
            sdp_mid: sdp_mid.into(),
            sdp_mline_index,
            candidate: candidate.into(),
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        SignalMessage::Error(ErrorMessage {
            message: message.into(),
        })
    }

    /// Parses one line of input.
    ///
    /// A non-empty string `type` selects a session description (`offer` or
    /// `answer`) or an error report. Without it, the object must carry all
    /// three candidate fields.
    pub fn parse(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw).map_err(|_| Error::ErrInvalidJson)?;
        let object = value.as_object().ok_or(Error::ErrInvalidJson)?;

        match object.get(TYPE_FIELD).and_then(Value::as_str) {
            Some(kind) if !kind.is_empty() => Self::parse_typed(kind, object),
            _ => Self::parse_candidate(object),
        }
    }

    fn parse_typed(kind: &str, object: &Map<String, Value>) -> Result<Self> {
        if kind == ERROR_TYPE_STR {
            let message = string_field(object, MESSAGE_FIELD)?;
            return Ok(SignalMessage::error(message));
        }

        let sdp = string_field(object, SDP_FIELD)?;
        match kind {
            SDP_TYPE_OFFER_STR => Ok(SignalMessage::offer(sdp)),
            SDP_TYPE_ANSWER_STR => Ok(SignalMessage::answer(sdp)),
            _ => Err(Error::ErrUnknownSdpType(kind.to_owned())),
        }
    }

    fn parse_candidate(object: &Map<String, Value>) -> Result<Self> {
        let sdp_mid = string_field(object, SDP_MID_FIELD)?;
        let sdp_mline_index = object
            .get(SDP_MLINE_INDEX_FIELD)
            .and_then(Value::as_u64)
            .and_then(|index| u16::try_from(index).ok())
            .ok_or(Error::ErrMissingField(SDP_MLINE_INDEX_FIELD))?;
        let candidate = string_field(object, CANDIDATE_FIELD)?;

        Ok(SignalMessage::candidate(sdp_mid, sdp_mline_index, candidate))
    }

    /// Compact JSON terminated by a single `\n`.
    pub fn to_json_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

fn string_field<'a>(object: &'a Map<String, Value>, name: &'static str) -> Result<&'a str> {
    object
        .get(name)
        .and_then(Value::as_str)
        .ok_or(Error::ErrMissingField(name))
}
