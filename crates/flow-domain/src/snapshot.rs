//! Serializable snapshot shapes: the flow log / script-transform wire format.
//!
//! A flow snapshot is `{request, response, error, version, backup}`, where
//! `request` carries headers as an ordered list of `[name, [values]]` pairs
//! and `content` as base64 bytes. Readers must tolerate additional fields,
//! so every struct here derives `Deserialize`
//! with `#[serde(default)]` on fields introduced after v1.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestSnapshot {
    pub host: String,
    pub port: u16,
    pub scheme: String,
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, Vec<String>)>,
    #[serde(with = "base64_bytes")]
    pub content: Vec<u8>,
    #[serde(default)]
    pub is_replay: bool,
    #[serde(default)]
    pub stickycookie: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseSnapshot {
    pub status_code: u16,
    pub headers: Vec<(String, Vec<String>)>,
    #[serde(with = "base64_bytes")]
    pub content: Vec<u8>,
    #[serde(default)]
    pub is_replay: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorSnapshot {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FlowSnapshot {
    pub request: Option<RequestSnapshot>,
    pub response: Option<ResponseSnapshot>,
    pub error: Option<ErrorSnapshot>,
    pub version: (u16, u16, u16),
    pub backup: Option<Box<FlowSnapshot>>,
}

mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(s.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
