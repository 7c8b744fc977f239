//! Protocol-version dialects: V3.1 (partial encryption, MD5-keyed header) and
//! V3.3 (full encryption, 3-byte + 12-NUL version header on non-query
//! commands). Wraps/unwraps a JSON body into/from the bytes that sit at
//! frame offset 16.

use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::crypto::{self, WireEncoding};
use crate::error::DecryptError;

/// `"3.3"` followed by twelve NUL bytes.
const V33_VERSION_HEADER: [u8; 15] = *b"3.3\0\0\0\0\0\0\0\0\0\0\0\0";
/// `"3.1"` (no padding — V3.1's header is the MD5 hex slice instead).
const V31_VERSION_PREFIX: &[u8] = b"3.1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolVersion {
    #[serde(rename = "3.1")]
    V31,
    #[serde(rename = "3.3")]
    V33,
}

impl ProtocolVersion {
    /// Wrap a plaintext JSON body into the bytes to place at frame offset 16
    /// for the given command.
    pub fn build_body(self, command: Command, json_payload: &[u8], local_key: &[u8; 16]) -> Vec<u8> {
        match self {
            ProtocolVersion::V31 => self.build_body_v31(command, json_payload, local_key),
            ProtocolVersion::V33 => self.build_body_v33(command, json_payload, local_key),
        }
    }

    fn build_body_v31(self, command: Command, json_payload: &[u8], local_key: &[u8; 16]) -> Vec<u8> {
        if command != Command::Control {
            // Best-effort / untested beyond DP_QUERY and CONTROL (spec §9 open question).
            return json_payload.to_vec();
        }

        let ciphertext = crypto::encrypt(json_payload, local_key, WireEncoding::Base64);
        let header_digest = crypto::v31_control_header_digest(&ciphertext, local_key);

        let mut body = Vec::with_capacity(V31_VERSION_PREFIX.len() + header_digest.len() + ciphertext.len());
        body.extend_from_slice(V31_VERSION_PREFIX);
        body.extend_from_slice(header_digest.as_bytes());
        body.extend_from_slice(&ciphertext);
        body
    }

    fn build_body_v33(self, command: Command, json_payload: &[u8], local_key: &[u8; 16]) -> Vec<u8> {
        let ciphertext = crypto::encrypt(json_payload, local_key, WireEncoding::Raw);

        if command == Command::DpQuery {
            return ciphertext;
        }

        let mut body = Vec::with_capacity(V33_VERSION_HEADER.len() + ciphertext.len());
        body.extend_from_slice(&V33_VERSION_HEADER);
        body.extend_from_slice(&ciphertext);
        body
    }

    /// Unwrap a raw (still possibly version-headered, possibly encrypted)
    /// body into the decoded JSON string, or `None` if the body was empty.
    pub fn parse_body(self, raw_body: &[u8], local_key: &[u8; 16]) -> Result<Option<String>, DecryptError> {
        if raw_body.is_empty() {
            return Ok(None);
        }

        match self {
            ProtocolVersion::V31 => self.parse_body_v31(raw_body, local_key),
            ProtocolVersion::V33 => self.parse_body_v33(raw_body, local_key),
        }
    }

    fn parse_body_v31(self, raw_body: &[u8], local_key: &[u8; 16]) -> Result<Option<String>, DecryptError> {
        if raw_body.first() == Some(&b'{') {
            return String::from_utf8(raw_body.to_vec())
                .map(Some)
                .map_err(|_| DecryptError::InvalidUtf8);
        }

        if raw_body.starts_with(V31_VERSION_PREFIX) {
            // "3.1" + 16 hex-char MD5 slice, then base64 ciphertext.
            let after_prefix = &raw_body[V31_VERSION_PREFIX.len()..];
            if after_prefix.len() < 16 {
                return Err(DecryptError::InvalidPadding);
            }
            let ciphertext = &after_prefix[16..];
            return crypto::decrypt(ciphertext, local_key, WireEncoding::Base64).map(Some);
        }

        Err(DecryptError::InvalidUtf8)
    }

    fn parse_body_v33(self, raw_body: &[u8], local_key: &[u8; 16]) -> Result<Option<String>, DecryptError> {
        let ciphertext = if raw_body.len() >= V33_VERSION_HEADER.len() && &raw_body[..3] == b"3.3" {
            &raw_body[V33_VERSION_HEADER.len()..]
        } else {
            raw_body
        };

        if ciphertext.is_empty() {
            return Ok(None);
        }

        crypto::decrypt(ciphertext, local_key, WireEncoding::Raw).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 16] = *b"0123456789abcdef";

    #[test]
    fn v33_non_dp_query_has_version_header_then_decrypts() {
        let json = br#"{"devId":"d","uid":"d","t":"1","dps":{"1":true}}"#;
        let body = ProtocolVersion::V33.build_body(Command::Control, json, &KEY);

        assert_eq!(&body[0..3], b"3.3");
        assert_eq!(&body[3..15], &[0u8; 12]);

        let parsed = ProtocolVersion::V33.parse_body(&body, &KEY).unwrap().unwrap();
        assert_eq!(parsed.as_bytes(), json);
    }

    #[test]
    fn v33_dp_query_has_no_version_header() {
        let json = br#"{"gwId":"g","devId":"d","uid":"d","t":"1"}"#;
        let body = ProtocolVersion::V33.build_body(Command::DpQuery, json, &KEY);
        assert_ne!(&body[0..3], b"3.3");

        let parsed = ProtocolVersion::V33.parse_body(&body, &KEY).unwrap().unwrap();
        assert_eq!(parsed.as_bytes(), json);
    }

    #[test]
    fn v31_control_header_is_3_1_plus_16_hex_chars() {
        let json = br#"{"devId":"d","uid":"d","t":"1","dps":{"1":true}}"#;
        let body = ProtocolVersion::V31.build_body(Command::Control, json, &KEY);

        assert_eq!(&body[0..3], b"3.1");
        let hex_part = std::str::from_utf8(&body[3..19]).unwrap();
        assert!(hex_part.chars().all(|c| c.is_ascii_hexdigit()));

        let parsed = ProtocolVersion::V31.parse_body(&body, &KEY).unwrap().unwrap();
        assert_eq!(parsed.as_bytes(), json);
    }

    #[test]
    fn v31_dp_query_is_cleartext() {
        let json = br#"{"gwId":"g","devId":"d","uid":"d","t":"1"}"#;
        let body = ProtocolVersion::V31.build_body(Command::DpQuery, json, &KEY);
        assert_eq!(body, json);

        let parsed = ProtocolVersion::V31.parse_body(&body, &KEY).unwrap().unwrap();
        assert_eq!(parsed.as_bytes(), json);
    }

    #[test]
    fn empty_body_parses_to_none() {
        assert_eq!(ProtocolVersion::V33.parse_body(&[], &KEY).unwrap(), None);
        assert_eq!(ProtocolVersion::V31.parse_body(&[], &KEY).unwrap(), None);
    }
}
