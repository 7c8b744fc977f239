//! AES-128-ECB/PKCS#7 payload encryption, in the two wire representations the
//! protocol uses (raw ciphertext for V3.3 device traffic, base64-wrapped for
//! V3.1 and for discovery broadcasts), plus the fixed discovery key and the
//! V3.1 MD5-keyed header.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyInit};

use crate::error::DecryptError;

type Aes128EcbEnc = ecb::Encryptor<aes::Aes128>;
type Aes128EcbDec = ecb::Decryptor<aes::Aes128>;

const AES_BLOCK_SIZE: usize = 16;

/// How ciphertext is represented on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireEncoding {
    /// Raw AES output (V3.3 device traffic).
    Raw,
    /// Base64 of the raw AES output (V3.1, and V3.3 discovery broadcasts).
    Base64,
}

/// Encrypt `plaintext` under `key`, returning ciphertext in the requested
/// wire encoding.
pub fn encrypt(plaintext: &[u8], key: &[u8; 16], encoding: WireEncoding) -> Vec<u8> {
    let padded_len = (plaintext.len() / AES_BLOCK_SIZE + 1) * AES_BLOCK_SIZE;
    let mut buf = vec![0u8; padded_len];
    buf[..plaintext.len()].copy_from_slice(plaintext);

    let encrypted = Aes128EcbEnc::new(key.into())
        .encrypt_padded_mut::<Pkcs7>(&mut buf, plaintext.len())
        .expect("buffer is correctly sized for PKCS7 padding");

    match encoding {
        WireEncoding::Raw => encrypted.to_vec(),
        WireEncoding::Base64 => base64_encode(encrypted).into_bytes(),
    }
}

/// Decrypt `ciphertext` (in the given wire encoding) under `key`, returning
/// the UTF-8 plaintext. Bad padding, a bad key length, or non-UTF-8 output
/// all surface as `DecryptError` — the caller treats the reply as
/// unparseable and drops it.
pub fn decrypt(ciphertext: &[u8], key: &[u8; 16], encoding: WireEncoding) -> Result<String, DecryptError> {
    let raw = match encoding {
        WireEncoding::Raw => ciphertext.to_vec(),
        WireEncoding::Base64 => base64_decode(ciphertext).ok_or(DecryptError::InvalidPadding)?,
    };

    let mut buf = raw;
    let decrypted = Aes128EcbDec::new(key.into())
        .decrypt_padded_mut::<Pkcs7>(&mut buf)
        .map_err(|_| DecryptError::InvalidPadding)?;

    String::from_utf8(decrypted.to_vec()).map_err(|_| DecryptError::InvalidUtf8)
}

/// The well-known discovery key: `MD5(b"yGAdlopoPVldABfn")`.
pub fn discovery_key() -> [u8; 16] {
    md5_digest(b"yGAdlopoPVldABfn")
}

/// The 16 hex characters V3.1 CONTROL frames embed in their header:
/// `MD5("data="||ciphertext||"||lpv=3.1||"||local_key).hex()[8:24]`.
pub fn v31_control_header_digest(ciphertext: &[u8], local_key: &[u8; 16]) -> String {
    let mut preimage = Vec::with_capacity(5 + ciphertext.len() + 11 + 16);
    preimage.extend_from_slice(b"data=");
    preimage.extend_from_slice(ciphertext);
    preimage.extend_from_slice(b"||lpv=3.1||");
    preimage.extend_from_slice(local_key);

    let digest = md5_digest(&preimage);
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[8..24].to_string()
}

fn md5_digest(data: &[u8]) -> [u8; 16] {
    md5::compute(data).0
}

fn base64_encode(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(data)
}

fn base64_decode(data: &[u8]) -> Option<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(data).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 16] = *b"0123456789abcdef";

    #[test]
    fn raw_roundtrip() {
        let plaintext = b"{\"dps\":{\"1\":true}}";
        let ct = encrypt(plaintext, &KEY, WireEncoding::Raw);
        let pt = decrypt(&ct, &KEY, WireEncoding::Raw).unwrap();
        assert_eq!(pt.as_bytes(), plaintext);
    }

    #[test]
    fn base64_roundtrip() {
        let plaintext = b"{\"gwId\":\"abc\"}";
        let ct = encrypt(plaintext, &KEY, WireEncoding::Base64);
        let pt = decrypt(&ct, &KEY, WireEncoding::Base64).unwrap();
        assert_eq!(pt.as_bytes(), plaintext);
    }

    #[test]
    fn roundtrip_holds_for_many_lengths() {
        for len in 0..=200 {
            let plaintext = vec![b'x'; len];
            let ct = encrypt(&plaintext, &KEY, WireEncoding::Raw);
            let pt = decrypt(&ct, &KEY, WireEncoding::Raw).unwrap();
            assert_eq!(pt.as_bytes(), plaintext.as_slice());
        }
    }

    #[test]
    fn wrong_key_is_rejected_as_decrypt_error() {
        let plaintext = b"some json here padded to a block";
        let ct = encrypt(plaintext, &KEY, WireEncoding::Raw);
        let wrong_key = *b"fedcba9876543210";
        // Either padding is invalid under the wrong key, or it happens to
        // validate but decodes to non-UTF-8 / wrong content — either way it
        // must never panic and must never silently equal the plaintext.
        match decrypt(&ct, &wrong_key, WireEncoding::Raw) {
            Ok(s) => assert_ne!(s.as_bytes(), plaintext),
            Err(_) => {}
        }
    }

    #[test]
    fn discovery_key_is_stable() {
        let key = discovery_key();
        assert_eq!(key.len(), 16);
        // Regression pin: MD5("yGAdlopoPVldABfn") is a fixed, well-known value.
        assert_eq!(hex::encode(key), "6c1ec8e2bb9bb59ab50b0daf649b410a");
    }

    #[test]
    fn v31_header_digest_is_16_hex_chars() {
        let digest = v31_control_header_digest(b"some-ciphertext", &KEY);
        assert_eq!(digest.len(), 16);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
