//! Scannable ticket codes.
//!
//! A code is `IZT1.` followed by base64url (no padding) of
//! `ticket_id (16) || nonce (16) || HMAC-SHA256(secret, ticket_id || nonce) (32)`.
//! Codes that fail to decode or verify are indistinguishable from unknown ones.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub const CODE_PREFIX: &str = "IZT1.";

const ID_LEN: usize = 16;
const NONCE_LEN: usize = 16;
const TAG_LEN: usize = 32;
const PAYLOAD_LEN: usize = ID_LEN + NONCE_LEN;
const RAW_LEN: usize = PAYLOAD_LEN + TAG_LEN;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("ticket code secret must not be empty")]
    EmptySecret,

    #[error("invalid ticket code secret: {0}")]
    InvalidKey(#[from] hmac::digest::InvalidLength),
}

#[derive(Clone)]
pub struct TicketCodec {
    mac: HmacSha256,
}

impl TicketCodec {
    pub fn new(secret: &[u8]) -> Result<Self, CodecError> {
        if secret.is_empty() {
            return Err(CodecError::EmptySecret);
        }
        Ok(Self {
            mac: HmacSha256::new_from_slice(secret)?,
        })
    }

    /// Mints a fresh code for `ticket_id`. Two calls never yield the same code.
    pub fn issue(&self, ticket_id: Uuid) -> String {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let mut raw = Vec::with_capacity(RAW_LEN);
        raw.extend_from_slice(ticket_id.as_bytes());
        raw.extend_from_slice(&nonce);

        let mut mac = self.mac.clone();
        mac.update(&raw);
        raw.extend_from_slice(&mac.finalize().into_bytes());

        format!("{CODE_PREFIX}{}", URL_SAFE_NO_PAD.encode(raw))
    }

    /// Returns the embedded ticket id if the code is well formed and carries a
    /// valid signature.
    pub fn verify(&self, code: &str) -> Option<Uuid> {
        let encoded = code.strip_prefix(CODE_PREFIX)?;
        let raw = URL_SAFE_NO_PAD.decode(encoded).ok()?;
        if raw.len() != RAW_LEN {
            return None;
        }

        let (payload, tag) = raw.split_at(PAYLOAD_LEN);
        let mut mac = self.mac.clone();
        mac.update(payload);
        mac.verify_slice(tag).ok()?;

        Uuid::from_slice(&payload[..ID_LEN]).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> TicketCodec {
        TicketCodec::new(b"test-ticket-secret").unwrap()
    }

    #[test]
    fn test_issued_code_verifies_to_ticket_id() {
        let id = Uuid::new_v4();
        let code = codec().issue(id);

        assert!(code.starts_with(CODE_PREFIX));
        assert_eq!(codec().verify(&code), Some(id));
    }

    #[test]
    fn test_codes_for_same_ticket_differ() {
        let id = Uuid::new_v4();
        assert_ne!(codec().issue(id), codec().issue(id));
    }

    #[test]
    fn test_tampered_code_is_rejected() {
        let code = codec().issue(Uuid::new_v4());

        // Flip one character in the body.
        let mut chars: Vec<char> = code.chars().collect();
        let idx = CODE_PREFIX.len() + 3;
        chars[idx] = if chars[idx] == 'A' { 'B' } else { 'A' };
        let tampered: String = chars.into_iter().collect();

        assert_eq!(codec().verify(&tampered), None);
    }

    #[test]
    fn test_other_secret_is_rejected() {
        let code = codec().issue(Uuid::new_v4());
        let other = TicketCodec::new(b"another-secret").unwrap();
        assert_eq!(other.verify(&code), None);
    }

    #[test]
    fn test_garbage_is_rejected() {
        let codec = codec();
        assert_eq!(codec.verify(""), None);
        assert_eq!(codec.verify("IZT1."), None);
        assert_eq!(codec.verify("IZT1.!!!"), None);
        assert_eq!(codec.verify(&Uuid::new_v4().to_string()), None);
    }

    #[test]
    fn test_empty_secret_is_refused() {
        assert!(matches!(TicketCodec::new(b""), Err(CodecError::EmptySecret)));
    }
}
