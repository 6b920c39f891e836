//! `X-Hub-Signature-256` verification, grounded in the teacher's
//! `integrations::webhooks::verify_webhook_signature`.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Verifies `signature` (the full `sha256=<hex>` header value) against
/// `body` using `secret`. Constant-time comparison to avoid leaking the
/// expected digest through timing.
#[must_use]
pub fn verify_signature(body: &[u8], signature: &str, secret: &str) -> bool {
    let Some(hex_digest) = signature.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(signature_bytes) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let computed = mac.finalize().into_bytes();
    computed.as_slice().ct_eq(&signature_bytes).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(body: &[u8], secret: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn accepts_a_correctly_signed_body() {
        let body = b"{\"hello\":\"world\"}";
        let sig = sign(body, "secret");
        assert!(verify_signature(body, &sig, "secret"));
    }

    #[test]
    fn rejects_wrong_secret() {
        let body = b"{\"hello\":\"world\"}";
        let sig = sign(body, "secret");
        assert!(!verify_signature(body, &sig, "other"));
    }

    #[test]
    fn rejects_malformed_header() {
        assert!(!verify_signature(b"x", "not-hex", "secret"));
        assert!(!verify_signature(b"x", "deadbeef", "secret"));
    }
}
