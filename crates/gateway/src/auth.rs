//! Connection-accept authentication and IP allowlisting (C14, §4.14).
//!
//! Semantics are taken from the reference implementation, which this spec
//! treats as authoritative for edge cases: `JWT_BYPASS` accepts everything;
//! otherwise a missing token only verifies if `JWT_ALLOW_PLAIN` is set, and
//! a present token is checked as a plain-text match first (when
//! `JWT_ALLOW_PLAIN` is set) before falling back to an HS256 JWT decode.

use std::collections::HashSet;
use std::net::IpAddr;

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use crate::config::AuthConfig;
use crate::error::GatewayError;

/// Strips a `Bearer `/`bearer ` prefix from a raw token value, as the
/// reference does before any comparison or decode.
fn strip_bearer(raw: &str) -> &str {
    raw.strip_prefix("Bearer ").or_else(|| raw.strip_prefix("bearer ")).unwrap_or(raw)
}

/// Constant-time byte comparison, avoiding a timing side-channel on the
/// plain-token path.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

fn verify_jwt(token: &str, secret: &str) -> bool {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();
    decode::<serde_json::Value>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation).is_ok()
}

/// Authenticates a connection attempt. `raw_token` is whatever was found in
/// `?token=`, the `Authorization` header, or the WebSocket subprotocol,
/// already stripped of which source it came from but not of a `Bearer `
/// prefix.
pub fn authenticate(raw_token: Option<&str>, auth: &AuthConfig) -> Result<(), GatewayError> {
    if auth.jwt_bypass {
        return Ok(());
    }

    let Some(raw) = raw_token else {
        return if auth.jwt_allow_plain { Ok(()) } else { Err(GatewayError::Unauthorized) };
    };

    let token = strip_bearer(raw);

    if auth.jwt_allow_plain && constant_time_eq(token.as_bytes(), auth.jwt_secret.as_bytes()) {
        return Ok(());
    }

    if verify_jwt(token, &auth.jwt_secret) {
        Ok(())
    } else {
        Err(GatewayError::Unauthorized)
    }
}

/// An empty allowlist means unrestricted.
pub fn ip_allowed(ip: IpAddr, allowlist: &[IpAddr]) -> bool {
    allowlist.is_empty() || allowlist.contains(&ip)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth_cfg(bypass: bool, allow_plain: bool, secret: &str) -> AuthConfig {
        AuthConfig {
            jwt_secret: secret.to_string(),
            jwt_bypass: bypass,
            jwt_allow_plain: allow_plain,
        }
    }

    #[test]
    fn bypass_accepts_missing_token() {
        let cfg = auth_cfg(true, false, "devsecret");
        assert!(authenticate(None, &cfg).is_ok());
    }

    #[test]
    fn bypass_accepts_garbage_token() {
        let cfg = auth_cfg(true, false, "devsecret");
        assert!(authenticate(Some("garbage"), &cfg).is_ok());
    }

    #[test]
    fn missing_token_rejected_without_allow_plain() {
        let cfg = auth_cfg(false, false, "devsecret");
        assert!(authenticate(None, &cfg).is_err());
    }

    #[test]
    fn missing_token_accepted_with_allow_plain() {
        let cfg = auth_cfg(false, true, "devsecret");
        assert!(authenticate(None, &cfg).is_ok());
    }

    #[test]
    fn plain_token_match_accepted_when_allowed() {
        let cfg = auth_cfg(false, true, "devsecret");
        assert!(authenticate(Some("devsecret"), &cfg).is_ok());
    }

    #[test]
    fn bearer_prefix_is_stripped_before_plain_match() {
        let cfg = auth_cfg(false, true, "devsecret");
        assert!(authenticate(Some("Bearer devsecret"), &cfg).is_ok());
    }

    #[test]
    fn plain_mismatch_falls_through_to_jwt_and_fails_on_garbage() {
        let cfg = auth_cfg(false, true, "devsecret");
        assert!(authenticate(Some("not-the-secret"), &cfg).is_err());
    }

    #[test]
    fn valid_jwt_is_accepted() {
        let cfg = auth_cfg(false, false, "devsecret");
        let claims = serde_json::json!({ "sub": "tester" });
        let token = jsonwebtoken::encode(
            &jsonwebtoken::Header::new(Algorithm::HS256),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(b"devsecret"),
        )
        .unwrap();
        assert!(authenticate(Some(&token), &cfg).is_ok());
    }

    #[test]
    fn jwt_signed_with_wrong_secret_is_rejected() {
        let cfg = auth_cfg(false, false, "devsecret");
        let claims = serde_json::json!({ "sub": "tester" });
        let token = jsonwebtoken::encode(
            &jsonwebtoken::Header::new(Algorithm::HS256),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(b"wrong-secret"),
        )
        .unwrap();
        assert!(authenticate(Some(&token), &cfg).is_err());
    }

    #[test]
    fn ip_allowlist_empty_means_unrestricted() {
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(ip_allowed(ip, &[]));
    }

    #[test]
    fn ip_allowlist_rejects_unlisted_ip() {
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        let other: IpAddr = "10.0.0.1".parse().unwrap();
        assert!(!ip_allowed(ip, &[other]));
    }
}
