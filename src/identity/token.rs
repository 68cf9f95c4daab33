//! Local, unverified token inspection.
//!
//! The route guard decodes the cookie token's payload and checks only the
//! expiry claim; it never verifies the signature or revocation status. A
//! forged-but-unexpired token therefore passes the edge gate. That gap is
//! inherited deliberately: every privileged operation re-verifies the token
//! with the identity provider before acting.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("invalid token payload: {0}")]
    Payload(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Claims {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

/// Decode the payload segment of a JWT without verifying anything.
///
/// # Errors
/// Returns [`TokenError`] when the token does not have three segments or the
/// payload is not base64url-encoded JSON.
pub fn decode_unverified(token: &str) -> Result<Claims, TokenError> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature)) =
        (segments.next(), segments.next(), segments.next())
    else {
        return Err(TokenError::Malformed);
    };
    if segments.next().is_some() {
        return Err(TokenError::Malformed);
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.as_bytes())
        .map_err(|_| TokenError::Malformed)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Expiry-claim check only. Missing or undecodable claims count as expired.
#[must_use]
pub fn is_unexpired(token: &str, now_unix: i64) -> bool {
    match decode_unverified(token) {
        Ok(claims) => claims.exp.is_some_and(|exp| exp > now_unix),
        Err(_) => false,
    }
}

/// Build an unsigned (`alg: none`) token carrying the given claims.
///
/// Used by the in-memory identity backend; real deployments receive signed
/// tokens from the platform and never mint locally.
#[must_use]
pub fn encode_unsigned(claims: &Claims) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = serde_json::to_vec(claims).unwrap_or_else(|_| b"{}".to_vec());
    format!("{header}.{}.", URL_SAFE_NO_PAD.encode(payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_with_exp(exp: i64) -> String {
        encode_unsigned(&Claims {
            sub: Some("user-1".to_string()),
            exp: Some(exp),
            ..Claims::default()
        })
    }

    #[test]
    fn round_trips_claims() {
        let token = token_with_exp(1_900_000_000);
        let claims = decode_unverified(&token).expect("decode");
        assert_eq!(claims.sub.as_deref(), Some("user-1"));
        assert_eq!(claims.exp, Some(1_900_000_000));
    }

    #[test]
    fn expiry_check_is_strict() {
        let token = token_with_exp(1_000);
        assert!(is_unexpired(&token, 999));
        assert!(!is_unexpired(&token, 1_000));
        assert!(!is_unexpired(&token, 1_001));
    }

    #[test]
    fn missing_exp_counts_as_expired() {
        let token = encode_unsigned(&Claims::default());
        assert!(!is_unexpired(&token, 0));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(decode_unverified("not-a-token").is_err());
        assert!(decode_unverified("a.b").is_err());
        assert!(decode_unverified("a.!!!.c").is_err());
        assert!(!is_unexpired("a.b.c.d", 0));
    }

    #[test]
    fn forged_unexpired_token_decodes() {
        // The documented trust gap: nothing here notices a bogus signature.
        let token = token_with_exp(i64::MAX);
        assert!(is_unexpired(&token, 1_700_000_000));
    }
}
