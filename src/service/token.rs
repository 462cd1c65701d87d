//! Minimal signed bearer tokens: `base64url(claims).base64url(hmac_sha256)`.

use crate::error::AppError;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{Duration, Utc};
use ring::hmac;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
}

#[derive(Clone)]
pub struct TokenSigner {
    key: hmac::Key,
    ttl: Duration,
}

impl TokenSigner {
    pub fn new(secret: &str, ttl_minutes: i64) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes()),
            ttl: Duration::minutes(ttl_minutes),
        }
    }

    pub fn issue(&self, subject: &str) -> Result<String, AppError> {
        let claims = Claims {
            sub: subject.to_string(),
            exp: (Utc::now() + self.ttl).timestamp(),
        };
        let payload = serde_json::to_vec(&claims)
            .map_err(|e| AppError::Unexpected(format!("encode token claims: {e}")))?;
        let payload = URL_SAFE_NO_PAD.encode(payload);
        let tag = hmac::sign(&self.key, payload.as_bytes());
        Ok(format!("{payload}.{}", URL_SAFE_NO_PAD.encode(tag.as_ref())))
    }

    /// Subject of a valid, unexpired token.
    pub fn verify(&self, token: &str) -> Result<String, AppError> {
        let invalid = || AppError::Unauthorized("Could not validate credentials".to_string());

        let (payload, tag) = token.split_once('.').ok_or_else(invalid)?;
        let tag = URL_SAFE_NO_PAD.decode(tag).map_err(|_| invalid())?;
        hmac::verify(&self.key, payload.as_bytes(), &tag).map_err(|_| invalid())?;

        let raw = URL_SAFE_NO_PAD.decode(payload).map_err(|_| invalid())?;
        let claims: Claims = serde_json::from_slice(&raw).map_err(|_| invalid())?;
        if claims.exp <= Utc::now().timestamp() {
            return Err(AppError::Unauthorized("Token has expired".to_string()));
        }
        Ok(claims.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies() {
        let signer = TokenSigner::new("secret", 30);
        let token = signer.issue("ravi").unwrap();
        assert_eq!(signer.verify(&token).unwrap(), "ravi");
    }

    #[test]
    fn foreign_or_tampered_tokens_fail() {
        let signer = TokenSigner::new("secret", 30);
        let other = TokenSigner::new("other", 30);
        let token = other.issue("ravi").unwrap();
        assert!(matches!(signer.verify(&token), Err(AppError::Unauthorized(_))));
        assert!(signer.verify("garbage").is_err());
    }

    #[test]
    fn expired_token_fails() {
        let signer = TokenSigner::new("secret", -1);
        let token = signer.issue("ravi").unwrap();
        assert!(matches!(signer.verify(&token), Err(AppError::Unauthorized(_))));
    }
}
