//! HMAC-SHA256 JWTs carrying a connection's `user_uuid` as the subject
//! claim, the same shape `CreateConn` tokens take on the wire.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

const ISSUER: &str = "im-gateway";
const AUDIENCE: &str = "member";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    pub exp: u64,
    pub iat: u64,
    pub nbf: u64,
    pub iss: String,
    pub aud: String,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Issues and validates `CreateConn` bearer tokens against a single shared
/// HMAC secret.
#[derive(Clone)]
pub struct JwtSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_ref()),
            decoding_key: DecodingKey::from_secret(secret.as_ref()),
        }
    }

    /// Generate a token for `user_uuid`, valid for `ttl_secs` seconds from
    /// now.
    pub fn generate_token(&self, user_uuid: &str, ttl_secs: u64) -> crate::Result<String> {
        let iat = now_secs();
        let claims = Claims {
            sub: user_uuid.to_string(),
            iat,
            nbf: iat,
            exp: iat + ttl_secs,
            iss: ISSUER.to_string(),
            aud: AUDIENCE.to_string(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?)
    }

    /// Validate a token and return its subject (`user_uuid`) on success.
    pub fn validate_token(&self, token: &str) -> crate::Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_audience(&[AUDIENCE]);
        validation.set_issuer(&[ISSUER]);
        let data = decode::<Claims>(token, &self.decoding_key, &validation)?;
        if data.claims.sub.is_empty() {
            return Err(crate::Error::MissingSubject);
        }
        Ok(data.claims)
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_valid_token() {
        let signer = JwtSigner::new(b"test-secret");
        let token = signer.generate_token("user-123", 3600).unwrap();
        let claims = signer.validate_token(&token).unwrap();
        assert_eq!(claims.sub, "user-123");
        assert_eq!(claims.iss, ISSUER);
        assert_eq!(claims.aud, AUDIENCE);
    }

    #[test]
    fn rejects_token_signed_with_a_different_secret() {
        let signer_a = JwtSigner::new(b"secret-a");
        let signer_b = JwtSigner::new(b"secret-b");
        let token = signer_a.generate_token("user-123", 3600).unwrap();
        assert!(signer_b.validate_token(&token).is_err());
    }

    #[test]
    fn rejects_expired_token() {
        let signer = JwtSigner::new(b"test-secret");
        let token = signer.generate_token("user-123", 0).unwrap();
        std::thread::sleep(std::time::Duration::from_secs(1));
        assert!(signer.validate_token(&token).is_err());
    }
}
