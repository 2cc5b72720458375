//! Request signing for private endpoints

use hmac::Hmac;
use hmac::Mac;
use jsonwebtoken::EncodingKey;
use jsonwebtoken::Header;
use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use sha2::Sha512;
use uuid::Uuid;

use crate::errors::HttpError;
use crate::errors::Result;

/// API key pair
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub secret_key: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self { api_key: api_key.into(), secret_key: secret_key.into() }
    }

    /// Read a key pair from two environment variables, `None` if either is unset
    pub fn from_env(api_key_var: &str, secret_key_var: &str) -> Option<Self> {
        let api_key = std::env::var(api_key_var).ok()?;
        let secret_key = std::env::var(secret_key_var).ok()?;
        Some(Self::new(api_key, secret_key))
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials").field("api_key", &self.api_key).field("secret_key", &"<redacted>").finish()
    }
}

/// Binance HMAC-SHA256 signature of a query string, hex encoded
pub fn binance_signature(secret_key: &str, query: &str) -> Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret_key.as_bytes()).map_err(|e| HttpError::AuthenticationFailed(e.to_string()))?;
    mac.update(query.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct UpbitClaims {
    pub access_key: String,
    pub nonce: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_hash_alg: Option<String>,
}

/// Upbit bearer token: an HS256 JWT with a fresh nonce and, for requests
/// carrying parameters, the SHA-512 hash of their query string
pub fn upbit_token(credentials: &Credentials, query: Option<&str>) -> Result<String> {
    let claims = UpbitClaims {
        access_key: credentials.api_key.clone(),
        nonce: Uuid::new_v4().to_string(),
        query_hash: query.map(|q| hex::encode(Sha512::digest(q.as_bytes()))),
        query_hash_alg: query.map(|_| "SHA512".to_string()),
    };

    jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(credentials.secret_key.as_bytes()))
        .map_err(|e| HttpError::AuthenticationFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::Algorithm;
    use jsonwebtoken::DecodingKey;
    use jsonwebtoken::Validation;

    use super::*;

    #[test]
    fn test_binance_signature_reference_vector() {
        let secret = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";

        assert_eq!(binance_signature(secret, query).unwrap(), "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71");
    }

    fn decode(token: &str, secret: &str) -> UpbitClaims {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        jsonwebtoken::decode::<UpbitClaims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation).unwrap().claims
    }

    #[test]
    fn test_upbit_token_without_query() {
        let credentials = Credentials::new("access", "secret");
        let claims = decode(&upbit_token(&credentials, None).unwrap(), "secret");

        assert_eq!(claims.access_key, "access");
        assert!(Uuid::parse_str(&claims.nonce).is_ok());
        assert!(claims.query_hash.is_none());
        assert!(claims.query_hash_alg.is_none());
    }

    #[test]
    fn test_upbit_token_hashes_query() {
        let credentials = Credentials::new("access", "secret");
        let query = "market=KRW-BTC&side=bid";
        let claims = decode(&upbit_token(&credentials, Some(query)).unwrap(), "secret");

        assert_eq!(claims.query_hash.as_deref(), Some(hex::encode(Sha512::digest(query.as_bytes())).as_str()));
        assert_eq!(claims.query_hash.unwrap().len(), 128);
        assert_eq!(claims.query_hash_alg.as_deref(), Some("SHA512"));
    }

    #[test]
    fn test_nonces_are_unique() {
        let credentials = Credentials::new("access", "secret");
        let a = decode(&upbit_token(&credentials, None).unwrap(), "secret");
        let b = decode(&upbit_token(&credentials, None).unwrap(), "secret");
        assert_ne!(a.nonce, b.nonce);
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let debug = format!("{:?}", Credentials::new("key", "hunter2"));
        assert!(!debug.contains("hunter2"));
    }
}
