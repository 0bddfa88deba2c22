//! Token signing and verification with per-tenant algorithm selection.
//!
//! RS256 signs under the active kid and verifies by kid lookup against the
//! key ring snapshot; HS256 uses the process-wide secret.

use crate::config::JwtAlgorithm;
use crate::entities::Tenant;
use crate::error::{ErrorKind, GatewayError};
use crate::jwt::Payload;
use crate::keys::KeyManager;
use chrono::Utc;
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::sync::Arc;

/// Signs and verifies bearer tokens.
pub struct TokenSigner {
    keys: Arc<KeyManager>,
    hs_secret: String,
    default_algorithm: JwtAlgorithm,
}

impl TokenSigner {
    /// Create a signer over the key manager and the HS256 process secret.
    #[must_use]
    pub fn new(keys: Arc<KeyManager>, hs_secret: String, default_algorithm: JwtAlgorithm) -> Self {
        Self {
            keys,
            hs_secret,
            default_algorithm,
        }
    }

    /// Sign a payload with the tenant's effective algorithm.
    ///
    /// # Errors
    ///
    /// Fails when no active RSA key exists for an RS256 tenant or encoding
    /// fails.
    pub fn sign_for_tenant(&self, payload: &Payload, tenant: &Tenant) -> Result<String, GatewayError> {
        self.sign(payload, tenant.effective_algorithm(self.default_algorithm))
    }

    /// Sign a payload with an explicit algorithm.
    ///
    /// # Errors
    ///
    /// Fails when no active RSA key exists for RS256 or encoding fails.
    pub fn sign(&self, payload: &Payload, algorithm: JwtAlgorithm) -> Result<String, GatewayError> {
        match algorithm {
            JwtAlgorithm::HS256 => {
                let header = Header::new(Algorithm::HS256);
                let key = EncodingKey::from_secret(self.hs_secret.as_bytes());
                encode(&header, payload, &key).map_err(|e| GatewayError::keys(e.to_string()))
            }
            JwtAlgorithm::RS256 => {
                let ring = self.keys.ring();
                let active = ring
                    .active()
                    .ok_or_else(|| GatewayError::keys("No active RSA signing key"))?;
                let mut header = Header::new(Algorithm::RS256);
                header.kid = Some(active.kid.clone());
                encode(&header, payload, &active.encoding)
                    .map_err(|e| GatewayError::keys(e.to_string()))
            }
        }
    }

    /// Verify a token and return its claims.
    ///
    /// # Errors
    ///
    /// `EXPIRED_TOKEN` when past expiry, `INVALID_TOKEN` for every other
    /// verification failure.
    pub fn verify(&self, token: &str) -> Result<Payload, GatewayError> {
        let (payload, expired) = self.verify_allow_expired(token)?;
        if expired {
            return Err(ErrorKind::ExpiredToken.into());
        }
        Ok(payload)
    }

    /// Verify a token's signature, reporting expiry as a flag instead of an
    /// error. The client-info middleware uses this to mark an expired SSO
    /// cookie without discarding its claims.
    ///
    /// # Errors
    ///
    /// `INVALID_TOKEN` when the signature or shape is wrong.
    pub fn verify_allow_expired(&self, token: &str) -> Result<(Payload, bool), GatewayError> {
        let header = decode_header(token).map_err(|_| ErrorKind::InvalidToken)?;

        let (algorithm, key) = match header.alg {
            Algorithm::HS256 => (
                Algorithm::HS256,
                DecodingKey::from_secret(self.hs_secret.as_bytes()),
            ),
            Algorithm::RS256 => {
                let kid = header.kid.ok_or(ErrorKind::InvalidToken)?;
                let ring = self.keys.ring();
                let key = ring.find(&kid).ok_or(ErrorKind::InvalidToken)?;
                (Algorithm::RS256, key.decoding.clone())
            }
            _ => return Err(ErrorKind::InvalidToken.into()),
        };

        let mut validation = Validation::new(algorithm);
        validation.validate_exp = false;
        validation.validate_aud = false;

        let data = decode::<Payload>(token, &key, &validation)
            .map_err(|_| ErrorKind::InvalidToken)?;

        let expired = data.claims.is_expired(Utc::now().timestamp());
        Ok((data.claims, expired))
    }
}
