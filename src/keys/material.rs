//! RSA key pair generation and JWKS projection.

use crate::error::GatewayError;
use crate::keys::Jwk;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Utc;
use rsa::pkcs8::{DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};

const RSA_BITS: usize = 2048;

/// A persisted RSA key pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyMaterial {
    /// Key identifier
    pub kid: String,
    /// PKCS#8 private key PEM
    #[serde(rename = "privateKeyPEM")]
    pub private_pem: String,
    /// SPKI public key PEM
    #[serde(rename = "publicKeyPEM")]
    pub public_pem: String,
}

impl KeyMaterial {
    /// Generate a fresh 2048-bit RSA key pair under the given kid.
    ///
    /// # Errors
    ///
    /// Fails when key generation or PEM encoding fails.
    pub fn generate(kid: impl Into<String>) -> Result<Self, GatewayError> {
        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, RSA_BITS)
            .map_err(|e| GatewayError::keys(format!("RSA generation failed: {e}")))?;

        let private_pem = private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| GatewayError::keys(format!("Private PEM encoding failed: {e}")))?
            .to_string();
        let public_pem = private
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| GatewayError::keys(format!("Public PEM encoding failed: {e}")))?;

        Ok(Self {
            kid: kid.into(),
            private_pem,
            public_pem,
        })
    }

    /// Project into a JWKS entry, modulus and exponent base64url-encoded
    /// without padding.
    ///
    /// # Errors
    ///
    /// Fails when the stored public PEM does not parse.
    pub fn jwk(&self) -> Result<Jwk, GatewayError> {
        let public = RsaPublicKey::from_public_key_pem(&self.public_pem)
            .map_err(|e| GatewayError::keys(format!("Public PEM parsing failed: {e}")))?;

        Ok(Jwk {
            kty: "RSA".to_string(),
            key_use: "sig".to_string(),
            kid: self.kid.clone(),
            alg: "RS256".to_string(),
            n: URL_SAFE_NO_PAD.encode(public.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(public.e().to_bytes_be()),
        })
    }
}

/// Date-based kid for newly generated keys (`YYYY-MM-DD`).
#[must_use]
pub fn date_kid() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}
