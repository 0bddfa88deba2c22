//! JSON Web Key Set document per RFC 7517.

use serde::{Deserialize, Serialize};

/// A single RSA signing key as published in the JWKS document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type; always `RSA`
    pub kty: String,
    /// Key use; always `sig`
    #[serde(rename = "use")]
    pub key_use: String,
    /// Key identifier
    pub kid: String,
    /// Algorithm; always `RS256`
    pub alg: String,
    /// Base64url modulus, unpadded
    pub n: String,
    /// Base64url exponent, unpadded
    pub e: String,
}

/// The published key set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Jwks {
    /// All published keys
    pub keys: Vec<Jwk>,
}

impl Jwks {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Find a key by ID.
    #[must_use]
    pub fn find_key(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid == kid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(kid: &str) -> Jwk {
        Jwk {
            kty: "RSA".to_string(),
            key_use: "sig".to_string(),
            kid: kid.to_string(),
            alg: "RS256".to_string(),
            n: "AQAB-n".to_string(),
            e: "AQAB".to_string(),
        }
    }

    #[test]
    fn test_find_key() {
        let jwks = Jwks {
            keys: vec![key("2024-11-01"), key("2024-11-08")],
        };
        assert!(jwks.find_key("2024-11-01").is_some());
        assert!(jwks.find_key("2024-11-15").is_none());
    }

    #[test]
    fn test_serialization_shape() {
        let json = serde_json::to_value(Jwks {
            keys: vec![key("k1")],
        })
        .unwrap();
        let entry = &json["keys"][0];
        assert_eq!(entry["kty"], "RSA");
        assert_eq!(entry["use"], "sig");
        assert_eq!(entry["alg"], "RS256");
        assert_eq!(entry["e"], "AQAB");
    }
}
