//! Property-based tests for key rotation and JWKS publication.
//!
//! Property 7: Rotation retains verifiability
//! Property 8: Published keys verify issued tokens

use auth_gateway::config::JwtAlgorithm;
use auth_gateway::jwt::{Payload, TokenSigner};
use auth_gateway::keys::{KeyManager, MemoryKeyStore};
use chrono::Utc;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use proptest::prelude::*;
use std::sync::Arc;

fn arb_kid() -> impl Strategy<Value = String> {
    "[a-z0-9-]{8,20}"
}

fn payload() -> Payload {
    let now = Utc::now().timestamp();
    Payload {
        iss: "https://login.example.com".to_string(),
        sub: "alice".to_string(),
        exp: now + 3600,
        iat: now,
        aud: "acme".to_string(),
        tenant: "acme".to_string(),
        responsibility: Payload::responsibility_for("example.com"),
        role: None,
        user: "alice@example.com".to_string(),
        scope: Some("read".to_string()),
        profile: serde_json::json!({ "displayName": "Alice" }),
    }
}

proptest! {
    // RSA generation is expensive; keep the case count low.
    #![proptest_config(ProptestConfig::with_cases(4))]

    /// Property 7: Rotation retains verifiability
    ///
    /// After rotating, JWKS carries both kids, tokens signed before the
    /// rotation keep verifying, and fresh tokens verify under the new kid.
    #[test]
    fn prop_rotation_preserves_old_tokens(kid_a in arb_kid(), kid_b in arb_kid()) {
        prop_assume!(kid_a != kid_b);
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let keys = Arc::new(KeyManager::new(Arc::new(MemoryKeyStore::new())));
            keys.rotate(Some(kid_a.clone())).await.unwrap();

            let signer = TokenSigner::new(keys.clone(), "secret".to_string(), JwtAlgorithm::RS256);
            let old_token = signer.sign(&payload(), JwtAlgorithm::RS256).unwrap();

            keys.rotate(Some(kid_b.clone())).await.unwrap();
            let new_token = signer.sign(&payload(), JwtAlgorithm::RS256).unwrap();

            let jwks = keys.jwks();
            prop_assert!(jwks.find_key(&kid_a).is_some());
            prop_assert!(jwks.find_key(&kid_b).is_some());

            prop_assert!(signer.verify(&old_token).is_ok());
            prop_assert!(signer.verify(&new_token).is_ok());
            prop_assert_eq!(decode_header(&new_token).unwrap().kid, Some(kid_b.clone()));
            Ok(())
        })?;
    }

    /// Property 8: Published keys verify issued tokens
    ///
    /// Every RS256 token verifies against the JWKS modulus and exponent of
    /// its kid, the way an external relying party would.
    #[test]
    fn prop_tokens_verify_against_published_jwks(kid in arb_kid()) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let keys = Arc::new(KeyManager::new(Arc::new(MemoryKeyStore::new())));
            keys.rotate(Some(kid.clone())).await.unwrap();

            let signer = TokenSigner::new(keys.clone(), "secret".to_string(), JwtAlgorithm::RS256);
            let token = signer.sign(&payload(), JwtAlgorithm::RS256).unwrap();

            let header = decode_header(&token).unwrap();
            let jwks = keys.jwks();
            let jwk = jwks.find_key(header.kid.as_deref().unwrap()).unwrap();

            let decoding = DecodingKey::from_rsa_components(&jwk.n, &jwk.e).unwrap();
            let mut validation = Validation::new(Algorithm::RS256);
            validation.validate_aud = false;

            let decoded = decode::<Payload>(&token, &decoding, &validation).unwrap();
            prop_assert_eq!(decoded.claims.sub, "alice");
            Ok(())
        })?;
    }
}
