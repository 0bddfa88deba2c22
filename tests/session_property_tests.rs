//! Property-based tests for the in-memory session store.
//!
//! Property 5: Code single-use
//! Property 6: TTL expiry drops counts

use auth_gateway::jwt::Payload;
use auth_gateway::sessions::{
    AuthSession, CodeGenerator, MemorySessionStore, SessionKind, SessionStore,
};
use chrono::Utc;
use proptest::prelude::*;

fn arb_code() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_-]{16}"
}

fn arb_tenant() -> impl Strategy<Value = String> {
    "[a-z]{3,10}"
}

fn session(kind: SessionKind, tenant: &str, subject: &str, code: &str, ttl: u64) -> AuthSession {
    let now = Utc::now().timestamp();
    AuthSession {
        kind,
        tenant_name: tenant.to_string(),
        subject: subject.to_string(),
        code: code.to_string(),
        scopes: vec!["read".to_string()],
        payload: Payload {
            iss: "https://login.example.com".to_string(),
            sub: subject.to_string(),
            exp: now + 3600,
            iat: now,
            aud: tenant.to_string(),
            tenant: tenant.to_string(),
            responsibility: Payload::responsibility_for("example.com"),
            role: None,
            user: subject.to_string(),
            scope: Some("read".to_string()),
            profile: serde_json::Value::Null,
        },
        redirect: "http://localhost/".to_string(),
        ttl,
        generated: now,
        code_challenge: None,
        code_challenge_method: None,
        login_id: None,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Property 5: Code single-use
    ///
    /// Issuing a code and consuming it succeeds exactly once; the second
    /// consume yields nothing.
    #[test]
    fn prop_code_single_use(code in arb_code(), tenant in arb_tenant()) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let store = MemorySessionStore::new();
            store
                .put(session(SessionKind::Code, &tenant, "subject", &code, 60))
                .await
                .unwrap();

            prop_assert!(store.get(SessionKind::Code, &code).await.unwrap().is_some());
            prop_assert!(store.get(SessionKind::Code, &code).await.unwrap().is_none());
            Ok(())
        })?;
    }

    /// Property 6: TTL expiry drops counts
    ///
    /// After the TTL passes, the session is gone and tenant counts reflect
    /// the eviction.
    #[test]
    fn prop_expired_sessions_vanish(code in arb_code(), tenant in arb_tenant()) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let store = MemorySessionStore::new();
            let mut expired = session(SessionKind::Refresh, &tenant, "subject", &code, 10);
            expired.generated -= 11;
            store.put(expired).await.unwrap();

            prop_assert!(store.get(SessionKind::Refresh, &code).await.unwrap().is_none());
            prop_assert_eq!(store.count_for_tenant(&tenant, None).await.unwrap(), 0);
            Ok(())
        })?;
    }

    /// Property: wipe removes exactly the (tenant, subject) pair.
    #[test]
    fn prop_wipe_is_scoped(
        code_a in arb_code(),
        code_b in arb_code(),
        tenant in arb_tenant(),
    ) {
        prop_assume!(code_a != code_b);
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let store = MemorySessionStore::new();
            store
                .put(session(SessionKind::Refresh, &tenant, "alice", &code_a, 60))
                .await
                .unwrap();
            store
                .put(session(SessionKind::Refresh, &tenant, "bob", &code_b, 60))
                .await
                .unwrap();

            store.wipe(&tenant, "alice").await.unwrap();

            prop_assert!(store.get(SessionKind::Refresh, &code_a).await.unwrap().is_none());
            prop_assert!(store.get(SessionKind::Refresh, &code_b).await.unwrap().is_some());
            Ok(())
        })?;
    }

    /// Property: generated codes use the urlsafe alphabet at the requested
    /// length.
    #[test]
    fn prop_generated_codes_are_urlsafe(length in 8usize..64) {
        let code = CodeGenerator::generate(length);
        prop_assert_eq!(code.len(), length);
        prop_assert!(code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
