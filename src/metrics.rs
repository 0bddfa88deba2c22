//! Prometheus metrics for the auth gateway.
//!
//! Counters only; exposition and transport are handled elsewhere.

use once_cell::sync::Lazy;
use prometheus::{register_counter_vec, register_int_gauge_vec, CounterVec, IntGaugeVec};

/// Login attempts counter.
pub static LOGIN_ATTEMPTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "auth_gateway_login_attempts_total",
        "Total number of login attempts",
        &["tenant", "outcome"]
    )
    .expect("Failed to register login_attempts metric")
});

/// Tokens issued counter.
pub static TOKENS_ISSUED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "auth_gateway_tokens_issued_total",
        "Total number of tokens issued",
        &["grant_type", "algorithm"]
    )
    .expect("Failed to register tokens_issued metric")
});

/// Interceptor admission decisions counter.
pub static INTERCEPTOR_DECISIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "auth_gateway_interceptor_decisions_total",
        "Total number of interceptor admission decisions",
        &["outcome"]
    )
    .expect("Failed to register interceptor_decisions metric")
});

/// Authorization codes minted counter.
pub static CODES_ISSUED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "auth_gateway_codes_issued_total",
        "Total number of authorization codes issued",
        &["tenant"]
    )
    .expect("Failed to register codes_issued metric")
});

/// Resource loader errors counter.
pub static LOADER_ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "auth_gateway_loader_errors_total",
        "Total number of resource loader failures",
        &["source"]
    )
    .expect("Failed to register loader_errors metric")
});

/// Loaded entity gauge.
pub static ENTITIES_LOADED: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "auth_gateway_entities_loaded",
        "Number of entities currently loaded",
        &["kind"]
    )
    .expect("Failed to register entities_loaded metric")
});
