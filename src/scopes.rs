//! Scope filtering against client glob patterns.

use crate::entities::Client;
use glob::Pattern;

/// Whether a scope matches any of the given glob patterns.
#[must_use]
pub fn scope_allowed(patterns: &[String], scope: &str) -> bool {
    patterns
        .iter()
        .filter_map(|p| Pattern::new(p).ok())
        .any(|p| p.matches(scope))
}

/// Filter requested scopes against the client's scope patterns.
#[must_use]
pub fn filter_requested(client: &Client, requested: &[String]) -> Vec<String> {
    requested
        .iter()
        .filter(|s| scope_allowed(&client.scopes, s))
        .cloned()
        .collect()
}

/// Filter provider-supplied scopes against `providers_allowed_scopes`.
///
/// A client without the allowance list accepts no provider scopes.
#[must_use]
pub fn filter_provider(client: &Client, supplied: &[String]) -> Vec<String> {
    match &client.providers_allowed_scopes {
        Some(patterns) => supplied
            .iter()
            .filter(|s| scope_allowed(patterns, s))
            .cloned()
            .collect(),
        None => Vec::new(),
    }
}

/// Union of filtered requested and provider scopes, order-preserving and
/// deduplicated. This is what gets written into sessions and tokens.
#[must_use]
pub fn granted(client: &Client, requested: &[String], provider: &[String]) -> Vec<String> {
    let mut out = filter_requested(client, requested);
    for scope in filter_provider(client, provider) {
        if !out.contains(&scope) {
            out.push(scope);
        }
    }
    out
}

/// Split a space-separated scope string into its parts.
#[must_use]
pub fn split(scope: &str) -> Vec<String> {
    scope
        .split_whitespace()
        .map(ToString::to_string)
        .collect()
}

/// Join scopes into the space-separated wire form.
#[must_use]
pub fn join(scopes: &[String]) -> String {
    scopes.join(" ")
}
