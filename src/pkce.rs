//! Proof Key for Code Exchange (RFC 7636).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Accepted code challenge methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeChallengeMethod {
    /// Verifier is compared verbatim
    Plain,
    /// Verifier is SHA-256 hashed and base64url-compared
    Sha256,
    /// Challenge explicitly disabled
    None,
}

impl CodeChallengeMethod {
    /// Parse the query-parameter spelling. Anything else is unsupported and
    /// must surface as 501 to the caller.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "plain" => Some(Self::Plain),
            "sha256" => Some(Self::Sha256),
            "none" => Some(Self::None),
            _ => None,
        }
    }

    /// Wire spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Sha256 => "sha256",
            Self::None => "none",
        }
    }

    /// Whether this method requires a challenge value at authorize time.
    #[must_use]
    pub const fn requires_challenge(self) -> bool {
        matches!(self, Self::Plain | Self::Sha256)
    }
}

/// Check a verifier against the stored challenge for the stored method.
#[must_use]
pub fn verify(method: CodeChallengeMethod, challenge: &str, verifier: &str) -> bool {
    match method {
        CodeChallengeMethod::Plain => challenge == verifier,
        CodeChallengeMethod::Sha256 => {
            let digest = Sha256::digest(verifier.as_bytes());
            URL_SAFE_NO_PAD.encode(digest) == challenge
        }
        CodeChallengeMethod::None => true,
    }
}

/// Derive the challenge for a verifier; used by tests and tooling.
#[must_use]
pub fn challenge_for(method: CodeChallengeMethod, verifier: &str) -> String {
    match method {
        CodeChallengeMethod::Plain | CodeChallengeMethod::None => verifier.to_string(),
        CodeChallengeMethod::Sha256 => URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_exactly_three_spellings() {
        assert_eq!(
            CodeChallengeMethod::parse("plain"),
            Some(CodeChallengeMethod::Plain)
        );
        assert_eq!(
            CodeChallengeMethod::parse("sha256"),
            Some(CodeChallengeMethod::Sha256)
        );
        assert_eq!(
            CodeChallengeMethod::parse("none"),
            Some(CodeChallengeMethod::None)
        );
        assert_eq!(CodeChallengeMethod::parse("S256"), None);
        assert_eq!(CodeChallengeMethod::parse("PLAIN"), None);
    }

    #[test]
    fn test_plain_round_trip() {
        let challenge = challenge_for(CodeChallengeMethod::Plain, "verifier-value");
        assert!(verify(CodeChallengeMethod::Plain, &challenge, "verifier-value"));
        assert!(!verify(CodeChallengeMethod::Plain, &challenge, "other"));
    }

    #[test]
    fn test_sha256_round_trip() {
        let challenge = challenge_for(CodeChallengeMethod::Sha256, "dBjftJeZ4CVP");
        assert!(verify(CodeChallengeMethod::Sha256, &challenge, "dBjftJeZ4CVP"));
        assert!(!verify(CodeChallengeMethod::Sha256, &challenge, "dBjftJeZ4CVq"));
    }

    #[test]
    fn test_sha256_known_vector() {
        // RFC 7636 appendix B
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        let challenge = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";
        assert_eq!(challenge_for(CodeChallengeMethod::Sha256, verifier), challenge);
        assert!(verify(CodeChallengeMethod::Sha256, challenge, verifier));
    }

    #[test]
    fn test_none_always_passes() {
        assert!(verify(CodeChallengeMethod::None, "anything", "whatever"));
    }
}
