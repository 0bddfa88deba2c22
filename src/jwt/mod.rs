//! JWT claims and the per-tenant signer.

pub mod claims;
pub mod signer;

pub use claims::Payload;
pub use signer::TokenSigner;
