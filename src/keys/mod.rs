//! RSA key material, persistence, rotation, and JWKS publication.

pub mod jwks;
pub mod manager;
pub mod material;
pub mod store;

pub use jwks::{Jwk, Jwks};
pub use manager::{KeyManager, KeyRing};
pub use material::KeyMaterial;
pub use store::{KeyStore, MemoryKeyStore, RedisKeyStore};
