//! Cryptographic primitives for Cofre.
//!
//! This module provides:
//! - Key derivation using Argon2id
//! - Salted one-way verifiers for the master secret and recovery answers
//! - BLAKE2b content digests for backup artifacts
//!
//! # Security Guarantees
//! - Derived key material is zeroized on drop
//! - Secrets are never stored or logged, only their salted hashes
//! - Verifier comparison is constant-time

pub mod digest;
pub mod kdf;
pub mod keys;
pub mod verifier;

pub use digest::{content_digest, verify_digest};
pub use kdf::{derive_key, KdfParams};
pub use keys::{DerivedKey, Salt};
pub use verifier::SecretVerifier;
