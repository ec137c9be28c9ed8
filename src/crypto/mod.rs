//! Cryptographic primitives for seal custody and verification
//!
//! Provides:
//! - Ed25519 seal key pairs, challenge nonces and constant-time signature comparison
//! - AES-256-GCM encryption of seal private keys at rest, bound to the seal by AAD

mod encrypt;
mod signing;

#[cfg(test)]
mod tests;

pub use encrypt::*;
pub use signing::*;
