//! Property-based tests for the crypto primitives
//!
//! - Ed25519 challenge signing and verification
//! - Sealed private-key encryption round trips and integrity failures
//! - Constant-time signature comparison

use super::encrypt::*;
use super::signing::*;
use proptest::prelude::*;

// ============================================================================
// Signing
// ============================================================================

proptest! {
    /// Property: signing the same challenge twice yields the same signature
    #[test]
    fn prop_signature_deterministic(challenge in any::<[u8; 32]>()) {
        let key = SealSigningKey::generate();
        prop_assert_eq!(key.sign_challenge(&challenge), key.sign_challenge(&challenge));
    }

    /// Property: a signature over one challenge never matches a different challenge
    #[test]
    fn prop_distinct_challenges_distinct_signatures(
        a in any::<[u8; 32]>(),
        b in any::<[u8; 32]>()
    ) {
        prop_assume!(a != b);
        let key = SealSigningKey::generate();
        let sig_a = key.sign_challenge(&a);
        let sig_b = key.sign_challenge(&b);
        prop_assert!(!signatures_match(&sig_a, &sig_b));
    }

    /// Property: a restored key produces byte-identical signatures
    #[test]
    fn prop_restored_key_signs_identically(challenge in any::<[u8; 32]>()) {
        let key = SealSigningKey::generate();
        let secret = key.to_secret_bytes();
        let restored = SealSigningKey::from_bytes(secret.as_ref()).unwrap();
        prop_assert_eq!(key.sign_challenge(&challenge), restored.sign_challenge(&challenge));
    }

    /// Property: flipping any bit of a signature breaks the match
    #[test]
    fn prop_bit_flip_breaks_match(idx in 0usize..64, bit in 0u8..8) {
        let key = SealSigningKey::generate();
        let sig = key.sign(b"challenge");
        let mut tampered = sig;
        tampered[idx] ^= 1 << bit;
        prop_assert!(!signatures_match(&tampered, &sig));
    }
}

// ============================================================================
// Sealed Keys
// ============================================================================

proptest! {
    /// Property: any 32-byte secret survives an encrypt/decrypt cycle
    #[test]
    fn prop_sealed_key_recovers_secret(
        secret in any::<[u8; 32]>(),
        serial in "[A-Z]{2,8}-[A-Z0-9]{4,24}"
    ) {
        let master = generate_key();
        let aad = compute_private_key_aad(&serial, &[0u8; 32]);
        let sealed = encrypt_private_key(&secret, &master, &aad).unwrap();
        let opened = decrypt_private_key(&sealed, &master, &aad).unwrap();
        prop_assert_eq!(opened.as_slice(), &secret[..]);
    }

    /// Property: corrupting any byte after the header is detected
    #[test]
    fn prop_corruption_detected(secret in any::<[u8; 32]>(), offset in 0usize..48) {
        let master = generate_key();
        let aad = compute_private_key_aad("SEAL-0001", &[1u8; 32]);
        let mut sealed = encrypt_private_key(&secret, &master, &aad).unwrap();
        let idx = SEALED_KEY_MAGIC_V1.len() + offset;
        sealed[idx] ^= 0x80;
        prop_assert!(decrypt_private_key(&sealed, &master, &aad).is_err());
    }

    /// Property: the AAD differs whenever the serial differs
    #[test]
    fn prop_aad_serial_separation(a in "[A-Z0-9-]{1,32}", b in "[A-Z0-9-]{1,32}") {
        prop_assume!(a != b);
        let pk = [3u8; 32];
        prop_assert_ne!(compute_private_key_aad(&a, &pk), compute_private_key_aad(&b, &pk));
    }
}

#[test]
fn test_end_to_end_custody_flow() {
    let master = generate_key();
    let key = generate_key_pair();
    let public_key = key.public_key_bytes();
    let aad = compute_private_key_aad("SEAL-0001", &public_key);

    let sealed = encrypt_private_key(key.to_secret_bytes().as_ref(), &master, &aad).unwrap();
    let opened = decrypt_private_key(&sealed, &master, &aad).unwrap();
    let restored = SealSigningKey::from_bytes(&opened).unwrap();

    let challenge = generate_challenge_bytes();
    let expected = restored.sign_challenge(&challenge);
    let presented = key.sign_challenge(&challenge);

    assert!(signatures_match(&presented, &expected));
    assert!(restored.public_key().verify(&challenge, &presented).is_ok());
}
