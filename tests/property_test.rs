//! Property-based tests using proptest.
//!
//! These tests verify invariants that should hold for any valid input.

use chrono::Utc;
use proptest::prelude::*;

use agri_seal::crypto::{
    compute_private_key_aad, decrypt_private_key, encrypt_private_key, generate_key,
    SealSigningKey,
};
use agri_seal::domain::{
    integrity_score, Challenge, Seal, SealStatus, SerialNumber, TamperIndicator,
    VerificationAttempt, VerificationId,
};
use agri_seal::protocol::{classify, detect_counter_anomaly, evaluate};

// ============================================================================
// Custom Strategies
// ============================================================================

/// Serial numbers in the printed-tag format, in either case
fn arb_serial() -> impl Strategy<Value = String> {
    ("[A-Za-z0-9]{2,8}", "[A-Za-z0-9]{4,24}").prop_map(|(prefix, body)| format!("{prefix}-{body}"))
}

/// (is_valid, tamper_indicator) pairs as they can appear in a history
fn arb_attempt_outcome() -> impl Strategy<Value = (bool, TamperIndicator)> {
    prop_oneof![
        Just((true, TamperIndicator::None)),
        Just((false, TamperIndicator::SignatureMismatch)),
        Just((false, TamperIndicator::CounterAnomaly)),
    ]
}

fn arb_expirable_status() -> impl Strategy<Value = SealStatus> {
    prop_oneof![
        Just(SealStatus::Provisioned),
        Just(SealStatus::Attached),
        Just(SealStatus::Verified),
    ]
}

// ============================================================================
// Helpers
// ============================================================================

fn seal_with_key(key: &SealSigningKey) -> Seal {
    Seal::provisioned(
        SerialNumber::parse("SEAL-0001").unwrap(),
        key.public_key_bytes(),
        vec![],
        None,
        Utc::now(),
    )
}

fn attempt(seal: &Seal, counter: u64, outcome: (bool, TamperIndicator)) -> VerificationAttempt {
    VerificationAttempt {
        id: VerificationId::new(),
        seal_id: seal.id,
        verified_by: "inspector".into(),
        verified_at: Utc::now(),
        location: None,
        lat: None,
        lng: None,
        read_counter: counter,
        signature_provided: vec![],
        signature_expected: vec![],
        challenge_used: seal.challenge,
        is_valid: outcome.0,
        tamper_indicator: outcome.1,
        tamper_details: None,
        device_info: None,
    }
}

// ============================================================================
// Serial numbers
// ============================================================================

proptest! {
    #[test]
    fn prop_serial_normalizes_to_uppercase(raw in arb_serial(), pad in " {0,3}") {
        let parsed = SerialNumber::parse(&format!("{pad}{raw}{pad}")).unwrap();
        prop_assert_eq!(parsed.as_str(), raw.to_ascii_uppercase());
    }

    #[test]
    fn prop_serial_without_separator_is_rejected(raw in "[A-Z0-9]{2,32}") {
        prop_assert!(SerialNumber::parse(&raw).is_err());
    }
}

// ============================================================================
// Counter rule & classification
// ============================================================================

proptest! {
    #[test]
    fn prop_only_successor_is_accepted(expected in 0u64..u64::MAX, claimed in any::<u64>()) {
        prop_assert_eq!(detect_counter_anomaly(expected, claimed), claimed != expected + 1);
    }

    #[test]
    fn prop_counter_at_max_is_always_anomalous(claimed in any::<u64>()) {
        prop_assert!(detect_counter_anomaly(u64::MAX, claimed));
    }

    #[test]
    fn prop_signature_mismatch_takes_precedence(
        counter_anomaly in any::<bool>(),
        expected in 0u64..1_000,
        claimed in 0u64..1_000,
    ) {
        let (indicator, details) = classify(false, counter_anomaly, expected, claimed);
        prop_assert_eq!(indicator, TamperIndicator::SignatureMismatch);
        prop_assert!(details.is_some());
    }
}

// ============================================================================
// Protocol
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_genuine_tag_sequence_stays_valid(reads in 1usize..20) {
        let key = SealSigningKey::generate();
        let mut seal = seal_with_key(&key);
        let mut seen = vec![seal.challenge];

        for counter in 1..=reads as u64 {
            let signature = key.sign_challenge(seal.challenge.as_bytes());
            let evaluation = evaluate(&seal, &signature, counter, &key);
            prop_assert!(evaluation.is_valid());

            let next = Challenge::generate();
            prop_assert!(!seen.contains(&next));
            seen.push(next);
            seal.apply_verification(counter, evaluation.tamper_indicator, None, next, Utc::now());
        }
        prop_assert_eq!(seal.actual_read_count, reads as u64);
    }

    #[test]
    fn prop_foreign_key_never_verifies(counter in 1u64..100) {
        let key = SealSigningKey::generate();
        let impostor = SealSigningKey::generate();
        let mut seal = seal_with_key(&key);
        seal.expected_read_count = counter - 1;

        let forged = impostor.sign_challenge(seal.challenge.as_bytes());
        let evaluation = evaluate(&seal, &forged, counter, &key);
        prop_assert!(!evaluation.signature_valid);
        prop_assert_eq!(evaluation.tamper_indicator, TamperIndicator::SignatureMismatch);
    }
}

// ============================================================================
// Integrity score
// ============================================================================

proptest! {
    #[test]
    fn prop_score_is_bounded(
        outcomes in prop::collection::vec(arb_attempt_outcome(), 0..40),
        status in arb_expirable_status(),
    ) {
        let key = SealSigningKey::generate();
        let mut seal = seal_with_key(&key);
        seal.status = status;
        let history: Vec<_> = outcomes
            .iter()
            .enumerate()
            .map(|(i, o)| attempt(&seal, i as u64 + 1, *o))
            .collect();

        let score = integrity_score(&seal, &history);
        prop_assert!(score <= 100);
        if history.is_empty() {
            prop_assert_eq!(score, 50);
        }
    }

    #[test]
    fn prop_tampered_seal_scores_zero(outcomes in prop::collection::vec(arb_attempt_outcome(), 0..20)) {
        let key = SealSigningKey::generate();
        let mut seal = seal_with_key(&key);
        seal.status = SealStatus::Tampered;
        let history: Vec<_> = outcomes
            .iter()
            .enumerate()
            .map(|(i, o)| attempt(&seal, i as u64 + 1, *o))
            .collect();
        prop_assert_eq!(integrity_score(&seal, &history), 0);
    }

    #[test]
    fn prop_invalid_attempt_never_raises_score(
        outcomes in prop::collection::vec(arb_attempt_outcome(), 1..30),
        bad in prop_oneof![
            Just((false, TamperIndicator::SignatureMismatch)),
            Just((false, TamperIndicator::CounterAnomaly)),
        ],
    ) {
        let key = SealSigningKey::generate();
        let mut seal = seal_with_key(&key);
        seal.status = SealStatus::Verified;
        let mut history: Vec<_> = outcomes
            .iter()
            .enumerate()
            .map(|(i, o)| attempt(&seal, i as u64 + 1, *o))
            .collect();

        let before = integrity_score(&seal, &history);
        history.push(attempt(&seal, history.len() as u64 + 1, bad));
        prop_assert!(integrity_score(&seal, &history) <= before);
    }
}

// ============================================================================
// Key custody
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_sealed_key_is_bound_to_serial(a in arb_serial(), b in arb_serial()) {
        prop_assume!(a.to_ascii_uppercase() != b.to_ascii_uppercase());
        let master = generate_key();
        let key = SealSigningKey::generate();
        let public_key = key.public_key_bytes();
        let a = a.to_ascii_uppercase();
        let b = b.to_ascii_uppercase();

        let sealed = encrypt_private_key(
            key.to_secret_bytes().as_slice(),
            &master,
            &compute_private_key_aad(&a, &public_key),
        )
        .unwrap();

        prop_assert!(decrypt_private_key(&sealed, &master, &compute_private_key_aad(&b, &public_key)).is_err());
        let opened = decrypt_private_key(&sealed, &master, &compute_private_key_aad(&a, &public_key)).unwrap();
        let secret = key.to_secret_bytes();
        prop_assert_eq!(opened.as_slice(), secret.as_slice());
    }
}
