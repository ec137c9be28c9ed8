//! Challenge–response verification protocol
//!
//! A genuine tag signs the seal's current challenge and reports a read counter
//! one higher than the last accepted value. Evaluation is pure: the caller
//! supplies the unsealed signing key and persists the outcome.
//!
//! Classification precedence when several checks fail:
//!
//! ```text
//! SIGNATURE_MISMATCH > COUNTER_ANOMALY > NONE
//! ```

use chrono::{DateTime, Utc};

use crate::crypto::{signatures_match, SealSigningKey, Signature64};
use crate::domain::{
    Challenge, Seal, TamperIndicator, VerificationAttempt, VerificationId, VerifySealRequest,
};

/// Result of evaluating one tag read against a seal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub expected_signature: Signature64,
    pub signature_valid: bool,
    pub counter_anomaly: bool,
    pub tamper_indicator: TamperIndicator,
    pub tamper_details: Option<String>,
}

impl Evaluation {
    pub fn is_valid(&self) -> bool {
        self.tamper_indicator == TamperIndicator::None
    }
}

/// The claimed counter must be the strict successor of the expected one.
///
/// Repeats, rollbacks and skipped values are all anomalies.
pub fn detect_counter_anomaly(expected: u64, claimed: u64) -> bool {
    expected.checked_add(1) != Some(claimed)
}

/// Map the individual checks onto a tamper indicator and a human-readable detail
pub fn classify(
    signature_valid: bool,
    counter_anomaly: bool,
    expected_counter: u64,
    claimed_counter: u64,
) -> (TamperIndicator, Option<String>) {
    if !signature_valid {
        let mut details = "signature does not match the current challenge".to_string();
        if counter_anomaly {
            details.push_str(&format!(
                "; read counter also anomalous (expected {}, got {})",
                expected_counter.saturating_add(1),
                claimed_counter
            ));
        }
        (TamperIndicator::SignatureMismatch, Some(details))
    } else if counter_anomaly {
        (
            TamperIndicator::CounterAnomaly,
            Some(format!(
                "read counter anomaly: expected {}, got {}",
                expected_counter.saturating_add(1),
                claimed_counter
            )),
        )
    } else {
        (TamperIndicator::None, None)
    }
}

/// Evaluate a tag read against the seal's current challenge and counter
pub fn evaluate(
    seal: &Seal,
    signature_provided: &[u8],
    claimed_counter: u64,
    key: &SealSigningKey,
) -> Evaluation {
    let expected_signature = key.sign_challenge(seal.challenge.as_bytes());
    let signature_valid = signatures_match(signature_provided, &expected_signature);
    let counter_anomaly = detect_counter_anomaly(seal.expected_read_count, claimed_counter);
    let (tamper_indicator, tamper_details) = classify(
        signature_valid,
        counter_anomaly,
        seal.expected_read_count,
        claimed_counter,
    );

    Evaluation {
        expected_signature,
        signature_valid,
        counter_anomaly,
        tamper_indicator,
        tamper_details,
    }
}

/// Build the immutable attempt record. Must be called before the seal's
/// challenge is rotated so `challenge_used` is the one that was signed.
pub fn record_attempt(
    seal: &Seal,
    request: &VerifySealRequest,
    evaluation: &Evaluation,
    now: DateTime<Utc>,
) -> VerificationAttempt {
    let location = request.location.as_ref();
    VerificationAttempt {
        id: VerificationId::new(),
        seal_id: seal.id,
        verified_by: request.verified_by.clone(),
        verified_at: now,
        location: location.and_then(|l| l.name.clone()),
        lat: location.and_then(|l| l.lat),
        lng: location.and_then(|l| l.lng),
        read_counter: request.read_counter,
        signature_provided: request.signature.clone(),
        signature_expected: evaluation.expected_signature.to_vec(),
        challenge_used: seal.challenge,
        is_valid: evaluation.is_valid(),
        tamper_indicator: evaluation.tamper_indicator,
        tamper_details: evaluation.tamper_details.clone(),
        device_info: request.device_info.clone(),
    }
}

/// Apply an evaluation to the seal, rotating its challenge
pub fn apply(
    seal: &mut Seal,
    request: &VerifySealRequest,
    evaluation: &Evaluation,
    now: DateTime<Utc>,
) {
    seal.apply_verification(
        request.read_counter,
        evaluation.tamper_indicator,
        evaluation.tamper_details.clone(),
        Challenge::generate(),
        now,
    );
}
