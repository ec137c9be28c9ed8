//! Integrity scoring
//!
//! The score is derived, never stored as the source of truth: it is a pure
//! function of the seal's current status and its ordered verification history.
//!
//! ```text
//! TAMPERED                    -> 0
//! no history                  -> 50
//! otherwise  100 - 50 * invalid/total - 20 * counter_anomalies, clamped to 0..=100
//! ```

use std::collections::BTreeMap;

use serde::Serialize;

use super::seal::Seal;
use super::types::{SealId, SealStatus, SerialNumber, ShipmentRef, TamperIndicator};
use super::verification::VerificationAttempt;

/// Score reported before any verification evidence exists
pub const NEUTRAL_SCORE: u8 = 50;

/// Maximum deduction from the proportion of invalid attempts
pub const INVALID_RATIO_WEIGHT: f64 = 50.0;

/// Deduction per attempt classified as a counter anomaly
pub const COUNTER_ANOMALY_PENALTY: f64 = 20.0;

/// Breakdown behind an integrity score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub score: u8,
    pub total_attempts: usize,
    pub invalid_attempts: usize,
    pub counter_anomalies: usize,
}

/// Compute the full integrity report for a seal
pub fn integrity_report(seal: &Seal, history: &[VerificationAttempt]) -> IntegrityReport {
    let total_attempts = history.len();
    let invalid_attempts = history.iter().filter(|a| !a.is_valid).count();
    let counter_anomalies = history
        .iter()
        .filter(|a| a.tamper_indicator == TamperIndicator::CounterAnomaly)
        .count();

    let score = if seal.status == SealStatus::Tampered {
        0
    } else if total_attempts == 0 {
        NEUTRAL_SCORE
    } else {
        let invalid_ratio = invalid_attempts as f64 / total_attempts as f64;
        let raw = 100.0
            - INVALID_RATIO_WEIGHT * invalid_ratio
            - COUNTER_ANOMALY_PENALTY * counter_anomalies as f64;
        raw.clamp(0.0, 100.0).round() as u8
    };

    IntegrityReport {
        score,
        total_attempts,
        invalid_attempts,
        counter_anomalies,
    }
}

/// 0–100 trust score for a seal
pub fn integrity_score(seal: &Seal, history: &[VerificationAttempt]) -> u8 {
    integrity_report(seal, history).score
}

/// Per-seal line of a shipment summary
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SealIntegrity {
    pub seal_id: SealId,
    pub serial_number: SerialNumber,
    pub status: SealStatus,
    pub tamper_indicator: TamperIndicator,
    pub report: IntegrityReport,
}

/// Integrity view across all seals attached to a shipment
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentIntegritySummary {
    pub shipment_ref: ShipmentRef,
    pub total_seals: usize,
    pub tampered_seals: usize,
    pub verified_seals: usize,
    /// Mean score across seals; `None` when the shipment has no seals
    pub average_score: Option<u8>,
    pub lowest_score: Option<u8>,
    /// No seal on the shipment is TAMPERED
    pub intact: bool,
    pub seals: Vec<SealIntegrity>,
}

impl ShipmentIntegritySummary {
    pub fn from_seals(shipment_ref: ShipmentRef, seals: Vec<SealIntegrity>) -> Self {
        let total_seals = seals.len();
        let tampered_seals = seals
            .iter()
            .filter(|s| s.status == SealStatus::Tampered)
            .count();
        let verified_seals = seals
            .iter()
            .filter(|s| s.status == SealStatus::Verified)
            .count();
        let scores: Vec<u32> = seals.iter().map(|s| u32::from(s.report.score)).collect();
        let average_score = if scores.is_empty() {
            None
        } else {
            let mean = scores.iter().sum::<u32>() as f64 / scores.len() as f64;
            Some(mean.round() as u8)
        };
        let lowest_score = scores.iter().min().map(|s| *s as u8);

        Self {
            shipment_ref,
            total_seals,
            tampered_seals,
            verified_seals,
            average_score,
            lowest_score,
            intact: tampered_seals == 0,
            seals,
        }
    }
}

/// Seal counts by status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SealStats {
    pub total: u64,
    pub by_status: BTreeMap<SealStatus, u64>,
}

impl SealStats {
    pub fn from_counts(counts: impl IntoIterator<Item = (SealStatus, u64)>) -> Self {
        let mut by_status: BTreeMap<SealStatus, u64> =
            SealStatus::ALL.into_iter().map(|s| (s, 0)).collect();
        for (status, count) in counts {
            *by_status.entry(status).or_default() += count;
        }
        Self {
            total: by_status.values().sum(),
            by_status,
        }
    }

    pub fn count(&self, status: SealStatus) -> u64 {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}
