//! Trust policy: write-mode resolution, spend tiers, and feedback deltas.
//!
//! Everything here is a pure function of a 0–100 trust score. The score
//! itself is owned by the transactional store and only ever mutated through
//! its atomic `adjust_trust` operation; callers interpret the returned
//! [`TrustAdjustment`] triple.

use serde::{Deserialize, Serialize};

/// How an agent response reaches the document.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActionKind {
    /// Append straight into the shared document.
    DirectWrite,
    /// Embed a pending approval card and wait for a human.
    ApprovalCard,
}

/// Response length (chars) above which mid-trust agents fall back to an
/// approval card.
pub const MID_TRUST_DIRECT_WRITE_LIMIT: usize = 200;

/// Decide write-mode from trust score and response size.
///
/// The single most important policy boundary in the system:
/// - trust < 50 → always [`ActionKind::ApprovalCard`]
/// - trust ≥ 80 → always [`ActionKind::DirectWrite`]
/// - 50–79 → direct write iff the response is ≤ 200 chars
pub fn resolve_action(trust_score: u8, response_len: usize) -> ActionKind {
    if trust_score < 50 {
        return ActionKind::ApprovalCard;
    }
    if trust_score >= 80 {
        return ActionKind::DirectWrite;
    }
    if response_len > MID_TRUST_DIRECT_WRITE_LIMIT {
        ActionKind::ApprovalCard
    } else {
        ActionKind::DirectWrite
    }
}

/// A spend/approval band derived from the trust score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustTier {
    pub min_score: u8,
    pub max_score: u8,
    /// Daily spend ceiling in JPY.
    pub daily_limit: u32,
    /// Per-action spend ceiling in JPY.
    pub per_action_limit: u32,
    /// Spend above this requires approval; `None` means approval is never
    /// required.
    pub approval_threshold: Option<u32>,
}

/// The four trust bands, in ascending score order.
pub const TRUST_TIERS: [TrustTier; 4] = [
    TrustTier {
        min_score: 0,
        max_score: 20,
        daily_limit: 100,
        per_action_limit: 10,
        approval_threshold: Some(0),
    },
    TrustTier {
        min_score: 21,
        max_score: 50,
        daily_limit: 1000,
        per_action_limit: 100,
        approval_threshold: Some(50),
    },
    TrustTier {
        min_score: 51,
        max_score: 80,
        daily_limit: 10_000,
        per_action_limit: 1000,
        approval_threshold: Some(500),
    },
    TrustTier {
        min_score: 81,
        max_score: 100,
        daily_limit: 100_000,
        per_action_limit: 10_000,
        approval_threshold: None,
    },
];

/// Inclusive-range scan in band order. Scores outside 0–100 fall back to the
/// lowest tier.
pub fn tier_for(trust_score: u8) -> TrustTier {
    TRUST_TIERS
        .iter()
        .copied()
        .find(|t| trust_score >= t.min_score && trust_score <= t.max_score)
        .unwrap_or(TRUST_TIERS[0])
}

impl TrustTier {
    /// Whether spending `amount_jpy` requires human approval in this tier.
    pub fn needs_approval(&self, amount_jpy: u32) -> bool {
        match self.approval_threshold {
            Some(threshold) => amount_jpy > threshold,
            None => false,
        }
    }
}

/// Feedback events that move the trust score.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TrustEventType {
    ApprovalAccepted,
    ApprovalRejected,
    BudgetExceeded,
    TaskCompleted,
    ManualAdjust,
}

impl TrustEventType {
    /// Score delta for this feedback type. `ManualAdjust` uses the
    /// caller-supplied delta exactly (0 when absent).
    pub fn delta(&self, custom: Option<i32>) -> i32 {
        match self {
            Self::ApprovalAccepted => 2,
            Self::ApprovalRejected => -5,
            Self::BudgetExceeded => -3,
            Self::TaskCompleted => 1,
            Self::ManualAdjust => custom.unwrap_or(0),
        }
    }
}

/// Result of the store's atomic trust mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustAdjustment {
    pub old_score: u8,
    pub new_score: u8,
    pub delta: i32,
}
