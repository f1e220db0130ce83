use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Distance between a referrer and the referred user.
/// A is the direct referrer, B the referrer's referrer, C the third ancestor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "referral_tier")]
pub enum ReferralTier {
    A,
    B,
    C,
}

impl ReferralTier {
    /// All tiers, nearest first.
    pub const ALL: [ReferralTier; 3] = [ReferralTier::A, ReferralTier::B, ReferralTier::C];

    /// Number of hops from the referrer to the referred user.
    pub fn depth(&self) -> usize {
        match self {
            ReferralTier::A => 1,
            ReferralTier::B => 2,
            ReferralTier::C => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReferralTier::A => "A",
            ReferralTier::B => "B",
            ReferralTier::C => "C",
        }
    }
}

/// Directed referral relationship (`TeamReferral`).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ReferralEdge {
    pub id: Uuid,
    pub referrer_id: Uuid,
    pub referred_user_id: Uuid,
    pub tier: ReferralTier,
    /// User ids from the referrer down to the referred user, inclusive.
    pub referral_chain: Vec<Uuid>,
    pub total_earnings: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReferralEdge {
    pub fn new(
        referrer_id: Uuid,
        referred_user_id: Uuid,
        tier: ReferralTier,
        referral_chain: Vec<Uuid>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            referrer_id,
            referred_user_id,
            tier,
            referral_chain,
            total_earnings: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    /// Checks that the chain starts at the referrer, ends at the referred user,
    /// and has one hop per tier level.
    pub fn chain_is_consistent(&self) -> bool {
        self.referral_chain.len() == self.tier.depth() + 1
            && self.referral_chain.first() == Some(&self.referrer_id)
            && self.referral_chain.last() == Some(&self.referred_user_id)
    }
}

/// Settlement status of a commission history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "commission_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommissionStatus {
    Pending,
    Completed,
}

/// Commission bookkeeping row (`TeamReferralHistory`).
/// Created pending with a zero amount at signup; settled once on the referred user's purchase.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CommissionHistoryEntry {
    pub id: Uuid,
    pub referral_id: Uuid,
    pub referrer_id: Uuid,
    pub referred_user_id: Uuid,
    pub tier: ReferralTier,
    pub referral_chain: Vec<Uuid>,
    pub status: CommissionStatus,
    pub amount: Decimal,
    pub commission_percentage: Option<Decimal>,
    pub investment_amount: Option<Decimal>,
    pub level_number: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl CommissionHistoryEntry {
    /// Creates the pending entry that accompanies a freshly created edge.
    pub fn pending_for(edge: &ReferralEdge) -> Self {
        Self {
            id: Uuid::new_v4(),
            referral_id: edge.id,
            referrer_id: edge.referrer_id,
            referred_user_id: edge.referred_user_id,
            tier: edge.tier,
            referral_chain: edge.referral_chain.clone(),
            status: CommissionStatus::Pending,
            amount: Decimal::ZERO,
            commission_percentage: None,
            investment_amount: None,
            level_number: None,
            created_at: Utc::now(),
            settled_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == CommissionStatus::Pending
    }
}

/// Builds the chain for an edge one tier further up: the new ancestor followed by
/// the chain of the edge below it.
pub fn extend_chain(ancestor: Uuid, lower_chain: &[Uuid]) -> Vec<Uuid> {
    let mut chain = Vec::with_capacity(lower_chain.len() + 1);
    chain.push(ancestor);
    chain.extend_from_slice(lower_chain);
    chain
}
