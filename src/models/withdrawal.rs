use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// External rail used to pay out a USD withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "withdrawal_method", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalMethod {
    /// Transfer to a pre-linked payout account, in minor currency units.
    BankTransfer,
    /// On-chain payout to an address on a specific network.
    Crypto,
}

impl WithdrawalMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalMethod::BankTransfer => "bank_transfer",
            WithdrawalMethod::Crypto => "crypto",
        }
    }
}

impl fmt::Display for WithdrawalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a USD withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "withdrawal_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalStatus {
    /// Funds reserved, awaiting an administrative decision.
    Pending,
    /// Provider call in flight.
    Processing,
    /// Provider accepted the payout.
    Completed,
    /// Provider rejected or timed out; funds were returned to the wallet.
    Failed,
    /// Rejected by an administrator; funds were returned to the wallet.
    Rejected,
}

impl WithdrawalStatus {
    /// Returns true if reaching this status requires returning the reserved funds.
    pub fn requires_compensation(&self) -> bool {
        matches!(self, WithdrawalStatus::Failed | WithdrawalStatus::Rejected)
    }
}

/// Allowed status transitions for withdrawals.
#[derive(Debug, Clone)]
pub struct WithdrawalStateMachine;

impl WithdrawalStateMachine {
    pub fn valid_transitions(current: WithdrawalStatus) -> Vec<WithdrawalStatus> {
        match current {
            WithdrawalStatus::Pending => vec![
                WithdrawalStatus::Processing,
                WithdrawalStatus::Rejected,
            ],
            WithdrawalStatus::Processing => vec![
                WithdrawalStatus::Completed,
                WithdrawalStatus::Failed,
            ],
            WithdrawalStatus::Completed => vec![],
            WithdrawalStatus::Failed => vec![],
            WithdrawalStatus::Rejected => vec![],
        }
    }

    pub fn can_transition(from: WithdrawalStatus, to: WithdrawalStatus) -> bool {
        Self::valid_transitions(from).contains(&to)
    }
}

/// A USD withdrawal request and its settlement outcome.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UsdWithdrawal {
    pub id: Uuid,
    pub user_id: Uuid,
    pub wallet_id: Uuid,
    /// Amount reserved from the wallet.
    pub amount_inr: Decimal,
    pub amount_usd: Decimal,
    /// Rate captured at creation; refunds are computed at this rate.
    pub exchange_rate: Decimal,
    pub fee_percent: Decimal,
    /// Amount actually sent to the provider.
    pub net_amount_usd: Decimal,
    pub withdrawal_method: WithdrawalMethod,
    pub status: WithdrawalStatus,
    /// Payout account id for bank transfers, address for crypto.
    pub destination: String,
    pub crypto_network: Option<String>,
    pub coin: Option<String>,
    pub provider_reference: Option<String>,
    pub remarks: Option<String>,
    pub rejection_reason: Option<String>,
    pub settings_version: i32,
    pub processed_at: Option<DateTime<Utc>>,
    pub processed_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UsdWithdrawal {
    pub fn can_transition_to(&self, to: WithdrawalStatus) -> bool {
        WithdrawalStateMachine::can_transition(self.status, to)
    }

    /// Client reference sent to providers. Stable per withdrawal, so a repeated dispatch
    /// is deduplicated by the provider.
    pub fn client_reference(&self) -> String {
        self.id.simple().to_string()
    }
}
