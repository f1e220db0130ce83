use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Direction of a wallet mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ledger_entry_kind", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryKind {
    /// Increases the balance.
    Credit,
    /// Decreases the balance.
    Debit,
}

impl EntryKind {
    /// Returns the signed amount for this entry kind.
    pub fn signed_amount(&self, amount: Decimal) -> Decimal {
        match self {
            EntryKind::Credit => amount,
            EntryKind::Debit => -amount,
        }
    }
}

/// Business event that caused a wallet mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ledger_reference_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferenceType {
    WalletFunding,
    Withdrawal,
    /// Compensating credit for a failed or rejected withdrawal.
    WithdrawalRefund,
    Commission,
    LevelPurchase,
}

/// Reference attached to every ledger row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerReference {
    pub reference_type: ReferenceType,
    pub reference_id: Option<Uuid>,
    pub description: Option<String>,
}

impl LedgerReference {
    pub fn new(reference_type: ReferenceType, reference_id: Option<Uuid>) -> Self {
        Self {
            reference_type,
            reference_id,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Audit row for a main-wallet mutation, with the balance before and after.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MainWalletTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: EntryKind,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub reference_type: ReferenceType,
    pub reference_id: Option<Uuid>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MainWalletTransaction {
    pub fn new(
        user_id: Uuid,
        kind: EntryKind,
        amount: Decimal,
        balance_before: Decimal,
        reference: &LedgerReference,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            kind,
            amount,
            balance_before,
            balance_after: balance_before + kind.signed_amount(amount),
            reference_type: reference.reference_type,
            reference_id: reference.reference_id,
            description: reference.description.clone(),
            created_at: Utc::now(),
        }
    }
}

/// Append-only USD wallet ledger row. Amounts are recorded in both currencies at the
/// rate applied to the mutation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UsdWalletTransaction {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub user_id: Uuid,
    pub kind: EntryKind,
    pub amount_inr: Decimal,
    pub amount_usd: Decimal,
    pub exchange_rate: Decimal,
    pub balance_after_inr: Decimal,
    pub balance_after_usd: Decimal,
    pub reference_type: ReferenceType,
    pub reference_id: Option<Uuid>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UsdWalletTransaction {
    /// Signed INR delta this row applied to the wallet.
    pub fn signed_amount_inr(&self) -> Decimal {
        self.kind.signed_amount(self.amount_inr)
    }
}

/// Returned when a debit would take a balance below zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsufficientFundsError {
    pub requested: Decimal,
    pub available: Decimal,
}

impl std::fmt::Display for InsufficientFundsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Insufficient funds: requested {}, available {}",
            self.requested, self.available
        )
    }
}

impl std::error::Error for InsufficientFundsError {}

/// Sums the signed INR deltas of a set of ledger rows.
pub fn net_inr(transactions: &[UsdWalletTransaction]) -> Decimal {
    transactions
        .iter()
        .map(UsdWalletTransaction::signed_amount_inr)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_signed_amount() {
        assert_eq!(EntryKind::Credit.signed_amount(dec!(10)), dec!(10));
        assert_eq!(EntryKind::Debit.signed_amount(dec!(10)), dec!(-10));
    }

    #[test]
    fn test_main_wallet_transaction_snapshot() {
        let reference = LedgerReference::new(ReferenceType::Commission, Some(Uuid::new_v4()))
            .with_description("Tier A commission");
        let credit =
            MainWalletTransaction::new(Uuid::new_v4(), EntryKind::Credit, dec!(100), dec!(50), &reference);
        assert_eq!(credit.balance_before, dec!(50));
        assert_eq!(credit.balance_after, dec!(150));
        assert_eq!(credit.description.as_deref(), Some("Tier A commission"));

        let reference = LedgerReference::new(ReferenceType::LevelPurchase, None);
        let debit =
            MainWalletTransaction::new(Uuid::new_v4(), EntryKind::Debit, dec!(1000), dec!(1200), &reference);
        assert_eq!(debit.balance_after, dec!(200));
    }

    #[test]
    fn test_reference_type_serialization() {
        let json = serde_json::to_string(&ReferenceType::WithdrawalRefund).unwrap();
        assert_eq!(json, "\"WITHDRAWAL_REFUND\"");
    }

    #[test]
    fn test_net_inr() {
        let wallet_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let row = |kind: EntryKind, amount: Decimal| UsdWalletTransaction {
            id: Uuid::new_v4(),
            wallet_id,
            user_id,
            kind,
            amount_inr: amount,
            amount_usd: Decimal::ZERO,
            exchange_rate: dec!(83),
            balance_after_inr: Decimal::ZERO,
            balance_after_usd: Decimal::ZERO,
            reference_type: ReferenceType::WalletFunding,
            reference_id: None,
            description: None,
            created_at: Utc::now(),
        };
        let rows = vec![
            row(EntryKind::Credit, dec!(500)),
            row(EntryKind::Debit, dec!(500)),
            row(EntryKind::Credit, dec!(500)),
        ];
        assert_eq!(net_inr(&rows), dec!(500));
    }
}
