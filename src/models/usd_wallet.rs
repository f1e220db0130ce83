use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::currency::{round_usd, to_usd};
use super::ledger_entry::InsufficientFundsError;
use super::withdrawal::WithdrawalMethod;

/// Per-user secondary wallet. `balance_inr` is the balance of record; `balance_usd` is
/// always `to_usd(balance_inr, last_exchange_rate)`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UsdWallet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub balance_inr: Decimal,
    pub balance_usd: Decimal,
    pub total_funded_inr: Decimal,
    pub total_withdrawn_usd: Decimal,
    pub last_exchange_rate: Decimal,
    pub preferred_withdrawal_method: Option<WithdrawalMethod>,
    /// Payout account linked with the bank-transfer provider.
    pub bank_payout_account_id: Option<String>,
    pub crypto_address: Option<String>,
    pub crypto_network: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UsdWallet {
    /// Creates an empty wallet valued at `exchange_rate`.
    pub fn new(user_id: Uuid, exchange_rate: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            balance_inr: Decimal::ZERO,
            balance_usd: Decimal::ZERO,
            total_funded_inr: Decimal::ZERO,
            total_withdrawn_usd: Decimal::ZERO,
            last_exchange_rate: exchange_rate,
            preferred_withdrawal_method: None,
            bank_payout_account_id: None,
            crypto_address: None,
            crypto_network: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_sufficient_funds(&self, amount_inr: Decimal) -> bool {
        self.balance_inr >= amount_inr
    }

    /// Credits INR and revalues the USD figure at `rate`.
    pub fn credit(&mut self, amount_inr: Decimal, rate: Decimal) {
        self.balance_inr += amount_inr;
        self.revalue(rate);
    }

    /// Debits INR and revalues the USD figure at `rate`.
    pub fn debit(&mut self, amount_inr: Decimal, rate: Decimal) -> Result<(), InsufficientFundsError> {
        if !self.has_sufficient_funds(amount_inr) {
            return Err(InsufficientFundsError {
                requested: amount_inr,
                available: self.balance_inr,
            });
        }
        self.balance_inr -= amount_inr;
        self.revalue(rate);
        Ok(())
    }

    /// Recomputes `balance_usd` from `balance_inr` at `rate`.
    pub fn revalue(&mut self, rate: Decimal) {
        self.last_exchange_rate = rate;
        self.balance_usd = to_usd(self.balance_inr, rate);
        self.updated_at = Utc::now();
    }

    pub fn record_withdrawn(&mut self, amount_usd: Decimal) {
        self.total_withdrawn_usd = round_usd(self.total_withdrawn_usd + amount_usd);
    }

    /// Returns true if the stored USD figure matches the INR balance at the stored rate.
    pub fn usd_is_consistent(&self) -> bool {
        self.balance_usd == to_usd(self.balance_inr, self.last_exchange_rate)
    }

    /// Linked destination for `method`, if any.
    pub fn linked_destination(&self, method: WithdrawalMethod) -> Option<&str> {
        match method {
            WithdrawalMethod::BankTransfer => self.bank_payout_account_id.as_deref(),
            WithdrawalMethod::Crypto => self.crypto_address.as_deref(),
        }
    }
}
