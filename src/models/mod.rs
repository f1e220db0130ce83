pub mod currency;
pub mod ledger_entry;
pub mod level;
pub mod outbox;
pub mod referral;
pub mod usd_wallet;
pub mod user;
pub mod withdrawal;
pub mod withdrawal_settings;

pub use ledger_entry::{
    EntryKind, InsufficientFundsError, LedgerReference, MainWalletTransaction, ReferenceType,
    UsdWalletTransaction,
};
pub use level::Level;
pub use outbox::{
    CommissionSettlementPayload, OutboxEvent, OutboxKind, OutboxStatus, ReferralChainPayload,
};
pub use referral::{CommissionHistoryEntry, CommissionStatus, ReferralEdge, ReferralTier};
pub use usd_wallet::UsdWallet;
pub use user::User;
pub use withdrawal::{UsdWithdrawal, WithdrawalMethod, WithdrawalStateMachine, WithdrawalStatus};
pub use withdrawal_settings::WithdrawalSettings;
