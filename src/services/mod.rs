pub mod commission_processor;
pub mod ledger;
pub mod level_purchase_service;
pub mod referral_chain;
pub mod settings_service;
pub mod usd_wallet_service;
pub mod user_service;
pub mod withdrawal_service;

pub use commission_processor::{CommissionProcessor, SettlementSummary};
pub use ledger::Ledger;
pub use level_purchase_service::{LevelPurchaseService, Purchase};
pub use referral_chain::{ReferralChainBuilder, ReferralChainOutcome};
pub use settings_service::SettingsService;
pub use usd_wallet_service::{Funding, ReconciliationReport, UsdWalletService};
pub use user_service::{Registration, UserService};
pub use withdrawal_service::{plan_withdrawal, WithdrawalPlan, WithdrawalRequest, WithdrawalService};
