pub mod ledger_repository;
pub mod level_repository;
pub mod outbox_repository;
pub mod referral_repository;
pub mod settings_repository;
pub mod usd_wallet_repository;
pub mod user_repository;
pub mod withdrawal_repository;

pub use ledger_repository::LedgerRepository;
pub use level_repository::LevelRepository;
pub use outbox_repository::OutboxRepository;
pub use referral_repository::ReferralRepository;
pub use settings_repository::SettingsRepository;
pub use usd_wallet_repository::{UsdWalletRepository, WalletPreferences};
pub use user_repository::UserRepository;
pub use withdrawal_repository::WithdrawalRepository;

use sqlx::PgPool;

/// Database connection pool type alias.
pub type DbPool = PgPool;
