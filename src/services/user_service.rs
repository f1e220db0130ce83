use crate::error::{AppError, Result};
use crate::models::user::generate_referral_code;
use crate::models::{CommissionHistoryEntry, OutboxEvent, ReferralChainPayload, ReferralEdge, User};
use crate::observability::get_metrics;
use crate::outbox;
use crate::repositories::{OutboxRepository, ReferralRepository, UserRepository};
use crate::services::referral_chain::{ReferralChainBuilder, ReferralChainOutcome};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

const REFERRAL_CODE_ATTEMPTS: usize = 5;

/// A completed signup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub user: User,
    /// None for organic signups and when the chain build was deferred.
    pub referral_chain: Option<ReferralChainOutcome>,
    /// True if the chain build failed in-line and was queued for retry.
    pub chain_deferred: bool,
}

/// Signup and user read operations.
pub struct UserService {
    user_repo: UserRepository,
    referral_repo: ReferralRepository,
    outbox_repo: OutboxRepository,
    chain_builder: ReferralChainBuilder,
}

impl UserService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            user_repo: UserRepository::new(pool.clone()),
            referral_repo: ReferralRepository::new(pool.clone()),
            outbox_repo: OutboxRepository::new(pool.clone()),
            chain_builder: ReferralChainBuilder::new(pool),
        }
    }

    /// Registers a user, optionally under the owner of `referral_code`.
    ///
    /// An unknown code is rejected before anything is written. Once the user exists the
    /// referral chain is built best-effort: a failure is deferred to the outbox and the
    /// signup still succeeds.
    pub async fn register(&self, referral_code: Option<&str>) -> Result<Registration> {
        let referrer = match referral_code.map(str::trim).filter(|c| !c.is_empty()) {
            Some(code) => Some(
                self.user_repo
                    .find_by_referral_code(code)
                    .await?
                    .ok_or_else(|| AppError::Validation(format!("Unknown referral code: {}", code)))?,
            ),
            None => None,
        };

        let code = self.unique_referral_code().await?;
        let user = self
            .user_repo
            .create(&User::new(code, referrer.as_ref().map(|r| r.id)))
            .await?;

        get_metrics().record_user_registered(referrer.is_some());
        tracing::info!(user_id = %user.id, referred = referrer.is_some(), "User registered");

        let Some(referrer) = referrer else {
            return Ok(Registration {
                user,
                referral_chain: None,
                chain_deferred: false,
            });
        };

        match self.chain_builder.build(user.id, Some(referrer.id)).await {
            Ok(outcome) => Ok(Registration {
                user,
                referral_chain: Some(outcome),
                chain_deferred: false,
            }),
            Err(e) => {
                tracing::warn!(
                    user_id = %user.id,
                    referrer_id = %referrer.id,
                    error = %e,
                    "Referral chain build failed"
                );
                let payload = ReferralChainPayload {
                    new_user_id: user.id,
                    direct_referrer_id: referrer.id,
                };
                outbox::defer(&self.outbox_repo, OutboxEvent::referral_chain(&payload), &e).await;
                Ok(Registration {
                    user,
                    referral_chain: None,
                    chain_deferred: true,
                })
            }
        }
    }

    async fn unique_referral_code(&self) -> Result<String> {
        for _ in 0..REFERRAL_CODE_ATTEMPTS {
            let code = generate_referral_code();
            if !self.user_repo.referral_code_exists(&code).await? {
                return Ok(code);
            }
        }
        Err(AppError::Internal(anyhow::anyhow!(
            "Could not generate a unique referral code after {} attempts",
            REFERRAL_CODE_ATTEMPTS
        )))
    }

    pub async fn get(&self, user_id: Uuid) -> Result<User> {
        self.user_repo
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))
    }

    /// Edges where the user is the upline.
    pub async fn referrals(&self, user_id: Uuid) -> Result<Vec<ReferralEdge>> {
        self.get(user_id).await?;
        self.referral_repo.find_edges_by_referrer(user_id).await
    }

    /// Commission history earned by the user.
    pub async fn commissions(&self, user_id: Uuid) -> Result<Vec<CommissionHistoryEntry>> {
        self.get(user_id).await?;
        self.referral_repo.find_history_by_referrer(user_id).await
    }
}
