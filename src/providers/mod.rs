//! External payout rails.
//!
//! The settlement engine only sees [`PayoutRail`]; each rail adapts one provider API.

pub mod bank_transfer;
pub mod crypto;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::models::WithdrawalMethod;
use crate::observability::LatencyTimer;

pub use bank_transfer::BankTransferClient;
pub use crypto::CryptoPayoutClient;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Provider call timed out after {0} ms")]
    Timeout(u64),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Invalid payout instruction: {0}")]
    InvalidInstruction(String),

    #[error("No provider configured for {0}")]
    NotConfigured(WithdrawalMethod),
}

/// What to pay, where, and under which client reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutInstruction {
    pub method: WithdrawalMethod,
    /// Stable per withdrawal; providers use it to deduplicate repeated dispatches.
    pub client_reference: String,
    /// Net USD amount to deliver.
    pub amount_usd: Decimal,
    /// Payout account id or on-chain address.
    pub destination: String,
    pub network: Option<String>,
    pub coin: Option<String>,
}

/// Provider acknowledgement of an accepted payout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutReceipt {
    pub reference: String,
}

/// Provider-side state of a previously dispatched payout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayoutStatus {
    Pending,
    Completed { reference: String },
    Failed { reason: String },
    /// The provider has no record of the client reference.
    NotFound,
}

/// A payout provider behind a uniform dispatch/status/balance interface.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PayoutRail: Send + Sync {
    fn method(&self) -> WithdrawalMethod;

    async fn dispatch(&self, instruction: &PayoutInstruction) -> Result<PayoutReceipt, ProviderError>;

    async fn status(&self, client_reference: &str) -> Result<PayoutStatus, ProviderError>;

    /// Funds available at the provider for payouts, in USD.
    async fn available_balance(&self) -> Result<Decimal, ProviderError>;
}

/// Configured rails keyed by withdrawal method, with a shared call timeout.
#[derive(Clone)]
pub struct PayoutRails {
    rails: HashMap<WithdrawalMethod, Arc<dyn PayoutRail>>,
    timeout: Duration,
}

impl PayoutRails {
    pub fn new(timeout: Duration) -> Self {
        Self {
            rails: HashMap::new(),
            timeout,
        }
    }

    /// Registers a rail under the method it reports.
    pub fn with_rail(mut self, rail: Arc<dyn PayoutRail>) -> Self {
        self.rails.insert(rail.method(), rail);
        self
    }

    pub fn is_configured(&self, method: WithdrawalMethod) -> bool {
        self.rails.contains_key(&method)
    }

    pub fn get(&self, method: WithdrawalMethod) -> Result<Arc<dyn PayoutRail>, ProviderError> {
        self.rails
            .get(&method)
            .cloned()
            .ok_or(ProviderError::NotConfigured(method))
    }

    /// Dispatches through the instruction's rail. A call exceeding the timeout is
    /// reported as [`ProviderError::Timeout`].
    pub async fn dispatch(&self, instruction: &PayoutInstruction) -> Result<PayoutReceipt, ProviderError> {
        let rail = self.get(instruction.method)?;
        let timer = LatencyTimer::new();
        let result = match tokio::time::timeout(self.timeout, rail.dispatch(instruction)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    method = %instruction.method,
                    client_reference = %instruction.client_reference,
                    "Payout dispatch timed out"
                );
                Err(ProviderError::Timeout(self.timeout.as_millis() as u64))
            }
        };
        crate::observability::get_metrics().record_provider_call(
            instruction.method.as_str(),
            "dispatch",
            timer.elapsed_ms(),
            result.is_ok(),
        );
        result
    }

    pub async fn status(
        &self,
        method: WithdrawalMethod,
        client_reference: &str,
    ) -> Result<PayoutStatus, ProviderError> {
        let rail = self.get(method)?;
        match tokio::time::timeout(self.timeout, rail.status(client_reference)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(self.timeout.as_millis() as u64)),
        }
    }

    pub async fn available_balance(&self, method: WithdrawalMethod) -> Result<Decimal, ProviderError> {
        let rail = self.get(method)?;
        match tokio::time::timeout(self.timeout, rail.available_balance()).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(self.timeout.as_millis() as u64)),
        }
    }
}

/// Extracts a readable message from a provider error body, falling back to the raw text.
pub(crate) fn error_message_from_body(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .or_else(|| value.get("msg"))
                .or_else(|| value.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(256).collect())
}
