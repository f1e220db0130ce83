//! Bank-transfer rail.
//!
//! Pays out to a pre-linked connected account through a card-network style transfers
//! API: amounts are sent in minor units and each transfer carries an idempotency key.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use super::{error_message_from_body, PayoutInstruction, PayoutRail, PayoutReceipt, PayoutStatus, ProviderError};
use crate::config::BankTransferSettings;
use crate::models::currency::to_minor_units;
use crate::models::WithdrawalMethod;
use crate::observability::mask_sensitive;

/// A transfer object as returned by the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct Transfer {
    pub id: String,
    /// Minor units.
    pub amount: i64,
    pub currency: String,
    pub destination: String,
    #[serde(default)]
    pub reversed: bool,
    #[serde(default)]
    pub transfer_group: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransferList {
    data: Vec<Transfer>,
}

#[derive(Debug, Deserialize)]
struct BalanceAmount {
    amount: i64,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct Balance {
    available: Vec<BalanceAmount>,
}

#[derive(Clone)]
pub struct BankTransferClient {
    http: Client,
    base_url: String,
    api_key: String,
    currency: String,
}

impl BankTransferClient {
    pub fn new(settings: &BankTransferSettings, timeout: Duration) -> Result<Self, ProviderError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            currency: settings.currency.to_lowercase(),
        })
    }

    /// Creates a transfer of `amount_minor` to `destination`. The idempotency key is also
    /// recorded as the transfer group so the transfer can be found again by client reference.
    pub async fn create_transfer(
        &self,
        amount_minor: i64,
        destination: &str,
        idempotency_key: &str,
    ) -> Result<Transfer, ProviderError> {
        debug!(
            amount_minor = amount_minor,
            destination = %mask_sensitive(destination, 4),
            "Creating bank transfer"
        );

        let amount = amount_minor.to_string();
        let response = self
            .http
            .post(format!("{}/v1/transfers", self.base_url))
            .bearer_auth(&self.api_key)
            .header("Idempotency-Key", idempotency_key)
            .form(&[
                ("amount", amount.as_str()),
                ("currency", self.currency.as_str()),
                ("destination", destination),
                ("transfer_group", idempotency_key),
            ])
            .send()
            .await?;

        let transfer: Transfer = Self::parse(response).await?;
        info!(transfer_id = %transfer.id, "Bank transfer created");
        Ok(transfer)
    }

    /// Transfers created under `transfer_group`, newest first.
    pub async fn list_by_group(&self, transfer_group: &str) -> Result<Vec<Transfer>, ProviderError> {
        let response = self
            .http
            .get(format!("{}/v1/transfers", self.base_url))
            .bearer_auth(&self.api_key)
            .query(&[("transfer_group", transfer_group)])
            .send()
            .await?;

        let list: TransferList = Self::parse(response).await?;
        Ok(list.data)
    }

    /// Available balance in the configured currency, in major units.
    pub async fn available(&self) -> Result<Decimal, ProviderError> {
        let response = self
            .http
            .get(format!("{}/v1/balance", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let balance: Balance = Self::parse(response).await?;
        let minor: i64 = balance
            .available
            .iter()
            .filter(|b| b.currency.eq_ignore_ascii_case(&self.currency))
            .map(|b| b.amount)
            .sum();
        Ok(Decimal::new(minor, 2))
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, ProviderError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: error_message_from_body(&body),
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }
}

/// Maps a provider transfer to a payout status.
pub fn transfer_status(transfer: &Transfer) -> PayoutStatus {
    if transfer.reversed {
        PayoutStatus::Failed {
            reason: "transfer reversed".to_string(),
        }
    } else {
        PayoutStatus::Completed {
            reference: transfer.id.clone(),
        }
    }
}

#[async_trait]
impl PayoutRail for BankTransferClient {
    fn method(&self) -> WithdrawalMethod {
        WithdrawalMethod::BankTransfer
    }

    async fn dispatch(&self, instruction: &PayoutInstruction) -> Result<PayoutReceipt, ProviderError> {
        let amount_minor = to_minor_units(instruction.amount_usd).ok_or_else(|| {
            ProviderError::InvalidInstruction(format!(
                "amount {} cannot be expressed in minor units",
                instruction.amount_usd
            ))
        })?;
        if amount_minor <= 0 {
            return Err(ProviderError::InvalidInstruction(
                "transfer amount must be positive".to_string(),
            ));
        }

        let transfer = self
            .create_transfer(amount_minor, &instruction.destination, &instruction.client_reference)
            .await?;
        Ok(PayoutReceipt { reference: transfer.id })
    }

    async fn status(&self, client_reference: &str) -> Result<PayoutStatus, ProviderError> {
        let transfers = self.list_by_group(client_reference).await?;
        Ok(transfers
            .first()
            .map(transfer_status)
            .unwrap_or(PayoutStatus::NotFound))
    }

    async fn available_balance(&self) -> Result<Decimal, ProviderError> {
        self.available().await
    }
}
