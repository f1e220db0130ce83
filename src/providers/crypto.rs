//! Crypto rail.
//!
//! On-chain payouts through an exchange withdraw API. Every private request is signed
//! with HMAC-SHA256 over its query string and carries the API key in a header.

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, Url};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use super::{error_message_from_body, PayoutInstruction, PayoutRail, PayoutReceipt, PayoutStatus, ProviderError};
use crate::config::CryptoSettings;
use crate::models::WithdrawalMethod;
use crate::observability::mask_sensitive;

const API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// Withdraw history status codes.
const STATUS_CANCELLED: i32 = 1;
const STATUS_REJECTED: i32 = 3;
const STATUS_FAILURE: i32 = 5;
const STATUS_COMPLETED: i32 = 6;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 of `payload` keyed with `secret`.
pub fn sign(secret: &str, payload: &str) -> Result<String, ProviderError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ProviderError::InvalidInstruction(format!("invalid signing key: {}", e)))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[derive(Debug, Deserialize)]
pub struct WithdrawResponse {
    pub id: String,
}

/// One entry of the withdraw history.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawRecord {
    pub id: String,
    pub amount: String,
    pub coin: String,
    pub network: String,
    pub status: i32,
    #[serde(default)]
    pub withdraw_order_id: Option<String>,
    #[serde(default)]
    pub tx_id: Option<String>,
    #[serde(default)]
    pub info: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserAsset {
    asset: String,
    free: String,
}

/// Maps a withdraw history record to a payout status.
pub fn record_status(record: &WithdrawRecord) -> PayoutStatus {
    match record.status {
        STATUS_COMPLETED => PayoutStatus::Completed {
            reference: record.id.clone(),
        },
        STATUS_CANCELLED | STATUS_REJECTED | STATUS_FAILURE => PayoutStatus::Failed {
            reason: record
                .info
                .clone()
                .filter(|i| !i.is_empty())
                .unwrap_or_else(|| format!("withdraw status {}", record.status)),
        },
        _ => PayoutStatus::Pending,
    }
}

#[derive(Clone)]
pub struct CryptoPayoutClient {
    http: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    recv_window_ms: u64,
    /// Asset whose free balance is reported as the available payout balance.
    balance_asset: String,
}

impl CryptoPayoutClient {
    pub fn new(settings: &CryptoSettings, balance_asset: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            api_secret: settings.api_secret.clone(),
            recv_window_ms: settings.recv_window_ms,
            balance_asset: balance_asset.to_uppercase(),
        })
    }

    /// Builds the signed URL for a private endpoint: `params`, then `recvWindow` and
    /// `timestamp`, then `signature` over everything before it.
    pub fn signed_url(
        &self,
        path: &str,
        params: &[(&str, String)],
        timestamp_ms: i64,
    ) -> Result<Url, ProviderError> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| ProviderError::InvalidInstruction(format!("invalid provider url: {}", e)))?;
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in params {
                query.append_pair(key, value);
            }
            query.append_pair("recvWindow", &self.recv_window_ms.to_string());
            query.append_pair("timestamp", &timestamp_ms.to_string());
        }
        let signature = sign(&self.api_secret, url.query().unwrap_or_default())?;
        url.query_pairs_mut().append_pair("signature", &signature);
        Ok(url)
    }

    async fn send_signed<T: serde::de::DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let url = self.signed_url(path, params, Utc::now().timestamp_millis())?;
        let response = self
            .http
            .request(method, url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;

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

    /// Submits an on-chain withdrawal. `withdraw_order_id` is the client reference the
    /// exchange uses to deduplicate and to look the withdrawal up later.
    pub async fn withdraw(
        &self,
        coin: &str,
        network: &str,
        address: &str,
        amount: Decimal,
        withdraw_order_id: &str,
    ) -> Result<WithdrawResponse, ProviderError> {
        debug!(
            coin = coin,
            network = network,
            address = %mask_sensitive(address, 4),
            "Submitting crypto withdrawal"
        );

        let response: WithdrawResponse = self
            .send_signed(
                Method::POST,
                "/sapi/v1/capital/withdraw/apply",
                &[
                    ("coin", coin.to_string()),
                    ("network", network.to_string()),
                    ("address", address.to_string()),
                    ("amount", amount.normalize().to_string()),
                    ("withdrawOrderId", withdraw_order_id.to_string()),
                ],
            )
            .await?;

        info!(withdraw_id = %response.id, "Crypto withdrawal submitted");
        Ok(response)
    }

    pub async fn withdraw_history(&self, withdraw_order_id: &str) -> Result<Vec<WithdrawRecord>, ProviderError> {
        self.send_signed(
            Method::GET,
            "/sapi/v1/capital/withdraw/history",
            &[("withdrawOrderId", withdraw_order_id.to_string())],
        )
        .await
    }

    pub async fn free_balance(&self) -> Result<Decimal, ProviderError> {
        let assets: Vec<UserAsset> = self
            .send_signed(
                Method::POST,
                "/sapi/v3/asset/getUserAsset",
                &[("asset", self.balance_asset.clone())],
            )
            .await?;

        match assets.iter().find(|a| a.asset.eq_ignore_ascii_case(&self.balance_asset)) {
            Some(asset) => Decimal::from_str(&asset.free)
                .map_err(|e| ProviderError::InvalidResponse(format!("invalid balance: {}", e))),
            None => Ok(Decimal::ZERO),
        }
    }
}

#[async_trait]
impl PayoutRail for CryptoPayoutClient {
    fn method(&self) -> WithdrawalMethod {
        WithdrawalMethod::Crypto
    }

    async fn dispatch(&self, instruction: &PayoutInstruction) -> Result<PayoutReceipt, ProviderError> {
        let network = instruction
            .network
            .as_deref()
            .ok_or_else(|| ProviderError::InvalidInstruction("crypto payout requires a network".to_string()))?;
        let coin = instruction
            .coin
            .as_deref()
            .ok_or_else(|| ProviderError::InvalidInstruction("crypto payout requires a coin".to_string()))?;

        let response = self
            .withdraw(
                coin,
                network,
                &instruction.destination,
                instruction.amount_usd,
                &instruction.client_reference,
            )
            .await?;
        Ok(PayoutReceipt { reference: response.id })
    }

    async fn status(&self, client_reference: &str) -> Result<PayoutStatus, ProviderError> {
        let records = self.withdraw_history(client_reference).await?;
        Ok(records
            .iter()
            .find(|r| r.withdraw_order_id.as_deref() == Some(client_reference))
            .or_else(|| records.first())
            .map(record_status)
            .unwrap_or(PayoutStatus::NotFound))
    }

    async fn available_balance(&self) -> Result<Decimal, ProviderError> {
        self.free_balance().await
    }
}
