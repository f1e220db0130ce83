use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub providers: ProviderSettings,
    pub outbox: OutboxSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_log_format() -> String {
    "pretty".to_string()
}

/// Credentials and endpoints for the two payout rails.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSettings {
    /// Upper bound for a single provider call; exceeding it counts as a provider failure.
    pub timeout_ms: u64,
    pub bank_transfer: BankTransferSettings,
    pub crypto: CryptoSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BankTransferSettings {
    pub base_url: String,
    pub api_key: String,
    pub currency: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CryptoSettings {
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
    pub recv_window_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutboxSettings {
    pub poll_interval_ms: u64,
    pub batch_size: i64,
    pub max_attempts: i32,
    pub base_backoff_ms: u64,
    #[serde(default = "default_claim_lease_ms")]
    pub claim_lease_ms: u64,
}

fn default_claim_lease_ms() -> u64 {
    300_000
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        builder.build()?.try_deserialize()
    }
}
