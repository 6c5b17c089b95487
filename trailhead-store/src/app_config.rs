use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub auth: AuthConfig,
    pub business_rules: BusinessRules,
    pub payment: PaymentConfig,
    pub workflows: WorkflowConfig,
    #[serde(default)]
    pub pricing: PricingSettings,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Seed file with POIs, loaded at start-up when present.
    pub seed_file: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    /// How long a pending booking holds capacity before cleanup cancels it.
    pub pending_hold_seconds: u64,
    pub max_quantity_per_booking: u32,
    pub booking_reference_prefix: String,
    #[serde(default = "default_range_days")]
    pub max_range_days: u32,
}

fn default_range_days() -> u32 { 92 }

#[derive(Debug, Deserialize, Clone)]
pub struct PricingSettings {
    #[serde(default = "default_max_multiplier")]
    pub max_multiplier: f64,
    #[serde(default = "default_min_multiplier")]
    pub min_multiplier: f64,
    #[serde(default = "default_true")]
    pub demand_pricing: bool,
}

fn default_max_multiplier() -> f64 { 1.5 }
fn default_min_multiplier() -> f64 { 1.0 }
fn default_true() -> bool { true }

impl Default for PricingSettings {
    fn default() -> Self {
        Self {
            max_multiplier: default_max_multiplier(),
            min_multiplier: default_min_multiplier(),
            demand_pricing: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentProvider {
    Mock,
    Http,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentConfig {
    pub provider: PaymentProvider,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub return_url: String,
    pub webhook_secret: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_failure_threshold")]
    pub circuit_failure_threshold: usize,
    #[serde(default = "default_reset_seconds")]
    pub circuit_reset_seconds: u64,
}

fn default_request_timeout() -> u64 { 10_000 }
fn default_failure_threshold() -> usize { 5 }
fn default_reset_seconds() -> u64 { 30 }

#[derive(Debug, Deserialize, Clone)]
pub struct WorkflowConfig {
    /// Recent-history entries kept per workflow id.
    pub history_limit: usize,
    /// Seconds a history list lives after its last append.
    pub history_retention_seconds: u64,
    pub default_timeout_ms: u64,
    pub default_max_retries: u32,
    pub default_base_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    /// TTL of the per-job scheduler lease.
    pub lease_ttl_seconds: u64,
    #[serde(default = "default_true")]
    pub scheduler_enabled: bool,
    #[serde(default = "default_email_concurrency")]
    pub email_concurrency: usize,
}

fn default_max_delay() -> u64 { 60_000 }
fn default_email_concurrency() -> usize { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides are optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg.. `TRAILHEAD__SERVER__PORT=8081`
            .add_source(config::Environment::with_prefix("TRAILHEAD").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    /// Parse a complete configuration from a TOML string (tests, tooling).
    pub fn from_toml(source: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}
