use anyhow::{bail, Context, Result};
use ethers::types::Address;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Testnet,
    Production,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub host: String,
    pub port: u16,

    // Monad (payment network)
    pub monad_rpc_url: String,
    pub monad_rpc_fallback: Option<String>,
    pub chain_id: u64,
    pub finality_depth: u64,

    // Payment requests
    pub merchant_address: Address,
    pub deeplink: DeeplinkSettings,
    pub signing_key: String,

    // Rates
    pub rate_feed_url: Option<String>,

    // Redis
    pub redis_url: String,

    // Rate Limiting
    pub rate_limit_per_second: u64,
    pub rate_limit_burst: u32,
}

/// Budget for watching one payment until it settles.
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_attempts: u32,
    pub timeout: Duration,
}

/// Link format and the defaults applied to fields a link leaves out.
#[derive(Debug, Clone)]
pub struct DeeplinkSettings {
    pub scheme: String,
    pub wallet_host: String,
    pub default_rate_mon_per_usd: Decimal,
    pub expiry_seconds: u64,
}

impl DeeplinkSettings {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(&env_lookup)
    }

    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let settings = Self {
            scheme: lookup("DEEPLINK_SCHEME").unwrap_or_else(|| "monadpay".to_string()),
            wallet_host: lookup("WALLET_LINK_HOST")
                .unwrap_or_else(|| "link.metamask.io".to_string()),
            default_rate_mon_per_usd: parse_with(lookup, "DEFAULT_RATE_MON_PER_USD", "2.0")?,
            expiry_seconds: parse_with(lookup, "PAYMENT_EXPIRY_SECONDS", "300")?,
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.scheme.is_empty()
            || !self
                .scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
        {
            bail!("DEEPLINK_SCHEME must be a valid URI scheme");
        }
        if self.default_rate_mon_per_usd <= Decimal::ZERO {
            bail!("DEFAULT_RATE_MON_PER_USD must be positive");
        }
        if self.expiry_seconds == 0 {
            bail!("PAYMENT_EXPIRY_SECONDS must be positive");
        }
        Ok(())
    }
}

impl PollSettings {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(&env_lookup)
    }

    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let settings = Self {
            interval: Duration::from_secs(parse_with(lookup, "POLL_INTERVAL_SECONDS", "5")?),
            max_attempts: parse_with(lookup, "POLL_MAX_ATTEMPTS", "60")?,
            timeout: Duration::from_secs(parse_with(lookup, "POLL_TIMEOUT_SECONDS", "300")?),
        };
        if settings.max_attempts == 0 || settings.interval.is_zero() {
            bail!("POLL_MAX_ATTEMPTS and POLL_INTERVAL_SECONDS must be positive");
        }
        Ok(settings)
    }
}

fn env_lookup(var: &str) -> Option<String> {
    std::env::var(var).ok()
}

fn parse_with<T>(lookup: &impl Fn(&str) -> Option<String>, var: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(var)
        .unwrap_or_else(|| default.to_string())
        .parse()
        .with_context(|| format!("Invalid {}", var))
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let environment = Self::parse_environment()?;

        let config = Self {
            environment: environment.clone(),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_var("PORT", "8080")?,

            monad_rpc_url: std::env::var("MONAD_RPC_URL")
                .unwrap_or_else(|_| "https://testnet-rpc.monad.xyz/".to_string()),
            monad_rpc_fallback: std::env::var("MONAD_RPC_FALLBACK").ok(),
            chain_id: Self::parse_var("MONAD_CHAIN_ID", "10143")?,
            finality_depth: Self::parse_var("FINALITY_DEPTH", "2")?,

            merchant_address: Self::parse_address("MERCHANT_WALLET_ADDRESS")?,
            deeplink: DeeplinkSettings::from_env()?,
            signing_key: std::env::var("DEEPLINK_SIGNING_KEY")
                .context("DEEPLINK_SIGNING_KEY required")?,

            rate_feed_url: std::env::var("RATE_FEED_URL").ok(),

            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),

            rate_limit_per_second: Self::parse_var("RATE_LIMIT_PER_SECOND", "10")?,
            rate_limit_burst: Self::parse_var("RATE_LIMIT_BURST", "30")?,
        };

        config.validate()?;
        Ok(config)
    }

    fn parse_environment() -> Result<Environment> {
        let env = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        match env.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testnet" | "test" => Ok(Environment::Testnet),
            "production" | "prod" => Ok(Environment::Production),
            _ => bail!("Unknown environment: {}", env),
        }
    }

    fn parse_var<T>(var: &str, default: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        parse_with(&env_lookup, var, default)
    }

    fn parse_address(var: &str) -> Result<Address> {
        let addr_str = std::env::var(var).with_context(|| format!("{} required", var))?;
        Address::from_str(&addr_str).with_context(|| format!("Invalid address for {}", var))
    }

    fn validate(&self) -> Result<()> {
        if !self.monad_rpc_url.starts_with("http") {
            bail!("MONAD_RPC_URL must be HTTP(S) URL");
        }
        if let Some(url) = &self.rate_feed_url {
            if !url.starts_with("http") {
                bail!("RATE_FEED_URL must be HTTP(S) URL");
            }
        }

        if self.signing_key.is_empty() {
            bail!("DEEPLINK_SIGNING_KEY must not be empty");
        }
        if self.signing_key.len() < 32 {
            if self.environment == Environment::Production {
                bail!("DEEPLINK_SIGNING_KEY must be at least 32 bytes in production");
            }
            tracing::warn!("DEEPLINK_SIGNING_KEY is shorter than 32 bytes");
        }

        tracing::info!(
            "Configuration validated for {:?} environment",
            self.environment
        );

        Ok(())
    }
}
