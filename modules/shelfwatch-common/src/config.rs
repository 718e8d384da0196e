use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Apify
    pub apify_api_token: String,
    pub product_actor_id: String,
    pub amazon_domain: String,
    pub product_max_reviews: u32,
    pub review_max_reviews: u32,

    // Database
    pub database_url: String,

    // Scrape monitoring
    pub poll_interval_secs: u64,

    // Refresh worker
    pub refresh_check_interval_secs: u64,
    pub refresh_retry_delay_secs: u64,
    pub refresh_batch_size: u32,
    pub refresh_stale_after_hours: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            apify_api_token: required_env("APIFY_API_TOKEN")?,
            product_actor_id: std::env::var("APIFY_PRODUCT_ACTOR_ID")
                .unwrap_or_else(|_| "ZhSGsaq9MHRnWtStl".to_string()),
            amazon_domain: std::env::var("AMAZON_DOMAIN")
                .unwrap_or_else(|_| "amazon.com".to_string()),
            product_max_reviews: parsed_env("PRODUCT_MAX_REVIEWS", 100)?,
            review_max_reviews: parsed_env("REVIEW_MAX_REVIEWS", 500)?,
            database_url: required_env("DATABASE_URL")?,
            poll_interval_secs: parsed_env("SCRAPE_POLL_INTERVAL_SECS", 5)?,
            refresh_check_interval_secs: parsed_env("REFRESH_CHECK_INTERVAL_SECS", 120)?,
            refresh_retry_delay_secs: parsed_env("REFRESH_RETRY_DELAY_SECS", 30)?,
            refresh_batch_size: parsed_env("REFRESH_BATCH_SIZE", 5)?,
            refresh_stale_after_hours: parsed_env("REFRESH_STALE_AFTER_HOURS", 24)?,
        };

        config.validate()?;
        config.log_keys();
        Ok(config)
    }

    /// Reject settings the scheduler cannot run with.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("SCRAPE_POLL_INTERVAL_SECS", self.poll_interval_secs),
            ("REFRESH_CHECK_INTERVAL_SECS", self.refresh_check_interval_secs),
            ("REFRESH_RETRY_DELAY_SECS", self.refresh_retry_delay_secs),
            ("REFRESH_BATCH_SIZE", u64::from(self.refresh_batch_size)),
        ];
        for (key, value) in positive {
            if value == 0 {
                bail!("{key} must be greater than zero");
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn refresh_check_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_check_interval_secs)
    }

    pub fn refresh_retry_delay(&self) -> Duration {
        Duration::from_secs(self.refresh_retry_delay_secs)
    }

    fn log_keys(&self) {
        fn preview(val: &str) -> String {
            let head: String = val.chars().take(5).collect();
            format!("{head}...({} chars)", val.chars().count())
        }

        tracing::info!("Config loaded:");
        tracing::info!("  APIFY_API_TOKEN: {}", preview(&self.apify_api_token));
        tracing::info!("  APIFY_PRODUCT_ACTOR_ID: {}", self.product_actor_id);
        tracing::info!("  AMAZON_DOMAIN: {}", self.amazon_domain);
        tracing::info!(
            "  refresh: every {}s, batch {}, retry after {}s, stale after {}h",
            self.refresh_check_interval_secs,
            self.refresh_batch_size,
            self.refresh_retry_delay_secs,
            self.refresh_stale_after_hours
        );
    }
}

fn required_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("{key} environment variable is required"))
}

fn parsed_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a number, got '{raw}'")),
        Err(_) => Ok(default),
    }
}
