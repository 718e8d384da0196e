pub mod error;
pub mod types;

pub use error::{ApifyError, Result};
pub use types::{
    AmazonProduct, AmazonReview, AmazonScraperInput, ProxyConfiguration, RunData, RunProgress,
    RunStatus, StarsBreakdown,
};

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use types::ApiResponse;

const BASE_URL: &str = "https://api.apify.com/v2";

const TOKEN_PREFIX: &str = "apify_api_";

/// Values people leave in `.env` templates.
const PLACEHOLDER_TOKENS: &[&str] = &["your-apify-token", "apify_api_token"];

pub struct ApifyClient {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl ApifyClient {
    pub fn new(token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            base_url: BASE_URL.to_string(),
        }
    }

    /// Build a client from a raw configured token. Rejects empty and template
    /// values, and adds the `apify_api_` prefix when it was left off.
    pub fn from_token(raw: &str) -> Result<Self> {
        Ok(Self::new(normalize_token(raw)?))
    }

    /// Start an actor run. Returns immediately with run metadata.
    pub async fn start_run<I: Serialize + ?Sized>(
        &self,
        actor_id: &str,
        input: &I,
    ) -> Result<RunData> {
        let url = format!("{}/acts/{}/runs", self.base_url, actor_id);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(input)
            .send()
            .await?;

        let api_resp: ApiResponse<RunData> = Self::parse(resp).await?;
        tracing::debug!(actor_id, run_id = %api_resp.data.id, "Apify run started");
        Ok(api_resp.data)
    }

    /// Start an Amazon product scraper run for a batch of ASINs.
    pub async fn start_amazon_scrape(
        &self,
        actor_id: &str,
        input: &AmazonScraperInput,
    ) -> Result<RunData> {
        tracing::info!(
            actor_id,
            asins = input.asins.len(),
            max_reviews = input.max_reviews,
            "Starting Amazon scrape"
        );
        self.start_run(actor_id, input).await
    }

    /// Fetch the current state of a run. Does not wait.
    pub async fn get_run(&self, actor_id: &str, run_id: &str) -> Result<RunData> {
        let url = format!("{}/acts/{}/runs/{}", self.base_url, actor_id, run_id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let api_resp: ApiResponse<RunData> = Self::parse(resp).await?;
        tracing::debug!(run_id, status = %api_resp.data.status, "Fetched run status");
        Ok(api_resp.data)
    }

    /// Fetch the items of a run's default dataset.
    pub async fn get_run_items<T: DeserializeOwned>(&self, run_id: &str) -> Result<T> {
        let url = format!("{}/actor-runs/{}/dataset/items?format=json", self.base_url, run_id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        Self::parse(resp).await
    }

    async fn parse<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApifyError::Api {
                status: status.as_u16(),
                message: error_message(&body, status),
            });
        }

        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// The Amazon scraper actor bound to fixed run settings. Product detail runs
/// and review runs use the same actor with a different review cap.
#[derive(Clone)]
pub struct AmazonActor {
    client: Arc<ApifyClient>,
    actor_id: String,
    amazon_domain: String,
    max_reviews: u32,
}

impl AmazonActor {
    pub fn new(
        client: Arc<ApifyClient>,
        actor_id: impl Into<String>,
        amazon_domain: impl Into<String>,
        max_reviews: u32,
    ) -> Self {
        Self {
            client,
            actor_id: actor_id.into(),
            amazon_domain: amazon_domain.into(),
            max_reviews,
        }
    }

    pub async fn start(&self, asins: &[String]) -> Result<RunData> {
        let input = AmazonScraperInput::new(asins.to_vec(), &self.amazon_domain, self.max_reviews);
        self.client.start_amazon_scrape(&self.actor_id, &input).await
    }

    pub async fn run(&self, run_id: &str) -> Result<RunData> {
        self.client.get_run(&self.actor_id, run_id).await
    }

    /// Raw dataset items. Left untyped so callers can tell an empty or
    /// malformed payload apart from a decoding error on a single item.
    pub async fn items(&self, run_id: &str) -> Result<serde_json::Value> {
        self.client.get_run_items(run_id).await
    }
}

/// Pull `error.message` / `message` out of an Apify error body, falling back
/// to the raw text or the HTTP reason phrase.
fn error_message(body: &str, status: reqwest::StatusCode) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let from_json = parsed.as_ref().and_then(|v| {
        v.pointer("/error/message")
            .or_else(|| v.get("error"))
            .or_else(|| v.get("message"))
            .and_then(|m| m.as_str())
            .map(str::to_string)
    });

    from_json
        .or_else(|| (!body.is_empty()).then(|| body.to_string()))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string())
}

fn normalize_token(raw: &str) -> Result<String> {
    let token = raw.trim();
    if token.is_empty() {
        return Err(ApifyError::InvalidToken("token is empty".to_string()));
    }
    if PLACEHOLDER_TOKENS.contains(&token) {
        return Err(ApifyError::InvalidToken(format!(
            "'{token}' is a placeholder, set APIFY_API_TOKEN"
        )));
    }
    if token.starts_with(TOKEN_PREFIX) {
        Ok(token.to_string())
    } else {
        Ok(format!("{TOKEN_PREFIX}{token}"))
    }
}
