use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Identifiers ---

/// Amazon Standard Identification Number: 10 uppercase letters or digits.
static RE_ASIN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z0-9]{10}$").unwrap());

pub fn is_valid_asin(candidate: &str) -> bool {
    RE_ASIN.is_match(candidate)
}

/// Every entry that is empty or not a well-formed ASIN, in input order.
pub fn invalid_asins<S: AsRef<str>>(candidates: &[S]) -> Vec<String> {
    candidates
        .iter()
        .filter(|c| !is_valid_asin(c.as_ref()))
        .map(|c| c.as_ref().to_string())
        .collect()
}

// --- Task lifecycle ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One provider run tracked by an orchestrator. The id is the provider's run id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScrapeTask {
    pub id: String,
    pub subject_ids: Vec<String>,
    pub status: TaskStatus,
    /// 0–100.
    pub progress: u8,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ScrapeTask {
    pub fn new(id: String, subject_ids: Vec<String>) -> Self {
        Self {
            id,
            subject_ids,
            status: TaskStatus::Pending,
            progress: 0,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }
}

// --- Product records ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Active,
    Archived,
}

impl ProductStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProductStatus::Active => "active",
            ProductStatus::Archived => "archived",
        }
    }
}

/// Share (or count, depending on the producer) of ratings per star level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RatingDistribution {
    #[serde(rename = "5star", default)]
    pub five: f64,
    #[serde(rename = "4star", default)]
    pub four: f64,
    #[serde(rename = "3star", default)]
    pub three: f64,
    #[serde(rename = "2star", default)]
    pub two: f64,
    #[serde(rename = "1star", default)]
    pub one: f64,
}

impl RatingDistribution {
    pub fn total(&self) -> f64 {
        self.five + self.four + self.three + self.two + self.one
    }
}

/// Aggregate review figures stored alongside a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSummary {
    pub rating: f64,
    pub review_count: i64,
    pub stars_breakdown: RatingDistribution,
    pub verified_purchases: i64,
    #[serde(default)]
    pub amazon_vine_reviews: i64,
    pub last_updated: DateTime<Utc>,
}

impl ReviewSummary {
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            rating: 0.0,
            review_count: 0,
            stars_breakdown: RatingDistribution::default(),
            verified_purchases: 0,
            amazon_vine_reviews: 0,
            last_updated: now,
        }
    }
}

/// Normalized product payload written by product reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductData {
    pub asin: String,
    pub title: Option<String>,
    pub brand: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub availability: Option<String>,
    pub dimensions: Option<serde_json::Value>,
    pub specifications: Option<serde_json::Value>,
    pub best_sellers_rank: Option<serde_json::Value>,
    pub variations: Option<serde_json::Value>,
    pub frequently_bought_together: Option<serde_json::Value>,
    pub customer_questions: Option<serde_json::Value>,
    pub images: Vec<String>,
    pub categories: Vec<String>,
    pub features: Vec<String>,
    pub description: Option<String>,
    pub review_summary: ReviewSummary,
    pub status: ProductStatus,
    pub updated_at: DateTime<Utc>,
}

/// The slice of a stored product row the orchestrators read back.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductRecord {
    pub id: Uuid,
    pub asin: String,
    pub title: Option<String>,
    pub status: String,
    pub review_summary: Option<ReviewSummary>,
    pub updated_at: DateTime<Utc>,
}

/// A product row the refresh worker should scrape again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshCandidate {
    pub product_id: Uuid,
    pub asin: String,
}

// --- Reviews ---

/// A normalized review as embedded in the product row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoredReview {
    pub id: String,
    pub review_id: Option<String>,
    pub review_title: String,
    pub review_description: String,
    pub rating_score: f64,
    pub reviewed_in: Option<String>,
    pub is_verified: bool,
    pub author: String,
    pub user_id: Option<String>,
    pub user_profile_link: Option<String>,
    pub review_url: Option<String>,
    pub review_reaction: Option<String>,
    pub is_amazon_vine: bool,
    pub variant: Option<String>,
    pub variant_attributes: Option<serde_json::Value>,
    pub review_images: Vec<String>,
    pub position: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReviewScrapeStatus {
    Completed,
    Failed,
}

/// Bookkeeping for the last review scrape of a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReviewScrapeState {
    pub last_scraped: DateTime<Utc>,
    pub scraped_reviews: Option<i64>,
    pub scrape_status: ReviewScrapeStatus,
    pub error: Option<String>,
}

impl ReviewScrapeState {
    pub fn completed(count: usize, now: DateTime<Utc>) -> Self {
        Self {
            last_scraped: now,
            scraped_reviews: Some(count as i64),
            scrape_status: ReviewScrapeStatus::Completed,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            last_scraped: now,
            scraped_reviews: None,
            scrape_status: ReviewScrapeStatus::Failed,
            error: Some(error.into()),
        }
    }
}
