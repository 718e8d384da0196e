use serde::{Deserialize, Serialize};

/// Wrapper for Apify API responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

/// Lifecycle status of an actor run, as reported by Apify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    #[serde(rename = "READY")]
    Ready,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "SUCCEEDED")]
    Succeeded,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "TIMING-OUT")]
    TimingOut,
    #[serde(rename = "TIMED-OUT")]
    TimedOut,
    #[serde(rename = "ABORTING")]
    Aborting,
    #[serde(rename = "ABORTED")]
    Aborted,
    /// Anything Apify adds later. Treated as still in progress.
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// Terminal statuses that mean the run produced no usable dataset.
    pub fn is_failure(self) -> bool {
        matches!(self, RunStatus::Failed | RunStatus::TimedOut | RunStatus::Aborted)
    }

    pub fn is_terminal(self) -> bool {
        self == RunStatus::Succeeded || self.is_failure()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Ready => "READY",
            RunStatus::Running => "RUNNING",
            RunStatus::Succeeded => "SUCCEEDED",
            RunStatus::Failed => "FAILED",
            RunStatus::TimingOut => "TIMING-OUT",
            RunStatus::TimedOut => "TIMED-OUT",
            RunStatus::Aborting => "ABORTING",
            RunStatus::Aborted => "ABORTED",
            RunStatus::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress block some actors attach to their run object.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunProgress {
    pub percent: Option<f64>,
}

/// Apify actor run metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct RunData {
    pub id: String,
    pub status: RunStatus,
    #[serde(rename = "statusMessage")]
    pub status_message: Option<String>,
    pub progress: Option<RunProgress>,
}

impl RunData {
    /// Reported completion percentage, clamped to 0–100. Missing means 0.
    pub fn percent(&self) -> u8 {
        self.progress
            .as_ref()
            .and_then(|p| p.percent)
            .map(|p| p.clamp(0.0, 100.0) as u8)
            .unwrap_or(0)
    }
}

// --- Amazon product scraper types ---

/// Proxy settings passed through to the actor.
#[derive(Debug, Clone, Serialize)]
pub struct ProxyConfiguration {
    #[serde(rename = "useApifyProxy")]
    pub use_apify_proxy: bool,
    #[serde(rename = "countryCode")]
    pub country_code: String,
}

/// Input for the Amazon product scraper actor. The same actor serves both
/// product detail and review runs; only `max_reviews` differs.
#[derive(Debug, Clone, Serialize)]
pub struct AmazonScraperInput {
    pub asins: Vec<String>,
    #[serde(rename = "amazonDomain")]
    pub amazon_domain: String,
    #[serde(rename = "maxReviews")]
    pub max_reviews: u32,
    #[serde(rename = "maxAnswers")]
    pub max_answers: u32,
    #[serde(rename = "scrapeReviews")]
    pub scrape_reviews: bool,
    #[serde(rename = "scrapeDescription")]
    pub scrape_description: bool,
    #[serde(rename = "scrapeFilters")]
    pub scrape_filters: bool,
    #[serde(rename = "scrapeSpecifications")]
    pub scrape_specifications: bool,
    #[serde(rename = "scrapeBuyingOptions")]
    pub scrape_buying_options: bool,
    #[serde(rename = "scrapeQuestions")]
    pub scrape_questions: bool,
    #[serde(rename = "scrapeVariants")]
    pub scrape_variants: bool,
    #[serde(rename = "proxyConfiguration")]
    pub proxy_configuration: ProxyConfiguration,
    #[serde(rename = "proxyCountry")]
    pub proxy_country: String,
    #[serde(rename = "useCaptchaSolver")]
    pub use_captcha_solver: bool,
}

impl AmazonScraperInput {
    pub fn new(asins: Vec<String>, amazon_domain: &str, max_reviews: u32) -> Self {
        Self {
            asins,
            amazon_domain: amazon_domain.to_string(),
            max_reviews,
            max_answers: 20,
            scrape_reviews: true,
            scrape_description: true,
            scrape_filters: true,
            scrape_specifications: true,
            scrape_buying_options: true,
            scrape_questions: true,
            scrape_variants: false,
            proxy_configuration: ProxyConfiguration {
                use_apify_proxy: true,
                country_code: "US".to_string(),
            },
            proxy_country: "AUTO_SELECT_PROXY_COUNTRY".to_string(),
            use_captcha_solver: false,
        }
    }
}

/// Per-star share of ratings as reported on the product page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StarsBreakdown {
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

/// A single product from the Amazon scraper dataset.
#[derive(Debug, Clone, Deserialize)]
pub struct AmazonProduct {
    pub asin: Option<String>,
    pub title: Option<String>,
    pub brand: Option<String>,
    /// Either a bare number or `{ "value": .., "currency": .. }`.
    pub price: Option<serde_json::Value>,
    pub currency: Option<String>,
    pub availability: Option<String>,
    pub dimensions: Option<serde_json::Value>,
    pub specifications: Option<serde_json::Value>,
    #[serde(rename = "bestSellersRank")]
    pub best_sellers_rank: Option<serde_json::Value>,
    pub variations: Option<serde_json::Value>,
    #[serde(rename = "frequentlyBoughtTogether")]
    pub frequently_bought_together: Option<serde_json::Value>,
    #[serde(rename = "customerQuestions")]
    pub customer_questions: Option<serde_json::Value>,
    pub rating: Option<f64>,
    #[serde(rename = "reviewsCount")]
    pub reviews_count: Option<i64>,
    #[serde(rename = "starsBreakdown")]
    pub stars_breakdown: Option<StarsBreakdown>,
    pub images: Option<Vec<String>>,
    pub categories: Option<Vec<String>>,
    pub features: Option<Vec<String>>,
    pub description: Option<String>,
}

impl AmazonProduct {
    /// Numeric price, unwrapping the `{ value }` form.
    pub fn price_value(&self) -> Option<f64> {
        match self.price.as_ref()? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::Object(obj) => obj.get("value").and_then(|v| v.as_f64()),
            _ => None,
        }
    }
}

/// A single review from the Amazon scraper dataset.
///
/// The actor has shipped two field sets over time (`rating`/`verified` and
/// `ratingScore`/`isVerified`), so both are accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct AmazonReview {
    pub id: Option<String>,
    #[serde(rename = "reviewId")]
    pub review_id: Option<String>,
    #[serde(rename = "reviewTitle")]
    pub review_title: Option<String>,
    #[serde(rename = "reviewDescription")]
    pub review_description: Option<String>,
    #[serde(rename = "ratingScore")]
    pub rating_score: Option<f64>,
    pub rating: Option<f64>,
    #[serde(rename = "reviewedIn")]
    pub reviewed_in: Option<String>,
    pub date: Option<String>,
    #[serde(rename = "isVerified")]
    pub is_verified: Option<bool>,
    pub verified: Option<bool>,
    pub author: Option<String>,
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    #[serde(rename = "userProfileLink")]
    pub user_profile_link: Option<String>,
    #[serde(rename = "reviewUrl")]
    pub review_url: Option<String>,
    #[serde(rename = "reviewReaction")]
    pub review_reaction: Option<String>,
    #[serde(rename = "isAmazonVine")]
    pub is_amazon_vine: Option<bool>,
    pub variant: Option<String>,
    #[serde(rename = "variantAttributes")]
    pub variant_attributes: Option<serde_json::Value>,
    #[serde(rename = "reviewImages")]
    pub review_images: Option<Vec<String>>,
    pub position: Option<i64>,
}

impl AmazonReview {
    pub fn score(&self) -> f64 {
        self.rating_score.or(self.rating).unwrap_or(0.0)
    }

    pub fn verified_purchase(&self) -> bool {
        self.is_verified.or(self.verified).unwrap_or(false)
    }

    pub fn amazon_vine(&self) -> bool {
        self.is_amazon_vine.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_status_parses_dashed_and_unknown_values() {
        let run: RunData = serde_json::from_str(
            r#"{"id":"r1","status":"TIMED-OUT","defaultDatasetId":"d1"}"#,
        )
        .unwrap();
        assert_eq!(run.status, RunStatus::TimedOut);
        assert!(run.status.is_failure());

        let run: RunData =
            serde_json::from_str(r#"{"id":"r2","status":"SOMETHING-NEW"}"#).unwrap();
        assert_eq!(run.status, RunStatus::Unknown);
        assert!(!run.status.is_terminal());
    }

    #[test]
    fn run_percent_defaults_to_zero_and_clamps() {
        let run: RunData = serde_json::from_str(r#"{"id":"r","status":"RUNNING"}"#).unwrap();
        assert_eq!(run.percent(), 0);

        let run: RunData = serde_json::from_str(
            r#"{"id":"r","status":"RUNNING","progress":{"percent":140.0}}"#,
        )
        .unwrap();
        assert_eq!(run.percent(), 100);
    }

    #[test]
    fn price_accepts_number_or_object() {
        let bare: AmazonProduct =
            serde_json::from_str(r#"{"asin":"B000000000","price":19.99}"#).unwrap();
        assert_eq!(bare.price_value(), Some(19.99));

        let nested: AmazonProduct = serde_json::from_str(
            r#"{"asin":"B000000000","price":{"value":5.5,"currency":"$"}}"#,
        )
        .unwrap();
        assert_eq!(nested.price_value(), Some(5.5));
    }

    #[test]
    fn review_accepts_either_field_set() {
        let old: AmazonReview =
            serde_json::from_str(r#"{"rating":4,"verified":true}"#).unwrap();
        assert_eq!(old.score(), 4.0);
        assert!(old.verified_purchase());

        let new: AmazonReview =
            serde_json::from_str(r#"{"ratingScore":2,"isVerified":false}"#).unwrap();
        assert_eq!(new.score(), 2.0);
        assert!(!new.verified_purchase());
    }
}
