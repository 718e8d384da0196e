// Trait seams for the orchestrators' collaborators.
//
// ScrapeProvider covers the remote actor runs, ProductStore covers every
// product/review write, ReviewDispatch is how product reconciliation hands an
// ASIN to review scraping. Production impls wrap apify-client and
// shelfwatch-store; the testing module provides in-memory mocks.

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use apify_client::{AmazonActor, RunStatus};
use shelfwatch_common::{
    ProductData, ProductRecord, RefreshCandidate, ReviewScrapeState, ReviewSummary, StoredReview,
};
use shelfwatch_store::PgProductStore;

// ---------------------------------------------------------------------------
// ScrapeProvider
// ---------------------------------------------------------------------------

/// Point-in-time view of a provider run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSnapshot {
    pub status: RunStatus,
    /// 0–100, 0 when the provider reports nothing.
    pub progress: u8,
    pub message: Option<String>,
}

impl RunSnapshot {
    pub fn new(status: RunStatus, progress: u8) -> Self {
        Self {
            status,
            progress,
            message: None,
        }
    }
}

#[async_trait]
pub trait ScrapeProvider: Send + Sync {
    /// Start a run for the given ASINs. Returns the provider's run id.
    async fn start_run(&self, asins: &[String]) -> apify_client::Result<String>;

    /// Current status of a run. Never waits for completion.
    async fn run_status(&self, run_id: &str) -> apify_client::Result<RunSnapshot>;

    /// Raw result payload of a finished run.
    async fn run_results(&self, run_id: &str) -> apify_client::Result<serde_json::Value>;
}

#[async_trait]
impl ScrapeProvider for AmazonActor {
    async fn start_run(&self, asins: &[String]) -> apify_client::Result<String> {
        Ok(self.start(asins).await?.id)
    }

    async fn run_status(&self, run_id: &str) -> apify_client::Result<RunSnapshot> {
        let run = self.run(run_id).await?;
        Ok(RunSnapshot {
            status: run.status,
            progress: run.percent(),
            message: run.status_message,
        })
    }

    async fn run_results(&self, run_id: &str) -> apify_client::Result<serde_json::Value> {
        self.items(run_id).await
    }
}

// ---------------------------------------------------------------------------
// ProductStore
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn find_by_asin(&self, asin: &str) -> Result<Option<ProductRecord>>;

    /// Insert a new product row. Returns its id.
    async fn insert_product(&self, data: &ProductData) -> Result<Uuid>;

    /// Overwrite an existing product row in place.
    async fn update_product(&self, id: Uuid, data: &ProductData) -> Result<()>;

    /// Replace the embedded review list and summary wholesale.
    async fn replace_reviews(
        &self,
        product_id: Uuid,
        reviews: &[StoredReview],
        summary: &ReviewSummary,
        state: &ReviewScrapeState,
    ) -> Result<()>;

    /// Record the outcome of a review scrape on a product found by ASIN.
    async fn set_review_scrape_state(&self, asin: &str, state: &ReviewScrapeState) -> Result<()>;

    /// Up to `batch_size` products due for a refresh.
    async fn due_for_refresh(&self, batch_size: u32) -> Result<Vec<RefreshCandidate>>;

    async fn mark_refresh_outcome(
        &self,
        product_id: Uuid,
        success: bool,
        error: Option<&str>,
    ) -> Result<()>;
}

#[async_trait]
impl ProductStore for PgProductStore {
    async fn find_by_asin(&self, asin: &str) -> Result<Option<ProductRecord>> {
        Ok(self.find_by_asin(asin).await?)
    }

    async fn insert_product(&self, data: &ProductData) -> Result<Uuid> {
        Ok(self.insert_product(data).await?)
    }

    async fn update_product(&self, id: Uuid, data: &ProductData) -> Result<()> {
        Ok(self.update_product(id, data).await?)
    }

    async fn replace_reviews(
        &self,
        product_id: Uuid,
        reviews: &[StoredReview],
        summary: &ReviewSummary,
        state: &ReviewScrapeState,
    ) -> Result<()> {
        Ok(self.replace_reviews(product_id, reviews, summary, state).await?)
    }

    async fn set_review_scrape_state(&self, asin: &str, state: &ReviewScrapeState) -> Result<()> {
        Ok(self.set_review_scrape_state(asin, state).await?)
    }

    async fn due_for_refresh(&self, batch_size: u32) -> Result<Vec<RefreshCandidate>> {
        Ok(self.due_for_refresh(batch_size).await?)
    }

    async fn mark_refresh_outcome(
        &self,
        product_id: Uuid,
        success: bool,
        error: Option<&str>,
    ) -> Result<()> {
        Ok(self.mark_refresh_outcome(product_id, success, error).await?)
    }
}

// ---------------------------------------------------------------------------
// ReviewDispatch
// ---------------------------------------------------------------------------

/// Starts review scraping for one ASIN without waiting for it to finish.
#[async_trait]
pub trait ReviewDispatch: Send + Sync {
    /// Returns the review task id.
    async fn dispatch(&self, asin: &str) -> crate::error::Result<String>;
}

