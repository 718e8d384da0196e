// Test mocks for the scrape orchestrators.
//
// Three mocks matching the three trait boundaries:
// - MockProvider (ScrapeProvider): scripted run statuses and results per run id
// - MockStore (ProductStore): stateful in-memory product table
// - RecordingDispatch (ReviewDispatch): records every ASIN handed to it
//
// Plus helpers for building ASIN batches and refresh candidates.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use apify_client::{ApifyError, RunStatus};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use shelfwatch_common::{
    ProductData, ProductRecord, ProductStatus, RefreshCandidate, ReviewScrapeState, ReviewSummary,
    StoredReview,
};

use crate::error::{Result as ScrapeResult, ScrapeError};
use crate::traits::{ProductStore, ReviewDispatch, RunSnapshot, ScrapeProvider};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `n` distinct well-formed ASINs: `B000000001`, `B000000002`, ...
pub fn asins(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("B{i:09}")).collect()
}

pub fn candidate(asin: &str) -> RefreshCandidate {
    RefreshCandidate {
        product_id: Uuid::new_v4(),
        asin: asin.to_string(),
    }
}

pub fn running(progress: u8) -> RunSnapshot {
    RunSnapshot::new(RunStatus::Running, progress)
}

pub fn succeeded() -> RunSnapshot {
    RunSnapshot::new(RunStatus::Succeeded, 100)
}

pub fn failed(message: &str) -> RunSnapshot {
    RunSnapshot {
        status: RunStatus::Failed,
        progress: 0,
        message: Some(message.to_string()),
    }
}

/// A dataset item shaped like the product actor's output.
pub fn product_item(asin: &str, title: &str) -> serde_json::Value {
    serde_json::json!({
        "asin": asin,
        "title": title,
        "price": { "value": 19.99, "currency": "$" },
        "rating": 4.5,
        "reviewsCount": 10,
        "starsBreakdown": { "5star": 0.6, "4star": 0.3, "3star": 0.1 }
    })
}

/// A dataset item shaped like the review actor's output.
pub fn review_item(id: &str, rating: f64, verified: bool) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "reviewTitle": "Title",
        "reviewDescription": "Body",
        "ratingScore": rating,
        "isVerified": verified,
        "author": "Reviewer"
    })
}

fn sample_product_data(asin: &str) -> ProductData {
    let now = Utc::now();
    ProductData {
        asin: asin.to_string(),
        title: Some(format!("Seeded {asin}")),
        brand: None,
        price: None,
        currency: None,
        availability: None,
        dimensions: None,
        specifications: None,
        best_sellers_rank: None,
        variations: None,
        frequently_bought_together: None,
        customer_questions: None,
        images: Vec::new(),
        categories: Vec::new(),
        features: Vec::new(),
        description: None,
        review_summary: ReviewSummary::empty(now),
        status: ProductStatus::Active,
        updated_at: now,
    }
}

// ---------------------------------------------------------------------------
// MockProvider
// ---------------------------------------------------------------------------

/// Scripted scrape provider. Run ids are `<prefix>-1`, `<prefix>-2`, ...
///
/// Each run walks through its scripted snapshots one poll at a time and then
/// repeats the last one. Runs without a script report the default status
/// (RUNNING at 0% unless changed). `set_status` replaces a run's script at
/// runtime so a test can finish a run whenever it likes.
pub struct MockProvider {
    prefix: String,
    next_id: AtomicUsize,
    start_error: Mutex<Option<String>>,
    start_delay: Option<Duration>,
    default_status: RunSnapshot,
    scripts: Mutex<HashMap<String, VecDeque<RunSnapshot>>>,
    status_errors: Mutex<HashMap<String, String>>,
    results: Mutex<HashMap<String, serde_json::Value>>,
    started: Mutex<Vec<Vec<String>>>,
    status_calls: Mutex<HashMap<String, usize>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::with_prefix("run")
    }

    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            next_id: AtomicUsize::new(1),
            start_error: Mutex::new(None),
            start_delay: None,
            default_status: running(0),
            scripts: Mutex::new(HashMap::new()),
            status_errors: Mutex::new(HashMap::new()),
            results: Mutex::new(HashMap::new()),
            started: Mutex::new(Vec::new()),
            status_calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn default_status(mut self, snapshot: RunSnapshot) -> Self {
        self.default_status = snapshot;
        self
    }

    pub fn on_status(self, run_id: &str, script: Vec<RunSnapshot>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(run_id.to_string(), script.into());
        self
    }

    pub fn on_results(self, run_id: &str, results: serde_json::Value) -> Self {
        self.set_results(run_id, results);
        self
    }

    /// Make every `start_run` take `delay` before answering.
    pub fn slow_start(mut self, delay: Duration) -> Self {
        self.start_delay = Some(delay);
        self
    }

    pub fn failing_start(self, message: &str) -> Self {
        self.set_start_error(Some(message));
        self
    }

    pub fn failing_status(self, run_id: &str, message: &str) -> Self {
        self.status_errors
            .lock()
            .unwrap()
            .insert(run_id.to_string(), message.to_string());
        self
    }

    pub fn set_status(&self, run_id: &str, snapshot: RunSnapshot) {
        self.scripts
            .lock()
            .unwrap()
            .insert(run_id.to_string(), VecDeque::from([snapshot]));
    }

    pub fn set_results(&self, run_id: &str, results: serde_json::Value) {
        self.results
            .lock()
            .unwrap()
            .insert(run_id.to_string(), results);
    }

    pub fn set_start_error(&self, message: Option<&str>) {
        *self.start_error.lock().unwrap() = message.map(str::to_string);
    }

    /// Every batch passed to `start_run`, in call order.
    pub fn started(&self) -> Vec<Vec<String>> {
        self.started.lock().unwrap().clone()
    }

    pub fn status_calls(&self, run_id: &str) -> usize {
        self.status_calls
            .lock()
            .unwrap()
            .get(run_id)
            .copied()
            .unwrap_or(0)
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScrapeProvider for MockProvider {
    async fn start_run(&self, asins: &[String]) -> apify_client::Result<String> {
        self.started.lock().unwrap().push(asins.to_vec());
        if let Some(delay) = self.start_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = self.start_error.lock().unwrap().clone() {
            return Err(ApifyError::Api {
                status: 500,
                message,
            });
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{}-{n}", self.prefix))
    }

    async fn run_status(&self, run_id: &str) -> apify_client::Result<RunSnapshot> {
        *self
            .status_calls
            .lock()
            .unwrap()
            .entry(run_id.to_string())
            .or_default() += 1;

        if let Some(message) = self.status_errors.lock().unwrap().get(run_id) {
            return Err(ApifyError::Network(message.clone()));
        }

        let mut scripts = self.scripts.lock().unwrap();
        let snapshot = match scripts.get_mut(run_id) {
            Some(script) if script.len() > 1 => script.pop_front(),
            Some(script) => script.front().cloned(),
            None => None,
        };
        Ok(snapshot.unwrap_or_else(|| self.default_status.clone()))
    }

    async fn run_results(&self, run_id: &str) -> apify_client::Result<serde_json::Value> {
        Ok(self
            .results
            .lock()
            .unwrap()
            .get(run_id)
            .cloned()
            .unwrap_or_else(|| serde_json::json!([])))
    }
}

// ---------------------------------------------------------------------------
// MockStore
// ---------------------------------------------------------------------------

/// One row of the in-memory product table.
#[derive(Debug, Clone)]
pub struct StoredProduct {
    pub id: Uuid,
    pub data: ProductData,
    pub reviews: Vec<StoredReview>,
    pub review_state: Option<ReviewScrapeState>,
}

/// Stateful in-memory store keyed by ASIN.
pub struct MockStore {
    products: Mutex<HashMap<String, StoredProduct>>,
    inserts: AtomicUsize,
    updates: AtomicUsize,
    failing_asins: Mutex<HashSet<String>>,
    due: Mutex<Vec<RefreshCandidate>>,
    due_error: Mutex<Option<String>>,
    due_calls: AtomicUsize,
    outcomes: Mutex<Vec<(Uuid, bool, Option<String>)>>,
    review_state_writes: Mutex<Vec<(String, ReviewScrapeState)>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            products: Mutex::new(HashMap::new()),
            inserts: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
            failing_asins: Mutex::new(HashSet::new()),
            due: Mutex::new(Vec::new()),
            due_error: Mutex::new(None),
            due_calls: AtomicUsize::new(0),
            outcomes: Mutex::new(Vec::new()),
            review_state_writes: Mutex::new(Vec::new()),
        }
    }

    /// Seed an existing product. Returns the store for chaining.
    pub fn with_product(self, asin: &str) -> Self {
        self.products.lock().unwrap().insert(
            asin.to_string(),
            StoredProduct {
                id: Uuid::new_v4(),
                data: sample_product_data(asin),
                reviews: Vec::new(),
                review_state: None,
            },
        );
        self
    }

    pub fn with_due(self, due: Vec<RefreshCandidate>) -> Self {
        *self.due.lock().unwrap() = due;
        self
    }

    /// Make inserts and updates for this ASIN fail.
    pub fn failing_upsert(self, asin: &str) -> Self {
        self.failing_asins.lock().unwrap().insert(asin.to_string());
        self
    }

    pub fn failing_due(self, message: &str) -> Self {
        *self.due_error.lock().unwrap() = Some(message.to_string());
        self
    }

    pub fn set_due(&self, due: Vec<RefreshCandidate>) {
        *self.due.lock().unwrap() = due;
    }

    pub fn product(&self, asin: &str) -> Option<StoredProduct> {
        self.products.lock().unwrap().get(asin).cloned()
    }

    pub fn product_count(&self) -> usize {
        self.products.lock().unwrap().len()
    }

    pub fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn due_calls(&self) -> usize {
        self.due_calls.load(Ordering::SeqCst)
    }

    /// Every `mark_refresh_outcome` call, in order.
    pub fn outcomes(&self) -> Vec<(Uuid, bool, Option<String>)> {
        self.outcomes.lock().unwrap().clone()
    }

    /// Every `set_review_scrape_state` call, in order.
    pub fn review_state_writes(&self) -> Vec<(String, ReviewScrapeState)> {
        self.review_state_writes.lock().unwrap().clone()
    }

    fn check_writable(&self, asin: &str) -> Result<()> {
        if self.failing_asins.lock().unwrap().contains(asin) {
            bail!("write rejected for {asin}");
        }
        Ok(())
    }
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProductStore for MockStore {
    async fn find_by_asin(&self, asin: &str) -> Result<Option<ProductRecord>> {
        Ok(self.products.lock().unwrap().get(asin).map(|p| ProductRecord {
            id: p.id,
            asin: p.data.asin.clone(),
            title: p.data.title.clone(),
            status: p.data.status.as_str().to_string(),
            review_summary: Some(p.data.review_summary.clone()),
            updated_at: p.data.updated_at,
        }))
    }

    async fn insert_product(&self, data: &ProductData) -> Result<Uuid> {
        self.check_writable(&data.asin)?;
        let mut products = self.products.lock().unwrap();
        if products.contains_key(&data.asin) {
            bail!("duplicate key value violates unique constraint on asin {}", data.asin);
        }
        let id = Uuid::new_v4();
        products.insert(
            data.asin.clone(),
            StoredProduct {
                id,
                data: data.clone(),
                reviews: Vec::new(),
                review_state: None,
            },
        );
        self.inserts.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn update_product(&self, id: Uuid, data: &ProductData) -> Result<()> {
        self.check_writable(&data.asin)?;
        let mut products = self.products.lock().unwrap();
        let row = products
            .values_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| anyhow!("no product with id {id}"))?;
        row.data = data.clone();
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn replace_reviews(
        &self,
        product_id: Uuid,
        reviews: &[StoredReview],
        summary: &ReviewSummary,
        state: &ReviewScrapeState,
    ) -> Result<()> {
        let mut products = self.products.lock().unwrap();
        let row = products
            .values_mut()
            .find(|p| p.id == product_id)
            .ok_or_else(|| anyhow!("no product with id {product_id}"))?;
        row.reviews = reviews.to_vec();
        row.data.review_summary = summary.clone();
        row.review_state = Some(state.clone());
        Ok(())
    }

    async fn set_review_scrape_state(&self, asin: &str, state: &ReviewScrapeState) -> Result<()> {
        self.review_state_writes
            .lock()
            .unwrap()
            .push((asin.to_string(), state.clone()));
        if let Some(row) = self.products.lock().unwrap().get_mut(asin) {
            row.review_state = Some(state.clone());
        }
        Ok(())
    }

    async fn due_for_refresh(&self, batch_size: u32) -> Result<Vec<RefreshCandidate>> {
        self.due_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.due_error.lock().unwrap().clone() {
            bail!(message);
        }
        Ok(self
            .due
            .lock()
            .unwrap()
            .iter()
            .take(batch_size as usize)
            .cloned()
            .collect())
    }

    async fn mark_refresh_outcome(
        &self,
        product_id: Uuid,
        success: bool,
        error: Option<&str>,
    ) -> Result<()> {
        self.outcomes
            .lock()
            .unwrap()
            .push((product_id, success, error.map(str::to_string)));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingDispatch
// ---------------------------------------------------------------------------

/// Records dispatched ASINs and answers with `review-<asin>`, or fails every
/// call when built with `failing`.
pub struct RecordingDispatch {
    dispatched: Mutex<Vec<String>>,
    error: Option<String>,
}

impl RecordingDispatch {
    pub fn new() -> Self {
        Self {
            dispatched: Mutex::new(Vec::new()),
            error: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            dispatched: Mutex::new(Vec::new()),
            error: Some(message.to_string()),
        }
    }

    pub fn dispatched(&self) -> Vec<String> {
        self.dispatched.lock().unwrap().clone()
    }
}

impl Default for RecordingDispatch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReviewDispatch for RecordingDispatch {
    async fn dispatch(&self, asin: &str) -> ScrapeResult<String> {
        self.dispatched.lock().unwrap().push(asin.to_string());
        match &self.error {
            Some(message) => Err(ScrapeError::InvalidInput(message.clone())),
            None => Ok(format!("review-{asin}")),
        }
    }
}
