use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use apify_client::{AmazonProduct, ApifyError, StarsBreakdown};
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use shelfwatch_common::{
    invalid_asins, ProductData, ProductStatus, RatingDistribution, ReviewSummary, ScrapeTask,
};

use crate::error::{Result, ScrapeError};
use crate::monitor::{watch_run, RunOutcome};
use crate::registry::{InFlightSet, TaskRegistry};
use crate::traits::{ProductStore, ReviewDispatch, ScrapeProvider};

/// Most ASINs the actor accepts in one run.
pub const MAX_BATCH_SIZE: usize = 100;

/// Counts from reconciling one finished product run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub reviews_dispatched: usize,
}

impl std::fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} inserted, {} updated, {} skipped, {} review runs started",
            self.inserted, self.updated, self.skipped, self.reviews_dispatched
        )
    }
}

/// Submits product scrapes, keeps one active run per ASIN, and reconciles
/// finished runs into the store.
///
/// Construct one per process and clone the handle wherever it is needed;
/// clones share the task registry and in-flight set.
#[derive(Clone)]
pub struct ProductScraper {
    inner: Arc<ProductScraperInner>,
}

struct ProductScraperInner {
    provider: Arc<dyn ScrapeProvider>,
    store: Arc<dyn ProductStore>,
    reviews: Arc<dyn ReviewDispatch>,
    tasks: TaskRegistry,
    in_flight: InFlightSet,
    poll_interval: Duration,
}

impl ProductScraper {
    pub fn new(
        provider: Arc<dyn ScrapeProvider>,
        store: Arc<dyn ProductStore>,
        reviews: Arc<dyn ReviewDispatch>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(ProductScraperInner {
                provider,
                store,
                reviews,
                tasks: TaskRegistry::new(),
                in_flight: InFlightSet::new(),
                poll_interval,
            }),
        }
    }

    /// Validate, claim and submit a batch of ASINs. Returns the provider run
    /// id, which doubles as the task id. Does not wait for the run.
    pub async fn start_scraping<S: AsRef<str>>(&self, asins: &[S]) -> Result<String> {
        if asins.is_empty() {
            return Err(ScrapeError::InvalidInput(
                "Provide at least one ASIN to scrape".to_string(),
            ));
        }

        let unique = dedup_preserving_order(asins);

        let invalid = invalid_asins(&unique);
        if !invalid.is_empty() {
            return Err(ScrapeError::InvalidFormat(invalid));
        }

        if unique.len() > MAX_BATCH_SIZE {
            return Err(ScrapeError::InvalidInput(format!(
                "Maximum of {MAX_BATCH_SIZE} ASINs allowed per batch, got {}",
                unique.len()
            )));
        }

        let inner = &self.inner;
        let claim = inner
            .in_flight
            .claim(&unique)
            .map_err(ScrapeError::AlreadyInFlight)?;

        // Until the task is registered, `claim` releases the ASINs on any
        // early return or cancellation.
        let run_id = match inner.provider.start_run(&unique).await {
            Ok(id) => id,
            Err(e) => {
                error!(asins = %unique.join(","), error = %e, "Failed to start product scrape");
                return Err(ScrapeError::Provider(e));
            }
        };

        info!(run_id = run_id.as_str(), asins = unique.len(), "Product scrape started");
        inner.tasks.insert(ScrapeTask::new(run_id.clone(), unique));
        claim.keep();

        tokio::spawn(self.clone().monitor(run_id.clone()));

        Ok(run_id)
    }

    pub fn get_task_status(&self, task_id: &str) -> Option<ScrapeTask> {
        self.inner.tasks.get(task_id)
    }

    pub fn is_in_flight(&self, asin: &str) -> bool {
        self.inner.in_flight.contains(asin)
    }

    pub fn active_tasks(&self) -> usize {
        self.inner.tasks.active_count()
    }

    async fn monitor(self, task_id: String) {
        let inner = &self.inner;
        let outcome = watch_run(
            inner.provider.as_ref(),
            &inner.tasks,
            &task_id,
            inner.poll_interval,
        )
        .await;

        match outcome {
            Ok(RunOutcome::Succeeded) => {
                if let Err(e) = self.process_results(&task_id).await {
                    error!(run_id = task_id.as_str(), error = %e, "Product reconciliation failed");
                }
            }
            Ok(RunOutcome::Failed(message)) => {
                warn!(run_id = task_id.as_str(), message = message.as_str(), "Product run failed");
                self.fail_task(&task_id, message);
            }
            Ok(RunOutcome::Detached) => {}
            Err(e) => {
                error!(run_id = task_id.as_str(), error = %e, "Error monitoring product run");
                self.fail_task(&task_id, e.to_string());
            }
        }
    }

    /// Reconcile a finished run into the store and settle the task.
    ///
    /// Any error marks the task Failed, releases its ASINs, and is returned.
    /// Records written before the failing one are kept.
    /// A task that is already settled, or being reconciled elsewhere, is
    /// refused with `AlreadySettled` and left untouched.
    pub async fn process_results(&self, task_id: &str) -> Result<ReconcileReport> {
        let task = self
            .inner
            .tasks
            .get(task_id)
            .ok_or_else(|| ScrapeError::TaskNotFound(task_id.to_string()))?;
        if !self.inner.tasks.begin_reconcile(task_id) {
            return Err(ScrapeError::AlreadySettled(task_id.to_string()));
        }

        match self.reconcile(&task).await {
            Ok(report) => {
                self.inner.tasks.complete(task_id);
                self.inner.in_flight.release_all(&task.subject_ids);
                info!(run_id = task_id, "Product run reconciled: {report}");
                Ok(report)
            }
            Err(e) => {
                self.fail_task(task_id, e.to_string());
                Err(e)
            }
        }
    }

    async fn reconcile(&self, task: &ScrapeTask) -> Result<ReconcileReport> {
        let inner = &self.inner;
        let payload = inner.provider.run_results(&task.id).await?;
        let items = match payload {
            serde_json::Value::Array(items) if !items.is_empty() => items,
            _ => return Err(ScrapeError::EmptyResults(task.id.clone())),
        };

        let mut report = ReconcileReport::default();
        for item in items {
            let product: AmazonProduct = serde_json::from_value(item).map_err(ApifyError::from)?;
            let Some(asin) = product.asin.clone().filter(|a| !a.is_empty()) else {
                warn!(run_id = task.id.as_str(), "Skipping product with missing ASIN");
                report.skipped += 1;
                continue;
            };

            if let Err(e) = self.upsert(&product, &asin, &mut report).await {
                error!(asin = asin.as_str(), error = %e, "Failed to process product");
                return Err(e);
            }

            match inner.reviews.dispatch(&asin).await {
                Ok(review_task) => {
                    report.reviews_dispatched += 1;
                    info!(asin = asin.as_str(), review_task = review_task.as_str(), "Started review scraping");
                }
                Err(e) => {
                    warn!(asin = asin.as_str(), error = %e, "Failed to start review scraping");
                }
            }
            inner.in_flight.release(&asin);
        }

        Ok(report)
    }

    async fn upsert(
        &self,
        product: &AmazonProduct,
        asin: &str,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        let store = &self.inner.store;
        let data = product_data(product, asin, Utc::now());

        match store.find_by_asin(asin).await.map_err(ScrapeError::Store)? {
            Some(existing) => {
                store
                    .update_product(existing.id, &data)
                    .await
                    .map_err(ScrapeError::Store)?;
                report.updated += 1;
            }
            None => {
                store.insert_product(&data).await.map_err(ScrapeError::Store)?;
                report.inserted += 1;
            }
        }
        Ok(())
    }

    fn fail_task(&self, task_id: &str, message: String) {
        let inner = &self.inner;
        inner.tasks.fail(task_id, message);
        inner.in_flight.release_all(&inner.tasks.subjects(task_id));
    }
}

fn dedup_preserving_order<S: AsRef<str>>(asins: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    asins
        .iter()
        .map(|a| a.as_ref().to_string())
        .filter(|a| seen.insert(a.clone()))
        .collect()
}

/// Normalize one dataset item into the stored product shape.
pub(crate) fn product_data(product: &AmazonProduct, asin: &str, now: DateTime<Utc>) -> ProductData {
    let review_summary = ReviewSummary {
        rating: product.rating.unwrap_or(0.0),
        review_count: product.reviews_count.unwrap_or(0),
        stars_breakdown: product
            .stars_breakdown
            .as_ref()
            .map(distribution)
            .unwrap_or_default(),
        ..ReviewSummary::empty(now)
    };

    ProductData {
        asin: asin.to_string(),
        title: product.title.clone(),
        brand: product.brand.clone(),
        price: product.price_value(),
        currency: product.currency.clone(),
        availability: product.availability.clone(),
        dimensions: product.dimensions.clone(),
        specifications: product.specifications.clone(),
        best_sellers_rank: product.best_sellers_rank.clone(),
        variations: product.variations.clone(),
        frequently_bought_together: product.frequently_bought_together.clone(),
        customer_questions: product.customer_questions.clone(),
        images: product.images.clone().unwrap_or_default(),
        categories: product.categories.clone().unwrap_or_default(),
        features: product.features.clone().unwrap_or_default(),
        description: product.description.clone(),
        review_summary,
        status: ProductStatus::Active,
        updated_at: now,
    }
}

fn distribution(stars: &StarsBreakdown) -> RatingDistribution {
    RatingDistribution {
        five: stars.five,
        four: stars.four,
        three: stars.three,
        two: stars.two,
        one: stars.one,
    }
}
