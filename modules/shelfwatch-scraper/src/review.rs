use std::sync::Arc;
use std::time::Duration;

use apify_client::{AmazonReview, ApifyError};
use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use shelfwatch_common::{
    is_valid_asin, ReviewScrapeState, ReviewStats, ScrapeTask, StoredReview,
};

use crate::error::{Result, ScrapeError};
use crate::monitor::{watch_run, RunOutcome};
use crate::registry::TaskRegistry;
use crate::traits::{ProductStore, ReviewDispatch, ScrapeProvider};

/// Review scrapes for one ASIN at a time. Unlike product scrapes these are
/// not deduplicated: two submissions for the same ASIN start two runs.
#[derive(Clone)]
pub struct ReviewScraper {
    inner: Arc<ReviewScraperInner>,
}

struct ReviewScraperInner {
    provider: Arc<dyn ScrapeProvider>,
    store: Arc<dyn ProductStore>,
    tasks: TaskRegistry,
    poll_interval: Duration,
}

impl ReviewScraper {
    pub fn new(
        provider: Arc<dyn ScrapeProvider>,
        store: Arc<dyn ProductStore>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(ReviewScraperInner {
                provider,
                store,
                tasks: TaskRegistry::new(),
                poll_interval,
            }),
        }
    }

    pub async fn start_scraping(&self, asin: &str) -> Result<String> {
        if asin.is_empty() {
            return Err(ScrapeError::InvalidInput("Provide an ASIN to scrape".to_string()));
        }
        if !is_valid_asin(asin) {
            return Err(ScrapeError::InvalidFormat(vec![asin.to_string()]));
        }

        let subjects = vec![asin.to_string()];
        let run_id = self.inner.provider.start_run(&subjects).await.map_err(|e| {
            error!(asin, error = %e, "Failed to start review scrape");
            ScrapeError::Provider(e)
        })?;

        info!(run_id = run_id.as_str(), asin, "Review scrape started");
        self.inner.tasks.insert(ScrapeTask::new(run_id.clone(), subjects));

        tokio::spawn(self.clone().monitor(run_id.clone()));

        Ok(run_id)
    }

    pub fn get_task_status(&self, task_id: &str) -> Option<ScrapeTask> {
        self.inner.tasks.get(task_id)
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
                    error!(run_id = task_id.as_str(), error = %e, "Review reconciliation failed");
                }
            }
            Ok(RunOutcome::Failed(message)) => {
                warn!(run_id = task_id.as_str(), message = message.as_str(), "Review run failed");
                inner.tasks.fail(&task_id, message);
            }
            Ok(RunOutcome::Detached) => {}
            Err(e) => {
                error!(run_id = task_id.as_str(), error = %e, "Error monitoring review run");
                inner.tasks.fail(&task_id, e.to_string());
            }
        }
    }

    /// Replace the product's stored reviews with the run's results.
    ///
    /// On failure the product's review scrape state is set to failed (best
    /// effort), the task is marked Failed, and the original error returned.
    /// A task that is already settled, or being reconciled elsewhere, is
    /// refused with `AlreadySettled` and left untouched.
    pub async fn process_results(&self, task_id: &str) -> Result<usize> {
        let task = self
            .inner
            .tasks
            .get(task_id)
            .ok_or_else(|| ScrapeError::TaskNotFound(task_id.to_string()))?;
        if !self.inner.tasks.begin_reconcile(task_id) {
            return Err(ScrapeError::AlreadySettled(task_id.to_string()));
        }
        let asin = task.subject_ids.first().cloned().unwrap_or_default();

        match self.reconcile(&task.id, &asin).await {
            Ok(count) => {
                self.inner.tasks.complete(task_id);
                info!(run_id = task_id, asin = asin.as_str(), reviews = count, "Reviews stored");
                Ok(count)
            }
            Err(e) => {
                let state = ReviewScrapeState::failed(e.to_string(), Utc::now());
                if let Err(write_err) = self.inner.store.set_review_scrape_state(&asin, &state).await {
                    warn!(asin = asin.as_str(), error = %write_err, "Failed to record review scrape failure");
                }
                self.inner.tasks.fail(task_id, e.to_string());
                Err(e)
            }
        }
    }

    async fn reconcile(&self, run_id: &str, asin: &str) -> Result<usize> {
        let inner = &self.inner;
        let payload = inner.provider.run_results(run_id).await?;
        let serde_json::Value::Array(items) = payload else {
            return Err(ApifyError::Parse(format!("review results for run {run_id} are not a list")).into());
        };

        let product = inner
            .store
            .find_by_asin(asin)
            .await
            .map_err(ScrapeError::Store)?
            .ok_or_else(|| ScrapeError::SubjectNotFound(asin.to_string()))?;

        let reviews = items
            .into_iter()
            .map(|item| serde_json::from_value::<AmazonReview>(item).map(stored_review))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(ApifyError::from)?;

        let now = Utc::now();
        let stats = ReviewStats::compute(&reviews);
        inner
            .store
            .replace_reviews(
                product.id,
                &reviews,
                &stats.summary(now),
                &ReviewScrapeState::completed(stats.total, now),
            )
            .await
            .map_err(ScrapeError::Store)?;

        Ok(stats.total)
    }
}

#[async_trait]
impl ReviewDispatch for ReviewScraper {
    async fn dispatch(&self, asin: &str) -> Result<String> {
        self.start_scraping(asin).await
    }
}

pub(crate) fn stored_review(review: AmazonReview) -> StoredReview {
    let rating_score = review.score();
    let is_verified = review.verified_purchase();
    let is_amazon_vine = review.amazon_vine();

    StoredReview {
        id: review
            .id
            .or_else(|| review.review_id.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        review_id: review.review_id,
        review_title: review.review_title.unwrap_or_default(),
        review_description: review.review_description.unwrap_or_default(),
        rating_score,
        reviewed_in: review.reviewed_in.or(review.date),
        is_verified,
        author: review
            .author
            .filter(|a| !a.trim().is_empty())
            .unwrap_or_else(|| "Anonymous".to_string()),
        user_id: review.user_id,
        user_profile_link: review.user_profile_link,
        review_url: review.review_url,
        review_reaction: review.review_reaction,
        is_amazon_vine,
        variant: review.variant,
        variant_attributes: review.variant_attributes,
        review_images: review.review_images.unwrap_or_default(),
        position: review.position,
    }
}
