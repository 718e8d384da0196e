use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior, Sleep};
use tracing::{debug, error, info, warn};

use shelfwatch_common::Config;

use crate::product::ProductScraper;
use crate::traits::ProductStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSettings {
    /// Most products submitted per cycle.
    pub batch_size: u32,
    pub check_interval: Duration,
    /// Delay before the one-off retry after a failed cycle.
    pub retry_delay: Duration,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            batch_size: 5,
            check_interval: Duration::from_secs(120),
            retry_delay: Duration::from_secs(30),
        }
    }
}

impl RefreshSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            batch_size: config.refresh_batch_size,
            check_interval: config.refresh_check_interval(),
            retry_delay: config.refresh_retry_delay(),
        }
    }
}

/// What a single refresh cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing was due.
    Idle,
    /// The due products went out as one product scrape.
    Submitted { task_id: String, asins: Vec<String> },
    /// Selecting or submitting failed; a retry is scheduled.
    Failed { error: String },
}

/// Periodically resubmits stale products to the product scraper.
#[derive(Clone)]
pub struct RefreshWorker {
    inner: Arc<RefreshWorkerInner>,
}

struct RefreshWorkerInner {
    products: ProductScraper,
    store: Arc<dyn ProductStore>,
    settings: RefreshSettings,
    running: AtomicBool,
    retry_pending: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshWorker {
    pub fn new(
        products: ProductScraper,
        store: Arc<dyn ProductStore>,
        settings: RefreshSettings,
    ) -> Self {
        Self {
            inner: Arc::new(RefreshWorkerInner {
                products,
                store,
                settings,
                running: AtomicBool::new(false),
                retry_pending: AtomicBool::new(false),
                handle: Mutex::new(None),
            }),
        }
    }

    /// Start the loop. The first cycle runs immediately. Returns false if the
    /// worker was already running.
    pub fn start(&self) -> bool {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            debug!("Refresh worker already running");
            return false;
        }
        self.inner.retry_pending.store(false, Ordering::SeqCst);

        let handle = tokio::spawn(self.clone().run_loop());
        *self.inner.handle.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);

        info!(
            every_secs = self.inner.settings.check_interval.as_secs(),
            batch_size = self.inner.settings.batch_size,
            "Refresh worker started"
        );
        true
    }

    /// Cancel the loop and any pending retry.
    pub fn stop(&self) {
        let handle = self.inner.handle.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            handle.abort();
            info!("Refresh worker stopped");
        }
        self.inner.retry_pending.store(false, Ordering::SeqCst);
        self.inner.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn retry_pending(&self) -> bool {
        self.inner.retry_pending.load(Ordering::SeqCst)
    }

    async fn run_loop(self) {
        let settings = &self.inner.settings;
        let mut ticker = interval(settings.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // At most one retry is ever pending; a failure while one is
        // scheduled does not push it back.
        let mut retry: Option<Pin<Box<Sleep>>> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = async {
                    if let Some(delay) = retry.as_mut() {
                        delay.await;
                    }
                }, if retry.is_some() => {
                    retry = None;
                    self.inner.retry_pending.store(false, Ordering::SeqCst);
                    info!("Retrying refresh cycle");
                }
            }

            if let CycleOutcome::Failed { .. } = self.run_cycle().await {
                if retry.is_none() {
                    retry = Some(Box::pin(sleep(settings.retry_delay)));
                    self.inner.retry_pending.store(true, Ordering::SeqCst);
                    info!(after_secs = settings.retry_delay.as_secs(), "Refresh retry scheduled");
                }
            }
        }
    }

    /// Run one refresh cycle. Never returns an error: failures are recorded
    /// on the affected products and reported in the outcome.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let inner = &self.inner;

        let due = match inner.store.due_for_refresh(inner.settings.batch_size).await {
            Ok(due) => due,
            Err(e) => {
                error!(error = %e, "Failed to load products due for refresh");
                return CycleOutcome::Failed { error: format!("{e:#}") };
            }
        };

        if due.is_empty() {
            debug!("No products due for refresh");
            return CycleOutcome::Idle;
        }

        let asins: Vec<String> = due.iter().map(|c| c.asin.clone()).collect();
        info!(count = asins.len(), "Refreshing products");

        match inner.products.start_scraping(&asins).await {
            Ok(task_id) => {
                for candidate in &due {
                    if let Err(e) = inner
                        .store
                        .mark_refresh_outcome(candidate.product_id, true, None)
                        .await
                    {
                        warn!(asin = candidate.asin.as_str(), error = %e, "Failed to mark product refreshed");
                    }
                }
                info!(run_id = task_id.as_str(), "Refresh batch submitted");
                CycleOutcome::Submitted { task_id, asins }
            }
            Err(e) => {
                let message = e.to_string();
                error!(error = message.as_str(), "Refresh batch failed");
                for candidate in &due {
                    if let Err(mark_err) = inner
                        .store
                        .mark_refresh_outcome(candidate.product_id, false, Some(&message))
                        .await
                    {
                        warn!(
                            asin = candidate.asin.as_str(),
                            error = %mark_err,
                            "Failed to record refresh failure"
                        );
                    }
                }
                CycleOutcome::Failed { error: message }
            }
        }
    }
}
