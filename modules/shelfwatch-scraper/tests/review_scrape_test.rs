//! Review orchestrator scenarios, including the chain from a product run into
//! review reconciliation.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use shelfwatch_common::{ReviewScrapeStatus, ScrapeTask, TaskStatus};
use shelfwatch_scraper::testing::{
    failed, product_item, review_item, succeeded, MockProvider, MockStore,
};
use shelfwatch_scraper::{ProductScraper, ReviewScraper, ScrapeError};

const POLL: Duration = Duration::from_secs(5);

async fn settle_review(scraper: &ReviewScraper, task_id: &str) -> ScrapeTask {
    for _ in 0..600 {
        let task = scraper.get_task_status(task_id).expect("task registered");
        if task.status.is_terminal() {
            return task;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    panic!("review task {task_id} never reached a terminal state");
}

fn review_provider() -> MockProvider {
    MockProvider::with_prefix("review").default_status(succeeded())
}

#[tokio::test(start_paused = true)]
async fn reviews_replace_stored_set_and_summary() {
    let provider = Arc::new(review_provider().on_results(
        "review-1",
        json!([
            review_item("r1", 5.0, true),
            review_item("r2", 5.0, true),
            review_item("r3", 4.0, false),
            review_item("r4", 1.0, true)
        ]),
    ));
    let store = Arc::new(MockStore::new().with_product("B000000001"));
    let scraper = ReviewScraper::new(provider.clone(), store.clone(), POLL);

    let task_id = scraper.start_scraping("B000000001").await.unwrap();
    assert_eq!(task_id, "review-1");
    let task = settle_review(&scraper, &task_id).await;
    assert_eq!(task.status, TaskStatus::Completed);

    let row = store.product("B000000001").unwrap();
    assert_eq!(row.reviews.len(), 4);

    let summary = &row.data.review_summary;
    assert_eq!(summary.review_count, 4);
    assert_eq!(summary.verified_purchases, 3);
    assert_eq!(summary.rating, 3.8);
    assert_eq!(summary.stars_breakdown.five, 0.5);
    assert_eq!(summary.stars_breakdown.four, 0.25);
    assert_eq!(summary.stars_breakdown.three, 0.0);
    assert_eq!(summary.stars_breakdown.one, 0.25);
    assert!((summary.stars_breakdown.total() - 1.0).abs() < 1e-9);

    let state = row.review_state.unwrap();
    assert_eq!(state.scrape_status, ReviewScrapeStatus::Completed);
    assert_eq!(state.scraped_reviews, Some(4));
}

#[tokio::test(start_paused = true)]
async fn second_scrape_replaces_rather_than_merges() {
    let provider = Arc::new(
        review_provider()
            .on_results("review-1", json!([review_item("r1", 5.0, true), review_item("r2", 3.0, true)]))
            .on_results("review-2", json!([review_item("r3", 2.0, false)])),
    );
    let store = Arc::new(MockStore::new().with_product("B000000001"));
    let scraper = ReviewScraper::new(provider, store.clone(), POLL);

    let first = scraper.start_scraping("B000000001").await.unwrap();
    settle_review(&scraper, &first).await;
    let second = scraper.start_scraping("B000000001").await.unwrap();
    settle_review(&scraper, &second).await;

    let row = store.product("B000000001").unwrap();
    assert_eq!(row.reviews.len(), 1);
    assert_eq!(row.reviews[0].id, "r3");
    assert_eq!(row.data.review_summary.review_count, 1);
    assert_eq!(row.data.review_summary.stars_breakdown.two, 1.0);
}

#[tokio::test(start_paused = true)]
async fn zero_reviews_store_zero_fractions() {
    let provider = Arc::new(review_provider().on_results("review-1", json!([])));
    let store = Arc::new(MockStore::new().with_product("B000000001"));
    let scraper = ReviewScraper::new(provider, store.clone(), POLL);

    let task_id = scraper.start_scraping("B000000001").await.unwrap();
    let task = settle_review(&scraper, &task_id).await;

    assert_eq!(task.status, TaskStatus::Completed);
    let summary = store.product("B000000001").unwrap().data.review_summary;
    assert_eq!(summary.review_count, 0);
    assert_eq!(summary.rating, 0.0);
    assert_eq!(summary.stars_breakdown.total(), 0.0);
}

#[tokio::test(start_paused = true)]
async fn missing_product_fails_and_records_state() {
    let provider = Arc::new(
        review_provider().on_results("review-1", json!([review_item("r1", 4.0, true)])),
    );
    let store = Arc::new(MockStore::new());
    let scraper = ReviewScraper::new(provider, store.clone(), POLL);

    let task_id = scraper.start_scraping("B000000001").await.unwrap();
    let task = settle_review(&scraper, &task_id).await;

    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error.as_deref(), Some("Product not found for ASIN B000000001"));

    let writes = store.review_state_writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].0, "B000000001");
    assert_eq!(writes[0].1.scrape_status, ReviewScrapeStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn non_list_payload_is_a_provider_error() {
    let provider = Arc::new(review_provider().on_results("review-1", json!({ "oops": true })));
    let store = Arc::new(MockStore::new().with_product("B000000001"));
    let scraper = ReviewScraper::new(provider, store.clone(), POLL);

    let task_id = scraper.start_scraping("B000000001").await.unwrap();
    let task = settle_review(&scraper, &task_id).await;

    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error.unwrap().contains("not a list"));
    let state = store.product("B000000001").unwrap().review_state.unwrap();
    assert_eq!(state.scrape_status, ReviewScrapeStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn settled_review_task_is_not_reconciled_again() {
    let provider = Arc::new(review_provider().on_results("review-1", json!([review_item("r1", 5.0, true)])));
    let store = Arc::new(MockStore::new().with_product("B000000001"));
    let scraper = ReviewScraper::new(provider.clone(), store.clone(), POLL);

    let task_id = scraper.start_scraping("B000000001").await.unwrap();
    assert_eq!(settle_review(&scraper, &task_id).await.status, TaskStatus::Completed);

    provider.set_results(
        "review-1",
        json!([review_item("r1", 5.0, true), review_item("r2", 1.0, false)]),
    );
    let err = scraper.process_results(&task_id).await.unwrap_err();

    assert!(matches!(err, ScrapeError::AlreadySettled(_)));
    assert!(store.review_state_writes().is_empty());
    assert_eq!(store.product("B000000001").unwrap().reviews.len(), 1);
    assert_eq!(
        scraper.get_task_status(&task_id).unwrap().status,
        TaskStatus::Completed
    );
}

#[tokio::test(start_paused = true)]
async fn failed_review_run_leaves_product_untouched() {
    let provider = Arc::new(
        MockProvider::with_prefix("review").default_status(failed("Review actor timed out")),
    );
    let store = Arc::new(MockStore::new().with_product("B000000001"));
    let scraper = ReviewScraper::new(provider, store.clone(), POLL);

    let task_id = scraper.start_scraping("B000000001").await.unwrap();
    let task = settle_review(&scraper, &task_id).await;

    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error.as_deref(), Some("Review actor timed out"));
    assert!(store.product("B000000001").unwrap().reviews.is_empty());
}

#[tokio::test(start_paused = true)]
async fn review_submissions_are_not_deduplicated() {
    let provider = Arc::new(MockProvider::with_prefix("review"));
    let scraper = ReviewScraper::new(provider.clone(), Arc::new(MockStore::new()), POLL);

    let a = scraper.start_scraping("B000000001").await.unwrap();
    let b = scraper.start_scraping("B000000001").await.unwrap();

    assert_ne!(a, b);
    assert_eq!(provider.started().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn malformed_review_asin_is_rejected() {
    let provider = Arc::new(MockProvider::with_prefix("review"));
    let scraper = ReviewScraper::new(provider.clone(), Arc::new(MockStore::new()), POLL);

    let err = scraper.start_scraping("b00").await.unwrap_err();

    assert!(matches!(err, ScrapeError::InvalidFormat(ref ids) if ids == &["b00"]));
    assert!(provider.started().is_empty());
}

#[tokio::test(start_paused = true)]
async fn product_run_chains_into_review_reconciliation() {
    let store = Arc::new(MockStore::new());
    let product_provider = Arc::new(
        MockProvider::new()
            .default_status(succeeded())
            .on_results("run-1", json!([product_item("B000000001", "Kettle")])),
    );
    let review_provider = Arc::new(review_provider().on_results(
        "review-1",
        json!([review_item("r1", 5.0, true), review_item("r2", 4.0, false)]),
    ));

    let reviews = ReviewScraper::new(review_provider.clone(), store.clone(), POLL);
    let products = ProductScraper::new(
        product_provider,
        store.clone(),
        Arc::new(reviews.clone()),
        POLL,
    );

    let task_id = products.start_scraping(&["B000000001"]).await.unwrap();
    tokio::time::sleep(POLL * 4).await;

    assert_eq!(
        products.get_task_status(&task_id).unwrap().status,
        TaskStatus::Completed
    );
    assert_eq!(review_provider.started(), vec![vec!["B000000001".to_string()]]);
    assert_eq!(
        reviews.get_task_status("review-1").unwrap().status,
        TaskStatus::Completed
    );

    let row = store.product("B000000001").unwrap();
    assert_eq!(row.data.title.as_deref(), Some("Kettle"));
    assert_eq!(row.reviews.len(), 2);
    assert_eq!(row.data.review_summary.review_count, 2);
    assert_eq!(row.data.review_summary.rating, 4.5);
    assert_eq!(reviews.active_tasks(), 0);
}
