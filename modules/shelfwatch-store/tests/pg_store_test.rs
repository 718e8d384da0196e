//! Postgres store round trips.
//!
//! Requirements:
//!   - DATABASE_URL env var pointing at a disposable Postgres database
//!
//! Tests skip themselves when DATABASE_URL is not set.

use chrono::Utc;
use uuid::Uuid;

use shelfwatch_common::{
    ProductData, ProductStatus, ReviewScrapeState, ReviewScrapeStatus, ReviewSummary,
};
use shelfwatch_store::PgProductStore;

async fn store() -> Option<PgProductStore> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let store = PgProductStore::connect(&url).await.expect("connect");
    store.migrate().await.expect("migrate");
    Some(store)
}

/// A random, well-formed ASIN so parallel tests never collide.
fn fresh_asin() -> String {
    let hex = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("T{}", &hex[..9])
}

fn product(asin: &str, title: &str) -> ProductData {
    let now = Utc::now();
    ProductData {
        asin: asin.to_string(),
        title: Some(title.to_string()),
        brand: Some("Acme".to_string()),
        price: Some(12.5),
        currency: Some("USD".to_string()),
        availability: None,
        dimensions: None,
        specifications: Some(serde_json::json!({ "Material": "Steel" })),
        best_sellers_rank: None,
        variations: None,
        frequently_bought_together: None,
        customer_questions: None,
        images: vec!["https://example.com/a.jpg".to_string()],
        categories: vec!["Kitchen".to_string()],
        features: Vec::new(),
        description: None,
        review_summary: ReviewSummary::empty(now),
        status: ProductStatus::Active,
        updated_at: now,
    }
}

#[tokio::test]
async fn insert_then_update_keeps_id() {
    let Some(store) = store().await else {
        eprintln!("Skipping: DATABASE_URL not available");
        return;
    };
    let asin = fresh_asin();

    let id = store.insert_product(&product(&asin, "First")).await.unwrap();
    store
        .update_product(id, &product(&asin, "Second"))
        .await
        .unwrap();

    let found = store.find_by_asin(&asin).await.unwrap().unwrap();
    assert_eq!(found.id, id);
    assert_eq!(found.title.as_deref(), Some("Second"));
    assert_eq!(found.status, "active");
    assert_eq!(found.review_summary.unwrap().review_count, 0);
}

#[tokio::test]
async fn missing_asin_is_none() {
    let Some(store) = store().await else {
        eprintln!("Skipping: DATABASE_URL not available");
        return;
    };

    assert!(store.find_by_asin(&fresh_asin()).await.unwrap().is_none());
}

#[tokio::test]
async fn review_state_and_refresh_outcomes_are_written() {
    let Some(store) = store().await else {
        eprintln!("Skipping: DATABASE_URL not available");
        return;
    };
    let asin = fresh_asin();
    let id = store.insert_product(&product(&asin, "Kettle")).await.unwrap();

    let mut summary = ReviewSummary::empty(Utc::now());
    summary.review_count = 3;
    summary.rating = 4.3;
    store
        .replace_reviews(id, &[], &summary, &ReviewScrapeState::completed(3, Utc::now()))
        .await
        .unwrap();
    let found = store.find_by_asin(&asin).await.unwrap().unwrap();
    assert_eq!(found.review_summary.unwrap().rating, 4.3);

    let failed = ReviewScrapeState::failed("actor crashed", Utc::now());
    assert_eq!(failed.scrape_status, ReviewScrapeStatus::Failed);
    store.set_review_scrape_state(&asin, &failed).await.unwrap();

    // Never refreshed, so it is due until a successful refresh is recorded.
    store
        .mark_refresh_outcome(id, false, Some("provider down"))
        .await
        .unwrap();
    store.mark_refresh_outcome(id, true, None).await.unwrap();

    let due = store.due_for_refresh(1000).await.unwrap();
    assert!(due.iter().all(|c| c.product_id != id));
}
