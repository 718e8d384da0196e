//! Refresh worker cycles and scheduling on a paused clock.

use std::sync::Arc;
use std::time::Duration;

use shelfwatch_scraper::testing::{
    asins, candidate, MockProvider, MockStore, RecordingDispatch,
};
use shelfwatch_scraper::{CycleOutcome, ProductScraper, RefreshSettings, RefreshWorker};

const POLL: Duration = Duration::from_secs(5);

struct Harness {
    provider: Arc<MockProvider>,
    store: Arc<MockStore>,
    products: ProductScraper,
    worker: RefreshWorker,
}

fn harness(provider: MockProvider, store: MockStore) -> Harness {
    let provider = Arc::new(provider);
    let store = Arc::new(store);
    let products = ProductScraper::new(
        provider.clone(),
        store.clone(),
        Arc::new(RecordingDispatch::new()),
        POLL,
    );
    let worker = RefreshWorker::new(products.clone(), store.clone(), RefreshSettings::default());
    Harness {
        provider,
        store,
        products,
        worker,
    }
}

fn due(n: usize) -> Vec<shelfwatch_common::RefreshCandidate> {
    asins(n).iter().map(|a| candidate(a)).collect()
}

// ---------------------------------------------------------------------------
// Single cycles
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn nothing_due_is_idle() {
    let h = harness(MockProvider::new(), MockStore::new());

    assert_eq!(h.worker.run_cycle().await, CycleOutcome::Idle);
    assert!(h.provider.started().is_empty());
    assert!(h.store.outcomes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn due_products_go_out_as_one_batch() {
    let candidates = due(7);
    let h = harness(MockProvider::new(), MockStore::new().with_due(candidates.clone()));

    let outcome = h.worker.run_cycle().await;

    let expected: Vec<String> = asins(5);
    assert_eq!(
        outcome,
        CycleOutcome::Submitted {
            task_id: "run-1".to_string(),
            asins: expected.clone(),
        }
    );
    assert_eq!(h.provider.started(), vec![expected]);

    let outcomes = h.store.outcomes();
    assert_eq!(outcomes.len(), 5);
    for (c, (id, success, error)) in candidates.iter().zip(&outcomes) {
        assert_eq!(&c.product_id, id);
        assert!(*success);
        assert!(error.is_none());
    }
    assert!(h.products.is_in_flight("B000000001"));
}

#[tokio::test(start_paused = true)]
async fn provider_failure_marks_every_record_failed() {
    let h = harness(
        MockProvider::new().failing_start("actor quota exceeded"),
        MockStore::new().with_due(due(5)),
    );

    let outcome = h.worker.run_cycle().await;

    let CycleOutcome::Failed { error } = outcome else {
        panic!("expected a failed cycle, got {outcome:?}");
    };
    assert!(error.contains("actor quota exceeded"));

    let outcomes = h.store.outcomes();
    assert_eq!(outcomes.len(), 5);
    assert!(outcomes
        .iter()
        .all(|(_, success, err)| !success && err.as_deref() == Some(error.as_str())));
    assert!(!h.products.is_in_flight("B000000001"));
}

#[tokio::test(start_paused = true)]
async fn still_running_products_are_not_resubmitted() {
    let h = harness(MockProvider::new(), MockStore::new().with_due(due(1)));

    assert!(matches!(
        h.worker.run_cycle().await,
        CycleOutcome::Submitted { .. }
    ));

    // The first run never finishes, so the same product is still claimed.
    let outcome = h.worker.run_cycle().await;
    let CycleOutcome::Failed { error } = outcome else {
        panic!("expected a failed cycle, got {outcome:?}");
    };
    assert!(error.contains("already being processed"));
    assert_eq!(h.provider.started().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn selection_failure_is_reported_not_raised() {
    let h = harness(MockProvider::new(), MockStore::new().failing_due("connection refused"));

    let outcome = h.worker.run_cycle().await;

    assert_eq!(
        outcome,
        CycleOutcome::Failed {
            error: "connection refused".to_string()
        }
    );
    assert!(h.store.outcomes().is_empty());
}

// ---------------------------------------------------------------------------
// Scheduling
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn start_runs_immediately_then_on_interval() {
    let h = harness(MockProvider::new(), MockStore::new());

    assert!(h.worker.start());
    assert!(!h.worker.start());
    assert!(h.worker.is_running());

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.store.due_calls(), 1);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.store.due_calls(), 1);
    assert!(!h.worker.retry_pending());

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(h.store.due_calls(), 2);

    h.worker.stop();
}

#[tokio::test(start_paused = true)]
async fn failed_cycle_retries_after_delay() {
    let h = harness(
        MockProvider::new().failing_start("provider down"),
        MockStore::new().with_due(due(5)),
    );

    h.worker.start();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(h.store.due_calls(), 1);
    assert_eq!(h.store.outcomes().len(), 5);
    assert!(h.worker.retry_pending());

    tokio::time::sleep(Duration::from_secs(29)).await;
    assert_eq!(h.store.due_calls(), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.store.due_calls(), 2);
    assert_eq!(h.provider.started().len(), 2);
    assert_eq!(h.store.outcomes().len(), 10);

    h.worker.stop();
}

#[tokio::test(start_paused = true)]
async fn selection_failure_also_schedules_retry() {
    let h = harness(MockProvider::new(), MockStore::new().failing_due("connection refused"));

    h.worker.start();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(h.worker.retry_pending());

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(h.store.due_calls(), 2);

    h.worker.stop();
}

#[tokio::test(start_paused = true)]
async fn successful_cycle_schedules_no_retry() {
    let h = harness(MockProvider::new(), MockStore::new().with_due(due(2)));

    h.worker.start();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(!h.worker.retry_pending());
    assert_eq!(h.provider.started().len(), 1);

    h.worker.stop();
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_loop_and_pending_retry() {
    let h = harness(
        MockProvider::new().failing_start("provider down"),
        MockStore::new().with_due(due(1)),
    );

    h.worker.start();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(h.worker.retry_pending());

    h.worker.stop();
    assert!(!h.worker.is_running());
    assert!(!h.worker.retry_pending());

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(h.store.due_calls(), 1);

    // A stopped worker can be started again.
    assert!(h.worker.start());
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.store.due_calls(), 2);
    h.worker.stop();
}

#[tokio::test(start_paused = true)]
async fn stop_during_submission_releases_claims() {
    let h = harness(
        MockProvider::new().slow_start(Duration::from_secs(10)),
        MockStore::new().with_due(due(1)),
    );

    h.worker.start();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.provider.started().len(), 1);
    assert!(h.products.is_in_flight("B000000001"));

    h.worker.stop();
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert!(!h.products.is_in_flight("B000000001"));
    assert_eq!(h.products.active_tasks(), 0);
    assert!(h.store.outcomes().is_empty());
}
