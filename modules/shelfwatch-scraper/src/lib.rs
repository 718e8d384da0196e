pub mod error;
mod monitor;
pub mod product;
pub mod refresh;
pub mod registry;
pub mod review;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;

pub use error::{Result, ScrapeError};
pub use product::{ProductScraper, ReconcileReport, MAX_BATCH_SIZE};
pub use refresh::{CycleOutcome, RefreshSettings, RefreshWorker};
pub use review::ReviewScraper;
pub use traits::{ProductStore, ReviewDispatch, RunSnapshot, ScrapeProvider};
