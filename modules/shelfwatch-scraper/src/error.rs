use apify_client::ApifyError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScrapeError>;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(
        "Invalid ASIN format: {}. ASINs must be 10 characters long and contain only uppercase letters and numbers.",
        .0.join(", ")
    )]
    InvalidFormat(Vec<String>),

    #[error(
        "Some ASINs are already being processed: {}. Wait for the current run to finish before trying again.",
        .0.join(", ")
    )]
    AlreadyInFlight(Vec<String>),

    #[error("Provider error: {0}")]
    Provider(#[from] ApifyError),

    #[error("No results returned for run {0}")]
    EmptyResults(String),

    #[error("Product not found for ASIN {0}")]
    SubjectNotFound(String),

    #[error("Store error: {0:#}")]
    Store(anyhow::Error),

    #[error("Unknown task: {0}")]
    TaskNotFound(String),

    #[error("Task {0} is finished or already being reconciled")]
    AlreadySettled(String),
}

impl ScrapeError {
    /// Validation failures are reported to the caller and never create a task.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ScrapeError::InvalidInput(_)
                | ScrapeError::InvalidFormat(_)
                | ScrapeError::AlreadyInFlight(_)
        )
    }
}
