pub mod config;
pub mod stats;
pub mod types;

pub use config::Config;
pub use stats::ReviewStats;
pub use types::*;
