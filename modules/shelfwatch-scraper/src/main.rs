use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use apify_client::{AmazonActor, ApifyClient};
use shelfwatch_common::{Config, TaskStatus};
use shelfwatch_scraper::{ProductScraper, RefreshSettings, RefreshWorker, ReviewScraper};
use shelfwatch_store::PgProductStore;

#[derive(Parser)]
#[command(name = "shelfwatch")]
#[command(about = "Amazon product and review scrape orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh stale products until interrupted
    Worker,

    /// Scrape a batch of ASINs once and follow it to completion
    Scrape {
        #[arg(required = true)]
        asins: Vec<String>,
    },

    /// Apply database migrations
    Migrate,
}

struct Services {
    store: Arc<PgProductStore>,
    products: ProductScraper,
    reviews: ReviewScraper,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("shelfwatch=info".parse()?)
                .add_directive("apify_client=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Worker => run_worker(&config).await,
        Commands::Scrape { asins } => run_scrape(&config, &asins).await,
        Commands::Migrate => {
            let store = PgProductStore::connect(&config.database_url).await?;
            store.migrate().await?;
            info!("Migrations applied");
            Ok(())
        }
    }
}

async fn connect(config: &Config) -> Result<Services> {
    let store = Arc::new(
        PgProductStore::connect(&config.database_url)
            .await?
            .with_stale_after_hours(config.refresh_stale_after_hours),
    );
    store.migrate().await?;

    let client = Arc::new(ApifyClient::from_token(&config.apify_api_token)?);
    let product_actor = AmazonActor::new(
        client.clone(),
        &config.product_actor_id,
        &config.amazon_domain,
        config.product_max_reviews,
    );
    let review_actor = AmazonActor::new(
        client,
        &config.product_actor_id,
        &config.amazon_domain,
        config.review_max_reviews,
    );

    let reviews = ReviewScraper::new(Arc::new(review_actor), store.clone(), config.poll_interval());
    let products = ProductScraper::new(
        Arc::new(product_actor),
        store.clone(),
        Arc::new(reviews.clone()),
        config.poll_interval(),
    );

    Ok(Services {
        store,
        products,
        reviews,
    })
}

async fn run_worker(config: &Config) -> Result<()> {
    let services = connect(config).await?;
    let worker = RefreshWorker::new(
        services.products,
        services.store,
        RefreshSettings::from_config(config),
    );

    worker.start();
    info!("Shelfwatch worker running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    worker.stop();
    Ok(())
}

async fn run_scrape(config: &Config, asins: &[String]) -> Result<()> {
    let services = connect(config).await?;
    let task_id = services.products.start_scraping(asins).await?;
    info!(run_id = task_id.as_str(), "Scrape submitted");

    let mut last = None;
    let task = loop {
        tokio::time::sleep(config.poll_interval()).await;
        let Some(task) = services.products.get_task_status(&task_id) else {
            bail!("Task {task_id} disappeared");
        };
        if last != Some((task.status, task.progress)) {
            info!(status = %task.status, progress = task.progress, "Product scrape");
            last = Some((task.status, task.progress));
        }
        if task.status.is_terminal() {
            break task;
        }
    };

    // Review runs were dispatched during reconciliation; wait for them too.
    while services.reviews.active_tasks() > 0 {
        tokio::time::sleep(config.poll_interval()).await;
    }

    match task.status {
        TaskStatus::Failed => bail!(
            "Scrape {task_id} failed: {}",
            task.error.as_deref().unwrap_or("unknown error")
        ),
        _ => {
            info!(run_id = task_id.as_str(), asins = task.subject_ids.len(), "Scrape complete");
            Ok(())
        }
    }
}
