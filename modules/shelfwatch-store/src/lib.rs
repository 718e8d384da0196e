// Postgres persistence for scraped products and their reviews.

pub mod error;

pub use error::{Result, StoreError};

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{debug, warn};
use uuid::Uuid;

use shelfwatch_common::{
    ProductData, ProductRecord, RefreshCandidate, ReviewScrapeState, ReviewSummary, StoredReview,
};

/// Default window after which an active product is due for another scrape.
pub const DEFAULT_STALE_AFTER_HOURS: i64 = 24;

#[derive(Clone)]
pub struct PgProductStore {
    pool: PgPool,
    stale_after_hours: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    asin: String,
    title: Option<String>,
    status: String,
    review_summary: Option<serde_json::Value>,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for ProductRecord {
    fn from(row: ProductRow) -> Self {
        let review_summary = row
            .review_summary
            .and_then(|v| serde_json::from_value::<ReviewSummary>(v).ok());
        ProductRecord {
            id: row.id,
            asin: row.asin,
            title: row.title,
            status: row.status,
            review_summary,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RefreshRow {
    id: Uuid,
    asin: String,
}

impl PgProductStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            stale_after_hours: DEFAULT_STALE_AFTER_HOURS,
        }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    pub fn with_stale_after_hours(mut self, hours: i64) -> Self {
        self.stale_after_hours = hours;
        self
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn find_by_asin(&self, asin: &str) -> Result<Option<ProductRecord>> {
        let row = sqlx::query_as::<_, ProductRow>(
            r#"
            SELECT id, asin, title, status, review_summary, updated_at
            FROM products
            WHERE asin = $1
            "#,
        )
        .bind(asin)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ProductRecord::from))
    }

    pub async fn insert_product(&self, data: &ProductData) -> Result<Uuid> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO products
                (asin, title, brand, price, currency, availability, dimensions,
                 specifications, best_sellers_rank, variations, frequently_bought_together,
                 customer_questions, images, categories, features, description,
                 review_summary, status, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19)
            RETURNING id
            "#,
        )
        .bind(&data.asin)
        .bind(&data.title)
        .bind(&data.brand)
        .bind(data.price)
        .bind(&data.currency)
        .bind(&data.availability)
        .bind(&data.dimensions)
        .bind(&data.specifications)
        .bind(&data.best_sellers_rank)
        .bind(&data.variations)
        .bind(&data.frequently_bought_together)
        .bind(&data.customer_questions)
        .bind(Json(&data.images))
        .bind(Json(&data.categories))
        .bind(Json(&data.features))
        .bind(&data.description)
        .bind(Json(&data.review_summary))
        .bind(data.status.as_str())
        .bind(data.updated_at)
        .fetch_one(&self.pool)
        .await?;

        debug!(asin = data.asin.as_str(), %id, "Inserted product");
        Ok(id)
    }

    pub async fn update_product(&self, id: Uuid, data: &ProductData) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE products SET
                asin = $2, title = $3, brand = $4, price = $5, currency = $6,
                availability = $7, dimensions = $8, specifications = $9,
                best_sellers_rank = $10, variations = $11, frequently_bought_together = $12,
                customer_questions = $13, images = $14, categories = $15, features = $16,
                description = $17, review_summary = $18, status = $19, updated_at = $20
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&data.asin)
        .bind(&data.title)
        .bind(&data.brand)
        .bind(data.price)
        .bind(&data.currency)
        .bind(&data.availability)
        .bind(&data.dimensions)
        .bind(&data.specifications)
        .bind(&data.best_sellers_rank)
        .bind(&data.variations)
        .bind(&data.frequently_bought_together)
        .bind(&data.customer_questions)
        .bind(Json(&data.images))
        .bind(Json(&data.categories))
        .bind(Json(&data.features))
        .bind(&data.description)
        .bind(Json(&data.review_summary))
        .bind(data.status.as_str())
        .bind(data.updated_at)
        .execute(&self.pool)
        .await?;

        debug!(asin = data.asin.as_str(), %id, "Updated product");
        Ok(())
    }

    /// Overwrite the review list, summary and scrape state of a product.
    pub async fn replace_reviews(
        &self,
        product_id: Uuid,
        reviews: &[StoredReview],
        summary: &ReviewSummary,
        state: &ReviewScrapeState,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE products
            SET reviews = $2, review_summary = $3, review_data = $4, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(product_id)
        .bind(Json(reviews))
        .bind(Json(summary))
        .bind(Json(state))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn set_review_scrape_state(&self, asin: &str, state: &ReviewScrapeState) -> Result<()> {
        sqlx::query("UPDATE products SET review_data = $2 WHERE asin = $1")
            .bind(asin)
            .bind(Json(state))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Active products never refreshed or last refreshed before the stale
    /// window, oldest first.
    pub async fn due_for_refresh(&self, batch_size: u32) -> Result<Vec<RefreshCandidate>> {
        let rows = sqlx::query_as::<_, RefreshRow>(
            r#"
            SELECT id, asin
            FROM products
            WHERE status = 'active'
              AND (last_refreshed_at IS NULL
                   OR last_refreshed_at < now() - make_interval(hours => $2))
            ORDER BY last_refreshed_at ASC NULLS FIRST
            LIMIT $1
            "#,
        )
        .bind(i64::from(batch_size))
        .bind(self.stale_after_hours as i32)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| RefreshCandidate {
                product_id: r.id,
                asin: r.asin,
            })
            .collect())
    }

    /// Record the outcome of a refresh attempt. Failures keep the previous
    /// `last_refreshed_at` so the product stays due.
    pub async fn mark_refresh_outcome(
        &self,
        product_id: Uuid,
        success: bool,
        error: Option<&str>,
    ) -> Result<()> {
        let result = if success {
            sqlx::query(
                r#"
                UPDATE products
                SET last_refreshed_at = now(), last_refresh_attempt_at = now(),
                    refresh_error = NULL, refresh_failures = 0
                WHERE id = $1
                "#,
            )
            .bind(product_id)
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query(
                r#"
                UPDATE products
                SET last_refresh_attempt_at = now(), refresh_error = $2,
                    refresh_failures = refresh_failures + 1
                WHERE id = $1
                "#,
            )
            .bind(product_id)
            .bind(error.unwrap_or("Unknown error"))
            .execute(&self.pool)
            .await?
        };

        if result.rows_affected() == 0 {
            warn!(%product_id, "Refresh outcome for unknown product");
        }
        Ok(())
    }
}
