//! Job/Record state store
//!
//! Durable tables tracking users, uploaded artifacts, detected clothing
//! items and extraction jobs. Stages depend on the [`ClosetStore`] trait;
//! production wiring uses [`PgClosetStore`] over a sqlx PostgreSQL pool.
//! Connections are acquired from the pool per operation and released on
//! every exit path.
//!
//! Field write discipline is last-writer-wins: each field has a single
//! logical writer stage except the clipart pointer, which the synthesis
//! stage may overwrite on re-runs, and the job result, which is guarded to
//! stay monotonic (unset to set, never back).

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// A persisted uploaded-artifact record.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ImageRecord {
    pub id: Uuid,
    pub user_id: String,
    pub s3_key: String,
    pub created_at: DateTime<Utc>,
}

/// Attributes of a clothing item detected by the analysis stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClothingAttributes {
    pub clothing_type: String,
    pub color: String,
    pub material: String,
    pub style: String,
    pub extra_info: String,
}

/// One row of the closet listing: a clothing item joined to its parent
/// artifact, with the optional clipart pointer.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ClosetItemRow {
    pub clothing_id: Uuid,
    pub clothing_type: String,
    pub color: String,
    pub material: String,
    pub style: String,
    pub extra_info: String,
    pub clipart_key: Option<String>,
}

/// Relational state contract the stages program against.
#[async_trait]
pub trait ClosetStore: Send + Sync {
    /// Ensure a user row exists. Idempotent and safe under concurrent
    /// invocation for the same identifier.
    async fn ensure_user(&self, user_id: &str) -> Result<()>;

    /// Persist an artifact record. Immutable once created.
    async fn insert_image(&self, id: Uuid, user_id: &str, s3_key: &str) -> Result<()>;

    /// Resolve the parent artifact from its object-store key. The pipeline
    /// never trusts artifact identity from a stage payload.
    async fn find_image_by_key(&self, s3_key: &str) -> Result<Option<ImageRecord>>;

    /// Persist one detected clothing item tied to its parent artifact.
    async fn insert_clothing_item(
        &self,
        image_id: Uuid,
        attributes: &ClothingAttributes,
    ) -> Result<Uuid>;

    /// Attach (or overwrite) the clipart pointer on every clothing item of
    /// the given artifact. Returns the number of rows touched.
    async fn set_clipart_key(&self, image_id: Uuid, clipart_key: &str) -> Result<u64>;

    /// All clothing items belonging to the given owner.
    async fn list_closet(&self, user_id: &str) -> Result<Vec<ClosetItemRow>>;

    /// Record the terminal result of an extraction job (a text key on
    /// success, the literal `"Error"` on failure). Monotonic: once a job
    /// has a result, later writes are ignored and `false` is returned.
    async fn set_job_result(&self, job_id: &str, value: &str) -> Result<bool>;
}

/// PostgreSQL-backed record store.
#[derive(Clone)]
pub struct PgClosetStore {
    pool: PgPool,
}

impl PgClosetStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ClosetStore for PgClosetStore {
    #[instrument(skip(self))]
    async fn ensure_user(&self, user_id: &str) -> Result<()> {
        let result = sqlx::query("INSERT INTO users (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("Failed to upsert user")?;

        if result.rows_affected() > 0 {
            debug!(user_id, "Created new user");
        }

        Ok(())
    }

    #[instrument(skip(self))]
    async fn insert_image(&self, id: Uuid, user_id: &str, s3_key: &str) -> Result<()> {
        sqlx::query("INSERT INTO images (id, user_id, s3_key) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(user_id)
            .bind(s3_key)
            .execute(&self.pool)
            .await
            .context("Failed to insert image record")?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_image_by_key(&self, s3_key: &str) -> Result<Option<ImageRecord>> {
        let record = sqlx::query_as::<_, ImageRecord>(
            "SELECT id, user_id, s3_key, created_at FROM images WHERE s3_key = $1",
        )
        .bind(s3_key)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to look up image by key")?;

        Ok(record)
    }

    #[instrument(skip(self, attributes))]
    async fn insert_clothing_item(
        &self,
        image_id: Uuid,
        attributes: &ClothingAttributes,
    ) -> Result<Uuid> {
        let clothing_id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO clothing_items (
                id, original_image_id, clothing_type, color,
                material, style, extra_info
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(clothing_id)
        .bind(image_id)
        .bind(&attributes.clothing_type)
        .bind(&attributes.color)
        .bind(&attributes.material)
        .bind(&attributes.style)
        .bind(&attributes.extra_info)
        .execute(&self.pool)
        .await
        .context("Failed to insert clothing item")?;

        Ok(clothing_id)
    }

    #[instrument(skip(self))]
    async fn set_clipart_key(&self, image_id: Uuid, clipart_key: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE clothing_items SET clipart_key = $1 WHERE original_image_id = $2",
        )
        .bind(clipart_key)
        .bind(image_id)
        .execute(&self.pool)
        .await
        .context("Failed to set clipart key")?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn list_closet(&self, user_id: &str) -> Result<Vec<ClosetItemRow>> {
        let rows = sqlx::query_as::<_, ClosetItemRow>(
            r#"
            SELECT c.id AS clothing_id, c.clothing_type, c.color, c.material,
                   c.style, c.extra_info, c.clipart_key
            FROM clothing_items c
            JOIN images i ON c.original_image_id = i.id
            WHERE i.user_id = $1
            ORDER BY c.created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list closet items")?;

        Ok(rows)
    }

    #[instrument(skip(self))]
    async fn set_job_result(&self, job_id: &str, value: &str) -> Result<bool> {
        // The WHERE clause keeps job results monotonic: the first terminal
        // result wins, re-triggered invocations cannot rewrite history.
        let result = sqlx::query(
            r#"
            INSERT INTO jobs (job_id, text_key) VALUES ($1, $2)
            ON CONFLICT (job_id) DO UPDATE SET text_key = EXCLUDED.text_key
            WHERE jobs.text_key IS NULL
            "#,
        )
        .bind(job_id)
        .bind(value)
        .execute(&self.pool)
        .await
        .context("Failed to record job result")?;

        let applied = result.rows_affected() > 0;
        if !applied {
            warn!(job_id, value, "Job already has a terminal result, write ignored");
        }

        Ok(applied)
    }
}
