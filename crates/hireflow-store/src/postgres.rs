//! PostgreSQL storage implementation.
//!
//! The ledger's append discipline is enforced by the schema itself:
//! `UNIQUE (organization_id, sequence)` turns a lost race into a unique
//! violation, which is reported as [`StoreError::Conflict`], and the partial
//! unique index on `external_event_id` does the same for duplicate events.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::Row;
use uuid::Uuid;

use hireflow_core::{
    CreditTransaction, Cv, CvId, HistoryFilter, Job, JobId, OrganizationId, Pagination,
    TransactionId, TransactionPage, TransactionType, UnlockRecord,
};

use crate::error::{Result, StoreError};
use crate::{check_append, Store, VisibilityCounts};

const SEQUENCE_CONSTRAINT: &str = "credit_transactions_org_sequence_key";
const EVENT_CONSTRAINT: &str = "credit_transactions_external_event_id_key";

const TRANSACTION_COLUMNS: &str = "id, organization_id, sequence, transaction_type, amount, \
     balance_after, related_entity, metadata, created_at";

const CV_COLUMNS: &str = "id, organization_id, job_id, candidate, ranking, status, visibility, \
     unlocked_by, source, created_at";

/// PostgreSQL-backed storage implementation.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url` and apply pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or a migration fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Apply the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    async fn head(&self, organization_id: &OrganizationId) -> Result<Option<CreditTransaction>> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM credit_transactions \
             WHERE organization_id = $1 ORDER BY sequence DESC LIMIT 1"
        );
        sqlx::query(&sql)
            .bind(organization_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(|row| transaction_from_row(&row))
            .transpose()
    }

    /// Insert a row, mapping the ledger's unique constraints to store errors.
    ///
    /// Callers run [`check_append`] first; the constraints catch the writers
    /// that raced past that check.
    async fn insert_transaction(&self, transaction: &CreditTransaction) -> Result<()> {
        let result = sqlx::query(
            "INSERT INTO credit_transactions \
             (id, organization_id, sequence, transaction_type, amount, balance_after, \
              related_entity, metadata, external_event_id, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(transaction.id.to_string())
        .bind(transaction.organization_id.as_uuid())
        .bind(to_i64(transaction.sequence)?)
        .bind(transaction.transaction_type.as_str())
        .bind(transaction.amount)
        .bind(transaction.balance_after)
        .bind(transaction.related_entity.as_ref().map(Json))
        .bind(Json(&transaction.metadata))
        .bind(transaction.external_event_id())
        .bind(transaction.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) => match violated_unique_constraint(&err).as_deref() {
                Some(SEQUENCE_CONSTRAINT) => Err(StoreError::Conflict {
                    organization_id: transaction.organization_id,
                    expected_sequence: transaction.sequence,
                }),
                Some(EVENT_CONSTRAINT) => {
                    let event_id = transaction.external_event_id().unwrap_or_default();
                    let existing = self
                        .find_by_external_event_id(event_id)
                        .await?
                        .ok_or_else(|| StoreError::Database(err.to_string()))?;
                    Err(StoreError::DuplicateEvent {
                        event_id: event_id.to_string(),
                        existing: Box::new(existing),
                    })
                }
                _ => Err(err.into()),
            },
        }
    }
}

/// Stored text form of a unit-variant enum.
fn to_text<T: Serialize>(value: &T) -> Result<String> {
    match serde_json::to_value(value)? {
        serde_json::Value::String(s) => Ok(s),
        other => Err(StoreError::Serialization(format!(
            "expected a string variant, got {other}"
        ))),
    }
}

fn from_text<T: DeserializeOwned>(text: String) -> Result<T> {
    Ok(serde_json::from_value(serde_json::Value::String(text))?)
}

fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| StoreError::Serialization(format!("{value} overflows i64")))
}

fn to_u64(value: i64) -> Result<u64> {
    u64::try_from(value)
        .map_err(|_| StoreError::Serialization(format!("negative counter in database: {value}")))
}

fn transaction_from_row(row: &PgRow) -> Result<CreditTransaction> {
    let id: String = row.try_get("id")?;
    let transaction_type: String = row.try_get("transaction_type")?;
    let related_entity: Option<Json<_>> = row.try_get("related_entity")?;
    let metadata: Json<_> = row.try_get("metadata")?;

    Ok(CreditTransaction {
        id: id
            .parse::<TransactionId>()
            .map_err(|e| StoreError::Serialization(e.to_string()))?,
        organization_id: OrganizationId::from_uuid(row.try_get("organization_id")?),
        sequence: to_u64(row.try_get("sequence")?)?,
        transaction_type: transaction_type
            .parse::<TransactionType>()
            .map_err(|e| StoreError::Serialization(e.to_string()))?,
        amount: row.try_get("amount")?,
        balance_after: row.try_get("balance_after")?,
        related_entity: related_entity.map(|Json(related)| related),
        metadata: metadata.0,
        created_at: row.try_get("created_at")?,
    })
}

fn job_from_row(row: &PgRow) -> Result<Job> {
    Ok(Job {
        id: JobId::from_uuid(row.try_get("id")?),
        organization_id: OrganizationId::from_uuid(row.try_get("organization_id")?),
        title: row.try_get("title")?,
        status: from_text(row.try_get("status")?)?,
        created_at: row.try_get("created_at")?,
    })
}

fn cv_from_row(row: &PgRow) -> Result<Cv> {
    let Json(candidate) = row.try_get("candidate")?;
    let Json(ranking) = row.try_get("ranking")?;
    let Json(unlocked_by) = row.try_get("unlocked_by")?;

    Ok(Cv {
        id: CvId::from_uuid(row.try_get("id")?),
        organization_id: OrganizationId::from_uuid(row.try_get("organization_id")?),
        job_id: JobId::from_uuid(row.try_get("job_id")?),
        candidate,
        ranking,
        status: from_text(row.try_get("status")?)?,
        visibility: from_text(row.try_get("visibility")?)?,
        unlocked_by,
        source: from_text(row.try_get("source")?)?,
        created_at: row.try_get("created_at")?,
    })
}

/// Name of the unique constraint a failed insert tripped, if any.
fn violated_unique_constraint(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            Some(db.constraint().unwrap_or_default().to_string())
        }
        _ => None,
    }
}

#[async_trait]
impl Store for PgStore {
    // =========================================================================
    // Ledger Operations
    // =========================================================================

    async fn latest_transaction(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Option<CreditTransaction>> {
        self.head(organization_id).await
    }

    async fn append_transaction(&self, transaction: &CreditTransaction) -> Result<()> {
        let existing_event = match transaction.external_event_id() {
            Some(event_id) => self.find_by_external_event_id(event_id).await?,
            None => None,
        };
        let head = self.head(&transaction.organization_id).await?;
        check_append(transaction, head.as_ref(), existing_event)?;
        self.insert_transaction(transaction).await
    }

    async fn get_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<CreditTransaction>> {
        let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM credit_transactions WHERE id = $1");
        sqlx::query(&sql)
            .bind(transaction_id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .map(|row| transaction_from_row(&row))
            .transpose()
    }

    async fn find_by_external_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<CreditTransaction>> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM credit_transactions WHERE external_event_id = $1"
        );
        sqlx::query(&sql)
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| transaction_from_row(&row))
            .transpose()
    }

    async fn list_transactions(
        &self,
        organization_id: &OrganizationId,
        filter: &HistoryFilter,
    ) -> Result<TransactionPage> {
        let filter = filter.clone().normalized();
        let start: Option<DateTime<Utc>> = filter.start_date;
        let end: Option<DateTime<Utc>> = filter.end_date;
        let kind = filter.transaction_type.map(|t| t.as_str());
        let predicate = "organization_id = $1 \
             AND ($2::timestamptz IS NULL OR created_at >= $2) \
             AND ($3::timestamptz IS NULL OR created_at <= $3) \
             AND ($4::text IS NULL OR transaction_type = $4)";

        let count_sql = format!("SELECT COUNT(*) FROM credit_transactions WHERE {predicate}");
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(organization_id.as_uuid())
            .bind(start)
            .bind(end)
            .bind(kind)
            .fetch_one(&self.pool)
            .await?;

        let page_sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM credit_transactions WHERE {predicate} \
             ORDER BY sequence DESC LIMIT $5 OFFSET $6"
        );
        let rows = sqlx::query(&page_sql)
            .bind(organization_id.as_uuid())
            .bind(start)
            .bind(end)
            .bind(kind)
            .bind(i64::from(filter.limit))
            .bind(to_i64(filter.offset() as u64)?)
            .fetch_all(&self.pool)
            .await?;

        let transactions = rows
            .iter()
            .map(transaction_from_row)
            .collect::<Result<Vec<_>>>()?;

        Ok(TransactionPage {
            transactions,
            pagination: Pagination::new(to_u64(total)?, filter.page, filter.limit),
        })
    }

    // =========================================================================
    // Job Operations
    // =========================================================================

    async fn put_job(&self, job: &Job) -> Result<()> {
        sqlx::query(
            "INSERT INTO jobs (id, organization_id, title, status, created_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (id) DO UPDATE SET title = EXCLUDED.title, status = EXCLUDED.status",
        )
        .bind(job.id.as_uuid())
        .bind(job.organization_id.as_uuid())
        .bind(&job.title)
        .bind(to_text(&job.status)?)
        .bind(job.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_job(
        &self,
        organization_id: &OrganizationId,
        job_id: &JobId,
    ) -> Result<Option<Job>> {
        sqlx::query(
            "SELECT id, organization_id, title, status, created_at FROM jobs \
             WHERE id = $1 AND organization_id = $2",
        )
        .bind(job_id.as_uuid())
        .bind(organization_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .map(|row| job_from_row(&row))
        .transpose()
    }

    // =========================================================================
    // CV Operations
    // =========================================================================

    async fn put_cv(&self, cv: &Cv) -> Result<()> {
        sqlx::query(
            "INSERT INTO cvs \
             (id, organization_id, job_id, candidate, ranking, status, visibility, \
              unlocked_by, source, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (id) DO UPDATE SET \
               candidate = EXCLUDED.candidate, ranking = EXCLUDED.ranking, \
               status = EXCLUDED.status, visibility = EXCLUDED.visibility, \
               unlocked_by = EXCLUDED.unlocked_by",
        )
        .bind(cv.id.as_uuid())
        .bind(cv.organization_id.as_uuid())
        .bind(cv.job_id.as_uuid())
        .bind(Json(&cv.candidate))
        .bind(Json(&cv.ranking))
        .bind(to_text(&cv.status)?)
        .bind(cv.visibility.as_str())
        .bind(Json(&cv.unlocked_by))
        .bind(to_text(&cv.source)?)
        .bind(cv.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_cvs(&self, organization_id: &OrganizationId, cv_ids: &[CvId]) -> Result<Vec<Cv>> {
        let ids: Vec<Uuid> = cv_ids.iter().map(|id| *id.as_uuid()).collect();
        let sql = format!(
            "SELECT {CV_COLUMNS} FROM cvs WHERE organization_id = $1 AND id = ANY($2)"
        );
        let rows = sqlx::query(&sql)
            .bind(organization_id.as_uuid())
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(cv_from_row).collect()
    }

    async fn latest_locked_cvs(
        &self,
        organization_id: &OrganizationId,
        job_id: &JobId,
        limit: usize,
    ) -> Result<Vec<Cv>> {
        let sql = format!(
            "SELECT {CV_COLUMNS} FROM cvs \
             WHERE organization_id = $1 AND job_id = $2 AND visibility = 'locked' \
             ORDER BY created_at DESC, id DESC LIMIT $3"
        );
        let rows = sqlx::query(&sql)
            .bind(organization_id.as_uuid())
            .bind(job_id.as_uuid())
            .bind(to_i64(limit as u64)?)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(cv_from_row).collect()
    }

    async fn unlock_cvs(
        &self,
        organization_id: &OrganizationId,
        cv_ids: &[CvId],
        record: &UnlockRecord,
    ) -> Result<Vec<CvId>> {
        let ids: Vec<Uuid> = cv_ids.iter().map(|id| *id.as_uuid()).collect();
        // The visibility predicate makes a concurrent second flip a no-op.
        let changed: Vec<Uuid> = sqlx::query_scalar(
            "UPDATE cvs SET visibility = 'unlocked', unlocked_by = unlocked_by || $3 \
             WHERE organization_id = $1 AND id = ANY($2) AND visibility = 'locked' \
             RETURNING id",
        )
        .bind(organization_id.as_uuid())
        .bind(&ids)
        .bind(Json(vec![record]))
        .fetch_all(&self.pool)
        .await?;
        Ok(changed.into_iter().map(CvId::from_uuid).collect())
    }

    async fn visibility_counts(
        &self,
        organization_id: &OrganizationId,
        job_id: &JobId,
    ) -> Result<VisibilityCounts> {
        let row = sqlx::query(
            "SELECT \
               COUNT(*) FILTER (WHERE visibility = 'locked') AS locked, \
               COUNT(*) FILTER (WHERE visibility = 'unlocked') AS unlocked \
             FROM cvs WHERE organization_id = $1 AND job_id = $2",
        )
        .bind(organization_id.as_uuid())
        .bind(job_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;

        Ok(VisibilityCounts {
            locked: to_u64(row.try_get("locked")?)?,
            unlocked: to_u64(row.try_get("unlocked")?)?,
        })
    }
}
