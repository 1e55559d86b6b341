use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::store::{RecordStore, SaveOptions, validate_save};
use crate::{AggregateId, EventEnvelope, EventId, Result, StoreError, StoredRecord, Version};

/// PostgreSQL-backed record store.
#[derive(Clone)]
pub struct PostgresRecordStore {
    pool: PgPool,
}

impl PostgresRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool to `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self> {
        Ok(Self::new(PgPool::connect(database_url).await?))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_record(row: PgRow) -> Result<StoredRecord> {
        Ok(StoredRecord {
            id: AggregateId::from_uuid(row.try_get::<Uuid, _>("id")?),
            record_type: row.try_get("record_type")?,
            version: Version::new(row.try_get("version")?),
            updated_at: row.try_get("updated_at")?,
            state: row.try_get("state")?,
        })
    }

    fn row_to_event(row: PgRow) -> Result<EventEnvelope> {
        Ok(EventEnvelope {
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            event_type: row.try_get("event_type")?,
            aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
            aggregate_type: row.try_get("aggregate_type")?,
            version: Version::new(row.try_get("version")?),
            timestamp: row.try_get("timestamp")?,
            payload: row.try_get("payload")?,
        })
    }
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    async fn save(
        &self,
        record: StoredRecord,
        events: Vec<EventEnvelope>,
        options: SaveOptions,
    ) -> Result<Version> {
        validate_save(&record, &events, &options)?;

        let mut tx = self.pool.begin().await?;

        let current: Option<i64> =
            sqlx::query_scalar("SELECT version FROM records WHERE id = $1 FOR UPDATE")
                .bind(record.id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;
        let current = current.map(Version::new).unwrap_or(Version::initial());

        if let Some(expected) = options.expected_version
            && current != expected
        {
            metrics::counter!("store_concurrency_conflicts_total").increment(1);
            return Err(StoreError::ConcurrencyConflict {
                aggregate_id: record.id,
                expected,
                actual: current,
            });
        }

        sqlx::query(
            r#"
            INSERT INTO records (id, record_type, version, updated_at, state)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                record_type = EXCLUDED.record_type,
                version = EXCLUDED.version,
                updated_at = EXCLUDED.updated_at,
                state = EXCLUDED.state
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(&record.record_type)
        .bind(record.version.as_i64())
        .bind(record.updated_at)
        .bind(&record.state)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            // Two first-time writers race past the empty SELECT ... FOR UPDATE
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return StoreError::ConcurrencyConflict {
                    aggregate_id: record.id,
                    expected: options.expected_version.unwrap_or(current),
                    actual: record.version,
                };
            }
            StoreError::Database(e)
        })?;

        for event in &events {
            sqlx::query(
                r#"
                INSERT INTO outbox_events (id, event_type, aggregate_id, aggregate_type, version, timestamp, payload)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(event.event_id.as_uuid())
            .bind(&event.event_type)
            .bind(event.aggregate_id.as_uuid())
            .bind(&event.aggregate_type)
            .bind(event.version.as_i64())
            .bind(event.timestamp)
            .bind(&event.payload)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::debug!(
            record_id = %record.id,
            record_type = %record.record_type,
            version = %record.version,
            events = events.len(),
            "record saved"
        );

        Ok(record.version)
    }

    async fn load(&self, id: AggregateId) -> Result<Option<StoredRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, record_type, version, updated_at, state
            FROM records
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn load_by_type(&self, record_type: &str) -> Result<Vec<StoredRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, record_type, version, updated_at, state
            FROM records
            WHERE record_type = $1
            ORDER BY updated_at ASC
            "#,
        )
        .bind(record_type)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn load_by_type_where(
        &self,
        record_type: &str,
        field: &str,
        values: &[&str],
    ) -> Result<Vec<StoredRecord>> {
        let values: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        let rows = sqlx::query(
            r#"
            SELECT id, record_type, version, updated_at, state
            FROM records
            WHERE record_type = $1 AND state->>$2 = ANY($3)
            ORDER BY updated_at ASC
            "#,
        )
        .bind(record_type)
        .bind(field)
        .bind(&values)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_type, aggregate_id, aggregate_type, version, timestamp, payload
            FROM outbox_events
            WHERE aggregate_id = $1
            ORDER BY sequence ASC
            "#,
        )
        .bind(aggregate_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn get_events_by_type(&self, event_type: &str) -> Result<Vec<EventEnvelope>> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_type, aggregate_id, aggregate_type, version, timestamp, payload
            FROM outbox_events
            WHERE event_type = $1
            ORDER BY sequence ASC
            "#,
        )
        .bind(event_type)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }
}
