//! PostgreSQL implementation of the event store.

use async_trait::async_trait;
use futures_util::StreamExt;
use sqlx::postgres::{PgListener, PgPoolOptions};
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::models::{EVENT_COLUMNS, EventRow, to_column};
use super::{CHANGE_CHANNEL, ChangeStream, EventQuery, EventStore, ScanDirection, StoreError};
use crate::domain::{AuctionEvent, Enrichment, EventId, EventKind};

/// PostgreSQL-backed event store using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Creates a new store with the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a pool of at most `max_connections` to `database_url`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError::Database`] if the database is unreachable.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Applies pending schema migrations.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(sqlx::Error::from)?;
        Ok(())
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn upsert_event(&self, event: AuctionEvent) -> Result<bool, StoreError> {
        let (mut start_time, mut end_time) = (None, None);
        let (mut bidder, mut value_wei, mut extended) = (None, None, None);
        let (mut winner, mut amount_wei) = (None, None);
        match &event.kind {
            EventKind::Created {
                start_time: start,
                end_time: end,
            } => {
                start_time = Some(*start);
                end_time = Some(*end);
            }
            EventKind::Bid {
                bidder: who,
                value_wei: value,
                extended: ext,
            } => {
                bidder = Some(who.clone());
                value_wei = Some(value.to_string());
                extended = Some(*ext);
            }
            EventKind::Settled {
                winner: who,
                amount_wei: amount,
            } => {
                winner = Some(who.clone());
                amount_wei = Some(amount.to_string());
            }
        }

        let result = sqlx::query(
            "INSERT INTO auction_events \
             (id, event_type, noun_id, block_number, block_timestamp, log_index, tx_hash, \
              start_time, end_time, bidder, value_wei, extended, winner, amount_wei) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(event.id.as_str())
        .bind(event.event_type().as_str())
        .bind(to_column::<u64, i64>("noun_id", event.noun_id)?)
        .bind(to_column::<u64, i64>("block_number", event.block_number)?)
        .bind(event.block_timestamp)
        .bind(to_column::<u32, i32>("log_index", event.log_index)?)
        .bind(&event.tx_hash)
        .bind(start_time)
        .bind(end_time)
        .bind(bidder)
        .bind(value_wei)
        .bind(extended)
        .bind(winner)
        .bind(amount_wei)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_event(&self, id: &EventId) -> Result<Option<AuctionEvent>, StoreError> {
        let row = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM auction_events WHERE id = $1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(AuctionEvent::try_from).transpose()
    }

    async fn update_enrichment(
        &self,
        id: &EventId,
        enrichment: &Enrichment,
    ) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE auction_events SET \
               resolved_bidder_name = COALESCE(resolved_bidder_name, $2), \
               resolved_winner_name = COALESCE(resolved_winner_name, $3), \
               value_usd = COALESCE(value_usd, $4), \
               amount_usd = COALESCE(amount_usd, $5), \
               headline = COALESCE($6, headline), \
               processed_at = COALESCE(processed_at, $7) \
             WHERE id = $1",
        )
        .bind(id.as_str())
        .bind(enrichment.resolved_bidder_name.as_deref())
        .bind(enrichment.resolved_winner_name.as_deref())
        .bind(enrichment.value_usd)
        .bind(enrichment.amount_usd)
        .bind(enrichment.headline.as_deref())
        .bind(enrichment.processed_at)
        .execute(&mut *tx)
        .await?;

        let rows = result.rows_affected();
        if rows > 0 {
            sqlx::query("SELECT pg_notify($1, $2)")
                .bind(CHANGE_CHANNEL)
                .bind(id.as_str())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(rows)
    }

    async fn list_events(&self, query: EventQuery) -> Result<Vec<AuctionEvent>, StoreError> {
        let mut builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new(format!("SELECT {EVENT_COLUMNS} FROM auction_events WHERE TRUE"));

        if let Some(event_type) = query.filters.event_type {
            builder.push(" AND event_type = ").push_bind(event_type.as_str());
        }
        if let Some(noun_id) = query.filters.noun_id {
            builder
                .push(" AND noun_id = ")
                .push_bind(to_column::<u64, i64>("noun_id", noun_id)?);
        }
        if let Some(anchor) = &query.after {
            let op = match query.direction {
                ScanDirection::Descending => " < ",
                ScanDirection::Ascending => " > ",
            };
            builder
                .push(" AND (block_timestamp, log_index, id)")
                .push(op)
                .push("(")
                .push_bind(anchor.block_timestamp)
                .push(", ")
                .push_bind(to_column::<u32, i32>("log_index", anchor.log_index)?)
                .push(", ")
                .push_bind(anchor.id.as_str().to_string())
                .push(")");
        }
        let order = match query.direction {
            ScanDirection::Descending => " ORDER BY block_timestamp DESC, log_index DESC, id DESC",
            ScanDirection::Ascending => " ORDER BY block_timestamp ASC, log_index ASC, id ASC",
        };
        builder
            .push(order)
            .push(" LIMIT ")
            .push_bind(to_column::<usize, i64>("limit", query.limit)?);

        let rows = builder
            .build_query_as::<EventRow>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(AuctionEvent::try_from).collect()
    }

    async fn subscribe_changes(&self) -> Result<ChangeStream, StoreError> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(CHANGE_CHANNEL).await?;
        tracing::info!(channel = CHANGE_CHANNEL, "listening for enrichment changes");

        let stream = listener.into_stream().map(|notification| {
            notification
                .map(|n| EventId::new(n.payload()))
                .map_err(|err| StoreError::Listener(err.to_string()))
        });
        Ok(stream.boxed())
    }
}
