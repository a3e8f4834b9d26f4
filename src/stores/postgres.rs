//! `PostgreSQL` store implementing all four contracts.
//!
//! Every contended mutation is one conditional statement: the seat counter
//! moves via `UPDATE … WHERE registered_count < max_capacity`, duplicates are
//! rejected by unique indexes, and waitlist promotion takes its row with
//! `FOR UPDATE SKIP LOCKED` so concurrent promoters never see the same entry.

use crate::error::RegistrationError;
use crate::stores::{
    CapacityLedger, PaidTransition, PaymentIntentStore, RegistrationStore, WaitlistQueue,
};
use crate::types::{
    Capacity, EventId, EventSnapshot, Money, OrderId, PaymentIntent, PaymentIntentStatus,
    Registration, UserId, WaitlistEntry,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

/// Store backed by a `PostgreSQL` connection pool.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Wraps an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the database and applies migrations.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Store`] if the connection or a migration
    /// fails.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        connect_timeout: Duration,
    ) -> Result<Self, RegistrationError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(connect_timeout)
            .connect(url)
            .await
            .map_err(store_err)?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| RegistrationError::Store(e.to_string()))?;
        Ok(Self { pool })
    }

    /// The underlying pool, for boundary code that needs direct queries.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn store_err(e: sqlx::Error) -> RegistrationError {
    RegistrationError::Store(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn as_u32(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

fn as_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn money_param(amount: Money) -> Result<i64, RegistrationError> {
    i64::try_from(amount.minor())
        .map_err(|_| RegistrationError::Store("amount exceeds storage range".to_string()))
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    max_capacity: i32,
    registered_count: i32,
    is_closed: bool,
    price: i64,
    currency: String,
}

impl From<EventRow> for EventSnapshot {
    fn from(row: EventRow) -> Self {
        Self {
            id: EventId::from_uuid(row.id),
            max_capacity: Capacity::new(as_u32(row.max_capacity)),
            registered_count: as_u32(row.registered_count),
            is_closed: row.is_closed,
            price: Money::from_minor(as_u64(row.price)),
            currency: row.currency,
        }
    }
}

#[derive(sqlx::FromRow)]
struct RegistrationRow {
    event_id: Uuid,
    user_id: Uuid,
    created_at: DateTime<Utc>,
}

impl From<RegistrationRow> for Registration {
    fn from(row: RegistrationRow) -> Self {
        Self {
            event_id: EventId::from_uuid(row.event_id),
            user_id: UserId::from_uuid(row.user_id),
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct WaitlistRow {
    event_id: Uuid,
    user_id: Uuid,
    joined_at: DateTime<Utc>,
}

impl From<WaitlistRow> for WaitlistEntry {
    fn from(row: WaitlistRow) -> Self {
        Self {
            event_id: EventId::from_uuid(row.event_id),
            user_id: UserId::from_uuid(row.user_id),
            joined_at: row.joined_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct IntentRow {
    internal_order_id: Uuid,
    provider_order_id: String,
    event_id: Uuid,
    user_id: Uuid,
    amount: i64,
    currency: String,
    status: String,
    provider_payment_id: Option<String>,
    signature: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<IntentRow> for PaymentIntent {
    type Error = RegistrationError;

    fn try_from(row: IntentRow) -> Result<Self, Self::Error> {
        let status = PaymentIntentStatus::parse(&row.status).ok_or_else(|| {
            RegistrationError::Store(format!("unknown payment intent status '{}'", row.status))
        })?;
        Ok(Self {
            internal_order_id: OrderId::from_uuid(row.internal_order_id),
            provider_order_id: row.provider_order_id,
            event_id: EventId::from_uuid(row.event_id),
            user_id: UserId::from_uuid(row.user_id),
            amount: Money::from_minor(as_u64(row.amount)),
            currency: row.currency,
            status,
            provider_payment_id: row.provider_payment_id,
            signature: row.signature,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl CapacityLedger for PostgresStore {
    async fn event(&self, event_id: EventId) -> Result<Option<EventSnapshot>, RegistrationError> {
        let row = sqlx::query_as::<_, EventRow>(
            "SELECT id, max_capacity, registered_count, is_closed, price, currency \
             FROM events WHERE id = $1",
        )
        .bind(event_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(row.map(EventSnapshot::from))
    }

    async fn try_increment(&self, event_id: EventId) -> Result<bool, RegistrationError> {
        let result = sqlx::query(
            "UPDATE events SET registered_count = registered_count + 1 \
             WHERE id = $1 AND registered_count < max_capacity",
        )
        .bind(event_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn decrement(&self, event_id: EventId) -> Result<(), RegistrationError> {
        sqlx::query(
            "UPDATE events SET registered_count = registered_count - 1 \
             WHERE id = $1 AND registered_count > 0",
        )
        .bind(event_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }
}

#[async_trait]
impl RegistrationStore for PostgresStore {
    async fn create(
        &self,
        event_id: EventId,
        user_id: UserId,
        created_at: DateTime<Utc>,
    ) -> Result<Registration, RegistrationError> {
        sqlx::query(
            "INSERT INTO registrations (event_id, user_id, created_at) VALUES ($1, $2, $3)",
        )
        .bind(event_id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RegistrationError::DuplicateRegistration
            } else {
                store_err(e)
            }
        })?;
        Ok(Registration {
            event_id,
            user_id,
            created_at,
        })
    }

    async fn delete(&self, event_id: EventId, user_id: UserId) -> Result<(), RegistrationError> {
        let result = sqlx::query("DELETE FROM registrations WHERE event_id = $1 AND user_id = $2")
            .bind(event_id.as_uuid())
            .bind(user_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        if result.rows_affected() == 0 {
            return Err(RegistrationError::NotFound("registration"));
        }
        Ok(())
    }

    async fn exists(&self, event_id: EventId, user_id: UserId) -> Result<bool, RegistrationError> {
        let found: Option<i32> = sqlx::query_scalar(
            "SELECT 1 FROM registrations WHERE event_id = $1 AND user_id = $2",
        )
        .bind(event_id.as_uuid())
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(found.is_some())
    }

    async fn list_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Registration>, RegistrationError> {
        let rows = sqlx::query_as::<_, RegistrationRow>(
            "SELECT event_id, user_id, created_at FROM registrations \
             WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(rows.into_iter().map(Registration::from).collect())
    }

    async fn count_for_event(&self, event_id: EventId) -> Result<u64, RegistrationError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM registrations WHERE event_id = $1")
                .bind(event_id.as_uuid())
                .fetch_one(&self.pool)
                .await
                .map_err(store_err)?;
        Ok(as_u64(count))
    }
}

#[async_trait]
impl WaitlistQueue for PostgresStore {
    async fn enqueue(
        &self,
        event_id: EventId,
        user_id: UserId,
        joined_at: DateTime<Utc>,
    ) -> Result<WaitlistEntry, RegistrationError> {
        sqlx::query(
            "INSERT INTO waitlist_entries (event_id, user_id, joined_at) VALUES ($1, $2, $3)",
        )
        .bind(event_id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(joined_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RegistrationError::DuplicateEntry
            } else {
                store_err(e)
            }
        })?;
        Ok(WaitlistEntry {
            event_id,
            user_id,
            joined_at,
        })
    }

    async fn dequeue_oldest(
        &self,
        event_id: EventId,
    ) -> Result<Option<WaitlistEntry>, RegistrationError> {
        let row = sqlx::query_as::<_, WaitlistRow>(
            "DELETE FROM waitlist_entries WHERE id = ( \
                 SELECT id FROM waitlist_entries WHERE event_id = $1 \
                 ORDER BY joined_at, id LIMIT 1 FOR UPDATE SKIP LOCKED \
             ) RETURNING event_id, user_id, joined_at",
        )
        .bind(event_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(row.map(WaitlistEntry::from))
    }

    async fn remove(&self, event_id: EventId, user_id: UserId) -> Result<(), RegistrationError> {
        let result =
            sqlx::query("DELETE FROM waitlist_entries WHERE event_id = $1 AND user_id = $2")
                .bind(event_id.as_uuid())
                .bind(user_id.as_uuid())
                .execute(&self.pool)
                .await
                .map_err(store_err)?;
        if result.rows_affected() == 0 {
            return Err(RegistrationError::NotFound("waitlist entry"));
        }
        Ok(())
    }

    async fn position(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> Result<Option<u32>, RegistrationError> {
        let ahead: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM waitlist_entries w \
             JOIN waitlist_entries me \
               ON me.event_id = w.event_id AND me.user_id = $2 \
             WHERE w.event_id = $1 \
               AND (w.joined_at, w.id) <= (me.joined_at, me.id)",
        )
        .bind(event_id.as_uuid())
        .bind(user_id.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(store_err)?;
        // Zero means the join found no row for the user.
        Ok(u32::try_from(ahead).ok().filter(|n| *n > 0))
    }
}

#[async_trait]
impl PaymentIntentStore for PostgresStore {
    async fn open(&self, intent: PaymentIntent) -> Result<(), RegistrationError> {
        sqlx::query(
            "INSERT INTO payment_intents \
             (internal_order_id, provider_order_id, event_id, user_id, amount, currency, \
              status, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(intent.internal_order_id.as_uuid())
        .bind(&intent.provider_order_id)
        .bind(intent.event_id.as_uuid())
        .bind(intent.user_id.as_uuid())
        .bind(money_param(intent.amount)?)
        .bind(&intent.currency)
        .bind(intent.status.as_str())
        .bind(intent.created_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn mark_paid(
        &self,
        provider_order_id: &str,
        internal_order_id: Option<OrderId>,
        provider_payment_id: &str,
        signature: &str,
        mode: PaidTransition,
    ) -> Result<Option<PaymentIntent>, RegistrationError> {
        let sql = match mode {
            PaidTransition::RequireCreated => {
                "UPDATE payment_intents \
                 SET status = 'paid', provider_payment_id = $2, signature = $3 \
                 WHERE provider_order_id = $1 AND status = 'created' \
                   AND ($4::uuid IS NULL OR internal_order_id = $4) \
                 RETURNING internal_order_id, provider_order_id, event_id, user_id, amount, \
                           currency, status, provider_payment_id, signature, created_at"
            }
            PaidTransition::AllowAlreadyPaid => {
                "UPDATE payment_intents \
                 SET status = 'paid', \
                     provider_payment_id = COALESCE(provider_payment_id, $2), \
                     signature = COALESCE(signature, $3) \
                 WHERE provider_order_id = $1 AND status IN ('created', 'paid') \
                   AND ($4::uuid IS NULL OR internal_order_id = $4) \
                 RETURNING internal_order_id, provider_order_id, event_id, user_id, amount, \
                           currency, status, provider_payment_id, signature, created_at"
            }
        };
        let row = sqlx::query_as::<_, IntentRow>(sql)
            .bind(provider_order_id)
            .bind(provider_payment_id)
            .bind(signature)
            .bind(internal_order_id.map(|id| *id.as_uuid()))
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        row.map(PaymentIntent::try_from).transpose()
    }

    async fn mark_refund_required(
        &self,
        internal_order_id: OrderId,
    ) -> Result<(), RegistrationError> {
        let result = sqlx::query(
            "UPDATE payment_intents SET status = 'refund_required' \
             WHERE internal_order_id = $1 AND status = 'paid'",
        )
        .bind(internal_order_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        if result.rows_affected() == 0 {
            return Err(RegistrationError::NotFound("paid payment intent"));
        }
        Ok(())
    }

    async fn mark_cancelled(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> Result<(), RegistrationError> {
        sqlx::query(
            "UPDATE payment_intents SET status = 'cancelled' \
             WHERE event_id = $1 AND user_id = $2 AND status IN ('created', 'paid')",
        )
        .bind(event_id.as_uuid())
        .bind(user_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn find_by_internal_order(
        &self,
        internal_order_id: OrderId,
    ) -> Result<Option<PaymentIntent>, RegistrationError> {
        let row = sqlx::query_as::<_, IntentRow>(
            "SELECT internal_order_id, provider_order_id, event_id, user_id, amount, currency, \
                    status, provider_payment_id, signature, created_at \
             FROM payment_intents WHERE internal_order_id = $1",
        )
        .bind(internal_order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        row.map(PaymentIntent::try_from).transpose()
    }
}
