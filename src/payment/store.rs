//! Persistence for payment records: a key-value-shaped table indexed by
//! `payment_intent_id`, with secondary lookups by `quote_id`, `user_id`,
//! and `external_session_id`. Backed by Postgres — the same store
//! discipline used elsewhere in this codebase rather than a document
//! store, since the one extra index this needs (uniqueness-of-activity
//! per `quote_id`) is exactly what a relational constraint is for.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::{SurfaceKind, ToSurface};

/// Lifecycle state of a payment record. `Completed`/`Failed`/`Expired`/
/// `Cancelled` are terminal sinks — no transition leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    /// Checkout session created, awaiting the customer.
    Pending,
    /// Payment succeeded; policy issuance may proceed.
    Completed,
    /// Payment attempt failed.
    Failed,
    /// Checkout session expired before completion.
    Expired,
    /// Cancelled before completion.
    Cancelled,
}

impl PaymentStatus {
    /// Wire/storage representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses the storage representation.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "expired" => Some(Self::Expired),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Whether this status is a terminal sink (no further transitions).
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// A payment record as persisted.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PaymentRecord {
    /// Locally-generated identifier, e.g. `pi_<hex>`.
    pub payment_intent_id: String,
    /// Owning user.
    pub user_id: String,
    /// Quote this payment is for.
    pub quote_id: String,
    /// Amount in the currency's smallest unit.
    pub amount: i64,
    /// ISO 4217 currency code.
    pub currency: String,
    /// Human-readable product description.
    pub product_name: String,
    /// Storage representation of [`PaymentStatus`]; use [`PaymentRecord::status`].
    pub payment_status: String,
    /// Optional customer email.
    pub customer_email: Option<String>,
    /// Provider checkout session id, once created.
    pub external_session_id: Option<String>,
    /// Provider payment intent id, once known (stamped by webhook/status poll).
    pub external_payment_intent: Option<String>,
    /// Set when the record transitions to `failed`.
    pub failure_reason: Option<String>,
    /// Checkout session expiry.
    pub expires_at: Option<DateTime<Utc>>,
    /// Timestamp the matching webhook event was processed, if any.
    pub webhook_processed_at: Option<DateTime<Utc>>,
    /// Record creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl PaymentRecord {
    /// Parsed [`PaymentStatus`].
    ///
    /// # Panics
    ///
    /// Panics if the stored value is not one of the five known statuses —
    /// this indicates a write path bypassed [`PaymentStatus::as_str`].
    #[must_use]
    pub fn status(&self) -> PaymentStatus {
        PaymentStatus::parse(&self.payment_status).expect("stored payment_status is always valid")
    }
}

/// Errors from the payment store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No record exists for the given key.
    #[error("payment record not found")]
    NotFound,
    /// A record already exists for this `quote_id` in an active state.
    #[error("quote already has an active payment: {0}")]
    Duplicate(String),
    /// Pool/connection failure.
    #[error("payment store unavailable: {0}")]
    Pool(#[source] sqlx::Error),
    /// Query failure.
    #[error("payment store query failed: {0}")]
    Query(#[source] sqlx::Error),
}

impl ToSurface for StoreError {
    fn surface_kind(&self) -> SurfaceKind {
        match self {
            Self::NotFound => SurfaceKind::NotFound,
            Self::Duplicate(_) => SurfaceKind::Duplicate,
            Self::Pool(_) => SurfaceKind::Unavailable,
            Self::Query(_) => SurfaceKind::Runtime,
        }
    }
}

const POOL_MIN_CONNECTIONS: u32 = 2;
const POOL_MAX_CONNECTIONS: u32 = 10;

/// Postgres-backed payment record store.
#[derive(Clone)]
pub struct PaymentStore {
    pool: PgPool,
}

impl PaymentStore {
    /// Connects a bounded pool to the payments database at `database_url`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Pool`] if the pool cannot be established.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .min_connections(POOL_MIN_CONNECTIONS)
            .max_connections(POOL_MAX_CONNECTIONS)
            .connect(database_url)
            .await
            .map_err(StoreError::Pool)?;
        Ok(Self { pool })
    }

    /// Creates a new `pending` record for `quote_id`, rejecting with
    /// [`StoreError::Duplicate`] if an active (pending or completed) record
    /// already exists for it. Serializes concurrent `initiate` calls for
    /// the same quote via a transaction holding a row lock for the
    /// duration of the check-then-insert.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Duplicate`] on an active existing record, or
    /// a query/pool error otherwise.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_pending(
        &self,
        payment_intent_id: &str,
        user_id: &str,
        quote_id: &str,
        amount: i64,
        currency: &str,
        product_name: &str,
        customer_email: Option<&str>,
    ) -> Result<PaymentRecord, StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::Pool)?;

        let existing: Option<(String, String)> = sqlx::query_as(
            "SELECT payment_intent_id, payment_status FROM payments \
             WHERE quote_id = $1 AND payment_status IN ('pending', 'completed') \
             FOR UPDATE",
        )
        .bind(quote_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(StoreError::Query)?;

        if let Some((existing_intent_id, _)) = existing {
            return Err(StoreError::Duplicate(existing_intent_id));
        }

        let record: PaymentRecord = sqlx::query_as(
            "INSERT INTO payments (\
                payment_intent_id, user_id, quote_id, amount, currency, product_name, \
                payment_status, customer_email, created_at, updated_at \
             ) VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7, now(), now()) \
             RETURNING *",
        )
        .bind(payment_intent_id)
        .bind(user_id)
        .bind(quote_id)
        .bind(amount)
        .bind(currency)
        .bind(product_name)
        .bind(customer_email)
        .fetch_one(&mut *tx)
        .await
        .map_err(StoreError::Query)?;

        tx.commit().await.map_err(StoreError::Pool)?;
        Ok(record)
    }

    /// Fetches a record by its local `payment_intent_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no such record exists.
    pub async fn get(&self, payment_intent_id: &str) -> Result<PaymentRecord, StoreError> {
        sqlx::query_as("SELECT * FROM payments WHERE payment_intent_id = $1")
            .bind(payment_intent_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::Query)?
            .ok_or(StoreError::NotFound)
    }

    /// Fetches a record by the provider's checkout session id.
    pub async fn get_by_session(
        &self,
        external_session_id: &str,
    ) -> Result<Option<PaymentRecord>, StoreError> {
        sqlx::query_as("SELECT * FROM payments WHERE external_session_id = $1")
            .bind(external_session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::Query)
    }

    /// Fetches a record by the provider's payment intent id (fallback scan
    /// used when an event carries only that id, per `payment_intent.failed`).
    pub async fn get_by_external_intent(
        &self,
        external_payment_intent: &str,
    ) -> Result<Option<PaymentRecord>, StoreError> {
        sqlx::query_as("SELECT * FROM payments WHERE external_payment_intent = $1")
            .bind(external_payment_intent)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::Query)
    }

    /// Lists a user's payments, most recent first.
    pub async fn by_user(&self, user_id: &str, limit: i64) -> Result<Vec<PaymentRecord>, StoreError> {
        sqlx::query_as(
            "SELECT * FROM payments WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Query)
    }

    /// Fetches the (at most one) active-or-latest record for `quote_id`.
    pub async fn by_quote(&self, quote_id: &str) -> Result<Option<PaymentRecord>, StoreError> {
        sqlx::query_as(
            "SELECT * FROM payments WHERE quote_id = $1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(quote_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::Query)
    }

    /// Stamps the provider's checkout session id onto a pending record.
    pub async fn attach_session(
        &self,
        payment_intent_id: &str,
        external_session_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE payments SET external_session_id = $1, expires_at = $2, updated_at = now() \
             WHERE payment_intent_id = $3",
        )
        .bind(external_session_id)
        .bind(expires_at)
        .bind(payment_intent_id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::Query)?;
        Ok(())
    }

    /// Transitions a record to `failed`, recording `reason`. A best-effort
    /// cleanup path — failures here are logged by the caller, not propagated.
    pub async fn mark_failed(&self, payment_intent_id: &str, reason: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE payments SET payment_status = 'failed', failure_reason = $1, updated_at = now() \
             WHERE payment_intent_id = $2",
        )
        .bind(reason)
        .bind(payment_intent_id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::Query)?;
        Ok(())
    }

    /// Idempotently transitions a record to a terminal status from a
    /// webhook/provider event. Re-applying the same terminal status is a
    /// no-op (the `WHERE` clause only matches non-terminal or same-status rows).
    pub async fn apply_terminal_transition(
        &self,
        payment_intent_id: &str,
        status: PaymentStatus,
        external_payment_intent: Option<&str>,
        external_session_id: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE payments SET \
                payment_status = $1, \
                external_payment_intent = COALESCE($2, external_payment_intent), \
                external_session_id = COALESCE($3, external_session_id), \
                webhook_processed_at = COALESCE(webhook_processed_at, now()), \
                updated_at = now() \
             WHERE payment_intent_id = $4 \
               AND (payment_status = 'pending' OR payment_status = $1)",
        )
        .bind(status.as_str())
        .bind(external_payment_intent)
        .bind(external_session_id)
        .bind(payment_intent_id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::Query)?;
        Ok(())
    }

    /// Transitions a pending record to `cancelled`, recording `reason`.
    /// Forbidden for already-completed records by the caller
    /// ([`crate::payment::PaymentOrchestrator::cancel`]) before this is invoked.
    pub async fn cancel(&self, payment_intent_id: &str, reason: Option<&str>) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE payments SET payment_status = 'cancelled', failure_reason = COALESCE($1, failure_reason), \
             updated_at = now() WHERE payment_intent_id = $2",
        )
        .bind(reason)
        .bind(payment_intent_id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::Query)?;
        Ok(())
    }
}
