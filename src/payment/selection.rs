//! Selection Record store: links a `quote_id` to the traveler's chosen
//! offer and, once [`PaymentOrchestrator::initiate`](super::PaymentOrchestrator::initiate)
//! runs, to the resulting `payment_intent_id`. Holds everything
//! `complete` needs to reconstruct the issuance purchase call without the
//! caller having to resend insured-party data after payment succeeds.
//! Same store discipline as [`super::store::PaymentStore`]: one Postgres
//! table, no document store, because the one extra index this needs
//! (lookup by `payment_id`) is exactly what a relational index is for.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::{SurfaceKind, ToSurface};

/// Current version of the stored Selection payload shape. `complete`
/// refuses to reconstruct an issuance call from a row stamped with any
/// other version rather than silently degrading.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

const POOL_MIN_CONNECTIONS: u32 = 1;
const POOL_MAX_CONNECTIONS: u32 = 5;

/// A Selection record as persisted.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SelectionRecord {
    /// Locally-generated identifier, e.g. `sel_<hex>`.
    pub selection_id: String,
    /// Quote this selection was made against; unique while the selection is live.
    pub quote_id: String,
    /// The payment this selection was initiated under, once `initiate` attaches it.
    pub payment_id: Option<String>,
    /// Schema version of the `purchase_offers`/`insureds`/`main_contact` payload.
    pub schema_version: i32,
    /// Provider-defined offer shape, as returned by the pricing call and
    /// to be echoed back verbatim to the purchase call.
    pub purchase_offers: Value,
    /// Insured travelers, in the provider's documented shape.
    pub insureds: Value,
    /// Main contact/policyholder, in the provider's documented shape.
    pub main_contact: Value,
    /// Market code the quote was priced under.
    pub market: String,
    /// Response language code the quote was priced under.
    pub language_code: String,
    /// Distribution channel the quote was priced under.
    pub channel: String,
    /// Record creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

/// Errors from the selection store.
#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    /// No record exists for the given key.
    #[error("selection record not found")]
    NotFound,
    /// Pool/connection failure.
    #[error("selection store unavailable: {0}")]
    Pool(#[source] sqlx::Error),
    /// Query failure.
    #[error("selection store query failed: {0}")]
    Query(#[source] sqlx::Error),
}

impl ToSurface for SelectionError {
    fn surface_kind(&self) -> SurfaceKind {
        match self {
            Self::NotFound => SurfaceKind::NotFound,
            Self::Pool(_) => SurfaceKind::Unavailable,
            Self::Query(_) => SurfaceKind::Runtime,
        }
    }
}

/// Postgres-backed Selection record store.
#[derive(Clone)]
pub struct SelectionStore {
    pool: PgPool,
}

impl SelectionStore {
    /// Connects a small bounded pool to the selections database at `database_url`.
    /// Shares the same physical database as [`super::store::PaymentStore`] in
    /// every deployment this process targets, but keeps its own pool since
    /// the two stores are independent components with independent lifetimes.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError::Pool`] if the pool cannot be established.
    pub async fn connect(database_url: &str) -> Result<Self, SelectionError> {
        let pool = PgPoolOptions::new()
            .min_connections(POOL_MIN_CONNECTIONS)
            .max_connections(POOL_MAX_CONNECTIONS)
            .connect(database_url)
            .await
            .map_err(SelectionError::Pool)?;
        Ok(Self { pool })
    }

    /// Records (or replaces) the traveler's chosen offer for `quote_id`.
    /// Re-selecting before payment is initiated overwrites the prior
    /// selection for the same quote; a quote already bound to a
    /// `payment_intent_id` keeps that binding across the replace.
    ///
    /// # Errors
    ///
    /// Returns a query/pool error on failure.
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert(
        &self,
        selection_id: &str,
        quote_id: &str,
        purchase_offers: &Value,
        insureds: &Value,
        main_contact: &Value,
        market: &str,
        language_code: &str,
        channel: &str,
    ) -> Result<SelectionRecord, SelectionError> {
        sqlx::query_as(
            "INSERT INTO selections (\
                selection_id, quote_id, schema_version, purchase_offers, insureds, \
                main_contact, market, language_code, channel, created_at, updated_at \
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now(), now()) \
             ON CONFLICT (quote_id) DO UPDATE SET \
                schema_version = EXCLUDED.schema_version, \
                purchase_offers = EXCLUDED.purchase_offers, \
                insureds = EXCLUDED.insureds, \
                main_contact = EXCLUDED.main_contact, \
                market = EXCLUDED.market, \
                language_code = EXCLUDED.language_code, \
                channel = EXCLUDED.channel, \
                updated_at = now() \
             RETURNING *",
        )
        .bind(selection_id)
        .bind(quote_id)
        .bind(CURRENT_SCHEMA_VERSION)
        .bind(purchase_offers)
        .bind(insureds)
        .bind(main_contact)
        .bind(market)
        .bind(language_code)
        .bind(channel)
        .fetch_one(&self.pool)
        .await
        .map_err(SelectionError::Query)
    }

    /// Fetches the selection for `quote_id`, if one was ever made.
    pub async fn get_by_quote(&self, quote_id: &str) -> Result<Option<SelectionRecord>, SelectionError> {
        sqlx::query_as("SELECT * FROM selections WHERE quote_id = $1")
            .bind(quote_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(SelectionError::Query)
    }

    /// Fetches the selection bound to `payment_intent_id`.
    pub async fn get_by_payment(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<SelectionRecord>, SelectionError> {
        sqlx::query_as("SELECT * FROM selections WHERE payment_id = $1")
            .bind(payment_intent_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(SelectionError::Query)
    }

    /// Binds `payment_intent_id` to the (already-existing) selection for
    /// `quote_id`. Called by [`super::PaymentOrchestrator::initiate`]
    /// immediately after the payment record is created. A no-op, not an
    /// error, when no selection was made for this quote — not every
    /// purchase flow routes through `select_offer` first.
    pub async fn attach_payment(
        &self,
        quote_id: &str,
        payment_intent_id: &str,
    ) -> Result<(), SelectionError> {
        sqlx::query(
            "UPDATE selections SET payment_id = $1, updated_at = now() WHERE quote_id = $2",
        )
        .bind(payment_intent_id)
        .bind(quote_id)
        .execute(&self.pool)
        .await
        .map_err(SelectionError::Query)?;
        Ok(())
    }
}
