//! PostgreSQL persistence.
//!
//! Order transitions lock the row with `SELECT ... FOR UPDATE` and compare the
//! stored status before writing. The audit insert runs inside a savepoint of
//! the same transaction, so a failed audit write never loses the transition.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use tracing::{debug, error, info};

use crate::application::ports::{
    AuditSink, Delivery, QueueError, ReconciliationReportRepository, SubmissionQueue,
};
use crate::domain::audit::{NewAuditEntry, to_metadata_value};
use crate::domain::copy_trading::{CopySubscription, CopySubscriptionRepository};
use crate::domain::order_execution::{
    Order, OrderRepository, OrderSnapshot, OrderStatus, RepositoryError,
};
use crate::domain::reconciliation::ReconciliationReport;
use crate::domain::risk_management::{RiskProfile, RiskProfileRepository};
use crate::domain::shared::{OrderId, UserId, VenueName};
use crate::observability::record_audit_write_failure;

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>;

const SCHEMA: &[&str] = &[
    r"CREATE TABLE IF NOT EXISTS orders (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        venue TEXT NOT NULL,
        symbol TEXT NOT NULL,
        order_type TEXT NOT NULL,
        side TEXT NOT NULL,
        quantity_requested NUMERIC NOT NULL,
        quantity_filled NUMERIC NOT NULL DEFAULT 0,
        average_fill_price NUMERIC,
        price NUMERIC,
        status TEXT NOT NULL,
        is_paper_trade BOOLEAN NOT NULL,
        is_algorithmic BOOLEAN NOT NULL,
        parent_order_id TEXT REFERENCES orders(id),
        exchange_order_id TEXT,
        created_at TIMESTAMPTZ NOT NULL,
        submitted_at TIMESTAMPTZ,
        filled_at TIMESTAMPTZ,
        canceled_at TIMESTAMPTZ,
        failure_reason TEXT,
        metadata JSONB NOT NULL DEFAULT '{}'::jsonb
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS orders_exchange_order_id_key ON orders (exchange_order_id)",
    "CREATE INDEX IF NOT EXISTS orders_status_idx ON orders (status, created_at)",
    "CREATE INDEX IF NOT EXISTS orders_parent_idx ON orders (parent_order_id)",
    r"CREATE TABLE IF NOT EXISTS audit_log (
        id BIGSERIAL PRIMARY KEY,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        user_id TEXT,
        action TEXT NOT NULL,
        details TEXT NOT NULL,
        metadata JSONB NOT NULL DEFAULT '{}'::jsonb
    )",
    "CREATE INDEX IF NOT EXISTS audit_log_user_idx ON audit_log (user_id, created_at)",
    r"CREATE TABLE IF NOT EXISTS risk_profiles (
        user_id TEXT PRIMARY KEY,
        trading_halted BOOLEAN NOT NULL DEFAULT FALSE,
        max_open_positions INTEGER,
        max_order_value_usd NUMERIC,
        max_exposure_per_symbol_usd NUMERIC,
        max_total_exposure_usd NUMERIC,
        max_daily_drawdown_pct NUMERIC,
        max_total_drawdown_pct NUMERIC,
        updated_at TIMESTAMPTZ NOT NULL
    )",
    r"CREATE TABLE IF NOT EXISTS copy_subscriptions (
        follower_id TEXT NOT NULL,
        leader_id TEXT NOT NULL,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        trade_size_multiplier NUMERIC NOT NULL,
        max_trade_size_usd NUMERIC NOT NULL,
        PRIMARY KEY (follower_id, leader_id)
    )",
    "CREATE INDEX IF NOT EXISTS copy_subscriptions_leader_idx ON copy_subscriptions (leader_id)",
    r"CREATE TABLE IF NOT EXISTS submission_queue (
        id BIGSERIAL PRIMARY KEY,
        order_id TEXT NOT NULL,
        enqueued_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        claimed_at TIMESTAMPTZ
    )",
    r"CREATE TABLE IF NOT EXISTS reconciliation_reports (
        id BIGSERIAL PRIMARY KEY,
        venue TEXT NOT NULL,
        status TEXT NOT NULL,
        window_start TIMESTAMPTZ NOT NULL,
        window_end TIMESTAMPTZ NOT NULL,
        started_at TIMESTAMPTZ NOT NULL,
        finished_at TIMESTAMPTZ NOT NULL,
        internal_checked BIGINT NOT NULL,
        external_fetched BIGINT NOT NULL,
        matched BIGINT NOT NULL,
        mismatched BIGINT NOT NULL,
        missing_internal BIGINT NOT NULL,
        missing_external BIGINT NOT NULL,
        discrepancies JSONB NOT NULL DEFAULT '[]'::jsonb
    )",
];

const ORDER_COLUMNS: &str = "id, user_id, venue, symbol, order_type, side, quantity_requested, \
     quantity_filled, average_fill_price, price, status, is_paper_trade, is_algorithmic, \
     parent_order_id, exchange_order_id, created_at, submitted_at, filled_at, canceled_at, \
     failure_reason, metadata";

/// Open a connection pool.
pub async fn connect_pool(database_url: &str, max_connections: u32) -> Result<PgPool, RepositoryError> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await
        .map_err(storage)
}

fn storage(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Storage(e.to_string())
}

fn corrupt(e: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Corrupt(e.to_string())
}

fn map_write_error(e: sqlx::Error, order: &Order) -> RepositoryError {
    let constraint = e
        .as_database_error()
        .and_then(|db| db.constraint())
        .map(str::to_string);
    match constraint.as_deref() {
        Some("orders_pkey") => RepositoryError::DuplicateOrderId(order.id().clone()),
        Some("orders_exchange_order_id_key") => RepositoryError::DuplicateExchangeOrderId(
            order.exchange_order_id().unwrap_or_default().to_string(),
        ),
        _ => storage(e),
    }
}

fn decode_order(row: &PgRow) -> Result<Order, RepositoryError> {
    let metadata = match row.try_get::<Value, _>("metadata").map_err(corrupt)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    Ok(Order::reconstitute(OrderSnapshot {
        id: OrderId::new(row.try_get::<String, _>("id").map_err(corrupt)?),
        user_id: UserId::new(row.try_get::<String, _>("user_id").map_err(corrupt)?),
        venue: VenueName::new(row.try_get::<String, _>("venue").map_err(corrupt)?),
        symbol: row.try_get("symbol").map_err(corrupt)?,
        order_type: row
            .try_get::<String, _>("order_type")
            .map_err(corrupt)?
            .parse()
            .map_err(corrupt)?,
        side: row
            .try_get::<String, _>("side")
            .map_err(corrupt)?
            .parse()
            .map_err(corrupt)?,
        quantity_requested: row.try_get("quantity_requested").map_err(corrupt)?,
        quantity_filled: row.try_get("quantity_filled").map_err(corrupt)?,
        average_fill_price: row.try_get("average_fill_price").map_err(corrupt)?,
        price: row.try_get("price").map_err(corrupt)?,
        status: row
            .try_get::<String, _>("status")
            .map_err(corrupt)?
            .parse()
            .map_err(corrupt)?,
        is_paper_trade: row.try_get("is_paper_trade").map_err(corrupt)?,
        is_algorithmic: row.try_get("is_algorithmic").map_err(corrupt)?,
        parent_order_id: row
            .try_get::<Option<String>, _>("parent_order_id")
            .map_err(corrupt)?
            .map(OrderId::new),
        exchange_order_id: row.try_get("exchange_order_id").map_err(corrupt)?,
        created_at: row.try_get("created_at").map_err(corrupt)?,
        submitted_at: row.try_get("submitted_at").map_err(corrupt)?,
        filled_at: row.try_get("filled_at").map_err(corrupt)?,
        canceled_at: row.try_get("canceled_at").map_err(corrupt)?,
        failure_reason: row.try_get("failure_reason").map_err(corrupt)?,
        metadata,
    }))
}

/// PostgreSQL implementation of every store port.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes if they do not exist.
    pub async fn migrate(&self) -> Result<(), RepositoryError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(storage)?;
        }
        info!("Order store schema ready");
        Ok(())
    }

    async fn fetch_orders(
        &self,
        filter: &str,
        bind: impl for<'q> FnOnce(PgQuery<'q>) -> PgQuery<'q>,
    ) -> Result<Vec<Order>, RepositoryError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE {filter} ORDER BY created_at");
        let rows = bind(sqlx::query(&sql))
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;
        rows.iter().map(decode_order).collect()
    }
}

/// Insert the audit row in a savepoint so a failure leaves the surrounding
/// transaction usable.
async fn insert_audit_in_savepoint(
    tx: &mut Transaction<'_, Postgres>,
    entry: &NewAuditEntry,
) -> Result<(), RepositoryError> {
    sqlx::query("SAVEPOINT audit_write")
        .execute(&mut **tx)
        .await
        .map_err(storage)?;

    let inserted = sqlx::query(
        "INSERT INTO audit_log (user_id, action, details, metadata) VALUES ($1, $2, $3, $4)",
    )
    .bind(entry.user_id.as_ref().map(UserId::as_str))
    .bind(entry.action.as_str())
    .bind(&entry.details)
    .bind(entry.metadata_value())
    .execute(&mut **tx)
    .await;

    match inserted {
        Ok(_) => {
            sqlx::query("RELEASE SAVEPOINT audit_write")
                .execute(&mut **tx)
                .await
                .map_err(storage)?;
        }
        Err(e) => {
            error!(action = %entry.action, error = %e, "Audit write failed");
            record_audit_write_failure();
            sqlx::query("ROLLBACK TO SAVEPOINT audit_write")
                .execute(&mut **tx)
                .await
                .map_err(storage)?;
        }
    }
    Ok(())
}

fn bind_order<'q>(query: PgQuery<'q>, order: &'q Order) -> PgQuery<'q> {
    let s = order.snapshot();
    query
        .bind(s.id.as_str())
        .bind(s.user_id.as_str())
        .bind(s.venue.as_str())
        .bind(&s.symbol)
        .bind(s.order_type.as_str())
        .bind(s.side.as_str())
        .bind(s.quantity_requested)
        .bind(s.quantity_filled)
        .bind(s.average_fill_price)
        .bind(s.price)
        .bind(s.status.as_str())
        .bind(s.is_paper_trade)
        .bind(s.is_algorithmic)
        .bind(s.parent_order_id.as_ref().map(OrderId::as_str))
        .bind(s.exchange_order_id.as_deref())
        .bind(s.created_at)
        .bind(s.submitted_at)
        .bind(s.filled_at)
        .bind(s.canceled_at)
        .bind(s.failure_reason.as_deref())
        .bind(Value::Object(s.metadata.clone()))
}

#[async_trait]
impl OrderRepository for PostgresStore {
    async fn insert(&self, order: &Order, audit: NewAuditEntry) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        let sql = format!(
            "INSERT INTO orders ({ORDER_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)"
        );
        bind_order(sqlx::query(&sql), order)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_write_error(e, order))?;

        insert_audit_in_savepoint(&mut tx, &audit).await?;
        tx.commit().await.map_err(storage)?;

        debug!(order_id = %order.id(), "Order inserted");
        Ok(())
    }

    async fn save_transition(
        &self,
        order: &Order,
        expected: OrderStatus,
        audit: NewAuditEntry,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        let row = sqlx::query("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
            .bind(order.id().as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage)?
            .ok_or_else(|| RepositoryError::NotFound(order.id().clone()))?;
        let actual: OrderStatus = row
            .try_get::<String, _>("status")
            .map_err(corrupt)?
            .parse()
            .map_err(corrupt)?;
        if actual != expected {
            return Err(RepositoryError::Conflict {
                order_id: order.id().clone(),
                expected,
                actual,
            });
        }

        let s = order.snapshot();
        sqlx::query(
            "UPDATE orders SET venue = $2, quantity_filled = $3, average_fill_price = $4, \
             status = $5, exchange_order_id = $6, submitted_at = $7, filled_at = $8, \
             canceled_at = $9, failure_reason = $10, metadata = $11 WHERE id = $1",
        )
        .bind(s.id.as_str())
        .bind(s.venue.as_str())
        .bind(s.quantity_filled)
        .bind(s.average_fill_price)
        .bind(s.status.as_str())
        .bind(s.exchange_order_id.as_deref())
        .bind(s.submitted_at)
        .bind(s.filled_at)
        .bind(s.canceled_at)
        .bind(s.failure_reason.as_deref())
        .bind(Value::Object(s.metadata.clone()))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_write_error(e, order))?;

        insert_audit_in_savepoint(&mut tx, &audit).await?;
        tx.commit().await.map_err(storage)?;
        Ok(())
    }

    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?
            .as_ref()
            .map(decode_order)
            .transpose()
    }

    async fn find_by_exchange_order_id(
        &self,
        exchange_order_id: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE exchange_order_id = $1");
        sqlx::query(&sql)
            .bind(exchange_order_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?
            .as_ref()
            .map(decode_order)
            .transpose()
    }

    async fn find_children(&self, parent_id: &OrderId) -> Result<Vec<Order>, RepositoryError> {
        self.fetch_orders("parent_order_id = $1", |q| q.bind(parent_id.to_string()))
            .await
    }

    async fn find_by_status(&self, status: OrderStatus) -> Result<Vec<Order>, RepositoryError> {
        self.fetch_orders("status = $1", |q| q.bind(status.as_str()))
            .await
    }

    async fn find_filled_between(
        &self,
        venue: &VenueName,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Order>, RepositoryError> {
        self.fetch_orders(
            "venue = $1 AND status = 'FILLED' AND is_paper_trade = FALSE \
             AND filled_at BETWEEN $2 AND $3",
            |q| q.bind(venue.to_string()).bind(start).bind(end),
        )
        .await
    }
}

#[async_trait]
impl AuditSink for PostgresStore {
    async fn record(&self, entry: NewAuditEntry) {
        let result = sqlx::query(
            "INSERT INTO audit_log (user_id, action, details, metadata) VALUES ($1, $2, $3, $4)",
        )
        .bind(entry.user_id.as_ref().map(UserId::as_str))
        .bind(entry.action.as_str())
        .bind(&entry.details)
        .bind(entry.metadata_value())
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            error!(action = %entry.action, error = %e, "Audit write failed");
            record_audit_write_failure();
        }
    }
}

#[async_trait]
impl RiskProfileRepository for PostgresStore {
    async fn find_by_user(&self, user_id: &UserId) -> Result<Option<RiskProfile>, RepositoryError> {
        let row = sqlx::query(
            "SELECT user_id, trading_halted, max_open_positions, max_order_value_usd, \
             max_exposure_per_symbol_usd, max_total_exposure_usd, max_daily_drawdown_pct, \
             max_total_drawdown_pct, updated_at FROM risk_profiles WHERE user_id = $1",
        )
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let max_open_positions = row
            .try_get::<Option<i32>, _>("max_open_positions")
            .map_err(corrupt)?
            .map(|n| u32::try_from(n).map_err(corrupt))
            .transpose()?;

        Ok(Some(RiskProfile {
            user_id: UserId::new(row.try_get::<String, _>("user_id").map_err(corrupt)?),
            trading_halted: row.try_get("trading_halted").map_err(corrupt)?,
            max_open_positions,
            max_order_value_usd: row.try_get("max_order_value_usd").map_err(corrupt)?,
            max_exposure_per_symbol_usd: row
                .try_get("max_exposure_per_symbol_usd")
                .map_err(corrupt)?,
            max_total_exposure_usd: row.try_get("max_total_exposure_usd").map_err(corrupt)?,
            max_daily_drawdown_pct: row.try_get("max_daily_drawdown_pct").map_err(corrupt)?,
            max_total_drawdown_pct: row.try_get("max_total_drawdown_pct").map_err(corrupt)?,
            updated_at: row.try_get("updated_at").map_err(corrupt)?,
        }))
    }

    async fn upsert(&self, profile: &RiskProfile) -> Result<(), RepositoryError> {
        let max_open_positions = profile
            .max_open_positions
            .map(|n| i32::try_from(n).unwrap_or(i32::MAX));
        sqlx::query(
            "INSERT INTO risk_profiles (user_id, trading_halted, max_open_positions, \
             max_order_value_usd, max_exposure_per_symbol_usd, max_total_exposure_usd, \
             max_daily_drawdown_pct, max_total_drawdown_pct, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (user_id) DO UPDATE SET trading_halted = EXCLUDED.trading_halted, \
             max_open_positions = EXCLUDED.max_open_positions, \
             max_order_value_usd = EXCLUDED.max_order_value_usd, \
             max_exposure_per_symbol_usd = EXCLUDED.max_exposure_per_symbol_usd, \
             max_total_exposure_usd = EXCLUDED.max_total_exposure_usd, \
             max_daily_drawdown_pct = EXCLUDED.max_daily_drawdown_pct, \
             max_total_drawdown_pct = EXCLUDED.max_total_drawdown_pct, \
             updated_at = EXCLUDED.updated_at",
        )
        .bind(profile.user_id.as_str())
        .bind(profile.trading_halted)
        .bind(max_open_positions)
        .bind(profile.max_order_value_usd)
        .bind(profile.max_exposure_per_symbol_usd)
        .bind(profile.max_total_exposure_usd)
        .bind(profile.max_daily_drawdown_pct)
        .bind(profile.max_total_drawdown_pct)
        .bind(profile.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }
}

#[async_trait]
impl CopySubscriptionRepository for PostgresStore {
    async fn find_active_by_leader(
        &self,
        leader_id: &UserId,
    ) -> Result<Vec<CopySubscription>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT follower_id, leader_id, is_active, trade_size_multiplier, max_trade_size_usd \
             FROM copy_subscriptions WHERE leader_id = $1 AND is_active ORDER BY follower_id",
        )
        .bind(leader_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.iter()
            .map(|row| {
                Ok(CopySubscription {
                    leader_id: UserId::new(row.try_get::<String, _>("leader_id").map_err(corrupt)?),
                    follower_id: UserId::new(
                        row.try_get::<String, _>("follower_id").map_err(corrupt)?,
                    ),
                    is_active: row.try_get("is_active").map_err(corrupt)?,
                    trade_size_multiplier: row.try_get("trade_size_multiplier").map_err(corrupt)?,
                    max_trade_size_usd: row.try_get("max_trade_size_usd").map_err(corrupt)?,
                })
            })
            .collect()
    }

    async fn upsert(&self, subscription: &CopySubscription) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO copy_subscriptions (follower_id, leader_id, is_active, \
             trade_size_multiplier, max_trade_size_usd) VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (follower_id, leader_id) DO UPDATE SET is_active = EXCLUDED.is_active, \
             trade_size_multiplier = EXCLUDED.trade_size_multiplier, \
             max_trade_size_usd = EXCLUDED.max_trade_size_usd",
        )
        .bind(subscription.follower_id.as_str())
        .bind(subscription.leader_id.as_str())
        .bind(subscription.is_active)
        .bind(subscription.trade_size_multiplier)
        .bind(subscription.max_trade_size_usd)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }
}

fn count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[async_trait]
impl ReconciliationReportRepository for PostgresStore {
    async fn save(&self, report: &ReconciliationReport) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO reconciliation_reports (venue, status, window_start, window_end, \
             started_at, finished_at, internal_checked, external_fetched, matched, mismatched, \
             missing_internal, missing_external, discrepancies) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(report.venue.as_str())
        .bind(report.status.as_str())
        .bind(report.window_start)
        .bind(report.window_end)
        .bind(report.started_at)
        .bind(report.finished_at)
        .bind(count(report.internal_checked))
        .bind(count(report.external_fetched))
        .bind(count(report.matched))
        .bind(count(report.mismatched))
        .bind(count(report.missing_internal))
        .bind(count(report.missing_external))
        .bind(to_metadata_value(&report.discrepancies))
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }
}

// ============================================
// Submission queue
// ============================================

/// Durable submission queue on the `submission_queue` table.
///
/// A claimed row that is not deleted within the visibility timeout becomes
/// claimable again, giving at-least-once delivery across restarts.
#[derive(Debug, Clone)]
pub struct PostgresQueue {
    pool: PgPool,
    poll_interval: Duration,
    visibility_timeout: Duration,
}

impl PostgresQueue {
    /// Create a queue on an existing pool. The schema comes from
    /// [`PostgresStore::migrate`].
    #[must_use]
    pub const fn new(pool: PgPool, poll_interval: Duration, visibility_timeout: Duration) -> Self {
        Self {
            pool,
            poll_interval,
            visibility_timeout,
        }
    }

    async fn claim_next(&self) -> Result<Option<Delivery>, QueueError> {
        let row = sqlx::query(
            "UPDATE submission_queue SET claimed_at = now() WHERE id = ( \
               SELECT id FROM submission_queue \
               WHERE claimed_at IS NULL OR claimed_at < now() - make_interval(secs => $1) \
               ORDER BY id FOR UPDATE SKIP LOCKED LIMIT 1) \
             RETURNING id, order_id",
        )
        .bind(self.visibility_timeout.as_secs_f64())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| QueueError::Backend(e.to_string()))?;

        row.map(|row| {
            Ok(Delivery {
                receipt: row
                    .try_get("id")
                    .map_err(|e| QueueError::Backend(e.to_string()))?,
                order_id: OrderId::new(
                    row.try_get::<String, _>("order_id")
                        .map_err(|e| QueueError::Backend(e.to_string()))?,
                ),
            })
        })
        .transpose()
    }
}

#[async_trait]
impl SubmissionQueue for PostgresQueue {
    async fn enqueue(&self, order_id: &OrderId) -> Result<(), QueueError> {
        sqlx::query("INSERT INTO submission_queue (order_id) VALUES ($1)")
            .bind(order_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn dequeue(&self) -> Result<Delivery, QueueError> {
        loop {
            if self.pool.is_closed() {
                return Err(QueueError::Closed);
            }
            if let Some(delivery) = self.claim_next().await? {
                return Ok(delivery);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        sqlx::query("DELETE FROM submission_queue WHERE id = $1")
            .bind(delivery.receipt)
            .execute(&self.pool)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        Ok(())
    }
}
