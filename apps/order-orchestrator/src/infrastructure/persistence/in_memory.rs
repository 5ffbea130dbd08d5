//! In-memory persistence for development and tests.
//!
//! One write lock guards every table, so a status compare-and-set and its
//! audit record are applied atomically.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::time::Instant;

use crate::application::ports::{
    AuditSink, Delivery, QueueError, ReconciliationReportRepository, SubmissionQueue,
};
use crate::domain::audit::{AuditEntry, NewAuditEntry};
use crate::domain::copy_trading::{CopySubscription, CopySubscriptionRepository};
use crate::domain::order_execution::{
    Order, OrderRepository, OrderStatus, RepositoryError,
};
use crate::domain::reconciliation::ReconciliationReport;
use crate::domain::risk_management::{RiskProfile, RiskProfileRepository};
use crate::domain::shared::{OrderId, UserId, VenueName};

#[derive(Debug, Default)]
struct Tables {
    orders: HashMap<OrderId, Order>,
    exchange_index: HashMap<String, OrderId>,
    audit_log: Vec<AuditEntry>,
    risk_profiles: HashMap<UserId, RiskProfile>,
    subscriptions: Vec<CopySubscription>,
    reports: Vec<ReconciliationReport>,
}

impl Tables {
    fn append_audit(&mut self, entry: NewAuditEntry) {
        let id = self.audit_log.len() as i64 + 1;
        self.audit_log.push(AuditEntry::from_new(id, Utc::now(), entry));
    }

    fn check_exchange_id(&self, order: &Order) -> Result<(), RepositoryError> {
        if let Some(exchange_id) = order.exchange_order_id() {
            if let Some(owner) = self.exchange_index.get(exchange_id) {
                if owner != order.id() {
                    return Err(RepositoryError::DuplicateExchangeOrderId(
                        exchange_id.to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    fn index_exchange_id(&mut self, order: &Order) {
        if let Some(exchange_id) = order.exchange_order_id() {
            self.exchange_index
                .insert(exchange_id.to_string(), order.id().clone());
        }
    }
}

/// In-memory implementation of every store port.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All audit entries, oldest first.
    pub async fn audit_entries(&self) -> Vec<AuditEntry> {
        self.tables.read().await.audit_log.clone()
    }

    /// Number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.tables.read().await.orders.len()
    }

    /// All stored orders, oldest first.
    pub async fn all_orders(&self) -> Vec<Order> {
        let tables = self.tables.read().await;
        let mut orders: Vec<Order> = tables.orders.values().cloned().collect();
        orders.sort_by_key(Order::created_at);
        orders
    }

    /// Saved reconciliation reports, oldest first.
    pub async fn reports(&self) -> Vec<ReconciliationReport> {
        self.tables.read().await.reports.clone()
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn insert(&self, order: &Order, audit: NewAuditEntry) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        if tables.orders.contains_key(order.id()) {
            return Err(RepositoryError::DuplicateOrderId(order.id().clone()));
        }
        tables.check_exchange_id(order)?;
        tables.index_exchange_id(order);
        tables.orders.insert(order.id().clone(), order.clone());
        tables.append_audit(audit);
        Ok(())
    }

    async fn save_transition(
        &self,
        order: &Order,
        expected: OrderStatus,
        audit: NewAuditEntry,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        let actual = tables
            .orders
            .get(order.id())
            .map(Order::status)
            .ok_or_else(|| RepositoryError::NotFound(order.id().clone()))?;
        if actual != expected {
            return Err(RepositoryError::Conflict {
                order_id: order.id().clone(),
                expected,
                actual,
            });
        }
        tables.check_exchange_id(order)?;
        tables.index_exchange_id(order);
        tables.orders.insert(order.id().clone(), order.clone());
        tables.append_audit(audit);
        Ok(())
    }

    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.tables.read().await.orders.get(id).cloned())
    }

    async fn find_by_exchange_order_id(
        &self,
        exchange_order_id: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .exchange_index
            .get(exchange_order_id)
            .and_then(|id| tables.orders.get(id))
            .cloned())
    }

    async fn find_children(&self, parent_id: &OrderId) -> Result<Vec<Order>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut children: Vec<Order> = tables
            .orders
            .values()
            .filter(|o| o.parent_order_id() == Some(parent_id))
            .cloned()
            .collect();
        children.sort_by_key(Order::created_at);
        Ok(children)
    }

    async fn find_by_status(&self, status: OrderStatus) -> Result<Vec<Order>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut orders: Vec<Order> = tables
            .orders
            .values()
            .filter(|o| o.status() == status)
            .cloned()
            .collect();
        orders.sort_by_key(Order::created_at);
        Ok(orders)
    }

    async fn find_filled_between(
        &self,
        venue: &VenueName,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Order>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .values()
            .filter(|o| {
                o.venue() == venue
                    && !o.is_paper_trade()
                    && o.status() == OrderStatus::Filled
                    && o.filled_at().is_some_and(|t| t >= start && t <= end)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AuditSink for InMemoryStore {
    async fn record(&self, entry: NewAuditEntry) {
        self.tables.write().await.append_audit(entry);
    }
}

#[async_trait]
impl RiskProfileRepository for InMemoryStore {
    async fn find_by_user(&self, user_id: &UserId) -> Result<Option<RiskProfile>, RepositoryError> {
        Ok(self.tables.read().await.risk_profiles.get(user_id).cloned())
    }

    async fn upsert(&self, profile: &RiskProfile) -> Result<(), RepositoryError> {
        self.tables
            .write()
            .await
            .risk_profiles
            .insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }
}

#[async_trait]
impl CopySubscriptionRepository for InMemoryStore {
    async fn find_active_by_leader(
        &self,
        leader_id: &UserId,
    ) -> Result<Vec<CopySubscription>, RepositoryError> {
        Ok(self
            .tables
            .read()
            .await
            .subscriptions
            .iter()
            .filter(|s| s.is_active && &s.leader_id == leader_id)
            .cloned()
            .collect())
    }

    async fn upsert(&self, subscription: &CopySubscription) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        tables.subscriptions.retain(|s| {
            !(s.leader_id == subscription.leader_id && s.follower_id == subscription.follower_id)
        });
        tables.subscriptions.push(subscription.clone());
        Ok(())
    }
}

#[async_trait]
impl ReconciliationReportRepository for InMemoryStore {
    async fn save(&self, report: &ReconciliationReport) -> Result<(), RepositoryError> {
        self.tables.write().await.reports.push(report.clone());
        Ok(())
    }
}

// ============================================
// Submission queue
// ============================================

#[derive(Debug, Default)]
struct QueueState {
    next_receipt: i64,
    ready: VecDeque<(i64, OrderId)>,
    in_flight: HashMap<i64, (OrderId, Instant)>,
    closed: bool,
}

impl QueueState {
    fn reclaim_expired(&mut self, visibility_timeout: Duration) {
        let now = Instant::now();
        let mut expired: Vec<i64> = self
            .in_flight
            .iter()
            .filter(|(_, (_, claimed_at))| now.duration_since(*claimed_at) >= visibility_timeout)
            .map(|(receipt, _)| *receipt)
            .collect();
        expired.sort_unstable();
        for receipt in expired.into_iter().rev() {
            if let Some((order_id, _)) = self.in_flight.remove(&receipt) {
                self.ready.push_front((receipt, order_id));
            }
        }
    }
}

/// In-process FIFO with at-least-once redelivery.
///
/// A dequeued entry that is not acknowledged within the visibility timeout is
/// handed out again.
#[derive(Debug)]
pub struct InMemoryQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    visibility_timeout: Duration,
}

impl InMemoryQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            visibility_timeout,
        }
    }

    /// Stop handing out entries; pending `dequeue` calls return `Closed`.
    pub async fn close(&self) {
        self.state.lock().await.closed = true;
        self.notify.notify_waiters();
    }

    /// Entries waiting for delivery.
    pub async fn pending(&self) -> usize {
        self.state.lock().await.ready.len()
    }
}

#[async_trait]
impl SubmissionQueue for InMemoryQueue {
    async fn enqueue(&self, order_id: &OrderId) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(QueueError::Closed);
        }
        state.next_receipt += 1;
        let receipt = state.next_receipt;
        state.ready.push_back((receipt, order_id.clone()));
        drop(state);
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(&self) -> Result<Delivery, QueueError> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock().await;
                if state.closed {
                    return Err(QueueError::Closed);
                }
                state.reclaim_expired(self.visibility_timeout);
                if let Some((receipt, order_id)) = state.ready.pop_front() {
                    state
                        .in_flight
                        .insert(receipt, (order_id.clone(), Instant::now()));
                    return Ok(Delivery { receipt, order_id });
                }
            }
            tokio::select! {
                () = notified => {}
                () = tokio::time::sleep(self.visibility_timeout) => {}
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        self.state.lock().await.in_flight.remove(&delivery.receipt);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use serde_json::Map;

    use super::*;
    use crate::domain::audit::AuditAction;
    use crate::domain::order_execution::{CreateOrderCommand, OrderSide, OrderType};

    fn order() -> Order {
        Order::new(
            CreateOrderCommand {
                user_id: UserId::new("u1"),
                venue: VenueName::new("spot"),
                symbol: "BTCUSDT".to_string(),
                order_type: OrderType::Market,
                side: OrderSide::Buy,
                quantity: dec!(1),
                price: None,
                is_paper_trade: false,
                is_algorithmic: false,
                parent_order_id: None,
                metadata: Map::new(),
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn insert_and_round_trip() {
        let store = InMemoryStore::new();
        let order = order();
        store
            .insert(&order, NewAuditEntry::order_created(&order))
            .await
            .unwrap();

        let found = store.find_by_id(order.id()).await.unwrap().unwrap();
        assert_eq!(found, order);
        assert!(found.average_fill_price().is_none());
        assert_eq!(store.audit_entries().await.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let store = InMemoryStore::new();
        let order = order();
        store
            .insert(&order, NewAuditEntry::order_created(&order))
            .await
            .unwrap();
        let err = store
            .insert(&order, NewAuditEntry::order_created(&order))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::DuplicateOrderId(_)));
    }

    #[tokio::test]
    async fn stale_transition_conflicts_without_audit() {
        let store = InMemoryStore::new();
        let mut order = order();
        store
            .insert(&order, NewAuditEntry::order_created(&order))
            .await
            .unwrap();

        let change = order.submit(Utc::now()).unwrap();
        store
            .save_transition(&order, change.from, NewAuditEntry::state_change(&order, change))
            .await
            .unwrap();

        let err = store
            .save_transition(&order, change.from, NewAuditEntry::state_change(&order, change))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict { .. }));

        let audit = store.audit_entries().await;
        assert_eq!(audit.len(), 2);
        assert_eq!(audit[1].action, AuditAction::OrderStateChange);
    }

    #[tokio::test]
    async fn exchange_order_id_is_unique() {
        let store = InMemoryStore::new();
        let mut first = order();
        let mut second = order();
        for o in [&first, &second] {
            store
                .insert(o, NewAuditEntry::order_created(o))
                .await
                .unwrap();
        }

        for o in [&mut first, &mut second] {
            let change = o.submit(Utc::now()).unwrap();
            store
                .save_transition(o, change.from, NewAuditEntry::state_change(o, change))
                .await
                .unwrap();
        }

        let change = first.accept(Some("X-1".to_string())).unwrap();
        store
            .save_transition(&first, change.from, NewAuditEntry::state_change(&first, change))
            .await
            .unwrap();

        let change = second.accept(Some("X-1".to_string())).unwrap();
        let err = store
            .save_transition(&second, change.from, NewAuditEntry::state_change(&second, change))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::DuplicateExchangeOrderId(_)));

        let found = store.find_by_exchange_order_id("X-1").await.unwrap().unwrap();
        assert_eq!(found.id(), first.id());
    }

    #[tokio::test]
    async fn queue_is_fifo() {
        let queue = InMemoryQueue::new(Duration::from_secs(60));
        let a = OrderId::generate();
        let b = OrderId::generate();
        queue.enqueue(&a).await.unwrap();
        queue.enqueue(&b).await.unwrap();

        let first = queue.dequeue().await.unwrap();
        let second = queue.dequeue().await.unwrap();
        assert_eq!(first.order_id, a);
        assert_eq!(second.order_id, b);
    }

    #[tokio::test(start_paused = true)]
    async fn unacked_delivery_is_redelivered() {
        let queue = InMemoryQueue::new(Duration::from_secs(5));
        let id = OrderId::generate();
        queue.enqueue(&id).await.unwrap();

        let first = queue.dequeue().await.unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;
        let again = queue.dequeue().await.unwrap();

        assert_eq!(first, again);
        queue.ack(&again).await.unwrap();
        assert_eq!(queue.pending().await, 0);
    }

    #[tokio::test]
    async fn closed_queue_stops_dequeue() {
        let queue = InMemoryQueue::new(Duration::from_secs(60));
        queue.close().await;
        assert!(matches!(queue.dequeue().await, Err(QueueError::Closed)));
    }
}
