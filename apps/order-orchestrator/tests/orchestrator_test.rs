//! Order Orchestrator Integration Tests
//!
//! Drives orders through the live, paper and TWAP paths against scripted venues
//! on the in-memory store, checking states, audit records, alerts and telemetry.

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use common::{Harness, MockAdapter, PlaceBehavior};
use order_orchestrator::application::dto::OrderIntent;
use order_orchestrator::application::orchestrator::OrchestratorError;
use order_orchestrator::application::ports::{
    AdapterError, AlertLevel, ExecutionReport, ExecutionReportKind, SubmissionQueue,
    VenueOrderPhase,
};
use order_orchestrator::domain::audit::{AuditAction, NewAuditEntry};
use order_orchestrator::domain::order_execution::{
    Order, OrderRepository, OrderSide, OrderStatus, TwapParams,
};
use order_orchestrator::domain::shared::{UserId, VenueName};

fn user() -> UserId {
    UserId::new("trader-1")
}

// ============================================
// Live path
// ============================================

#[tokio::test]
async fn live_market_order_fills_from_place_result() {
    let venue = MockAdapter::new("cfd")
        .with_quote("EURUSD", dec!(1.0999), dec!(1.1001))
        .with_behavior(PlaceBehavior::Fill(dec!(1.1001)));
    let h = Harness::new(vec![venue.clone()]).await;
    h.start_worker();

    let order = h
        .orchestrator
        .create_order(&user(), OrderIntent::market("cfd", "EURUSD", OrderSide::Buy, dec!(2)))
        .await
        .unwrap();
    assert_eq!(order.status(), OrderStatus::PendingSubmit);

    let filled = h.wait_for_status(order.id(), OrderStatus::Filled).await;
    assert_eq!(filled.quantity_filled(), dec!(2));
    assert_eq!(filled.average_fill_price(), Some(dec!(1.1001)));
    assert_eq!(filled.exchange_order_id(), Some("CFD-1"));
    assert!(filled.submitted_at().is_some());
    assert!(filled.filled_at().is_some());

    assert_eq!(venue.place_count(), 1);
    let placed = venue.placed();
    assert_eq!(&placed[0].client_order_id, order.id());
    assert_eq!(placed[0].quantity, dec!(2));

    assert_eq!(h.telemetry.latency_count(), 1);
    let fills = h.telemetry.fills();
    assert_eq!(fills.len(), 1);
    assert_eq!(fills[0].2, dec!(2));
    assert!(h.alerts.all().is_empty());
}

#[tokio::test]
async fn every_transition_has_exactly_one_audit() {
    let venue = MockAdapter::new("cfd")
        .with_quote("EURUSD", dec!(1.0999), dec!(1.1001))
        .with_behavior(PlaceBehavior::Fill(dec!(1.1)));
    let h = Harness::new(vec![venue]).await;
    h.start_worker();

    let order = h
        .orchestrator
        .create_order(&user(), OrderIntent::market("cfd", "EURUSD", OrderSide::Sell, dec!(1)))
        .await
        .unwrap();
    h.wait_for_status(order.id(), OrderStatus::Filled).await;

    let created = h.audits_for(order.id(), AuditAction::OrderCreateRequest).await;
    assert_eq!(created.len(), 1);

    let changes = h.audits_for(order.id(), AuditAction::OrderStateChange).await;
    let path: Vec<(String, String)> = changes
        .iter()
        .map(|e| {
            (
                e.metadata["from"].as_str().unwrap().to_string(),
                e.metadata["to"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    assert_eq!(
        path,
        vec![
            ("PENDING_SUBMIT".to_string(), "SUBMITTED".to_string()),
            ("SUBMITTED".to_string(), "ACCEPTED".to_string()),
            ("ACCEPTED".to_string(), "FILLED".to_string()),
        ]
    );
}

#[tokio::test]
async fn live_place_error_gives_error_and_one_critical_alert() {
    let venue = MockAdapter::new("spot")
        .with_quote("BTCUSDT", dec!(50000), dec!(50010))
        .with_behavior(PlaceBehavior::Error(AdapterError::Connection(
            "socket closed".to_string(),
        )));
    let h = Harness::new(vec![venue]).await;
    h.start_worker();

    let order = h
        .orchestrator
        .create_order(&user(), OrderIntent::market("spot", "BTCUSDT", OrderSide::Buy, dec!(0.1)))
        .await
        .unwrap();

    let failed = h.wait_for_status(order.id(), OrderStatus::Error).await;
    assert!(failed.failure_reason().unwrap().contains("socket closed"));
    assert_eq!(h.alerts.count(AlertLevel::Critical), 1);
    assert_eq!(h.alerts.count(AlertLevel::Warning), 0);
    assert_eq!(failed.quantity_filled(), Decimal::ZERO);
}

#[tokio::test]
async fn place_timeout_gives_error_and_one_critical_alert() {
    let venue = MockAdapter::new("spot")
        .with_quote("BTCUSDT", dec!(50000), dec!(50010))
        .with_behavior(PlaceBehavior::Hang);
    let h = Harness::new(vec![venue]).await;
    h.start_worker();

    let order = h
        .orchestrator
        .create_order(&user(), OrderIntent::market("spot", "BTCUSDT", OrderSide::Buy, dec!(0.1)))
        .await
        .unwrap();

    let failed = h.wait_for_status(order.id(), OrderStatus::Error).await;
    assert!(failed.failure_reason().unwrap().contains("timed out"));
    assert_eq!(h.alerts.count(AlertLevel::Critical), 1);
}

#[tokio::test]
async fn venue_rejection_keeps_message_verbatim() {
    let venue = MockAdapter::new("spot")
        .with_quote("BTCUSDT", dec!(50000), dec!(50010))
        .with_behavior(PlaceBehavior::Error(AdapterError::Rejected(
            "Account has insufficient balance for requested action.".to_string(),
        )));
    let h = Harness::new(vec![venue]).await;
    h.start_worker();

    let order = h
        .orchestrator
        .create_order(&user(), OrderIntent::market("spot", "BTCUSDT", OrderSide::Buy, dec!(1)))
        .await
        .unwrap();

    let rejected = h.wait_for_status(order.id(), OrderStatus::Rejected).await;
    assert_eq!(
        rejected.failure_reason(),
        Some("Account has insufficient balance for requested action.")
    );
    assert_eq!(h.alerts.count(AlertLevel::Warning), 1);
    assert_eq!(h.alerts.count(AlertLevel::Critical), 0);
}

#[tokio::test]
async fn unsuccessful_place_result_is_a_rejection() {
    let venue = MockAdapter::new("cfd")
        .with_quote("XAUUSD", dec!(2000), dec!(2001))
        .with_behavior(PlaceBehavior::Unsuccessful("Market closed".to_string()));
    let h = Harness::new(vec![venue]).await;
    h.start_worker();

    let order = h
        .orchestrator
        .create_order(&user(), OrderIntent::market("cfd", "XAUUSD", OrderSide::Sell, dec!(1)))
        .await
        .unwrap();

    let rejected = h.wait_for_status(order.id(), OrderStatus::Rejected).await;
    assert_eq!(rejected.failure_reason(), Some("Market closed"));
}

#[tokio::test]
async fn auto_venue_is_routed_to_best_quote() {
    let cfd = MockAdapter::new("cfd")
        .with_quote("ETHUSD", dec!(2999), dec!(3002))
        .with_behavior(PlaceBehavior::Fill(dec!(3002)));
    let spot = MockAdapter::new("spot")
        .with_quote("ETHUSD", dec!(2999), dec!(3001))
        .with_behavior(PlaceBehavior::Fill(dec!(3001)));
    let h = Harness::new(vec![cfd.clone(), spot.clone()]).await;
    h.start_worker();

    let order = h
        .orchestrator
        .create_order(&user(), OrderIntent::market("auto", "ETHUSD", OrderSide::Buy, dec!(1)))
        .await
        .unwrap();

    let filled = h.wait_for_status(order.id(), OrderStatus::Filled).await;
    assert_eq!(filled.venue(), &VenueName::new("spot"));
    assert_eq!(cfd.place_count(), 0);
    assert_eq!(spot.place_count(), 1);
}

#[tokio::test]
async fn venue_without_symbol_catalog_still_receives_orders() {
    let venue = MockAdapter::without_symbol_catalog("fix")
        .with_quote("AAPL", dec!(189.9), dec!(190.1))
        .with_behavior(PlaceBehavior::Accept);
    let h = Harness::new(vec![venue.clone()]).await;
    h.start_worker();

    let order = h
        .orchestrator
        .create_order(
            &user(),
            OrderIntent::limit("fix", "AAPL", OrderSide::Buy, dec!(10), dec!(190)),
        )
        .await
        .unwrap();

    let accepted = h.wait_for_status(order.id(), OrderStatus::Accepted).await;
    assert_eq!(accepted.exchange_order_id(), Some("FIX-1"));
    assert_eq!(venue.place_count(), 1);
    assert_eq!(venue.placed()[0].symbol, "AAPL");
    assert_eq!(h.alerts.count(AlertLevel::Critical), 0);
}

#[tokio::test]
async fn same_intent_twice_creates_two_orders() {
    let venue = MockAdapter::new("cfd").with_quote("EURUSD", dec!(1.0999), dec!(1.1001));
    let h = Harness::new(vec![venue]).await;

    let intent = OrderIntent::limit("cfd", "EURUSD", OrderSide::Buy, dec!(1), dec!(1.1));
    let first = h
        .orchestrator
        .create_order(&user(), intent.clone())
        .await
        .unwrap();
    let second = h.orchestrator.create_order(&user(), intent).await.unwrap();

    assert_ne!(first.id(), second.id());
    assert_eq!(h.store.order_count().await, 2);
    for order in [&first, &second] {
        let created = h.audits_for(order.id(), AuditAction::OrderCreateRequest).await;
        assert_eq!(created.len(), 1);
    }
}

// ============================================
// Asynchronous execution reports
// ============================================

#[tokio::test]
async fn execution_reports_fill_an_accepted_order() {
    let venue = MockAdapter::new("fix").with_quote("AAPL", dec!(189.9), dec!(190.1));
    let h = Harness::new(vec![venue]).await;
    h.start_worker();

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(Arc::clone(&h.orchestrator).run_fill_listener(rx, CancellationToken::new()));

    let order = h
        .orchestrator
        .create_order(
            &user(),
            OrderIntent::limit("fix", "AAPL", OrderSide::Buy, dec!(10), dec!(190)),
        )
        .await
        .unwrap();
    let accepted = h.wait_for_status(order.id(), OrderStatus::Accepted).await;
    let exchange_order_id = accepted.exchange_order_id().unwrap().to_string();

    let report = |quantity: Decimal, price: Decimal| ExecutionReport {
        venue: VenueName::new("fix"),
        exchange_order_id: exchange_order_id.clone(),
        client_order_id: None,
        kind: ExecutionReportKind::Fill { quantity, price },
        time: Utc::now(),
    };

    tx.send(report(dec!(4), dec!(189))).unwrap();
    let partial = h.wait_for_status(order.id(), OrderStatus::PartiallyFilled).await;
    assert_eq!(partial.quantity_filled(), dec!(4));

    // Over-fill is clamped to the remaining quantity.
    tx.send(report(dec!(10), dec!(190))).unwrap();
    let filled = h.wait_for_status(order.id(), OrderStatus::Filled).await;
    assert_eq!(filled.quantity_filled(), dec!(10));
    assert_eq!(filled.average_fill_price(), Some(dec!(189.6)));
    assert_eq!(h.telemetry.fills().len(), 2);
}

#[tokio::test]
async fn venue_cancel_report_closes_the_order() {
    let venue = MockAdapter::new("fix").with_quote("AAPL", dec!(189.9), dec!(190.1));
    let h = Harness::new(vec![venue]).await;
    h.start_worker();

    let order = h
        .orchestrator
        .create_order(&user(), OrderIntent::market("fix", "AAPL", OrderSide::Sell, dec!(5)))
        .await
        .unwrap();
    let accepted = h.wait_for_status(order.id(), OrderStatus::Accepted).await;

    let updated = h
        .orchestrator
        .apply_execution_report(&ExecutionReport {
            venue: VenueName::new("fix"),
            exchange_order_id: accepted.exchange_order_id().unwrap().to_string(),
            client_order_id: Some(order.id().clone()),
            kind: ExecutionReportKind::Canceled,
            time: Utc::now(),
        })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.status(), OrderStatus::Canceled);
    assert!(updated.canceled_at().is_some());
}

#[tokio::test]
async fn fill_listener_outlives_orchestrator_shutdown() {
    let venue = MockAdapter::new("fix").with_quote("AAPL", dec!(189.9), dec!(190.1));
    let h = Harness::new(vec![venue]).await;
    h.start_worker();

    let listener_cancel = CancellationToken::new();
    let (tx, rx) = mpsc::unbounded_channel();
    let listener = tokio::spawn(
        Arc::clone(&h.orchestrator).run_fill_listener(rx, listener_cancel.clone()),
    );

    let order = h
        .orchestrator
        .create_order(&user(), OrderIntent::market("fix", "AAPL", OrderSide::Buy, dec!(3)))
        .await
        .unwrap();
    let accepted = h.wait_for_status(order.id(), OrderStatus::Accepted).await;

    h.shutdown().await;
    tx.send(ExecutionReport {
        venue: VenueName::new("fix"),
        exchange_order_id: accepted.exchange_order_id().unwrap().to_string(),
        client_order_id: None,
        kind: ExecutionReportKind::Fill {
            quantity: dec!(3),
            price: dec!(190),
        },
        time: Utc::now(),
    })
    .unwrap();
    h.wait_for_status(order.id(), OrderStatus::Filled).await;

    listener_cancel.cancel();
    listener.await.unwrap();
}

#[tokio::test]
async fn unmatched_report_is_parked_and_alerted_without_blocking_others() {
    let venue = MockAdapter::new("fix").with_quote("AAPL", dec!(189.9), dec!(190.1));
    let h = Harness::new(vec![venue]).await;
    h.start_worker();

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(Arc::clone(&h.orchestrator).run_fill_listener(rx, CancellationToken::new()));

    let order = h
        .orchestrator
        .create_order(&user(), OrderIntent::market("fix", "AAPL", OrderSide::Buy, dec!(2)))
        .await
        .unwrap();
    let accepted = h.wait_for_status(order.id(), OrderStatus::Accepted).await;

    let fill = |exchange_order_id: &str| ExecutionReport {
        venue: VenueName::new("fix"),
        exchange_order_id: exchange_order_id.to_string(),
        client_order_id: None,
        kind: ExecutionReportKind::Fill {
            quantity: dec!(2),
            price: dec!(190),
        },
        time: Utc::now(),
    };
    tx.send(fill("NOPE")).unwrap();
    tx.send(fill(accepted.exchange_order_id().unwrap())).unwrap();

    h.wait_for_status(order.id(), OrderStatus::Filled).await;

    let alerted = async {
        while h.alerts.count(AlertLevel::Critical) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), alerted)
        .await
        .expect("dropped report was never alerted");
    let critical: Vec<String> = h
        .alerts
        .all()
        .into_iter()
        .filter(|(_, level)| *level == AlertLevel::Critical)
        .map(|(message, _)| message)
        .collect();
    assert_eq!(critical.len(), 1);
    assert!(critical[0].contains("NOPE"));
}

#[tokio::test]
async fn report_for_unknown_order_gives_up_after_retries() {
    let venue = MockAdapter::new("fix");
    let h = Harness::new(vec![venue]).await;

    let result = h
        .orchestrator
        .apply_execution_report(&ExecutionReport {
            venue: VenueName::new("fix"),
            exchange_order_id: "NOPE".to_string(),
            client_order_id: None,
            kind: ExecutionReportKind::Fill {
                quantity: dec!(1),
                price: dec!(1),
            },
            time: Utc::now(),
        })
        .await;
    assert!(matches!(result, Err(OrchestratorError::NotFound(_))));
}

// ============================================
// Order status polling
// ============================================

/// Worker, fill listener and status poller over one report channel.
fn start_polling(h: &Harness) -> CancellationToken {
    h.start_worker();
    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(Arc::clone(&h.orchestrator).run_fill_listener(rx, cancel.clone()));
    tokio::spawn(Arc::clone(&h.orchestrator).run_order_status_poller(
        Duration::from_millis(10),
        tx,
        cancel.clone(),
    ));
    cancel
}

#[tokio::test]
async fn polled_executions_fill_a_resting_order() {
    let venue = MockAdapter::new("spot")
        .with_quote("BTCUSDT", dec!(49990), dec!(50010))
        .with_behavior(PlaceBehavior::Accept);
    let h = Harness::new(vec![venue.clone()]).await;
    let cancel = start_polling(&h);

    let order = h
        .orchestrator
        .create_order(
            &user(),
            OrderIntent::limit("spot", "BTCUSDT", OrderSide::Buy, dec!(1), dec!(50300)),
        )
        .await
        .unwrap();
    h.wait_for_status(order.id(), OrderStatus::Accepted).await;

    venue.set_order_state("SPOT-1", VenueOrderPhase::Working, dec!(0.5), Some(dec!(50000)));
    let partial = h.wait_for_status(order.id(), OrderStatus::PartiallyFilled).await;
    assert_eq!(partial.quantity_filled(), dec!(0.5));

    // Cumulative average 50100 over 1 means the second half executed at 50200.
    venue.set_order_state("SPOT-1", VenueOrderPhase::Done, dec!(1), Some(dec!(50100)));
    let filled = h.wait_for_status(order.id(), OrderStatus::Filled).await;
    assert_eq!(filled.quantity_filled(), dec!(1));
    assert_eq!(filled.average_fill_price(), Some(dec!(50100)));

    let fills = h.telemetry.fills();
    assert_eq!(fills.len(), 2);
    assert_eq!(fills[1].3, dec!(50200));

    // Finished orders are no longer queried.
    tokio::time::sleep(Duration::from_millis(30)).await;
    let queried = venue.state_count();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(venue.state_count(), queried);
    cancel.cancel();
}

#[tokio::test]
async fn polled_cancel_closes_a_resting_order() {
    let venue = MockAdapter::new("cfd")
        .with_quote("EURUSD", dec!(1.0999), dec!(1.1001))
        .with_behavior(PlaceBehavior::Accept);
    let h = Harness::new(vec![venue.clone()]).await;
    let cancel = start_polling(&h);

    let order = h
        .orchestrator
        .create_order(
            &user(),
            OrderIntent::limit("cfd", "EURUSD", OrderSide::Sell, dec!(2), dec!(1.2)),
        )
        .await
        .unwrap();
    h.wait_for_status(order.id(), OrderStatus::Accepted).await;

    venue.set_order_state("CFD-1", VenueOrderPhase::Canceled, dec!(0), None);
    let canceled = h.wait_for_status(order.id(), OrderStatus::Canceled).await;
    assert_eq!(canceled.quantity_filled(), Decimal::ZERO);
    cancel.cancel();
}

// ============================================
// Worker semantics
// ============================================

#[tokio::test]
async fn duplicate_delivery_is_a_no_op() {
    let venue = MockAdapter::new("cfd")
        .with_quote("EURUSD", dec!(1.0999), dec!(1.1001))
        .with_behavior(PlaceBehavior::Fill(dec!(1.1001)));
    let h = Harness::new(vec![venue.clone()]).await;

    let order = h
        .orchestrator
        .create_order(&user(), OrderIntent::market("cfd", "EURUSD", OrderSide::Buy, dec!(1)))
        .await
        .unwrap();
    h.queue.enqueue(order.id()).await.unwrap();
    h.start_worker();

    h.wait_for_status(order.id(), OrderStatus::Filled).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(venue.place_count(), 1);
    let changes = h.audits_for(order.id(), AuditAction::OrderStateChange).await;
    assert_eq!(changes.len(), 3);
}

#[tokio::test]
async fn recover_pending_resubmits_orders_from_a_previous_run() {
    let venue = MockAdapter::new("cfd")
        .with_quote("EURUSD", dec!(1.0999), dec!(1.1001))
        .with_behavior(PlaceBehavior::Fill(dec!(1.1001)));
    let h = Harness::new(vec![venue]).await;

    // Persisted but never enqueued, as after a crash.
    let order = Order::new(
        OrderIntent::market("cfd", "EURUSD", OrderSide::Buy, dec!(1)).into_command(user(), None),
        Utc::now(),
    )
    .unwrap();
    h.store
        .insert(&order, NewAuditEntry::order_created(&order))
        .await
        .unwrap();

    let resumed = h.orchestrator.recover_pending().await.unwrap();
    assert_eq!(resumed, 1);

    h.start_worker();
    h.wait_for_status(order.id(), OrderStatus::Filled).await;
}

// ============================================
// Structural validation
// ============================================

#[tokio::test]
async fn invalid_intents_are_refused_without_a_row() {
    let venue = MockAdapter::new("cfd").with_quote("EURUSD", dec!(1.0999), dec!(1.1001));
    let h = Harness::new(vec![venue]).await;

    let zero = h
        .orchestrator
        .create_order(&user(), OrderIntent::market("cfd", "EURUSD", OrderSide::Buy, dec!(0)))
        .await;
    assert!(matches!(zero, Err(OrchestratorError::Validation(_))));

    let mut no_price = OrderIntent::limit("cfd", "EURUSD", OrderSide::Buy, dec!(1), dec!(1.1));
    no_price.price = None;
    let no_price = h.orchestrator.create_order(&user(), no_price).await;
    assert!(matches!(no_price, Err(OrchestratorError::Validation(_))));

    let unknown = h
        .orchestrator
        .create_order(&user(), OrderIntent::market("nowhere", "EURUSD", OrderSide::Buy, dec!(1)))
        .await;
    assert!(matches!(unknown, Err(OrchestratorError::Connectivity(_))));

    let bad_twap = h
        .orchestrator
        .create_order(
            &user(),
            OrderIntent::market("cfd", "EURUSD", OrderSide::Buy, dec!(1)).twap(0, 5),
        )
        .await;
    assert!(matches!(bad_twap, Err(OrchestratorError::Validation(_))));

    let crowded_twap = h
        .orchestrator
        .create_order(
            &user(),
            OrderIntent::market("cfd", "EURUSD", OrderSide::Buy, dec!(1)).twap(1, 60_001),
        )
        .await;
    assert!(matches!(crowded_twap, Err(OrchestratorError::Validation(_))));

    assert_eq!(h.store.order_count().await, 0);
}

#[tokio::test]
async fn auto_venue_without_active_adapters_is_refused() {
    let venue = MockAdapter::new("cfd");
    venue.set_fail_connect(true);
    let h = Harness::new(vec![venue]).await;

    let result = h
        .orchestrator
        .create_order(&user(), OrderIntent::market("auto", "EURUSD", OrderSide::Buy, dec!(1)))
        .await;
    assert!(matches!(result, Err(OrchestratorError::Connectivity(_))));
    assert_eq!(h.store.order_count().await, 0);
}

// ============================================
// Paper path
// ============================================

#[tokio::test]
async fn paper_limit_order_fills_at_limit_price() {
    let venue = MockAdapter::new("spot").with_quote("BTCUSDT", dec!(99), dec!(101));
    let h = Harness::new(vec![venue.clone()]).await;
    h.start_worker();

    let order = h
        .orchestrator
        .create_order(
            &user(),
            OrderIntent::limit("spot", "BTCUSDT", OrderSide::Buy, dec!(1), dec!(100)).paper(),
        )
        .await
        .unwrap();

    let filled = h.wait_for_status(order.id(), OrderStatus::Filled).await;
    assert_eq!(filled.average_fill_price(), Some(dec!(100)));
    assert_eq!(filled.quantity_filled(), dec!(1));
    assert!(filled.exchange_order_id().unwrap().starts_with("PAPER-"));
    assert_eq!(venue.place_count(), 0);
    assert!(h.telemetry.fills().is_empty());
}

#[tokio::test]
async fn paper_market_orders_fill_at_the_touch() {
    let venue = MockAdapter::new("spot").with_quote("BTCUSDT", dec!(99), dec!(101));
    let h = Harness::new(vec![venue]).await;
    h.start_worker();

    let buy = h
        .orchestrator
        .create_order(
            &user(),
            OrderIntent::market("spot", "BTCUSDT", OrderSide::Buy, dec!(1)).paper(),
        )
        .await
        .unwrap();
    let sell = h
        .orchestrator
        .create_order(
            &user(),
            OrderIntent::market("spot", "BTCUSDT", OrderSide::Sell, dec!(1)).paper(),
        )
        .await
        .unwrap();

    let buy = h.wait_for_status(buy.id(), OrderStatus::Filled).await;
    let sell = h.wait_for_status(sell.id(), OrderStatus::Filled).await;
    assert_eq!(buy.average_fill_price(), Some(dec!(101)));
    assert_eq!(sell.average_fill_price(), Some(dec!(99)));
}

#[tokio::test]
async fn paper_order_without_a_tick_fails() {
    let venue = MockAdapter::new("spot");
    let h = Harness::new(vec![venue]).await;
    h.start_worker();

    let order = h
        .orchestrator
        .create_order(
            &user(),
            OrderIntent::market("spot", "DOGEUSDT", OrderSide::Buy, dec!(1)).paper(),
        )
        .await
        .unwrap();

    let failed = h.wait_for_status(order.id(), OrderStatus::Error).await;
    assert!(
        failed
            .failure_reason()
            .unwrap()
            .starts_with("Paper trade simulation failed:")
    );
}

// ============================================
// TWAP
// ============================================

#[tokio::test(start_paused = true)]
async fn twap_releases_children_on_schedule() {
    let venue = MockAdapter::new("cfd").with_quote("EURUSD", dec!(1.0999), dec!(1.1001));
    let h = Harness::new(vec![venue]).await;

    let parent = h
        .orchestrator
        .create_order(
            &user(),
            OrderIntent::market("auto", "EURUSD", OrderSide::Buy, dec!(10))
                .paper()
                .twap(10, 5),
        )
        .await
        .unwrap();

    // Children are released at 2, 4, 6, 8 and 10 minutes.
    tokio::time::sleep(Duration::from_secs(60)).await;
    let early = h.store.find_children(parent.id()).await.unwrap();
    assert!(early.is_empty());

    tokio::time::sleep(Duration::from_secs(61)).await;
    let first = h.store.find_children(parent.id()).await.unwrap();
    assert_eq!(first.len(), 1);

    tokio::time::sleep(Duration::from_secs(6 * 60)).await;
    let four = h.store.find_children(parent.id()).await.unwrap();
    assert_eq!(four.len(), 4);

    tokio::time::sleep(Duration::from_secs(2 * 60)).await;
    let children = h.store.find_children(parent.id()).await.unwrap();
    assert_eq!(children.len(), 5);
    for child in &children {
        assert_eq!(child.quantity_requested(), dec!(2));
        assert_eq!(child.parent_order_id(), Some(parent.id()));
        assert!(child.is_paper_trade());
        assert!(!child.is_algorithmic());
        assert_eq!(child.status(), OrderStatus::PendingSubmit);
        assert_eq!(child.venue(), &VenueName::new("cfd"));
    }

    let parent = h.orchestrator.get_order(parent.id()).await.unwrap();
    assert_eq!(parent.status(), OrderStatus::Accepted);
}

#[tokio::test(start_paused = true)]
async fn twap_stops_on_shutdown() {
    let venue = MockAdapter::new("cfd").with_quote("EURUSD", dec!(1.0999), dec!(1.1001));
    let h = Harness::new(vec![venue]).await;

    let parent = h
        .orchestrator
        .create_order(
            &user(),
            OrderIntent::market("auto", "EURUSD", OrderSide::Sell, dec!(10)).twap(10, 5),
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(150)).await;
    h.shutdown().await;
    tokio::time::sleep(Duration::from_secs(20 * 60)).await;

    let children = h.store.find_children(parent.id()).await.unwrap();
    assert_eq!(children.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn recovered_twap_with_broken_parameters_fails_loudly() {
    let venue = MockAdapter::new("cfd").with_quote("EURUSD", dec!(1.0999), dec!(1.1001));
    let h = Harness::new(vec![venue]).await;

    let valid = Order::new(
        OrderIntent::market("cfd", "EURUSD", OrderSide::Buy, dec!(10))
            .twap(10, 5)
            .into_command(user(), None),
        Utc::now(),
    )
    .unwrap();
    let mut snapshot = valid.snapshot().clone();
    TwapParams::new(10, 0).write_to(&mut snapshot.metadata);
    let broken = Order::reconstitute(snapshot);
    h.store
        .insert(&broken, NewAuditEntry::order_created(&broken))
        .await
        .unwrap();

    assert_eq!(h.orchestrator.recover_pending().await.unwrap(), 1);

    let failed = h.wait_for_status(broken.id(), OrderStatus::Error).await;
    assert!(failed.failure_reason().unwrap().starts_with("Unexpected error:"));
    assert_eq!(h.alerts.count(AlertLevel::Critical), 1);
    assert!(h.store.find_children(broken.id()).await.unwrap().is_empty());
}

// ============================================
// Cancellation
// ============================================

#[tokio::test]
async fn cancel_reaches_the_venue_for_working_orders() {
    let venue = MockAdapter::new("fix").with_quote("AAPL", dec!(189.9), dec!(190.1));
    let h = Harness::new(vec![venue.clone()]).await;
    h.start_worker();

    let order = h
        .orchestrator
        .create_order(
            &user(),
            OrderIntent::limit("fix", "AAPL", OrderSide::Buy, dec!(10), dec!(150)),
        )
        .await
        .unwrap();
    h.wait_for_status(order.id(), OrderStatus::Accepted).await;

    let canceled = h.orchestrator.cancel_order(order.id()).await.unwrap();
    assert_eq!(canceled.status(), OrderStatus::Canceled);
    assert_eq!(venue.cancel_count(), 1);

    let again = h.orchestrator.cancel_order(order.id()).await;
    assert!(matches!(again, Err(OrchestratorError::Validation(_))));
}

#[tokio::test]
async fn pending_orders_are_canceled_locally() {
    let venue = MockAdapter::new("fix").with_quote("AAPL", dec!(189.9), dec!(190.1));
    let h = Harness::new(vec![venue.clone()]).await;

    let order = h
        .orchestrator
        .create_order(&user(), OrderIntent::market("fix", "AAPL", OrderSide::Buy, dec!(1)))
        .await
        .unwrap();

    let canceled = h.orchestrator.cancel_order(order.id()).await.unwrap();
    assert_eq!(canceled.status(), OrderStatus::Canceled);
    assert_eq!(venue.cancel_count(), 0);

    // The queued delivery is now skipped.
    h.start_worker();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(venue.place_count(), 0);
}
