//! Smart Order Router and Venue Registry Integration Tests

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use rust_decimal_macros::dec;
use tokio_util::sync::CancellationToken;

use common::{Harness, MockAdapter};
use order_orchestrator::application::ports::{ConnectionStatus, ExchangeAdapter};
use order_orchestrator::application::services::RoutingError;
use order_orchestrator::domain::order_execution::OrderSide;
use order_orchestrator::domain::shared::VenueName;
use order_orchestrator::resilience::RetryConfig;

#[tokio::test]
async fn buy_takes_lowest_ask_and_sell_takes_highest_bid() {
    let cfd = MockAdapter::new("cfd").with_quote("ETHUSD", dec!(2995), dec!(3005));
    let spot = MockAdapter::new("spot").with_quote("ETHUSD", dec!(2990), dec!(3001));
    let fix = MockAdapter::new("fix").with_quote("ETHUSD", dec!(2998), dec!(3010));
    let h = Harness::new(vec![cfd, spot, fix]).await;

    let buy = h.router.get_best_quote("ETHUSD", OrderSide::Buy).await.unwrap();
    assert_eq!(buy.venue, VenueName::new("spot"));
    assert_eq!(buy.price, dec!(3001));

    let sell = h.router.get_best_quote("ETHUSD", OrderSide::Sell).await.unwrap();
    assert_eq!(sell.venue, VenueName::new("fix"));
    assert_eq!(sell.price, dec!(2998));
}

#[tokio::test]
async fn ties_go_to_the_first_registered_venue() {
    let cfd = MockAdapter::new("cfd").with_quote("ETHUSD", dec!(2999), dec!(3001));
    let spot = MockAdapter::new("spot").with_quote("ETHUSD", dec!(2999), dec!(3001));
    let h = Harness::new(vec![cfd, spot]).await;

    let buy = h.router.get_best_quote("ETHUSD", OrderSide::Buy).await.unwrap();
    assert_eq!(buy.venue, VenueName::new("cfd"));
    let sell = h.router.get_best_quote("ETHUSD", OrderSide::Sell).await.unwrap();
    assert_eq!(sell.venue, VenueName::new("cfd"));
}

#[tokio::test]
async fn disconnected_venues_are_not_quoted() {
    let cfd = MockAdapter::new("cfd").with_quote("ETHUSD", dec!(2999), dec!(3000));
    let spot = MockAdapter::new("spot").with_quote("ETHUSD", dec!(2999), dec!(3005));
    let h = Harness::new(vec![cfd.clone(), spot]).await;

    cfd.set_status(ConnectionStatus::Disconnected);

    let buy = h.router.get_best_quote("ETHUSD", OrderSide::Buy).await.unwrap();
    assert_eq!(buy.venue, VenueName::new("spot"));
    assert_eq!(cfd.tick_count(), 0);
    assert_eq!(h.registry.active_venues(), vec![VenueName::new("spot")]);
    assert_eq!(
        h.registry.configured_venues(),
        vec![VenueName::new("cfd"), VenueName::new("spot")]
    );
}

#[tokio::test]
async fn no_quote_anywhere_is_no_market() {
    let cfd = MockAdapter::new("cfd").with_quote("EURUSD", dec!(1.1), dec!(1.1001));
    let h = Harness::new(vec![cfd]).await;

    assert!(h.router.get_best_quote("DOGEUSD", OrderSide::Buy).await.is_none());

    let plan = h
        .router
        .generate_execution_plan("DOGEUSD", OrderSide::Buy, dec!(1))
        .await;
    assert!(matches!(plan, Err(RoutingError::NoMarket { .. })));
}

#[tokio::test]
async fn plan_sends_the_whole_quantity_to_the_best_venue() {
    let cfd = MockAdapter::new("cfd").with_quote("EURUSD", dec!(1.0999), dec!(1.1002));
    let spot = MockAdapter::new("spot").with_quote("EURUSD", dec!(1.0998), dec!(1.1001));
    let h = Harness::new(vec![cfd, spot]).await;

    let plan = h
        .router
        .generate_execution_plan("EURUSD", OrderSide::Buy, dec!(3))
        .await
        .unwrap();

    assert_eq!(plan.len(), 1);
    assert_eq!(plan[0].venue, VenueName::new("spot"));
    assert_eq!(plan[0].quantity, dec!(3));
    assert_eq!(plan[0].quantity_pct, dec!(100));
}

#[tokio::test]
async fn venue_lookup_is_case_insensitive() {
    let cfd = MockAdapter::new("cfd");
    let h = Harness::new(vec![cfd]).await;

    assert!(h.registry.get_adapter("CFD").is_some());
    assert!(h.registry.get_adapter("spot").is_none());
}

#[tokio::test(start_paused = true)]
async fn keeper_reconnects_dropped_venues() {
    let cfd = MockAdapter::new("cfd");
    cfd.set_fail_connect(true);
    let h = Harness::new(vec![cfd.clone()]).await;
    assert!(h.registry.active_venues().is_empty());

    let cancel = CancellationToken::new();
    let keeper = tokio::spawn(Arc::clone(&h.registry).run_connection_keeper(
        Duration::from_secs(1),
        RetryConfig::unlimited(Duration::from_secs(5), Duration::from_secs(60)),
        cancel.clone(),
    ));

    // First probe fails and schedules the next attempt 5s out.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(cfd.connect_calls.load(Ordering::SeqCst), 2);

    cfd.set_fail_connect(false);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(cfd.connect_calls.load(Ordering::SeqCst), 2);

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(cfd.status(), ConnectionStatus::Connected);
    assert_eq!(h.registry.active_venues(), vec![VenueName::new("cfd")]);

    cancel.cancel();
    keeper.await.unwrap();
}

#[tokio::test]
async fn shutdown_disconnects_everything() {
    let cfd = MockAdapter::new("cfd");
    let spot = MockAdapter::new("spot");
    let h = Harness::new(vec![cfd.clone(), spot.clone()]).await;
    assert_eq!(h.registry.active_venues().len(), 2);

    h.registry.shutdown_all().await;

    assert_eq!(cfd.status(), ConnectionStatus::Disconnected);
    assert_eq!(spot.status(), ConnectionStatus::Disconnected);
    assert!(h.registry.active_venues().is_empty());
}
