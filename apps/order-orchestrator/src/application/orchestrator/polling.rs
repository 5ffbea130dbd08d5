//! Order status polling.
//!
//! Venues that answer over request/response never push fills for resting
//! orders. Their working orders are queried on an interval and every change is
//! turned into an execution report on the shared channel, so the fill listener
//! applies polled and pushed reports the same way.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::order_orchestrator::OrderOrchestrator;
use crate::application::ports::{
    ExecutionReport, ExecutionReportKind, ExecutionReportSender, VenueOrderPhase, VenueOrderState,
};
use crate::domain::order_execution::{Order, OrderStatus};
use crate::domain::shared::OrderId;

/// Local statuses of live orders still working at a venue.
const WORKING: [OrderStatus; 2] = [OrderStatus::Accepted, OrderStatus::PartiallyFilled];

/// What earlier passes already put on the channel.
#[derive(Debug, Default)]
struct PollCursor {
    /// Cumulative quantity covered by emitted fill reports.
    reported_fills: HashMap<OrderId, Decimal>,
    /// Orders whose closing report was emitted.
    closed: HashSet<OrderId>,
}

impl PollCursor {
    /// An order is settled when nothing emitted for it is still in flight.
    fn is_settled(&self, order: &Order) -> bool {
        !self.closed.contains(order.id())
            && self
                .reported_fills
                .get(order.id())
                .is_none_or(|reported| *reported <= order.quantity_filled())
    }

    fn record(&mut self, order: &Order, report: &ExecutionReport) {
        match report.kind {
            ExecutionReportKind::Fill { quantity, .. } => {
                self.reported_fills
                    .insert(order.id().clone(), order.quantity_filled() + quantity);
            }
            _ => {
                self.closed.insert(order.id().clone());
            }
        }
    }

    fn retain(&mut self, working: &HashSet<OrderId>) {
        self.reported_fills.retain(|id, _| working.contains(id));
        self.closed.retain(|id| working.contains(id));
    }
}

impl OrderOrchestrator {
    /// Poll working live orders at venues that do not push execution reports
    /// and send what changed into `reports` until `cancel` fires.
    pub async fn run_order_status_poller(
        self: Arc<Self>,
        interval: Duration,
        reports: ExecutionReportSender,
        cancel: CancellationToken,
    ) {
        info!(interval_ms = interval.as_millis(), "Order status poller started");
        let mut cursor = PollCursor::default();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let emitted = self.poll_working_orders(&reports, &mut cursor).await;
            if emitted > 0 {
                debug!(emitted, "Order status poll produced reports");
            }
            if reports.is_closed() {
                warn!("Execution report channel closed");
                break;
            }
        }
        info!("Order status poller stopped");
    }

    /// One pass over the working orders. Returns how many reports were sent.
    async fn poll_working_orders(
        &self,
        reports: &ExecutionReportSender,
        cursor: &mut PollCursor,
    ) -> usize {
        let mut emitted = 0;
        let mut working = HashSet::new();

        for status in WORKING {
            let orders = match self.orders.find_by_status(status).await {
                Ok(orders) => orders,
                Err(e) => {
                    warn!(status = %status, error = %e, "Could not load working orders");
                    continue;
                }
            };

            for order in orders
                .iter()
                .filter(|o| !o.is_paper_trade() && !o.is_algorithmic())
            {
                working.insert(order.id().clone());
                let Some(exchange_order_id) = order.exchange_order_id() else {
                    continue;
                };
                // Disconnected venues are picked up again on a later pass.
                let Ok(adapter) = self.market.adapter(order.venue().as_str()) else {
                    continue;
                };
                if adapter.pushes_execution_reports() || !cursor.is_settled(order) {
                    continue;
                }

                let state = match self
                    .market
                    .get_order_state(order.venue().as_str(), exchange_order_id, order.symbol())
                    .await
                {
                    Ok(Some(state)) => state,
                    Ok(None) => {
                        warn!(
                            order_id = %order.id(),
                            venue = %order.venue(),
                            exchange_order_id,
                            "Venue does not know working order"
                        );
                        continue;
                    }
                    Err(e) => {
                        warn!(
                            order_id = %order.id(),
                            venue = %order.venue(),
                            error = %e,
                            "Order status query failed"
                        );
                        continue;
                    }
                };

                for report in reports_from_state(order, exchange_order_id, &state) {
                    cursor.record(order, &report);
                    if reports.send(report).is_err() {
                        return emitted;
                    }
                    emitted += 1;
                }
            }
        }

        cursor.retain(&working);
        emitted
    }
}

/// Reports that bring `order` in line with the venue's view of it.
fn reports_from_state(
    order: &Order,
    exchange_order_id: &str,
    state: &VenueOrderState,
) -> Vec<ExecutionReport> {
    let report = |kind: ExecutionReportKind| ExecutionReport {
        venue: order.venue().clone(),
        exchange_order_id: exchange_order_id.to_string(),
        client_order_id: Some(order.id().clone()),
        kind,
        time: state.updated_at,
    };
    let mut out = Vec::new();

    let new_quantity = state.filled_quantity - order.quantity_filled();
    if new_quantity > Decimal::ZERO {
        match incremental_price(order, state, new_quantity) {
            Some(price) => out.push(report(ExecutionReportKind::Fill {
                quantity: new_quantity,
                price,
            })),
            None => warn!(
                order_id = %order.id(),
                exchange_order_id,
                "Venue reports an execution without a price"
            ),
        }
    }

    match state.phase {
        VenueOrderPhase::Working | VenueOrderPhase::Done => {}
        VenueOrderPhase::Canceled => out.push(report(ExecutionReportKind::Canceled)),
        VenueOrderPhase::Expired => out.push(report(ExecutionReportKind::Expired)),
        VenueOrderPhase::Rejected => out.push(report(ExecutionReportKind::Rejected {
            reason: state
                .reason
                .clone()
                .unwrap_or_else(|| "Rejected by venue".to_string()),
        })),
    }
    out
}

/// Price of the executions not yet recorded locally, backed out of the venue's
/// cumulative average.
fn incremental_price(
    order: &Order,
    state: &VenueOrderState,
    new_quantity: Decimal,
) -> Option<Decimal> {
    let cumulative = state.average_price?;
    let recorded = order.quantity_filled();
    let Some(recorded_price) = order
        .average_fill_price()
        .filter(|_| recorded > Decimal::ZERO)
    else {
        return Some(cumulative);
    };
    let price = (cumulative * state.filled_quantity - recorded_price * recorded) / new_quantity;
    Some(if price > Decimal::ZERO { price } else { cumulative })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use serde_json::Map;

    use super::*;
    use crate::domain::order_execution::{CreateOrderCommand, OrderSide, OrderType};
    use crate::domain::shared::{UserId, VenueName};

    fn working_order() -> Order {
        let mut order = Order::new(
            CreateOrderCommand {
                user_id: UserId::new("trader"),
                venue: VenueName::new("spot"),
                symbol: "BTCUSDT".to_string(),
                order_type: OrderType::Limit,
                side: OrderSide::Buy,
                quantity: dec!(4),
                price: Some(dec!(100)),
                is_paper_trade: false,
                is_algorithmic: false,
                parent_order_id: None,
                metadata: Map::new(),
            },
            Utc::now(),
        )
        .unwrap();
        order.submit(Utc::now()).unwrap();
        order.accept(Some("42".to_string())).unwrap();
        order
    }

    fn state(phase: VenueOrderPhase, filled: Decimal, average: Option<Decimal>) -> VenueOrderState {
        VenueOrderState {
            exchange_order_id: "42".to_string(),
            phase,
            filled_quantity: filled,
            average_price: average,
            reason: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn unchanged_working_order_yields_nothing() {
        let order = working_order();
        let reports =
            reports_from_state(&order, "42", &state(VenueOrderPhase::Working, dec!(0), None));
        assert!(reports.is_empty());
    }

    #[test]
    fn new_execution_becomes_a_fill_for_the_difference() {
        let mut order = working_order();
        order.apply_fill(dec!(1), dec!(100), Utc::now()).unwrap();

        // Venue now has 3 filled at an average of 101: the 2 new ones cost 101.5.
        let reports = reports_from_state(
            &order,
            "42",
            &state(VenueOrderPhase::Working, dec!(3), Some(dec!(101))),
        );
        assert_eq!(reports.len(), 1);
        assert_eq!(
            reports[0].kind,
            ExecutionReportKind::Fill {
                quantity: dec!(2),
                price: dec!(101.5)
            }
        );
        assert_eq!(reports[0].client_order_id.as_ref(), Some(order.id()));
    }

    #[test]
    fn cancel_after_partial_execution_reports_both_in_order() {
        let order = working_order();
        let reports = reports_from_state(
            &order,
            "42",
            &state(VenueOrderPhase::Canceled, dec!(1), Some(dec!(99))),
        );
        assert_eq!(reports.len(), 2);
        assert!(matches!(reports[0].kind, ExecutionReportKind::Fill { .. }));
        assert_eq!(reports[1].kind, ExecutionReportKind::Canceled);
    }

    #[test]
    fn rejection_without_text_gets_a_default_reason() {
        let order = working_order();
        let reports =
            reports_from_state(&order, "42", &state(VenueOrderPhase::Rejected, dec!(0), None));
        assert_eq!(
            reports[0].kind,
            ExecutionReportKind::Rejected {
                reason: "Rejected by venue".to_string()
            }
        );
    }

    #[test]
    fn cursor_holds_orders_with_reports_in_flight() {
        let order = working_order();
        let mut cursor = PollCursor::default();
        assert!(cursor.is_settled(&order));

        let reports = reports_from_state(
            &order,
            "42",
            &state(VenueOrderPhase::Working, dec!(2), Some(dec!(100))),
        );
        cursor.record(&order, &reports[0]);
        assert!(!cursor.is_settled(&order));

        let mut applied = order.clone();
        applied.apply_fill(dec!(2), dec!(100), Utc::now()).unwrap();
        assert!(cursor.is_settled(&applied));

        cursor.retain(&HashSet::new());
        assert!(cursor.reported_fills.is_empty());
    }
}
