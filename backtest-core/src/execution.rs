//! Converts resting Orders into Fills. MKT orders fill at the next base-interval
//! bar's open; MOC orders fill at the close of the last interval of the trading
//! day. No partial fills — an order either fills in full or stays queued.

use crate::commission::CommissionModel;
use crate::domain::{Bar, Direction, Event, OrderId, OrderType};
use crate::slippage::SlippageModel;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
struct PendingOrder {
    id: OrderId,
    symbol: String,
    direction: Direction,
    quantity: u64,
}

#[derive(Debug, Default)]
pub struct ExecutionHandler {
    pending_mkt: Vec<PendingOrder>,
    pending_moc: Vec<PendingOrder>,
}

impl ExecutionHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit(&mut self, id: OrderId, symbol: String, order_type: OrderType, direction: Direction, quantity: u64) {
        let order = PendingOrder {
            id,
            symbol,
            direction,
            quantity,
        };
        match order_type {
            OrderType::Market => self.pending_mkt.push(order),
            OrderType::MarketOnClose => self.pending_moc.push(order),
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending_mkt.is_empty() || !self.pending_moc.is_empty()
    }

    /// Fill every MKT order resting for `bar.symbol` at this bar's open.
    /// Called at the start of processing a new bar, before its market event.
    pub fn drain_mkt_fills(
        &mut self,
        bar: &Bar,
        commission: &CommissionModel,
        slippage: &mut dyn SlippageModel,
    ) -> Vec<Event> {
        let (matched, rest): (Vec<_>, Vec<_>) =
            self.pending_mkt.drain(..).partition(|o| o.symbol == bar.symbol);
        self.pending_mkt = rest;
        matched
            .into_iter()
            .map(|order| fill_order(order, bar.open, bar.timestamp, commission, slippage))
            .collect()
    }

    /// Fill every MOC order resting for `bar.symbol` if this bar closes the
    /// trading day; otherwise they remain queued for a later close.
    pub fn drain_moc_fills(
        &mut self,
        bar: &Bar,
        is_last_interval_of_day: bool,
        commission: &CommissionModel,
        slippage: &mut dyn SlippageModel,
    ) -> Vec<Event> {
        if !is_last_interval_of_day {
            return Vec::new();
        }
        let (matched, rest): (Vec<_>, Vec<_>) =
            self.pending_moc.drain(..).partition(|o| o.symbol == bar.symbol);
        self.pending_moc = rest;
        matched
            .into_iter()
            .map(|order| fill_order(order, bar.close, bar.timestamp, commission, slippage))
            .collect()
    }
}

fn fill_order(
    order: PendingOrder,
    ref_price: f64,
    ts: DateTime<Utc>,
    commission: &CommissionModel,
    slippage: &mut dyn SlippageModel,
) -> Event {
    let estimate = slippage.estimate(&order.symbol, order.direction, order.quantity);
    let slippage_cost = order.direction.sign() * estimate.slippage_frac * ref_price;
    let fill_price = ref_price + slippage_cost;
    let commission_cost = commission.compute(order.quantity, fill_price);

    Event::Fill {
        order_id: order.id,
        symbol: order.symbol,
        direction: order.direction,
        quantity: order.quantity,
        fill_price,
        commission: commission_cost,
        slippage: slippage_cost,
        slippage_fallback: estimate.fallback_triggered,
        ts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Interval;
    use crate::slippage::NoSlippage;

    fn bar(open: f64, close: f64) -> Bar {
        Bar {
            symbol: "AAPL".into(),
            interval: Interval::Days(1),
            timestamp: Utc::now(),
            open,
            high: open.max(close),
            low: open.min(close),
            close,
            volume: 1000.0,
        }
    }

    fn free_commission() -> CommissionModel {
        CommissionModel {
            per_share: 0.0,
            per_trade: 0.0,
            bps: 0.0,
        }
    }

    #[test]
    fn mkt_order_fills_at_next_bar_open() {
        let mut handler = ExecutionHandler::new();
        handler.submit(OrderId(0), "AAPL".into(), OrderType::Market, Direction::Buy, 5);

        let mut slippage = NoSlippage;
        let fills = handler.drain_mkt_fills(&bar(101.0, 103.0), &free_commission(), &mut slippage);
        assert_eq!(fills.len(), 1);
        match &fills[0] {
            Event::Fill { fill_price, quantity, .. } => {
                assert_eq!(*fill_price, 101.0);
                assert_eq!(*quantity, 5);
            }
            _ => panic!("expected a fill event"),
        }
    }

    #[test]
    fn moc_order_waits_until_day_close() {
        let mut handler = ExecutionHandler::new();
        handler.submit(OrderId(1), "AAPL".into(), OrderType::MarketOnClose, Direction::Sell, 3);

        let mut slippage = NoSlippage;
        let no_fills = handler.drain_moc_fills(&bar(100.0, 102.0), false, &free_commission(), &mut slippage);
        assert!(no_fills.is_empty());
        assert!(handler.has_pending());

        let fills = handler.drain_moc_fills(&bar(100.0, 102.0), true, &free_commission(), &mut slippage);
        assert_eq!(fills.len(), 1);
        assert!(!handler.has_pending());
    }

    #[test]
    fn unrelated_symbols_are_not_matched() {
        let mut handler = ExecutionHandler::new();
        handler.submit(OrderId(2), "MSFT".into(), OrderType::Market, Direction::Buy, 1);
        let mut slippage = NoSlippage;
        let fills = handler.drain_mkt_fills(&bar(10.0, 11.0), &free_commission(), &mut slippage);
        assert!(fills.is_empty());
        assert!(handler.has_pending());
    }
}
