// ===============================
// src/summary.rs
// ===============================
//
// One poll -> one Snapshot. The chart window is owned by the caller and only
// ever receives the per-token point of the newest snapshot.
//

use std::collections::{BTreeMap, VecDeque};

use rust_decimal::Decimal;
use serde::Serialize;

use crate::config::TrackedToken;
use crate::dca::{build_positions, summarize_dca, DcaPosition};
use crate::decimals::MintLookup;
use crate::domain::{format_utc, DecodedDcaAccount, DecodedLimitOrder, PriceMap, TokenAggregate};
use crate::limit::{aggregate_limit_orders, build_views, classify_all, LimitOrderView};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartPoint {
    /// unix millis
    pub timestamp: i64,
    pub buy_volume: Decimal,
    pub sell_volume: Decimal,
    pub buy_orders: u32,
    pub sell_orders: u32,
    pub limit_order_volume: Decimal,
    pub dca_volume: Decimal,
    pub average_price: Decimal,
}

impl ChartPoint {
    /// Limit + DCA aggregates of one token at `timestamp`.
    pub fn fold(timestamp: i64, limit: &TokenAggregate, dca: &TokenAggregate) -> Self {
        let price = if limit.price > Decimal::ZERO { limit.price } else { dca.price };
        Self {
            timestamp,
            buy_volume: limit.buy_volume + dca.buy_volume,
            sell_volume: limit.sell_volume + dca.sell_volume,
            buy_orders: limit.buy_orders + dca.buy_orders,
            sell_orders: limit.sell_orders + dca.sell_orders,
            limit_order_volume: limit.buy_volume + limit.sell_volume,
            dca_volume: dca.buy_volume + dca.sell_volume,
            average_price: price,
        }
    }
}

pub fn chart_points(
    timestamp: i64,
    limit: &BTreeMap<String, TokenAggregate>,
    dca: &BTreeMap<String, TokenAggregate>,
) -> BTreeMap<String, ChartPoint> {
    let empty = TokenAggregate::default();
    limit
        .keys()
        .chain(dca.keys())
        .map(|token| {
            let l = limit.get(token).unwrap_or(&empty);
            let d = dca.get(token).unwrap_or(&empty);
            (token.clone(), ChartPoint::fold(timestamp, l, d))
        })
        .collect()
}

/// Rolling per-token series, oldest first.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct ChartWindow {
    #[serde(skip)]
    cap: usize,
    series: BTreeMap<String, VecDeque<ChartPoint>>,
}

impl ChartWindow {
    pub fn new(cap: usize) -> Self {
        Self { cap: cap.max(1), series: BTreeMap::new() }
    }

    pub fn push(&mut self, points: &BTreeMap<String, ChartPoint>) {
        let cap = self.cap;
        for (token, p) in points {
            let win = self
                .series
                .entry(token.clone())
                .or_insert_with(|| VecDeque::with_capacity(cap.min(64)));
            if win.len() == cap {
                win.pop_front();
            }
            win.push_back(p.clone());
        }
    }

    #[cfg(test)]
    pub fn series(&self, token: &str) -> Option<&VecDeque<ChartPoint>> { self.series.get(token) }

    #[cfg(test)]
    pub fn len(&self, token: &str) -> usize { self.series.get(token).map_or(0, |s| s.len()) }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(skip)]
    pub taken_at: i64,
    pub last_update: String,
    pub limit_orders: Vec<LimitOrderView>,
    pub dca_positions: Vec<DcaPosition>,
    pub limit_summary: BTreeMap<String, TokenAggregate>,
    pub dca_summary: BTreeMap<String, TokenAggregate>,
    pub chart_point: BTreeMap<String, ChartPoint>,
}

pub struct SnapshotInput<'a> {
    pub limit_orders: Vec<DecodedLimitOrder>,
    pub dca_accounts: &'a [DecodedDcaAccount],
    pub tracked: &'a [TrackedToken],
    pub prices: &'a PriceMap,
    pub quote_symbol: &'a str,
    /// unix seconds
    pub now: i64,
}

impl Snapshot {
    pub fn build(input: SnapshotInput<'_>, mints: &dyn MintLookup) -> Self {
        let SnapshotInput { limit_orders, dca_accounts, tracked, prices, quote_symbol, now } = input;

        let classified = classify_all(limit_orders, tracked);
        let limit_summary = aggregate_limit_orders(&classified, tracked, prices, mints, now);
        let limit_orders = build_views(&classified, mints, now);

        let dca_positions = build_positions(dca_accounts, tracked, prices, quote_symbol, mints);
        let dca_summary = summarize_dca(&dca_positions, tracked, prices);

        let chart_point = chart_points(now.saturating_mul(1000), &limit_summary, &dca_summary);

        Self {
            taken_at: now,
            last_update: format_utc(now),
            limit_orders,
            dca_positions,
            limit_summary,
            dca_summary,
            chart_point,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimals::TokenRegistry;
    use crate::decoder::{decode_dca_account, decode_limit_order, fixtures};
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal { Decimal::from_str(s).unwrap() }

    fn agg(buy: &str, sell: &str, bo: u32, so: u32, price: &str) -> TokenAggregate {
        TokenAggregate {
            buy_orders: bo,
            sell_orders: so,
            buy_volume: dec(buy),
            sell_volume: dec(sell),
            price: dec(price),
            ..Default::default()
        }
    }

    #[test]
    fn fold_adds_limit_and_dca() {
        let p = ChartPoint::fold(1_000, &agg("10", "5", 2, 1, "0.5"), &agg("3", "7", 1, 4, "0.5"));
        assert_eq!(p.buy_volume, dec("13"));
        assert_eq!(p.sell_volume, dec("12"));
        assert_eq!((p.buy_orders, p.sell_orders), (3, 5));
        assert_eq!(p.limit_order_volume, dec("15"));
        assert_eq!(p.dca_volume, dec("10"));
        assert_eq!(p.average_price, dec("0.5"));
    }

    #[test]
    fn window_is_bounded_per_token() {
        let mut w = ChartWindow::new(3);
        for ts in 0..5 {
            let mut m = BTreeMap::new();
            m.insert("CHAOS".to_string(), ChartPoint::fold(ts, &TokenAggregate::default(), &TokenAggregate::default()));
            if ts % 2 == 0 {
                m.insert("LOGOS".to_string(), ChartPoint::fold(ts, &TokenAggregate::default(), &TokenAggregate::default()));
            }
            w.push(&m);
        }
        assert_eq!(w.len("CHAOS"), 3);
        assert_eq!(w.len("LOGOS"), 3);
        let ts: Vec<i64> = w.series("CHAOS").unwrap().iter().map(|p| p.timestamp).collect();
        assert_eq!(ts, vec![2, 3, 4]);
        assert_eq!(w.len("NOPE"), 0);

        let json = serde_json::to_value(&w).unwrap();
        assert_eq!(json["LOGOS"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn snapshot_from_decoded_fixtures() {
        let tracked = vec![TrackedToken { symbol: "TOKA".into(), mint: fixtures::b58(3), decimals: 6 }];
        let mut reg = TokenRegistry::with_known_tokens();
        reg.insert("QUOTE", &fixtures::b58(2), 6);
        reg.insert("TOKA", &fixtures::b58(3), 6);

        // USDC-like mint(2) -> TOKA mint(3): BUY 200 TOKA for 4 QUOTE
        let lo = decode_limit_order("Lo1", &fixtures::LimitFixture::default().encode()).unwrap();
        let dca = decode_dca_account("Dca1", &fixtures::DcaFixture::default().encode()).unwrap();

        let mut prices = PriceMap::new();
        prices.insert("TOKA".into(), dec("0.02"));
        let snap = Snapshot::build(
            SnapshotInput {
                limit_orders: vec![lo],
                dca_accounts: &[dca],
                tracked: &tracked,
                prices: &prices,
                quote_symbol: "USDC",
                now: 1_736_046_245,
            },
            &reg,
        );

        assert_eq!(snap.last_update, "January 5, 2025 03:04:05 +UTC");
        assert_eq!(snap.limit_orders.len(), 1);
        assert_eq!(snap.limit_summary["TOKA"].buy_volume, dec("200"));
        assert_eq!(snap.limit_summary["TOKA"].buy_volume_usdc, dec("4"));
        assert_eq!(snap.dca_positions.len(), 1);
        assert_eq!(snap.dca_summary["TOKA"].buy_orders, 1);

        let point = &snap.chart_point["TOKA"];
        assert_eq!(point.timestamp, 1_736_046_245_000);
        assert_eq!(point.buy_orders, 2);
        assert_eq!(point.limit_order_volume, dec("200"));
    }
}
