// ===============================
// src/limit.rs
// ===============================
//
// Limit orders: classify (token + BUY/SELL), aggregate per token, and build
// the rows the dashboard renders.
//
// Classification:
//   tracked token is the output mint -> BUY
//   tracked token is the input mint  -> SELL
//   both tracked                     -> output mint wins (BUY of the output token)
//   neither                          -> dropped
//

use std::collections::BTreeMap;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::config::TrackedToken;
use crate::decimals::{DecimalsInfo, MintLookup};
use crate::domain::{format_utc, DecodedLimitOrder, PriceMap, Side, TokenAggregate};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedOrder {
    pub order: DecodedLimitOrder,
    pub token: String,
    pub side: Side,
}

pub fn classify_mints<'t>(
    input_mint: &str,
    output_mint: &str,
    tracked: &'t [TrackedToken],
) -> Option<(&'t TrackedToken, Side)> {
    if let Some(t) = tracked.iter().find(|t| t.mint == output_mint) {
        return Some((t, Side::Buy));
    }
    tracked.iter().find(|t| t.mint == input_mint).map(|t| (t, Side::Sell))
}

pub fn classify(order: DecodedLimitOrder, tracked: &[TrackedToken]) -> Option<ClassifiedOrder> {
    let (token, side) = classify_mints(&order.input_mint, &order.output_mint, tracked)?;
    let token = token.symbol.clone();
    Some(ClassifiedOrder { order, token, side })
}

pub fn classify_all(orders: Vec<DecodedLimitOrder>, tracked: &[TrackedToken]) -> Vec<ClassifiedOrder> {
    orders.into_iter().filter_map(|o| classify(o, tracked)).collect()
}

/// Nearest whole quote unit, halves away from zero.
pub fn round_quote(v: Decimal) -> Decimal {
    v.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

/// `native * price`, rounded; 0 when the price is unknown.
pub fn quote_value(native: Decimal, price: Decimal) -> Decimal {
    if price <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    native.checked_mul(price).map(round_quote).unwrap_or(Decimal::ZERO)
}

/// Amount of the tracked token the order moves, in its own units.
fn tracked_volume(o: &ClassifiedOrder, mints: &dyn MintLookup) -> Decimal {
    match o.side {
        Side::Sell => mints.amount(&o.order.input_mint, o.order.making_amount).value(),
        Side::Buy => mints.amount(&o.order.output_mint, o.order.taking_amount).value(),
    }
}

/// Per-token totals over the open orders. Filled and expired accounts still
/// get a dashboard row but add nothing here.
pub fn aggregate_limit_orders(
    orders: &[ClassifiedOrder],
    tracked: &[TrackedToken],
    prices: &PriceMap,
    mints: &dyn MintLookup,
    now: i64,
) -> BTreeMap<String, TokenAggregate> {
    let mut out: BTreeMap<String, TokenAggregate> = tracked
        .iter()
        .map(|t| {
            let price = prices.get(&t.symbol).copied().unwrap_or_default();
            (t.symbol.clone(), TokenAggregate::with_price(price))
        })
        .collect();

    for o in orders.iter().filter(|o| status(&o.order, now) == "open") {
        let Some(agg) = out.get_mut(&o.token) else { continue };
        let vol = tracked_volume(o, mints);
        match o.side {
            Side::Buy => {
                agg.buy_orders += 1;
                agg.buy_volume += vol;
            }
            Side::Sell => {
                agg.sell_orders += 1;
                agg.sell_volume += vol;
            }
        }
    }

    for agg in out.values_mut() {
        agg.buy_volume_usdc = quote_value(agg.buy_volume, agg.price);
        agg.sell_volume_usdc = quote_value(agg.sell_volume, agg.price);
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub address: String,
    pub symbol: String,
    pub decimals: u8,
    pub is_decimal_known: bool,
}

impl TokenInfo {
    fn resolve(mint: &str, mints: &dyn MintLookup) -> Self {
        let DecimalsInfo { decimals, known } = mints.decimals(mint);
        Self {
            address: mint.to_string(),
            symbol: mints.symbol(mint).unwrap_or("UNKNOWN").to_string(),
            decimals,
            is_decimal_known: known,
        }
    }
}

/// One dashboard row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitOrderView {
    pub id: String,
    pub maker: String,
    pub input_mint: TokenInfo,
    pub output_mint: TokenInfo,
    pub making_amount: Decimal,
    pub taking_amount: Decimal,
    pub ori_making_amount: Decimal,
    pub ori_taking_amount: Decimal,
    pub borrow_making_amount: Decimal,
    pub status: &'static str,
    pub created_at: String,
    pub updated_at: String,
    pub expired_at: String,
    pub token_type: String,
    pub order_type: Side,
    pub fee_bps: u16,
    pub fee_account: String,
    pub bump: u8,
    pub input_token_program: String,
    pub output_token_program: String,
    pub input_mint_reserve: String,
    pub unique_id: String,
    /// Limit price of the tracked token in the counter token. `None` = price unknown.
    pub price: Option<Decimal>,
    #[serde(skip)]
    pub created_ts: i64,
}

fn status(o: &DecodedLimitOrder, now: i64) -> &'static str {
    if o.making_amount == 0 {
        "filled"
    } else if o.expired_at.is_some_and(|ts| ts <= now) {
        "expired"
    } else {
        "open"
    }
}

fn limit_price(side: Side, making: Decimal, taking: Decimal) -> Option<Decimal> {
    // SELL: tracked in, counter out -> taking/making; BUY the other way round
    let (num, den) = match side {
        Side::Sell => (taking, making),
        Side::Buy => (making, taking),
    };
    if den.is_zero() {
        return None;
    }
    num.checked_div(den)
}

pub fn build_view(o: &ClassifiedOrder, mints: &dyn MintLookup, now: i64) -> LimitOrderView {
    let d = &o.order;
    let input = TokenInfo::resolve(&d.input_mint, mints);
    let output = TokenInfo::resolve(&d.output_mint, mints);
    let making = mints.amount(&d.input_mint, d.making_amount).value();
    let taking = mints.amount(&d.output_mint, d.taking_amount).value();

    let price = if input.is_decimal_known && output.is_decimal_known {
        limit_price(o.side, making, taking)
    } else {
        None
    };

    LimitOrderView {
        id: d.address.clone(),
        maker: d.maker.clone(),
        making_amount: making,
        taking_amount: taking,
        ori_making_amount: mints.amount(&d.input_mint, d.ori_making_amount).value(),
        ori_taking_amount: mints.amount(&d.output_mint, d.ori_taking_amount).value(),
        borrow_making_amount: mints.amount(&d.input_mint, d.borrow_making_amount).value(),
        input_mint: input,
        output_mint: output,
        status: status(d, now),
        created_at: format_utc(d.created_at),
        updated_at: format_utc(d.updated_at),
        expired_at: d.expired_at.map(format_utc).unwrap_or_else(|| "None".to_string()),
        token_type: o.token.clone(),
        order_type: o.side,
        fee_bps: d.fee_bps,
        fee_account: d.fee_account.clone(),
        bump: d.bump,
        input_token_program: d.input_token_program.clone(),
        output_token_program: d.output_token_program.clone(),
        input_mint_reserve: d.input_mint_reserve.clone(),
        unique_id: d.unique_id.to_string(),
        price,
        created_ts: d.created_at,
    }
}

/// BUY rows first, newest first within a side.
pub fn build_views(orders: &[ClassifiedOrder], mints: &dyn MintLookup, now: i64) -> Vec<LimitOrderView> {
    let mut rows: Vec<LimitOrderView> = orders.iter().map(|o| build_view(o, mints, now)).collect();
    rows.sort_by(|a, b| {
        let rank = |s: Side| match s { Side::Buy => 0, Side::Sell => 1 };
        rank(a.order_type)
            .cmp(&rank(b.order_type))
            .then(b.created_ts.cmp(&a.created_ts))
    });
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimals::TokenRegistry;
    use std::str::FromStr;

    const CHAOS: &str = "8SgNwESovnbG1oNEaPVhg6CR9mTMSK7jPvcYRe3wpump";
    const LOGOS: &str = "HJUfqXoYjC653f2p33i84zdCC3jc4EuVnbruSe5kpump";
    const USDC: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
    const SOL: &str = "So11111111111111111111111111111111111111112";
    const MYSTERY: &str = "Mystery111111111111111111111111111111111111";

    fn dec(s: &str) -> Decimal { Decimal::from_str(s).unwrap() }

    fn tracked() -> Vec<TrackedToken> {
        vec![
            TrackedToken { symbol: "CHAOS".into(), mint: CHAOS.into(), decimals: 6 },
            TrackedToken { symbol: "LOGOS".into(), mint: LOGOS.into(), decimals: 6 },
        ]
    }

    fn order(addr: &str, input: &str, output: &str, making: u64, taking: u64, created: i64) -> DecodedLimitOrder {
        DecodedLimitOrder {
            address: addr.into(),
            maker: "Maker".into(),
            input_mint: input.into(),
            output_mint: output.into(),
            input_token_program: "Tok".into(),
            output_token_program: "Tok".into(),
            input_mint_reserve: "Res".into(),
            unique_id: 1,
            ori_making_amount: making,
            ori_taking_amount: taking,
            making_amount: making,
            taking_amount: taking,
            borrow_making_amount: 0,
            expired_at: None,
            fee_bps: 0,
            fee_account: "Fee".into(),
            created_at: created,
            updated_at: created,
            bump: 1,
        }
    }

    #[test]
    fn classification_by_mint_position() {
        let t = tracked();
        let buy = classify(order("a", USDC, CHAOS, 1, 1, 0), &t).unwrap();
        assert_eq!((buy.token.as_str(), buy.side), ("CHAOS", Side::Buy));

        let sell = classify(order("b", LOGOS, SOL, 1, 1, 0), &t).unwrap();
        assert_eq!((sell.token.as_str(), sell.side), ("LOGOS", Side::Sell));

        assert!(classify(order("c", USDC, SOL, 1, 1, 0), &t).is_none());

        // token-to-token: output mint decides
        let both = classify(order("d", CHAOS, LOGOS, 1, 1, 0), &t).unwrap();
        assert_eq!((both.token.as_str(), both.side), ("LOGOS", Side::Buy));
    }

    #[test]
    fn classification_is_exclusive() {
        let t = tracked();
        let mints = [CHAOS, LOGOS, USDC, SOL];
        for i in mints {
            for o in mints {
                if i == o {
                    continue;
                }
                let tracked_count = [i, o].iter().filter(|m| **m == CHAOS || **m == LOGOS).count();
                let got = classify(order("x", i, o, 1, 1, 0), &t);
                match tracked_count {
                    0 => assert!(got.is_none()),
                    _ => {
                        let c = got.unwrap();
                        let expect_side = if o == CHAOS || o == LOGOS { Side::Buy } else { Side::Sell };
                        assert_eq!(c.side, expect_side);
                    }
                }
            }
        }
    }

    #[test]
    fn aggregates_counts_and_volumes() {
        let t = tracked();
        let reg = TokenRegistry::with_known_tokens();
        let orders = classify_all(
            vec![
                // buy 200 CHAOS for 4 USDC
                order("a", USDC, CHAOS, 4_000_000, 200_000_000, 10),
                // buy 100.5 CHAOS
                order("b", USDC, CHAOS, 2_000_000, 100_500_000, 20),
                // sell 50 CHAOS
                order("c", CHAOS, USDC, 50_000_000, 1_000_000, 30),
                // untracked, ignored
                order("d", USDC, SOL, 1, 1, 40),
            ],
            &t,
        );
        assert_eq!(orders.len(), 3);

        let mut prices = PriceMap::new();
        prices.insert("CHAOS".into(), dec("0.02"));
        let agg = aggregate_limit_orders(&orders, &t, &prices, &reg, 1_000);

        let chaos = &agg["CHAOS"];
        assert_eq!(chaos.buy_orders, 2);
        assert_eq!(chaos.sell_orders, 1);
        assert_eq!(chaos.buy_volume, dec("300.5"));
        assert_eq!(chaos.sell_volume, dec("50"));
        // 300.5 * 0.02 = 6.01 -> 6 ; 50 * 0.02 = 1
        assert_eq!(chaos.buy_volume_usdc, dec("6"));
        assert_eq!(chaos.sell_volume_usdc, dec("1"));
        assert_eq!(chaos.price, dec("0.02"));

        let logos = &agg["LOGOS"];
        assert_eq!((logos.buy_orders, logos.sell_orders), (0, 0));
        assert_eq!(logos.price, Decimal::ZERO);
    }

    #[test]
    fn unknown_price_reports_native_only() {
        let t = tracked();
        let reg = TokenRegistry::with_known_tokens();
        let orders = classify_all(vec![order("a", LOGOS, USDC, 7_000_000, 1, 0)], &t);
        let agg = aggregate_limit_orders(&orders, &t, &PriceMap::new(), &reg, 1_000);
        assert_eq!(agg["LOGOS"].sell_volume, dec("7"));
        assert_eq!(agg["LOGOS"].sell_volume_usdc, Decimal::ZERO);
    }

    #[test]
    fn quote_rounding_is_half_away_from_zero() {
        assert_eq!(quote_value(dec("2.5"), dec("1")), dec("3"));
        assert_eq!(quote_value(dec("2.49"), dec("1")), dec("2"));
        assert_eq!(quote_value(dec("10"), Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn views_carry_prices_and_sort_buys_first() {
        let t = tracked();
        let reg = TokenRegistry::with_known_tokens();
        let orders = classify_all(
            vec![
                order("sell", CHAOS, USDC, 50_000_000, 1_000_000, 300),
                order("buy-old", USDC, CHAOS, 4_000_000, 200_000_000, 100),
                order("buy-new", USDC, CHAOS, 1_000_000, 100_000_000, 200),
            ],
            &t,
        );
        let rows = build_views(&orders, &reg, 1_000);
        let ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["buy-new", "buy-old", "sell"]);

        // 4 USDC for 200 CHAOS -> 0.02 USDC per CHAOS
        assert_eq!(rows[1].price, Some(dec("0.02")));
        // 50 CHAOS for 1 USDC -> 0.02
        assert_eq!(rows[2].price, Some(dec("0.02")));
        assert_eq!(rows[2].input_mint.symbol, "CHAOS");
        assert_eq!(rows[2].expired_at, "None");
        assert_eq!(rows[2].status, "open");
        assert_eq!(rows[2].making_amount, dec("50"));
    }

    #[test]
    fn unknown_counter_decimals_hide_the_price() {
        let t = tracked();
        let reg = TokenRegistry::with_known_tokens();
        let orders = classify_all(vec![order("a", MYSTERY, CHAOS, 5_000_000, 10_000_000, 0)], &t);
        let row = &build_views(&orders, &reg, 0)[0];
        assert!(!row.input_mint.is_decimal_known);
        assert_eq!(row.input_mint.symbol, "UNKNOWN");
        assert_eq!(row.input_mint.decimals, 6);
        assert_eq!(row.price, None);

        let json = serde_json::to_value(row).unwrap();
        assert!(json["price"].is_null());
        assert_eq!(json["orderType"], "BUY");
        assert!(json.get("createdTs").is_none());
    }

    #[test]
    fn expired_and_filled_orders_stay_out_of_totals() {
        let t = tracked();
        let reg = TokenRegistry::with_known_tokens();
        let mut expired = order("exp", USDC, CHAOS, 4_000_000, 200_000_000, 10);
        expired.expired_at = Some(500);
        let filled = order("done", CHAOS, USDC, 0, 1_000_000, 20);
        let open = order("open", USDC, CHAOS, 2_000_000, 100_000_000, 30);
        let orders = classify_all(vec![expired, filled, open], &t);

        let agg = aggregate_limit_orders(&orders, &t, &PriceMap::new(), &reg, 1_000);
        let chaos = &agg["CHAOS"];
        assert_eq!((chaos.buy_orders, chaos.sell_orders), (1, 0));
        assert_eq!(chaos.buy_volume, dec("100"));

        let rows = build_views(&orders, &reg, 1_000);
        let statuses: Vec<_> = rows.iter().map(|r| (r.id.as_str(), r.status)).collect();
        assert!(statuses.contains(&("exp", "expired")));
        assert!(statuses.contains(&("done", "filled")));
    }

    #[test]
    fn out_of_range_decimals_never_yield_a_price() {
        use crate::decimals::{DecimalsCache, MintView};
        use std::time::{Duration, Instant};

        let t = tracked();
        let reg = TokenRegistry::with_known_tokens();
        let now = Instant::now();
        let mut cache = DecimalsCache::new(Duration::from_secs(60));
        cache.insert("WeirdMint", 40, now);
        let view = MintView { registry: &reg, cache: &cache, now };

        let orders = classify_all(vec![order("w", "WeirdMint", CHAOS, 4_000_000, 200_000_000, 0)], &t);
        let row = build_view(&orders[0], &view, 0);
        assert_eq!(row.input_mint.decimals, 6);
        assert!(!row.input_mint.is_decimal_known);
        assert_eq!(row.price, None);
    }

    #[test]
    fn status_reflects_fill_and_expiry() {
        let mut o = order("a", USDC, CHAOS, 1, 1, 0);
        assert_eq!(status(&o, 100), "open");
        o.expired_at = Some(50);
        assert_eq!(status(&o, 100), "expired");
        o.making_amount = 0;
        assert_eq!(status(&o, 100), "filled");
    }
}
