// ===============================
// src/dca.rs
// ===============================
//
// DCA position math. Cycle counts are derived from raw u64 amounts (exact
// integer ceil/floor/mod); everything shown to the user is a Decimal.
//
//   total      = ceil(deposited / per_cycle)
//   whole      = floor(used / per_cycle)
//   partial    = (used % per_cycle) / per_cycle
//   completed  = whole + partial
//   remaining  = total - completed
//
// per_cycle == 0 or used > deposited -> CycleError, position excluded.
//

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use thiserror::Error;
use tracing::warn;

use crate::config::TrackedToken;
use crate::decimals::{normalize, DecimalsInfo, MintLookup};
use crate::domain::{format_utc, DecodedDcaAccount, PriceMap, Side, TokenAggregate};
use crate::limit::{classify_mints, quote_value, round_quote};
use crate::metrics::CYCLE_ERRORS;

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum CycleError {
    #[error("in_amount_per_cycle is zero")]
    ZeroPerCycle,
    #[error("used {used} exceeds deposited {deposited}")]
    OverUsed { used: u64, deposited: u64 },
}

/// Inputs of the cycle calculator, raw units plus the decimals needed to
/// present them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DcaOrderState {
    pub address: String,
    pub input_mint: String,
    pub output_mint: String,
    pub deposited: u64,
    pub withdrawn: u64,
    pub used: u64,
    pub out_withdrawn: u64,
    pub per_cycle: u64,
    pub cycle_frequency: i64,
    pub next_cycle_at: i64,
    pub min_out: Option<u64>,
    pub max_out: Option<u64>,
    pub input: DecimalsInfo,
    pub output: DecimalsInfo,
}

impl DcaOrderState {
    pub fn from_account(acc: &DecodedDcaAccount, mints: &dyn MintLookup) -> Self {
        Self {
            address: acc.address.clone(),
            input_mint: acc.input_mint.clone(),
            output_mint: acc.output_mint.clone(),
            deposited: acc.in_deposited,
            withdrawn: acc.in_withdrawn,
            used: acc.in_used,
            out_withdrawn: acc.out_withdrawn,
            per_cycle: acc.in_amount_per_cycle,
            cycle_frequency: acc.cycle_frequency,
            next_cycle_at: acc.next_cycle_at,
            min_out: acc.min_out_amount,
            max_out: acc.max_out_amount,
            input: mints.decimals(&acc.input_mint),
            output: mints.decimals(&acc.output_mint),
        }
    }

    fn in_value(&self, raw: u64) -> Decimal { normalize(raw, self.input).value() }
    fn out_value(&self, raw: u64) -> Decimal { normalize(raw, self.output).value() }

    pub fn is_decimals_known(&self) -> bool { self.input.known && self.output.known }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleProgress {
    pub total: u64,
    pub whole: u64,
    pub partial: Decimal,
    pub completed: Decimal,
    pub remaining: Decimal,
    /// Raw input still to be spent in the cycle in progress.
    pub left_in_cycle: u64,
    /// Raw input covered by the remaining cycles: total * per_cycle - used.
    pub remaining_raw: u128,
}

pub fn cycle_progress(deposited: u64, used: u64, per_cycle: u64) -> Result<CycleProgress, CycleError> {
    if per_cycle == 0 {
        return Err(CycleError::ZeroPerCycle);
    }
    if used > deposited {
        return Err(CycleError::OverUsed { used, deposited });
    }
    let total = deposited.div_ceil(per_cycle);
    let whole = used / per_cycle;
    let rem = used % per_cycle;
    let partial = Decimal::from(rem) / Decimal::from(per_cycle);
    let completed = Decimal::from(whole) + partial;
    Ok(CycleProgress {
        total,
        whole,
        partial,
        completed,
        remaining: Decimal::from(total) - completed,
        left_in_cycle: per_cycle - rem,
        remaining_raw: total as u128 * per_cycle as u128 - used as u128,
    })
}

/// BUY-side price ceiling; serialized as a number or `"No limit"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxPrice {
    NoLimit,
    Price(Decimal),
}

impl Serialize for MaxPrice {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            MaxPrice::NoLimit => s.serialize_str("No limit"),
            MaxPrice::Price(p) => Serialize::serialize(p, s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionMetrics {
    pub total_cycles: u64,
    pub completed_whole_cycles: u64,
    pub partial_cycle: Decimal,
    pub completed_cycles: Decimal,
    pub remaining_cycles: Decimal,
    /// out_withdrawn / used; the current price until the first fill.
    pub execution_price: Decimal,
    pub executed: bool,
    pub remaining_in_cycle: Decimal,
    pub remaining_amount: Decimal,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_price: Option<MaxPrice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_price: Option<Decimal>,
    pub estimated_tokens: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DcaPosition {
    pub id: String,
    pub public_key: String,
    pub token: String,
    #[serde(rename = "type")]
    pub side: Side,
    pub input_token: String,
    pub output_token: String,
    pub input_amount: Decimal,
    pub amount_per_cycle: Decimal,
    pub total_amount: Decimal,
    pub cycle_frequency: i64,
    pub next_cycle_at: String,
    pub current_price: Decimal,
    pub target_price: Decimal,
    pub price_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_output: Option<Decimal>,
    pub is_decimal_known: bool,
    #[serde(flatten)]
    pub metrics: PositionMetrics,
}

pub fn compute_metrics(state: &DcaOrderState, side: Side, current_price: Decimal) -> Result<PositionMetrics, CycleError> {
    let cp = cycle_progress(state.deposited, state.used, state.per_cycle)?;
    let per_cycle = state.in_value(state.per_cycle);
    let in_scale = normalize(0, state.input).decimals() as u32;
    let remaining_amount = Decimal::from_i128_with_scale(cp.remaining_raw as i128, in_scale);

    let (execution_price, executed) = if state.used > 0 {
        let p = state.out_value(state.out_withdrawn).checked_div(state.in_value(state.used));
        (p.unwrap_or(current_price), true)
    } else {
        (current_price, false)
    };

    let (max_price, min_price, estimated_tokens) = match side {
        Side::Buy => {
            let max_price = match state.max_out {
                Some(max_out) => per_cycle
                    .checked_div(state.out_value(max_out))
                    .filter(|p| !p.is_zero())
                    .map_or(MaxPrice::NoLimit, MaxPrice::Price),
                None => MaxPrice::NoLimit,
            };
            let divisor = match max_price {
                MaxPrice::Price(p) => p,
                MaxPrice::NoLimit => current_price,
            };
            let est = if divisor > Decimal::ZERO { remaining_amount.checked_div(divisor) } else { None };
            (Some(max_price), None, est)
        }
        Side::Sell => {
            let min_price = state.min_out.and_then(|m| state.out_value(m).checked_div(per_cycle));
            let est = min_price.and_then(|p| remaining_amount.checked_mul(p));
            (None, min_price, est)
        }
    };

    Ok(PositionMetrics {
        total_cycles: cp.total,
        completed_whole_cycles: cp.whole,
        partial_cycle: cp.partial,
        completed_cycles: cp.completed,
        remaining_cycles: cp.remaining,
        execution_price,
        executed,
        remaining_in_cycle: state.in_value(cp.left_in_cycle),
        remaining_amount,
        is_active: state.used < state.deposited,
        max_price,
        min_price,
        estimated_tokens,
    })
}

pub fn compute_position(
    state: &DcaOrderState,
    token: &TrackedToken,
    side: Side,
    current_price: Decimal,
    quote_symbol: &str,
    mints: &dyn MintLookup,
) -> Result<DcaPosition, CycleError> {
    let metrics = compute_metrics(state, side, current_price)?;
    let per_cycle = state.in_value(state.per_cycle);
    let symbol_of = |mint: &str| mints.symbol(mint).unwrap_or("UNKNOWN").to_string();

    let estimated_output = match side {
        Side::Sell => per_cycle.checked_mul(metrics.execution_price),
        Side::Buy => None,
    };

    Ok(DcaPosition {
        id: state.address.clone(),
        public_key: state.address.clone(),
        token: token.symbol.clone(),
        side,
        input_token: symbol_of(&state.input_mint),
        output_token: symbol_of(&state.output_mint),
        input_amount: per_cycle,
        amount_per_cycle: per_cycle,
        total_amount: state.in_value(state.deposited.saturating_sub(state.withdrawn)),
        cycle_frequency: state.cycle_frequency,
        next_cycle_at: format_utc(state.next_cycle_at),
        current_price,
        target_price: metrics.execution_price,
        price_token: quote_symbol.to_string(),
        estimated_output,
        is_decimal_known: state.is_decimals_known(),
        metrics,
    })
}

/// Classify, compute and keep the active positions. Broken cycle configs
/// are logged and dropped.
pub fn build_positions(
    accounts: &[DecodedDcaAccount],
    tracked: &[TrackedToken],
    prices: &PriceMap,
    quote_symbol: &str,
    mints: &dyn MintLookup,
) -> Vec<DcaPosition> {
    let mut out = Vec::new();
    for acc in accounts {
        let Some((token, side)) = classify_mints(&acc.input_mint, &acc.output_mint, tracked) else {
            continue;
        };
        let price = prices.get(&token.symbol).copied().unwrap_or_default();
        let state = DcaOrderState::from_account(acc, mints);
        match compute_position(&state, token, side, price, quote_symbol, mints) {
            Ok(p) if p.metrics.is_active => out.push(p),
            Ok(_) => {}
            Err(e) => {
                warn!(address = %acc.address, error = %e, "skipping DCA account");
                CYCLE_ERRORS.inc();
            }
        }
    }
    out
}

/// Per-token DCA summary over active positions.
///
/// sell volume = deposited - withdrawn (token units); buy side is valued by
/// the input still committed to whole cycles, converted at the current price.
pub fn summarize_dca(
    positions: &[DcaPosition],
    tracked: &[TrackedToken],
    prices: &PriceMap,
) -> BTreeMap<String, TokenAggregate> {
    let mut out = BTreeMap::new();
    for t in tracked {
        let price = prices.get(&t.symbol).copied().unwrap_or_default();
        let mut agg = TokenAggregate::with_price(price);
        let mut buy_quote = Decimal::ZERO;

        for p in positions.iter().filter(|p| p.token == t.symbol && p.metrics.is_active) {
            match p.side {
                Side::Sell => {
                    agg.sell_orders += 1;
                    agg.sell_volume += p.total_amount;
                }
                Side::Buy => {
                    agg.buy_orders += 1;
                    let whole_left = p.metrics.total_cycles.saturating_sub(p.metrics.completed_whole_cycles);
                    if let Some(v) = Decimal::from(whole_left).checked_mul(p.amount_per_cycle) {
                        buy_quote += v;
                    }
                }
            }
        }

        agg.buy_volume_usdc = round_quote(buy_quote);
        agg.sell_volume_usdc = quote_value(agg.sell_volume, price);
        agg.buy_volume = if price > Decimal::ZERO {
            buy_quote.checked_div(price).map(round_quote).unwrap_or_default()
        } else {
            Decimal::ZERO
        };
        out.insert(t.symbol.clone(), agg);
    }
    out
}
