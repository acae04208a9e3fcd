// ===============================
// src/domain.rs
// ===============================
use ahash::AHashMap as HashMap;
use chrono::DateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side { Buy, Sell }
impl Side { pub fn as_str(&self) -> &'static str { match self { Side::Buy => "BUY", Side::Sell => "SELL" } } }

/// Tracked symbol -> reference price (quote units per token). 0 = unknown.
pub type PriceMap = HashMap<String, Decimal>;

/// Account as returned by getProgramAccounts (base64 already decoded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAccount { pub address: String, pub data: Vec<u8> }

/// Jupiter limit order account, raw integer amounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedLimitOrder {
    pub address: String,
    pub maker: String,
    pub input_mint: String,
    pub output_mint: String,
    pub input_token_program: String,
    pub output_token_program: String,
    pub input_mint_reserve: String,
    pub unique_id: u64,
    pub ori_making_amount: u64,
    pub ori_taking_amount: u64,
    pub making_amount: u64,
    pub taking_amount: u64,
    pub borrow_making_amount: u64,
    pub expired_at: Option<i64>,
    pub fee_bps: u16,
    pub fee_account: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub bump: u8,
}

/// Jupiter DCA account, raw integer amounts. Zero min/max out bounds decode as `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedDcaAccount {
    pub address: String,
    pub user: String,
    pub input_mint: String,
    pub output_mint: String,
    pub idx: u64,
    pub next_cycle_at: i64,
    pub in_deposited: u64,
    pub in_withdrawn: u64,
    pub out_withdrawn: u64,
    pub in_used: u64,
    pub out_received: u64,
    pub in_amount_per_cycle: u64,
    pub cycle_frequency: i64,
    pub next_cycle_amount_left: u64,
    pub in_account: String,
    pub out_account: String,
    pub min_out_amount: Option<u64>,
    pub max_out_amount: Option<u64>,
    pub keeper_in_balance_before_borrow: u64,
    pub dca_out_balance_before_swap: u64,
    pub created_at: i64,
    pub bump: u8,
}

/// Per tracked token, recomputed from scratch every poll.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenAggregate {
    pub buy_orders: u32,
    pub sell_orders: u32,
    pub buy_volume: Decimal,
    pub sell_volume: Decimal,
    #[serde(rename = "buyVolumeUSDC")]
    pub buy_volume_usdc: Decimal,
    #[serde(rename = "sellVolumeUSDC")]
    pub sell_volume_usdc: Decimal,
    pub price: Decimal,
}

impl TokenAggregate {
    pub fn with_price(price: Decimal) -> Self { Self { price, ..Default::default() } }
}

/// "January 5, 2025 03:04:05 +UTC"
pub fn format_utc(ts: i64) -> String {
    match DateTime::from_timestamp(ts, 0) {
        Some(dt) => format!("{} +UTC", dt.format("%B %-d, %Y %H:%M:%S")),
        None => format!("{ts} +UTC"),
    }
}
