// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : jup_order_monitor — Jupiter limit-order & DCA monitor in Rust
Module  : config.rs
Version : 0.1.0
Author  : Kukuh Tripamungkas Wicaksono (Kukuh TW)
Email   : kukuhtw@gmail.com
WhatsApp: https://wa.me/628129893706
LinkedIn: https://id.linkedin.com/in/kukuhtw
License : MIT (see LICENSE)

Summary : Polls Solana RPC for Jupiter limit-order and DCA accounts touching
          the tracked tokens, decodes the raw account layouts, derives DCA
          positions and per-token buy/sell aggregates, serves them as JSON
          and exposes Prometheus metrics.

(c) 2025 Kukuh TW. All rights reserved where applicable.
=============================================================================
*/
use std::env;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use dotenvy::dotenv;
use thiserror::Error;

use crate::decimals::known_token;
use crate::rpc::RetryPolicy;

pub const DEFAULT_TRACKED: &str = "CHAOS:8SgNwESovnbG1oNEaPVhg6CR9mTMSK7jPvcYRe3wpump:6,\
LOGOS:HJUfqXoYjC653f2p33i84zdCC3jc4EuVnbruSe5kpump:6";
pub const DEFAULT_LIMIT_PROGRAM_ID: &str = "j1o2qRpjcyUwEvwtcfhEQefh773ZgjxcVRry7LDqg5X";
pub const DEFAULT_DCA_PROGRAM_ID: &str = "DCA265Vj8a9CEuX1eb1LWRnDT7uK6q1xMipnNyatn23M";
pub const DEFAULT_PRICE_API_URL: &str = "https://api.jup.ag/price/v2";

#[derive(Debug, Parser)]
#[command(name = "jup_order_monitor", version, about = "Jupiter limit-order & DCA monitor")]
pub struct Cli {
    /// Run a single poll, print the snapshot as JSON and exit
    #[arg(long)]
    pub once: bool,
}

/// Token yang dipantau (mint + decimals yang sudah pasti)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackedToken {
    pub symbol: String,
    pub mint: String,
    pub decimals: u8,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("RPC_URL (or HELIUS_RPC_URL) is not set")]
    MissingRpcUrl,
    #[error("bad TRACKED_TOKENS entry {0:?} (want SYMBOL:mint[:decimals])")]
    BadTrackedToken(String),
    #[error("mint {0} is not a 32-byte base58 key")]
    BadMint(String),
    #[error("mint {0} is tracked twice")]
    DuplicateMint(String),
    #[error("TRACKED_TOKENS is empty")]
    NoTrackedTokens,
}

#[derive(Clone, Debug)]
pub struct Args {
    // endpoints
    pub rpc_url: String,
    pub price_api_url: String,
    pub rpc_timeout: Duration,

    // programs & tokens
    pub limit_program_id: String,
    pub dca_program_id: String,
    pub tracked: Vec<TrackedToken>,
    pub quote_symbol: String, // price token, USDC by default

    // polling
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
    pub decimals_ttl: Duration,
    pub chart_window: usize,

    // http
    pub http_port: u16,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

fn is_pubkey(s: &str) -> bool {
    bs58::decode(s).into_vec().map(|v| v.len() == 32).unwrap_or(false)
}

/// `SYMBOL:mint[:decimals]`, comma separated. Decimals may be omitted only
/// for mints in the built-in table.
pub fn parse_tracked(raw: &str) -> Result<Vec<TrackedToken>, ConfigError> {
    let mut out: Vec<TrackedToken> = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
        let (symbol, mint) = match parts.as_slice() {
            [s, m] | [s, m, _] if !s.is_empty() => (s.to_string(), m.to_string()),
            _ => return Err(ConfigError::BadTrackedToken(entry.to_string())),
        };
        if !is_pubkey(&mint) {
            return Err(ConfigError::BadMint(mint));
        }
        let decimals = match parts.get(2) {
            Some(d) => d.parse::<u8>().map_err(|_| ConfigError::BadTrackedToken(entry.to_string()))?,
            None => known_token(&symbol)
                .filter(|t| t.mint == mint)
                .map(|t| t.decimals)
                .ok_or_else(|| ConfigError::BadTrackedToken(entry.to_string()))?,
        };
        if out.iter().any(|t| t.mint == mint) {
            return Err(ConfigError::DuplicateMint(mint));
        }
        out.push(TrackedToken { symbol: symbol.to_ascii_uppercase(), mint, decimals });
    }
    if out.is_empty() {
        return Err(ConfigError::NoTrackedTokens);
    }
    Ok(out)
}

pub fn load() -> Result<Args, ConfigError> {
    // .env optional
    let _ = dotenv();

    let rpc_url = env::var("RPC_URL")
        .or_else(|_| env::var("HELIUS_RPC_URL"))
        .map_err(|_| ConfigError::MissingRpcUrl)?;
    let price_api_url = env::var("PRICE_API_URL").unwrap_or_else(|_| DEFAULT_PRICE_API_URL.to_string());
    let rpc_timeout = Duration::from_secs(env_or("RPC_TIMEOUT_SECS", 20u64).max(1));

    let limit_program_id = env::var("LIMIT_PROGRAM_ID").unwrap_or_else(|_| DEFAULT_LIMIT_PROGRAM_ID.to_string());
    let dca_program_id = env::var("DCA_PROGRAM_ID").unwrap_or_else(|_| DEFAULT_DCA_PROGRAM_ID.to_string());
    let tracked = parse_tracked(&env::var("TRACKED_TOKENS").unwrap_or_else(|_| DEFAULT_TRACKED.to_string()))?;
    let quote_symbol = env::var("QUOTE_SYMBOL").unwrap_or_else(|_| "USDC".to_string());

    // ===== Polling =====
    let poll_interval = Duration::from_secs(env_or("POLL_INTERVAL_SECS", 5u64).max(1));
    let retry = RetryPolicy {
        attempts: env_or("FETCH_RETRIES", 3u32).max(1),
        base_delay: Duration::from_millis(env_or("RETRY_BASE_MS", 1000u64)),
    };
    let decimals_ttl = Duration::from_secs(env_or("DECIMALS_CACHE_TTL_SECS", 3600u64));
    let chart_window = env_or("CHART_WINDOW", 720usize).max(1);

    let http_port = env_or("HTTP_PORT", 9898u16);

    Ok(Args {
        rpc_url,
        price_api_url,
        rpc_timeout,
        limit_program_id,
        dca_program_id,
        tracked,
        quote_symbol,
        poll_interval,
        retry,
        decimals_ttl,
        chart_window,
        http_port,
    })
}
