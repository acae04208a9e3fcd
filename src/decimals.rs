// ===============================
// src/decimals.rs
// ===============================
//
// Raw integer amounts -> human decimals.
//
// Resolution order for a mint's decimals:
//   1) static registry (well-known mints + configured tracked tokens)
//   2) DecimalsCache (filled from on-chain mint accounts, TTL bound)
//   3) fallback 6 with known=false
//
// known=false must reach the dashboard; callers show "price unknown" then.
//

use std::time::{Duration, Instant};

use ahash::AHashMap as HashMap;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

/// Stablecoin convention; used only when nothing better is known.
pub const FALLBACK_DECIMALS: u8 = 6;

// rust_decimal scale limit
const MAX_DECIMALS: u8 = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecimalsInfo {
    pub decimals: u8,
    pub known: bool,
}

impl DecimalsInfo {
    pub fn known(decimals: u8) -> Self { Self { decimals, known: true } }
    pub fn fallback() -> Self { Self { decimals: FALLBACK_DECIMALS, known: false } }

    /// Decimals reported by a registry or the chain. Out of range means
    /// fallback, so every consumer sees the same answer.
    pub fn resolved(decimals: u8) -> Self {
        if decimals > MAX_DECIMALS {
            tracing::warn!(decimals, "decimals out of range, using fallback");
            return Self::fallback();
        }
        Self::known(decimals)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenAmount {
    raw: u64,
    decimals: u8,
    is_decimals_known: bool,
}

impl TokenAmount {
    pub fn decimals(&self) -> u8 { self.decimals }
    pub fn is_decimals_known(&self) -> bool { self.is_decimals_known }

    /// raw / 10^decimals, exact.
    pub fn value(&self) -> Decimal {
        Decimal::from_i128_with_scale(self.raw as i128, self.decimals as u32)
    }

    /// Inverse of `value()`; `None` if the value has more precision than `decimals` allows.
    #[cfg(test)]
    pub fn rescale(value: Decimal, decimals: u8) -> Option<u64> {
        let scaled = value.checked_mul(Decimal::from(10u64.checked_pow(decimals as u32)?))?;
        if scaled.fract() != Decimal::ZERO {
            return None;
        }
        scaled.to_u64()
    }
}

pub fn normalize(raw: u64, info: DecimalsInfo) -> TokenAmount {
    if info.decimals > MAX_DECIMALS {
        return TokenAmount { raw, decimals: FALLBACK_DECIMALS, is_decimals_known: false };
    }
    TokenAmount { raw, decimals: info.decimals, is_decimals_known: info.known }
}

/// Anything that can answer "what are this mint's decimals / symbol".
pub trait MintLookup {
    fn decimals(&self, mint: &str) -> DecimalsInfo;
    fn symbol(&self, mint: &str) -> Option<&str>;

    fn amount(&self, mint: &str, raw: u64) -> TokenAmount {
        normalize(raw, self.decimals(mint))
    }
}

pub struct KnownToken {
    pub symbol: &'static str,
    pub mint: &'static str,
    pub decimals: u8,
}

pub const KNOWN_TOKENS: &[KnownToken] = &[
    KnownToken { symbol: "CHAOS", mint: "8SgNwESovnbG1oNEaPVhg6CR9mTMSK7jPvcYRe3wpump", decimals: 6 },
    KnownToken { symbol: "LOGOS", mint: "HJUfqXoYjC653f2p33i84zdCC3jc4EuVnbruSe5kpump", decimals: 6 },
    KnownToken { symbol: "USDC", mint: "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v", decimals: 6 },
    KnownToken { symbol: "USDT", mint: "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB", decimals: 6 },
    KnownToken { symbol: "SOL", mint: "So11111111111111111111111111111111111111112", decimals: 9 },
    KnownToken { symbol: "BONK", mint: "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263", decimals: 5 },
    KnownToken { symbol: "RAY", mint: "4k3Dyjzvzp8eMZWUXbBCjEvwSkkk59S5iCNLY3QrkX6R", decimals: 6 },
    KnownToken { symbol: "MSOL", mint: "mSoLzYCxHdYgdzU16g5QSh3i5K3z3KZK7ytfqcJm7So", decimals: 9 },
    KnownToken { symbol: "JitoSOL", mint: "J1toso1uCk3RLmjorhTtrVwY9HJ7X8V9yYac6Y7kGCPn", decimals: 9 },
];

pub fn known_token(symbol: &str) -> Option<&'static KnownToken> {
    KNOWN_TOKENS.iter().find(|t| t.symbol.eq_ignore_ascii_case(symbol))
}

/// Static mint table. Configured tracked tokens override the built-ins.
#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    by_mint: HashMap<String, (String, u8)>,
}

impl TokenRegistry {
    pub fn with_known_tokens() -> Self {
        let mut reg = Self::default();
        for t in KNOWN_TOKENS {
            reg.insert(t.symbol, t.mint, t.decimals);
        }
        reg
    }

    pub fn insert(&mut self, symbol: &str, mint: &str, decimals: u8) {
        self.by_mint.insert(mint.to_string(), (symbol.to_string(), decimals));
    }

    pub fn contains(&self, mint: &str) -> bool { self.by_mint.contains_key(mint) }
}

impl MintLookup for TokenRegistry {
    fn decimals(&self, mint: &str) -> DecimalsInfo {
        self.by_mint.get(mint).map(|(_, d)| DecimalsInfo::resolved(*d)).unwrap_or_else(DecimalsInfo::fallback)
    }

    fn symbol(&self, mint: &str) -> Option<&str> {
        self.by_mint.get(mint).map(|(s, _)| s.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    decimals: u8,
    stored_at: Instant,
}

/// Decimals read from chain, keyed by mint. Owned by the poller; `now` is
/// always passed in so tests control expiry.
#[derive(Debug, Clone)]
pub struct DecimalsCache {
    ttl: Duration,
    entries: HashMap<String, CacheEntry>,
}

impl DecimalsCache {
    pub fn new(ttl: Duration) -> Self { Self { ttl, entries: HashMap::new() } }

    pub fn get(&self, mint: &str, now: Instant) -> Option<u8> {
        self.entries
            .get(mint)
            .filter(|e| now.saturating_duration_since(e.stored_at) < self.ttl)
            .map(|e| e.decimals)
    }

    pub fn insert(&mut self, mint: &str, decimals: u8, now: Instant) {
        self.entries.insert(mint.to_string(), CacheEntry { decimals, stored_at: now });
    }

    /// Drops expired entries, returns how many were removed.
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, e| now.saturating_duration_since(e.stored_at) < ttl);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize { self.entries.len() }
}

/// Registry first, then the cache, then fallback.
pub struct MintView<'a> {
    pub registry: &'a TokenRegistry,
    pub cache: &'a DecimalsCache,
    pub now: Instant,
}

impl MintLookup for MintView<'_> {
    fn decimals(&self, mint: &str) -> DecimalsInfo {
        if self.registry.contains(mint) {
            return self.registry.decimals(mint);
        }
        match self.cache.get(mint, self.now) {
            Some(d) => DecimalsInfo::resolved(d),
            None => DecimalsInfo::fallback(),
        }
    }

    fn symbol(&self, mint: &str) -> Option<&str> { self.registry.symbol(mint) }
}
