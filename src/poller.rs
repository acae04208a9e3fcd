// ===============================
// src/poller.rs
// ===============================
//
// One poll = fetch everything (joined, all-or-nothing) -> decode -> resolve
// decimals of unseen mints -> Snapshot. Only one poll runs at a time; the
// caller owns the loop.
//
// Fetch fan-out per program: tracked tokens x {inputMint@40, outputMint@72}.
// An order touching two tracked tokens shows up in two result sets, so the
// batches are deduplicated by address.
//

use std::time::Instant;

use ahash::AHashSet as HashSet;
use futures_util::future::{join_all, try_join_all};
use tracing::{info, warn};

use crate::config::{Args, TrackedToken};
use crate::decimals::{DecimalsCache, MintView, TokenRegistry};
use crate::decoder::{
    decode_all, decode_dca_account, decode_limit_order, DCA_ACCOUNT_SIZE, INPUT_MINT_OFFSET, LIMIT_ORDER_SIZE,
    OUTPUT_MINT_OFFSET,
};
use crate::domain::{DecodedDcaAccount, DecodedLimitOrder, RawAccount};
use crate::metrics::{self, POLLS, POLL_LATENCY};
use crate::price::PriceClient;
use crate::rpc::{FetchError, MemcmpFilter, RpcClient};
use crate::summary::{Snapshot, SnapshotInput};

pub struct Poller {
    rpc: RpcClient,
    prices: PriceClient,
    registry: TokenRegistry,
    cache: DecimalsCache,
    limit_program_id: String,
    dca_program_id: String,
    tracked: Vec<TrackedToken>,
    quote_symbol: String,
}

pub fn mint_filters(tracked: &[TrackedToken]) -> Vec<MemcmpFilter> {
    tracked
        .iter()
        .flat_map(|t| {
            [INPUT_MINT_OFFSET, OUTPUT_MINT_OFFSET]
                .into_iter()
                .map(move |offset| MemcmpFilter { offset, bytes: t.mint.clone() })
        })
        .collect()
}

/// Flatten filter results, first occurrence of an address wins.
pub fn dedupe(batches: Vec<Vec<RawAccount>>) -> Vec<RawAccount> {
    let mut seen = HashSet::new();
    batches
        .into_iter()
        .flatten()
        .filter(|a| seen.insert(a.address.clone()))
        .collect()
}

/// Mints referenced by the orders whose decimals are neither in the registry
/// nor freshly cached.
pub fn unresolved_mints(
    limit: &[DecodedLimitOrder],
    dca: &[DecodedDcaAccount],
    registry: &TokenRegistry,
    cache: &DecimalsCache,
    now: Instant,
) -> Vec<String> {
    let mut seen = HashSet::new();
    limit
        .iter()
        .flat_map(|o| [&o.input_mint, &o.output_mint])
        .chain(dca.iter().flat_map(|d| [&d.input_mint, &d.output_mint]))
        .filter(|m| !registry.contains(m) && cache.get(m, now).is_none())
        .filter(|m| seen.insert((*m).clone()))
        .cloned()
        .collect()
}

impl Poller {
    pub fn new(args: &Args) -> Result<Self, FetchError> {
        let mut registry = TokenRegistry::with_known_tokens();
        for t in &args.tracked {
            registry.insert(&t.symbol, &t.mint, t.decimals);
        }
        Ok(Self {
            rpc: RpcClient::new(&args.rpc_url, args.rpc_timeout, args.retry.clone())?,
            prices: PriceClient::new(&args.price_api_url, args.rpc_timeout, args.retry.clone())?,
            registry,
            cache: DecimalsCache::new(args.decimals_ttl),
            limit_program_id: args.limit_program_id.clone(),
            dca_program_id: args.dca_program_id.clone(),
            tracked: args.tracked.clone(),
            quote_symbol: args.quote_symbol.clone(),
        })
    }

    async fn fetch_program(&self, program_id: &str, data_size: usize) -> Result<Vec<RawAccount>, FetchError> {
        let filters = mint_filters(&self.tracked);
        let batches =
            try_join_all(filters.iter().map(|f| self.rpc.get_program_accounts(program_id, data_size, f))).await?;
        Ok(dedupe(batches))
    }

    /// Reads decimals of unseen mints from chain. A failed lookup leaves the
    /// mint unknown for this poll.
    async fn resolve_decimals(&mut self, limit: &[DecodedLimitOrder], dca: &[DecodedDcaAccount]) {
        let now = Instant::now();
        self.cache.purge_expired(now);
        let mints = unresolved_mints(limit, dca, &self.registry, &self.cache, now);
        if mints.is_empty() {
            return;
        }
        let rpc = &self.rpc;
        let results = join_all(mints.iter().map(|m| rpc.get_mint_decimals(m))).await;
        for (mint, res) in mints.iter().zip(results) {
            match res {
                Ok(Some(d)) => self.cache.insert(mint, d, now),
                Ok(None) => warn!(%mint, "not a mint account, decimals unknown"),
                Err(e) => warn!(%mint, error = %e, "mint decimals lookup failed"),
            }
        }
    }

    async fn collect(&mut self) -> Result<Snapshot, FetchError> {
        let (limit_raw, dca_raw, prices) = tokio::try_join!(
            self.fetch_program(&self.limit_program_id, LIMIT_ORDER_SIZE),
            self.fetch_program(&self.dca_program_id, DCA_ACCOUNT_SIZE),
            self.prices.fetch(&self.tracked),
        )?;

        let limit = decode_all(&limit_raw, "limit", decode_limit_order);
        let dca = decode_all(&dca_raw, "dca", decode_dca_account);
        self.resolve_decimals(&limit, &dca).await;

        let view = MintView { registry: &self.registry, cache: &self.cache, now: Instant::now() };
        let snap = Snapshot::build(
            SnapshotInput {
                limit_orders: limit,
                dca_accounts: &dca,
                tracked: &self.tracked,
                prices: &prices,
                quote_symbol: &self.quote_symbol,
                now: chrono::Utc::now().timestamp(),
            },
            &view,
        );
        info!(
            limit_accounts = limit_raw.len(),
            limit_orders = snap.limit_orders.len(),
            dca_accounts = dca_raw.len(),
            dca_positions = snap.dca_positions.len(),
            cached_mints = self.cache.len(),
            "poll done"
        );
        Ok(snap)
    }

    pub async fn poll_once(&mut self) -> Result<Snapshot, FetchError> {
        let t0 = Instant::now();
        let res = self.collect().await;
        POLL_LATENCY.observe(t0.elapsed().as_secs_f64() * 1000.0);
        match &res {
            Ok(snap) => {
                POLLS.with_label_values(&["ok"]).inc();
                metrics::record_snapshot(snap);
            }
            Err(_) => POLLS.with_label_values(&["error"]).inc(),
        }
        res
    }
}
