// ===============================
// src/rpc.rs
// ===============================
//
// Minimal Solana JSON-RPC over reqwest: getProgramAccounts (dataSize +
// memcmp, base64) and getAccountInfo for SPL mint decimals.
//
// Retry: `attempts` tries in total, delay before try n+1 = base * n + jitter.
//

use std::future::Future;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::domain::RawAccount;
use crate::metrics::FETCH_RETRIES;

// SPL token mint: mint_authority COption<Pubkey>(36) + supply u64(8), then decimals
const MINT_DECIMALS_OFFSET: usize = 44;
const MINT_ACCOUNT_LEN: usize = 82;
// Token-2022 mints with extensions: base padded to the token account size,
// then an AccountType byte (1 = Mint)
const TOKEN_2022_ACCOUNT_TYPE_OFFSET: usize = 165;
const ACCOUNT_TYPE_MINT: u8 = 1;

const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
const TOKEN_2022_PROGRAM_ID: &str = "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb";

const MAX_JITTER_MS: u64 = 250;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("bad response: {0}")]
    BadResponse(String),
    #[error("{what} failed after {attempts} attempts: {last}")]
    Exhausted { what: &'static str, attempts: u32, last: Box<FetchError> },
}

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self { Self { attempts: 3, base_delay: Duration::from_millis(1000) } }
}

impl RetryPolicy {
    /// Delay after the `attempt`-th failure (1-based), without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    fn jitter(&self) -> Duration {
        let cap = (self.base_delay.as_millis() as u64 / 4).min(MAX_JITTER_MS);
        Duration::from_millis(rand::thread_rng().gen_range(0..=cap))
    }

    pub async fn run<T, F, Fut>(&self, what: &'static str, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if attempt >= attempts => {
                    return Err(FetchError::Exhausted { what, attempts: attempt, last: Box::new(e) });
                }
                Err(e) => {
                    let delay = self.backoff(attempt) + self.jitter();
                    warn!(what, attempt, error = %e, delay_ms = delay.as_millis() as u64, "fetch failed, retrying");
                    FETCH_RETRIES.with_label_values(&[what]).inc();
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Byte-equality filter on account data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemcmpFilter {
    pub offset: usize,
    pub bytes: String, // base58
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct KeyedAccount {
    pubkey: String,
    account: EncodedAccount,
}

#[derive(Deserialize)]
struct EncodedAccount {
    // [payload, encoding]
    data: (String, String),
    #[serde(default)]
    owner: String,
}

#[derive(Deserialize)]
struct AccountInfo {
    value: Option<EncodedAccount>,
}

fn decode_data(acc: &EncodedAccount) -> Result<Vec<u8>, FetchError> {
    let (payload, encoding) = &acc.data;
    if encoding != "base64" {
        return Err(FetchError::BadResponse(format!("unexpected encoding {encoding}")));
    }
    B64.decode(payload).map_err(|e| FetchError::BadResponse(format!("base64: {e}")))
}

pub fn program_accounts_params(program_id: &str, data_size: usize, filter: &MemcmpFilter) -> Value {
    json!([
        program_id,
        {
            "encoding": "base64",
            "commitment": "confirmed",
            "filters": [
                { "dataSize": data_size },
                { "memcmp": { "offset": filter.offset, "bytes": filter.bytes } }
            ]
        }
    ])
}

pub fn parse_program_accounts(result: Value) -> Result<Vec<RawAccount>, FetchError> {
    let keyed: Vec<KeyedAccount> =
        serde_json::from_value(result).map_err(|e| FetchError::BadResponse(e.to_string()))?;
    keyed
        .into_iter()
        .map(|k| Ok(RawAccount { data: decode_data(&k.account)?, address: k.pubkey }))
        .collect()
}

/// Decimals byte of an SPL mint. Anything that is not a mint owned by one of
/// the token programs (token accounts, other programs' data) gives `None`.
pub fn mint_decimals_from_data(owner: &str, data: &[u8]) -> Option<u8> {
    let is_mint = match owner {
        TOKEN_PROGRAM_ID => data.len() == MINT_ACCOUNT_LEN,
        TOKEN_2022_PROGRAM_ID => {
            data.len() == MINT_ACCOUNT_LEN
                || data.get(TOKEN_2022_ACCOUNT_TYPE_OFFSET) == Some(&ACCOUNT_TYPE_MINT)
        }
        _ => false,
    };
    if !is_mint {
        return None;
    }
    data.get(MINT_DECIMALS_OFFSET).copied()
}

#[derive(Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    url: String,
    retry: RetryPolicy,
}

impl RpcClient {
    pub fn new(url: &str, timeout: Duration, retry: RetryPolicy) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, url: url.to_string(), retry })
    }

    /// One JSON-RPC request, no retry.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, FetchError> {
        let body = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });
        let rsp = self.http.post(&self.url).json(&body).send().await?.error_for_status()?;
        let rsp: RpcResponse<T> = rsp.json().await?;
        if let Some(e) = rsp.error {
            return Err(FetchError::Rpc { code: e.code, message: e.message });
        }
        rsp.result.ok_or_else(|| FetchError::BadResponse(format!("{method}: no result")))
    }

    pub async fn get_program_accounts(
        &self,
        program_id: &str,
        data_size: usize,
        filter: &MemcmpFilter,
    ) -> Result<Vec<RawAccount>, FetchError> {
        let params = program_accounts_params(program_id, data_size, filter);
        let result: Value = self
            .retry
            .run("getProgramAccounts", || self.call("getProgramAccounts", params.clone()))
            .await?;
        let accounts = parse_program_accounts(result)?;
        debug!(program = program_id, offset = filter.offset, n = accounts.len(), "program accounts");
        Ok(accounts)
    }

    /// Decimals byte of an SPL mint; `None` if the account is missing or not a mint.
    pub async fn get_mint_decimals(&self, mint: &str) -> Result<Option<u8>, FetchError> {
        let info: AccountInfo = self.call("getAccountInfo", json!([mint, { "encoding": "base64" }])).await?;
        match info.value {
            Some(acc) => Ok(mint_decimals_from_data(&acc.owner, &decode_data(&acc)?)),
            None => Ok(None),
        }
    }
}
