// ===============================
// src/main.rs
// ===============================
/*
 RPC_URL=https://mainnet.helius-rpc.com/?api-key=... cargo run --release

 # satu kali poll, cetak snapshot JSON
 cargo run --release -- --once | jq '.limitSummary'

 # dashboard API
 curl -s localhost:9898/api/limit-orders | jq '.orders | length'
 curl -s localhost:9898/api/summary | jq '.limit'

 # metrics
 curl -s localhost:9898/metrics | egrep '^(polls_total|orders_open|decode_failures_total)'
*/
/*
=============================================================================
Project : jup_order_monitor — Jupiter limit-order & DCA monitor in Rust
Module  : main.rs
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
mod domain;
mod config;
mod metrics;
mod reader;     // cursor over account bytes
mod decoder;    // limit order + DCA layouts
mod decimals;
mod limit;
mod dca;
mod summary;
mod rpc;
mod price;
mod poller;
mod server;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::{
    select,
    sync::watch,
    time::{interval, MissedTickBehavior},
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::poller::Poller;
use crate::server::DashboardState;
use crate::summary::ChartWindow;

#[tokio::main]
async fn main() -> ExitCode {
    // ---- Logging ----
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ---- Load config ----
    let cli = config::Cli::parse();
    let args = match config::load() {
        Ok(a) => a,
        Err(e) => {
            error!(error = %e, "bad configuration");
            return ExitCode::FAILURE;
        }
    };

    // ---- Metrics ----
    metrics::init();

    // ---- Human-friendly startup info + export config to metrics ----
    let tracked: Vec<&str> = args.tracked.iter().map(|t| t.symbol.as_str()).collect();
    info!(
        tracked = ?tracked,
        limit_program = %args.limit_program_id,
        dca_program = %args.dca_program_id,
        poll_secs = args.poll_interval.as_secs(),
        retries = args.retry.attempts,
        http_port = args.http_port,
        "startup config"
    );
    for t in &args.tracked {
        metrics::CONFIG_TRACKED.with_label_values(&[t.symbol.as_str(), t.mint.as_str()]).set(t.decimals as i64);
    }

    let mut poller = match Poller::new(&args) {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "cannot build http clients");
            return ExitCode::FAILURE;
        }
    };

    // ---- One-shot mode ----
    if cli.once {
        return match poller.poll_once().await {
            Ok(snap) => match serde_json::to_string_pretty(&snap) {
                Ok(s) => {
                    println!("{s}");
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    error!(error = %e, "serialize snapshot");
                    ExitCode::FAILURE
                }
            },
            Err(e) => {
                error!(error = %e, "poll failed");
                ExitCode::FAILURE
            }
        };
    }

    // ---- Dashboard / metrics server ----
    let (state_tx, state_rx) = watch::channel(DashboardState::default());
    let port = args.http_port;
    tokio::spawn(async move {
        if let Err(e) = server::serve(port, state_rx).await {
            error!(error = %e, port, "http server stopped");
        }
    });

    // ---- Poll loop ----
    // Skip: a slow poll delays the next one instead of stacking them up.
    let mut ticker = interval(args.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut chart = ChartWindow::new(args.chart_window);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        select! {
            _ = ticker.tick() => {
                match poller.poll_once().await {
                    Ok(snap) => {
                        chart.push(&snap.chart_point);
                        let chart = Arc::new(chart.clone());
                        state_tx.send_modify(|s| {
                            s.snapshot = Some(Arc::new(snap));
                            s.chart = Some(chart);
                            s.last_error = None;
                        });
                    }
                    Err(e) => {
                        // keep the previous snapshot on screen
                        warn!(error = %e, "poll failed, keeping last snapshot");
                        state_tx.send_modify(|s| s.last_error = Some(e.to_string()));
                    }
                }
            }
            _ = &mut shutdown => {
                info!("shutdown");
                break;
            }
        }
    }
    ExitCode::SUCCESS
}
