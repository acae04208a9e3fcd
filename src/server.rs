// ===============================
// src/server.rs
// ===============================
//
// Dashboard JSON + Prometheus text over hyper 0.14. Handlers only read the
// latest DashboardState from the watch channel; they never trigger a poll.
//
//   GET /, /metrics        -> prometheus text
//   GET /api/limit-orders  -> {lastUpdate, orders}
//   GET /api/dca           -> {orders}
//   GET /api/summary       -> {lastUpdate, limit, dca, chart}
//

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::header::{CACHE_CONTROL, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info};

use crate::dca::DcaPosition;
use crate::domain::TokenAggregate;
use crate::limit::LimitOrderView;
use crate::metrics::encode_metrics;
use crate::summary::{ChartWindow, Snapshot};

const CACHE_POLICY: &str = "s-maxage=300";
const NOT_READY: &str = r#"{"error":"Failed to fetch orders"}"#;

/// What the HTTP side sees. The previous snapshot stays in place when a
/// poll fails; only `last_error` changes.
#[derive(Debug, Clone, Default)]
pub struct DashboardState {
    pub snapshot: Option<Arc<Snapshot>>,
    pub chart: Option<Arc<ChartWindow>>,
    pub last_error: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LimitOrdersBody<'a> {
    last_update: &'a str,
    orders: &'a [LimitOrderView],
    #[serde(skip_serializing_if = "Option::is_none")]
    last_error: Option<&'a str>,
}

#[derive(Serialize)]
struct DcaBody<'a> {
    orders: &'a [DcaPosition],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SummaryBody<'a> {
    last_update: &'a str,
    limit: &'a BTreeMap<String, TokenAggregate>,
    dca: &'a BTreeMap<String, TokenAggregate>,
    chart: Option<&'a ChartWindow>,
}

fn respond(status: StatusCode, content_type: &str, body: impl Into<Body>) -> Response<Body> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, content_type)
        .header(CACHE_CONTROL, CACHE_POLICY)
        .body(body.into())
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

fn json<T: Serialize>(body: &T) -> Response<Body> {
    match serde_json::to_vec(body) {
        Ok(bytes) => respond(StatusCode::OK, "application/json", bytes),
        Err(e) => {
            error!(error = %e, "serialize response");
            respond(StatusCode::INTERNAL_SERVER_ERROR, "application/json", r#"{"error":"internal"}"#)
        }
    }
}

pub fn route(method: &Method, path: &str, state: &DashboardState) -> Response<Body> {
    if method != Method::GET {
        return respond(StatusCode::METHOD_NOT_ALLOWED, "text/plain", "method not allowed");
    }
    if matches!(path, "/" | "/metrics") {
        return respond(StatusCode::OK, "text/plain; version=0.0.4; charset=utf-8", encode_metrics());
    }
    if !path.starts_with("/api/") {
        return respond(StatusCode::NOT_FOUND, "text/plain", "not found");
    }
    let Some(snap) = state.snapshot.as_deref() else {
        return respond(StatusCode::SERVICE_UNAVAILABLE, "application/json", NOT_READY);
    };
    match path {
        "/api/limit-orders" => json(&LimitOrdersBody {
            last_update: &snap.last_update,
            orders: &snap.limit_orders,
            last_error: state.last_error.as_deref(),
        }),
        "/api/dca" => json(&DcaBody { orders: &snap.dca_positions }),
        "/api/summary" => json(&SummaryBody {
            last_update: &snap.last_update,
            limit: &snap.limit_summary,
            dca: &snap.dca_summary,
            chart: state.chart.as_deref(),
        }),
        _ => respond(StatusCode::NOT_FOUND, "text/plain", "not found"),
    }
}

pub async fn serve(port: u16, state: watch::Receiver<DashboardState>) -> Result<(), hyper::Error> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let make_svc = make_service_fn(move |_| {
        let state = state.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let rsp = route(req.method(), req.uri().path(), &state.borrow());
                async move { Ok::<_, Infallible>(rsp) }
            }))
        }
    });
    let server = Server::try_bind(&addr)?.serve(make_svc);
    info!("dashboard listening on http://{addr}/ (api: /api/limit-orders, /api/dca, /api/summary)");
    server.await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> Snapshot {
        let mut limit_summary = BTreeMap::new();
        limit_summary.insert("CHAOS".to_string(), TokenAggregate { buy_orders: 2, ..Default::default() });
        Snapshot {
            taken_at: 1_736_046_245,
            last_update: "January 5, 2025 03:04:05 +UTC".into(),
            limit_orders: vec![],
            dca_positions: vec![],
            limit_summary,
            dca_summary: BTreeMap::new(),
            chart_point: BTreeMap::new(),
        }
    }

    async fn body_json(rsp: Response<Body>) -> serde_json::Value {
        let bytes = hyper::body::to_bytes(rsp.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn api_is_unavailable_before_first_poll() {
        let rsp = route(&Method::GET, "/api/limit-orders", &DashboardState::default());
        assert_eq!(rsp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(rsp).await["error"], "Failed to fetch orders");
    }

    #[tokio::test]
    async fn serves_snapshot_json() {
        let state = DashboardState {
            snapshot: Some(Arc::new(snapshot())),
            chart: Some(Arc::new(ChartWindow::new(10))),
            last_error: Some("rpc down".into()),
        };

        let rsp = route(&Method::GET, "/api/limit-orders", &state);
        assert_eq!(rsp.status(), StatusCode::OK);
        assert_eq!(rsp.headers()[CACHE_CONTROL], "s-maxage=300");
        let v = body_json(rsp).await;
        assert_eq!(v["lastUpdate"], "January 5, 2025 03:04:05 +UTC");
        assert!(v["orders"].as_array().unwrap().is_empty());
        assert_eq!(v["lastError"], "rpc down");

        let v = body_json(route(&Method::GET, "/api/dca", &state)).await;
        assert!(v["orders"].is_array());

        let v = body_json(route(&Method::GET, "/api/summary", &state)).await;
        assert_eq!(v["limit"]["CHAOS"]["buyOrders"], 2);
        assert!(v["chart"].is_object());
    }

    #[test]
    fn other_routes() {
        let state = DashboardState::default();
        assert_eq!(route(&Method::GET, "/metrics", &state).status(), StatusCode::OK);
        assert_eq!(route(&Method::GET, "/nope", &state).status(), StatusCode::NOT_FOUND);
        assert_eq!(route(&Method::POST, "/api/dca", &state).status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
