//! # Prometheus Metrics
//!
//! Operational metrics for the node, scraped at `/metrics`. Ledger counters
//! are driven by ledger events: [`NodeMetrics`] is itself an
//! [`EventSink`], fanned in next to the tracing and broadcast sinks, so
//! every accepted or refused operation is counted exactly once no matter
//! which surface triggered it.
//!
//! All metrics live in a dedicated [`prometheus::Registry`] under the
//! `harbor` namespace.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

use harbor_protocol::events::{EventSink, LedgerEvent};

/// Holds all Prometheus metric handles for the node.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Successful mints.
    pub mints_total: IntCounter,
    /// Successful redemptions.
    pub redeems_total: IntCounter,
    /// Refused operations, by operation and error label.
    pub rejections_total: IntCounterVec,
    /// Yield positions opened.
    pub positions_opened_total: IntCounter,
    /// Yield positions closed.
    pub positions_closed_total: IntCounter,
    /// Wallets known to the ledger.
    pub wallets: IntGauge,
    /// Handler latency in seconds, by route name.
    pub request_latency_seconds: HistogramVec,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("harbor".into()), None)?;

        let mints_total = IntCounter::new("mints_total", "Successful stablecoin mints")?;
        registry.register(Box::new(mints_total.clone()))?;

        let redeems_total = IntCounter::new("redeems_total", "Successful stablecoin redemptions")?;
        registry.register(Box::new(redeems_total.clone()))?;

        let rejections_total = IntCounterVec::new(
            Opts::new("rejections_total", "Ledger operations refused, by reason"),
            &["operation", "reason"],
        )?;
        registry.register(Box::new(rejections_total.clone()))?;

        let positions_opened_total =
            IntCounter::new("positions_opened_total", "Yield positions opened")?;
        registry.register(Box::new(positions_opened_total.clone()))?;

        let positions_closed_total =
            IntCounter::new("positions_closed_total", "Yield positions closed")?;
        registry.register(Box::new(positions_closed_total.clone()))?;

        let wallets = IntGauge::new("wallets", "Wallets known to the ledger")?;
        registry.register(Box::new(wallets.clone()))?;

        let request_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "request_latency_seconds",
                "API handler latency in seconds",
            )
            .buckets(vec![
                0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
            ]),
            &["route"],
        )?;
        registry.register(Box::new(request_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            mints_total,
            redeems_total,
            rejections_total,
            positions_opened_total,
            positions_closed_total,
            wallets,
            request_latency_seconds,
        })
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl EventSink for NodeMetrics {
    fn emit(&self, event: &LedgerEvent) {
        match event {
            LedgerEvent::WalletRegistered { .. } => self.wallets.inc(),
            LedgerEvent::Minted { .. } => self.mints_total.inc(),
            LedgerEvent::Redeemed { .. } => self.redeems_total.inc(),
            LedgerEvent::PositionOpened { .. } => self.positions_opened_total.inc(),
            LedgerEvent::PositionClosed { .. } => self.positions_closed_total.inc(),
            LedgerEvent::Rejected {
                operation, reason, ..
            } => self
                .rejections_total
                .with_label_values(&[operation.as_str(), reason.as_str()])
                .inc(),
            LedgerEvent::WalletVerified { .. }
            | LedgerEvent::CollateralUpdated { .. }
            | LedgerEvent::YieldAccrued { .. } => {}
        }
    }
}

/// Shared metrics handle passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
