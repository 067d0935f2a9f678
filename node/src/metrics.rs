//! # Prometheus Metrics
//!
//! Counters for the Authority's protocol traffic, served at `/metrics` on
//! the metrics port. Everything is registered in a dedicated registry under
//! the `shroud` prefix.
//!
//! None of these carry labels. A per-pseudonym or per-real-id label would
//! turn the metrics endpoint into a linkage oracle.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Metric handles shared by the HTTP handlers.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    pub principals_registered_total: IntCounter,
    pub pseudonyms_issued_total: IntCounter,
    pub pseudonym_requests_rejected_total: IntCounter,
    pub submissions_accepted_total: IntCounter,
    pub submissions_rejected_total: IntCounter,
    pub grades_recorded_total: IntCounter,
    /// Size of the published grade map after the last publish.
    pub grades_published: IntGauge,
}

impl NodeMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("shroud".into()), None)?;

        let counter = |name: &str, help: &str| -> Result<IntCounter, prometheus::Error> {
            let c = IntCounter::new(name, help)?;
            registry.register(Box::new(c.clone()))?;
            Ok(c)
        };

        let principals_registered_total = counter(
            "principals_registered_total",
            "Registration requests accepted",
        )?;
        let pseudonyms_issued_total =
            counter("pseudonyms_issued_total", "Pseudonym grants issued")?;
        let pseudonym_requests_rejected_total = counter(
            "pseudonym_requests_rejected_total",
            "Pseudonym requests refused",
        )?;
        let submissions_accepted_total =
            counter("submissions_accepted_total", "Submissions accepted")?;
        let submissions_rejected_total =
            counter("submissions_rejected_total", "Submissions refused")?;
        let grades_recorded_total =
            counter("grades_recorded_total", "Grades set on submissions")?;

        let grades_published =
            IntGauge::new("grades_published", "Entries in the published grade map")?;
        registry.register(Box::new(grades_published.clone()))?;

        Ok(Self {
            registry,
            principals_registered_total,
            pseudonyms_issued_total,
            pseudonym_requests_rejected_total,
            submissions_accepted_total,
            submissions_rejected_total,
            grades_recorded_total,
            grades_published,
        })
    }

    /// Prometheus text exposition of every registered metric.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub type SharedMetrics = Arc<NodeMetrics>;

/// `GET /metrics`.
pub async fn metrics_handler(State(metrics): State<SharedMetrics>) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
