//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): routed requests by outcome, status
//! - `gateway_request_duration_seconds` (histogram): gateway handling time by outcome
//!   (static, boot responses and backend dispatch alike)
//! - `gateway_static_hits_total` (counter): assets served without the backend
//! - `relay_requests_total` (counter): relayed fetches by final status
//! - `relay_redirects_total` (counter): redirects followed
//! - `backend_boots_total` (counter): boot outcomes

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(outcome: &'static str, status: u16, start: Instant) {
    ::metrics::counter!(
        "gateway_requests_total",
        "outcome" => outcome,
        "status" => status.to_string()
    )
    .increment(1);
    ::metrics::histogram!("gateway_request_duration_seconds", "outcome" => outcome)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_static_hit() {
    ::metrics::counter!("gateway_static_hits_total").increment(1);
}

pub fn record_relay(status: u16) {
    ::metrics::counter!("relay_requests_total", "status" => status.to_string()).increment(1);
}

pub fn record_redirect() {
    ::metrics::counter!("relay_redirects_total").increment(1);
}

pub fn record_boot(outcome: &'static str) {
    ::metrics::counter!("backend_boots_total", "outcome" => outcome).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_is_labelled_for_every_outcome() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        ::metrics::with_local_recorder(&recorder, || {
            record_request("static", 200, Instant::now());
            record_request("booting", 202, Instant::now());
            record_request("backend", 200, Instant::now());
        });

        let rendered = handle.render();
        for outcome in ["static", "booting", "backend"] {
            let count = format!("gateway_request_duration_seconds_count{{outcome=\"{outcome}\"}} 1");
            assert!(rendered.contains(&count), "missing {count} in\n{rendered}");
        }
    }
}
