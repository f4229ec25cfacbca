//! Prometheus metrics handler

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the global Prometheus recorder
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    describe_counter!(
        "transfers_total",
        "Transfer requests by outcome"
    );
    describe_counter!(
        "ami_connection_transitions_total",
        "AMI connection transitions (connected, lost, failed)"
    );
    describe_gauge!(
        "ami_tracked_channels",
        "Channels currently tracked from the AMI event stream"
    );

    Ok(handle)
}

pub async fn metrics_handler(State(prometheus_handle): State<PrometheusHandle>) -> Response {
    (StatusCode::OK, prometheus_handle.render()).into_response()
}
