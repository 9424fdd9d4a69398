//! Metric registration and the Prometheus render handle.

use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::error::{Error, NhResult};

/// Install the global recorder and describe the hub's metrics.
pub fn init() -> NhResult<PrometheusHandle> {
	let handle = PrometheusBuilder::new()
		.install_recorder()
		.map_err(|err| Error::Internal(format!("metrics recorder install failed: {}", err)))?;

	describe_counter!("nh_events_published_total", "Events accepted on the publish path");
	describe_counter!("nh_event_index_drift_total", "Accepted publishes whose index row insert failed");
	describe_counter!("nh_rate_limited_total", "Requests denied by a credential token bucket");
	describe_counter!("nh_audit_dropped_total", "Audit entries whose durable write was dropped");
	describe_counter!("nh_webhook_attempts_total", "Webhook delivery attempts by outcome");
	describe_counter!("nh_streaming_deliveries_total", "Frames delivered over subscribe channels");
	describe_counter!("nh_interceptor_messages_total", "Interceptor consumer outcomes");
	describe_histogram!("nh_publish_latency_seconds", Unit::Seconds, "Bus publish latency");
	describe_histogram!("nh_webhook_latency_seconds", Unit::Seconds, "Webhook POST latency");

	Ok(handle)
}

// vim: ts=4
