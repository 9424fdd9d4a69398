//! Per-tenant stream provisioning.
//!
//! Three durable streams per tenant, with retention and size caps taken
//! from the tier. Provisioning is idempotent: identical configuration is a
//! no-op, a changed configuration is updated in place.

use async_nats::jetstream;
use async_nats::jetstream::stream::{Config, RetentionPolicy, StorageType};

use crate::prelude::*;

pub fn events_stream(tenant_id: &TenantId) -> String {
	format!("EVENTS_{}", tenant_id)
}

pub fn dead_letter_stream(tenant_id: &TenantId) -> String {
	format!("DEAD_LETTER_{}", tenant_id)
}

pub fn webhook_retry_stream(tenant_id: &TenantId) -> String {
	format!("WEBHOOK_RETRY_{}", tenant_id)
}

fn desired_configs(tenant_id: &TenantId, tier: Tier) -> [Config; 3] {
	let caps = tier.caps();
	[
		Config {
			name: events_stream(tenant_id),
			subjects: vec![format!("events.{}.>", tenant_id)],
			max_age: caps.stream_max_age,
			max_bytes: caps.stream_max_bytes,
			storage: StorageType::File,
			retention: RetentionPolicy::Limits,
			..Default::default()
		},
		Config {
			name: dead_letter_stream(tenant_id),
			subjects: vec![format!("deadletter.{}.>", tenant_id)],
			max_age: caps.stream_max_age,
			max_bytes: caps.stream_max_bytes,
			storage: StorageType::File,
			retention: RetentionPolicy::Limits,
			..Default::default()
		},
		// Retry jobs are consumed exactly once and then removed.
		Config {
			name: webhook_retry_stream(tenant_id),
			subjects: vec![format!("webhook.retry.{}.>", tenant_id)],
			max_age: caps.stream_max_age,
			max_bytes: caps.stream_max_bytes,
			storage: StorageType::File,
			retention: RetentionPolicy::WorkQueue,
			..Default::default()
		},
	]
}

fn configs_equivalent(current: &Config, desired: &Config) -> bool {
	current.subjects == desired.subjects
		&& current.max_age == desired.max_age
		&& current.max_bytes == desired.max_bytes
		&& current.storage == desired.storage
		&& current.retention == desired.retention
}

/// Create or update the tenant's three streams.
pub async fn provision(js: &jetstream::Context, tenant_id: &TenantId, tier: Tier) -> NhResult<()> {
	for desired in desired_configs(tenant_id, tier) {
		let name = desired.name.clone();
		let mut stream = js.get_or_create_stream(desired.clone()).await.map_err(|err| {
			Error::StreamUnavailable(format!("provisioning {} failed: {}", name, err))
		})?;

		let info = stream
			.info()
			.await
			.map_err(|err| Error::StreamUnavailable(format!("info for {} failed: {}", name, err)))?;

		if !configs_equivalent(&info.config, &desired) {
			info!(stream = %name, "stream configuration changed, updating in place");
			js.update_stream(&desired).await.map_err(|err| {
				Error::StreamUnavailable(format!("update of {} failed: {}", name, err))
			})?;
		}
	}
	Ok(())
}

/// Delete the tenant's streams. Missing streams are not an error.
pub async fn delete_streams(js: &jetstream::Context, tenant_id: &TenantId) {
	for name in [
		events_stream(tenant_id),
		dead_letter_stream(tenant_id),
		webhook_retry_stream(tenant_id),
	] {
		if let Err(err) = js.delete_stream(&name).await {
			debug!(stream = %name, "stream delete skipped: {}", err);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn stream_names_embed_the_tenant() {
		let tenant = TenantId::parse("t1").unwrap();
		assert_eq!(events_stream(&tenant), "EVENTS_t1");
		assert_eq!(dead_letter_stream(&tenant), "DEAD_LETTER_t1");
		assert_eq!(webhook_retry_stream(&tenant), "WEBHOOK_RETRY_t1");
	}

	#[test]
	fn identical_configs_compare_equal() {
		let tenant = TenantId::parse("t1").unwrap();
		let a = desired_configs(&tenant, Tier::Free);
		let b = desired_configs(&tenant, Tier::Free);
		for (x, y) in a.iter().zip(b.iter()) {
			assert!(configs_equivalent(x, y));
		}
	}

	#[test]
	fn tier_change_produces_a_different_config() {
		let tenant = TenantId::parse("t1").unwrap();
		let free = desired_configs(&tenant, Tier::Free);
		let pro = desired_configs(&tenant, Tier::Pro);
		assert!(!configs_equivalent(&free[0], &pro[0]));
	}
}

// vim: ts=4
