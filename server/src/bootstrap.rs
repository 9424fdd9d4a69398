//! Process bootstrap.
//!
//! The readiness gate stays shut until every known tenant has a live
//! connection and provisioned streams. A failed tenant keeps the gate shut
//! and the process exits after a grace period; orchestration restarts it.
//! There is no retry loop here.

use futures::StreamExt;

use crate::interceptor::engine;
use crate::keys::{self, claims, KeyKind};
use crate::prelude::*;
use crate::tenant::lifecycle;

/// Parallel tenant activations during boot.
const BOOTSTRAP_CONCURRENCY: usize = 16;

pub async fn run(app: &App) -> NhResult<()> {
	info!("bootstrapping");

	// System account key: configured, or generated for this process
	// lifetime.
	let system_seed = match &app.settings.system_account_seed {
		Some(seed) => seed.to_string(),
		None => {
			let pair = keys::generate(KeyKind::Account);
			warn!(
				public_key = %keys::public_key(&pair),
				"SYSTEM_ACCOUNT_SEED not set, generated an ephemeral system account key"
			);
			keys::seed(&pair)?
		}
	};
	let system = keys::from_seed(KeyKind::Account, &system_seed)?;

	app.pool.connect_system(&system_seed).await?;

	// Refresh the system account claim now that we can reach the bus.
	let system_claim = claims::build_account_claim(
		&app.operator,
		&keys::public_key(&system),
		"system",
		Tier::Enterprise,
	)?;
	app.pool.push_account_claim(&system_claim).await?;

	let tenants = app.store.list_tenants().await?;
	info!("activating {} tenants", tenants.len());

	let failures: Vec<(TenantId, Error)> = futures::stream::iter(tenants)
		.map(|tenant| async move {
			let tenant_id = tenant.tenant_id.clone();
			(tenant_id, lifecycle::prepare_tenant(app, &tenant).await)
		})
		.buffer_unordered(BOOTSTRAP_CONCURRENCY)
		.filter_map(|(tenant_id, result)| async move {
			match result {
				Ok(()) => None,
				Err(err) => Some((tenant_id, err)),
			}
		})
		.collect()
		.await;

	if !failures.is_empty() {
		for (tenant_id, err) in &failures {
			error!(tenant_id = %tenant_id, "tenant activation failed: {}", err);
			app.audit.log(
				"system",
				"bootstrap.fail",
				Some(tenant_id),
				None,
				serde_json::json!({ "error": err.code() }),
				None,
			);
		}
		return Err(Error::Internal(format!("{} tenants failed to activate", failures.len())));
	}

	engine::start(app).await?;

	app.release_readiness_gate();
	app.audit.log(
		"system",
		"bootstrap.complete",
		None,
		None,
		serde_json::json!({ "tenants": app.pool.tenant_count() }),
		None,
	);
	info!("readiness gate released, {} tenants live", app.pool.tenant_count());
	Ok(())
}

// vim: ts=4
