//! Bus-side tenant lifecycle: claims, connection, streams, workers.
//!
//! `prepare_tenant` is the single path that takes a stored tenant to a live
//! one; the bootstrapper and the create endpoint both go through it.

use crate::bus::provision;
use crate::keys::{self, claims, KeyKind};
use crate::prelude::*;
use crate::store_adapter::TenantRecord;
use crate::webhook;

/// Rebuild the tenant's account claim from durable state and push it.
pub async fn push_claim(app: &App, tenant: &TenantRecord) -> NhResult<()> {
	let claim = claims::build_account_claim(
		&app.operator,
		&tenant.public_key,
		tenant.tenant_id.as_str(),
		tenant.tier,
	)?;
	app.pool.push_account_claim(&claim).await
}

/// Take a stored tenant to a live one: verify key material, push the
/// account claim, open the pooled connection, provision streams, start the
/// webhook workers.
pub async fn prepare_tenant(app: &App, tenant: &TenantRecord) -> NhResult<()> {
	let account = keys::from_seed(KeyKind::Account, &tenant.sealed_seed)?;
	if keys::public_key(&account) != tenant.public_key.as_ref() {
		return Err(Error::InvalidKey(format!(
			"stored public key does not match sealed seed for {}",
			tenant.tenant_id
		)));
	}

	push_claim(app, tenant).await?;
	let conn = app.pool.open(&tenant.tenant_id, &account).await?;
	provision::provision(&conn.jetstream, &tenant.tenant_id, tenant.tier).await?;
	webhook::worker::start_tenant(app, &tenant.tenant_id);

	info!(tenant_id = %tenant.tenant_id, "tenant live");
	Ok(())
}

/// Tear a tenant down: stop workers, delete streams, close the connection,
/// remove the account claim. Best-effort throughout; the durable store row
/// is handled by the caller.
pub async fn teardown_tenant(app: &App, tenant: &TenantRecord) {
	webhook::worker::stop_tenant(app, &tenant.tenant_id);

	if let Ok(conn) = app.pool.get(&tenant.tenant_id) {
		provision::delete_streams(&conn.jetstream, &tenant.tenant_id).await;
	}
	app.pool.close(&tenant.tenant_id).await;

	if let Err(err) = app.pool.delete_account_claim(&app.operator, &tenant.public_key).await {
		warn!(tenant_id = %tenant.tenant_id, "claim delete failed: {}", err);
	}

	info!(tenant_id = %tenant.tenant_id, "tenant torn down");
}

// vim: ts=4
