//! Database schema initialization

use sqlx::SqlitePool;

pub(crate) async fn init_db(db: &SqlitePool) -> Result<(), sqlx::Error> {
	let mut tx = db.begin().await?;

	sqlx::query(
		"CREATE TABLE IF NOT EXISTS tenants (
			tenant_id text NOT NULL,
			name text NOT NULL,
			external_id text,
			public_key text NOT NULL,
			sealed_seed text NOT NULL,
			tier text NOT NULL,
			created_at integer NOT NULL,
			updated_at integer NOT NULL,
			PRIMARY KEY(tenant_id)
	)",
	)
	.execute(&mut *tx)
	.await?;
	sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS idx_tenants_public_key ON tenants (public_key)")
		.execute(&mut *tx)
		.await?;
	sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS idx_tenants_external_id ON tenants (external_id) WHERE external_id IS NOT NULL")
		.execute(&mut *tx)
		.await?;

	sqlx::query(
		"CREATE TABLE IF NOT EXISTS credentials (
			credential_id text NOT NULL,
			tenant_id text NOT NULL REFERENCES tenants (tenant_id) ON DELETE CASCADE,
			hash text NOT NULL,
			prefix text NOT NULL,
			label text,
			rate_limit integer NOT NULL,
			created_at integer NOT NULL,
			last_used_at integer,
			revoked_at integer,
			PRIMARY KEY(credential_id)
	)",
	)
	.execute(&mut *tx)
	.await?;
	sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS idx_credentials_hash ON credentials (hash)")
		.execute(&mut *tx)
		.await?;
	sqlx::query("CREATE INDEX IF NOT EXISTS idx_credentials_tenant ON credentials (tenant_id)")
		.execute(&mut *tx)
		.await?;

	sqlx::query(
		"CREATE TABLE IF NOT EXISTS events (
			event_id text NOT NULL,
			tenant_id text NOT NULL REFERENCES tenants (tenant_id) ON DELETE CASCADE,
			topic text NOT NULL,
			payload_size integer NOT NULL,
			created_at integer NOT NULL,
			PRIMARY KEY(event_id)
	)",
	)
	.execute(&mut *tx)
	.await?;
	sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_tenant_created ON events (tenant_id, created_at)")
		.execute(&mut *tx)
		.await?;

	sqlx::query(
		"CREATE TABLE IF NOT EXISTS deliveries (
			delivery_id text NOT NULL,
			event_id text NOT NULL,
			tenant_id text NOT NULL REFERENCES tenants (tenant_id) ON DELETE CASCADE,
			kind text NOT NULL,
			webhook_id text,
			consumer_group text,
			client_id text,
			status text NOT NULL,
			attempts integer NOT NULL DEFAULT 0,
			created_at integer NOT NULL,
			delivered_at integer,
			acked_at integer,
			error text,
			PRIMARY KEY(delivery_id),
			CHECK (
				(kind = 'webhook' AND webhook_id IS NOT NULL)
				OR (kind = 'streaming' AND (consumer_group IS NOT NULL OR client_id IS NOT NULL))
			)
	)",
	)
	.execute(&mut *tx)
	.await?;
	sqlx::query("CREATE INDEX IF NOT EXISTS idx_deliveries_event ON deliveries (event_id)")
		.execute(&mut *tx)
		.await?;
	sqlx::query("CREATE INDEX IF NOT EXISTS idx_deliveries_webhook ON deliveries (tenant_id, webhook_id)")
		.execute(&mut *tx)
		.await?;

	sqlx::query(
		"CREATE TABLE IF NOT EXISTS webhooks (
			webhook_id text NOT NULL,
			tenant_id text NOT NULL REFERENCES tenants (tenant_id) ON DELETE CASCADE,
			url text NOT NULL,
			topics text NOT NULL,
			secret text NOT NULL,
			enabled integer NOT NULL DEFAULT 1,
			created_at integer NOT NULL,
			updated_at integer NOT NULL,
			PRIMARY KEY(webhook_id)
	)",
	)
	.execute(&mut *tx)
	.await?;
	sqlx::query("CREATE INDEX IF NOT EXISTS idx_webhooks_tenant ON webhooks (tenant_id)")
		.execute(&mut *tx)
		.await?;

	sqlx::query(
		"CREATE TABLE IF NOT EXISTS audit_log (
			audit_id integer PRIMARY KEY AUTOINCREMENT,
			created_at integer NOT NULL,
			actor text NOT NULL,
			action text NOT NULL,
			tenant_id text,
			target text,
			detail text NOT NULL,
			client_addr text
	)",
	)
	.execute(&mut *tx)
	.await?;
	sqlx::query("CREATE INDEX IF NOT EXISTS idx_audit_tenant ON audit_log (tenant_id, audit_id)")
		.execute(&mut *tx)
		.await?;
	sqlx::query("CREATE INDEX IF NOT EXISTS idx_audit_action ON audit_log (action, audit_id)")
		.execute(&mut *tx)
		.await?;

	tx.commit().await?;
	Ok(())
}

// vim: ts=4
