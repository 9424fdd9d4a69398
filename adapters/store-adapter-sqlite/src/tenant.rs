//! Tenant persistence operations

use sqlx::{Row, SqlitePool};

use crate::utils::*;
use notifhub::prelude::*;
use notifhub::store_adapter::{CreateTenantData, TenantRecord};

pub(crate) fn row_to_tenant(row: sqlx::sqlite::SqliteRow) -> Result<TenantRecord, sqlx::Error> {
	let tenant_id: String = row.try_get("tenant_id")?;
	let tier: String = row.try_get("tier")?;
	Ok(TenantRecord {
		tenant_id: TenantId::parse(&tenant_id)
			.map_err(|_| sqlx::Error::Decode("invalid tenant id".into()))?,
		name: row.try_get::<String, _>("name")?.into(),
		external_id: row.try_get::<Option<String>, _>("external_id")?.map(Into::into),
		public_key: row.try_get::<String, _>("public_key")?.into(),
		sealed_seed: row.try_get::<String, _>("sealed_seed")?.into(),
		tier: Tier::parse(&tier).map_err(|_| sqlx::Error::Decode("invalid tier".into()))?,
		created_at: Timestamp(row.try_get("created_at")?),
		updated_at: Timestamp(row.try_get("updated_at")?),
	})
}

pub(crate) async fn create_tenant(
	db: &SqlitePool,
	data: CreateTenantData<'_>,
) -> NhResult<TenantRecord> {
	let now = Timestamp::now();
	let res = sqlx::query(
		"INSERT INTO tenants (tenant_id, name, external_id, public_key, sealed_seed, tier, created_at, updated_at)
		VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
		RETURNING *",
	)
	.bind(data.tenant_id.as_str())
	.bind(data.name)
	.bind(data.external_id)
	.bind(data.public_key)
	.bind(data.sealed_seed)
	.bind(data.tier.as_str())
	.bind(now.0)
	.fetch_one(db)
	.await;

	match res {
		Ok(row) => map_res(Ok(row), row_to_tenant),
		Err(err) => Err(map_exec_err(err)),
	}
}

pub(crate) async fn read_tenant(db: &SqlitePool, tenant_id: &TenantId) -> NhResult<TenantRecord> {
	let res = sqlx::query("SELECT * FROM tenants WHERE tenant_id = ?1")
		.bind(tenant_id.as_str())
		.fetch_one(db)
		.await;
	map_res(res, row_to_tenant)
}

pub(crate) async fn read_tenant_by_external_id(
	db: &SqlitePool,
	external_id: &str,
) -> NhResult<TenantRecord> {
	let res = sqlx::query("SELECT * FROM tenants WHERE external_id = ?1")
		.bind(external_id)
		.fetch_one(db)
		.await;
	map_res(res, row_to_tenant)
}

pub(crate) async fn list_tenants(db: &SqlitePool) -> NhResult<Vec<TenantRecord>> {
	let rows = sqlx::query("SELECT * FROM tenants ORDER BY tenant_id")
		.fetch_all(db)
		.await
		.map_err(map_exec_err)?;
	collect_rows(rows, row_to_tenant)
}

async fn update_column(
	db: &SqlitePool,
	tenant_id: &TenantId,
	column: &'static str,
	value: &str,
) -> NhResult<()> {
	let sql = format!("UPDATE tenants SET {} = ?1, updated_at = ?2 WHERE tenant_id = ?3", column);
	let res = sqlx::query(&sql)
		.bind(value)
		.bind(Timestamp::now().0)
		.bind(tenant_id.as_str())
		.execute(db)
		.await
		.map_err(map_exec_err)?;
	if res.rows_affected() == 0 {
		return Err(Error::NotFound);
	}
	Ok(())
}

pub(crate) async fn update_tenant_tier(
	db: &SqlitePool,
	tenant_id: &TenantId,
	tier: Tier,
) -> NhResult<()> {
	update_column(db, tenant_id, "tier", tier.as_str()).await
}

pub(crate) async fn update_tenant_public_key(
	db: &SqlitePool,
	tenant_id: &TenantId,
	public_key: &str,
) -> NhResult<()> {
	update_column(db, tenant_id, "public_key", public_key).await
}

pub(crate) async fn update_tenant_seed(
	db: &SqlitePool,
	tenant_id: &TenantId,
	sealed_seed: &str,
) -> NhResult<()> {
	update_column(db, tenant_id, "sealed_seed", sealed_seed).await
}

/// Delete a tenant and all dependent rows in one transaction.
pub(crate) async fn delete_tenant(db: &SqlitePool, tenant_id: &TenantId) -> NhResult<()> {
	let mut tx = db.begin().await.map_err(map_exec_err)?;

	for sql in [
		"DELETE FROM deliveries WHERE tenant_id = ?1",
		"DELETE FROM events WHERE tenant_id = ?1",
		"DELETE FROM webhooks WHERE tenant_id = ?1",
		"DELETE FROM credentials WHERE tenant_id = ?1",
	] {
		sqlx::query(sql)
			.bind(tenant_id.as_str())
			.execute(&mut *tx)
			.await
			.map_err(map_exec_err)?;
	}

	let res = sqlx::query("DELETE FROM tenants WHERE tenant_id = ?1")
		.bind(tenant_id.as_str())
		.execute(&mut *tx)
		.await
		.map_err(map_exec_err)?;
	if res.rows_affected() == 0 {
		return Err(Error::NotFound);
	}

	tx.commit().await.map_err(map_exec_err)?;
	info!("tenant deleted: {}", tenant_id);
	Ok(())
}

// vim: ts=4
