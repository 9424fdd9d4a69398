//! API credential persistence operations

use sqlx::{Row, SqlitePool};

use crate::utils::*;
use notifhub::prelude::*;
use notifhub::store_adapter::{CreateCredentialData, CredentialRecord};

pub(crate) fn row_to_credential(
	row: sqlx::sqlite::SqliteRow,
) -> Result<CredentialRecord, sqlx::Error> {
	let tenant_id: String = row.try_get("tenant_id")?;
	Ok(CredentialRecord {
		credential_id: row.try_get::<String, _>("credential_id")?.into(),
		tenant_id: TenantId::parse(&tenant_id)
			.map_err(|_| sqlx::Error::Decode("invalid tenant id".into()))?,
		hash: row.try_get::<String, _>("hash")?.into(),
		prefix: row.try_get::<String, _>("prefix")?.into(),
		label: row.try_get::<Option<String>, _>("label")?.map(Into::into),
		rate_limit: row.try_get::<i64, _>("rate_limit")? as u32,
		created_at: Timestamp(row.try_get("created_at")?),
		last_used_at: row.try_get::<Option<i64>, _>("last_used_at")?.map(Timestamp),
		revoked_at: row.try_get::<Option<i64>, _>("revoked_at")?.map(Timestamp),
	})
}

pub(crate) async fn create_credential(
	db: &SqlitePool,
	data: CreateCredentialData<'_>,
) -> NhResult<CredentialRecord> {
	let res = sqlx::query(
		"INSERT INTO credentials (credential_id, tenant_id, hash, prefix, label, rate_limit, created_at)
		VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
		RETURNING *",
	)
	.bind(data.credential_id)
	.bind(data.tenant_id.as_str())
	.bind(data.hash)
	.bind(data.prefix)
	.bind(data.label)
	.bind(i64::from(data.rate_limit))
	.bind(Timestamp::now().0)
	.fetch_one(db)
	.await;

	match res {
		Ok(row) => map_res(Ok(row), row_to_credential),
		Err(err) => Err(map_exec_err(err)),
	}
}

pub(crate) async fn read_credential_by_hash(
	db: &SqlitePool,
	hash: &str,
) -> NhResult<CredentialRecord> {
	let res = sqlx::query("SELECT * FROM credentials WHERE hash = ?1")
		.bind(hash)
		.fetch_one(db)
		.await;
	map_res(res, row_to_credential)
}

pub(crate) async fn list_credentials(
	db: &SqlitePool,
	tenant_id: &TenantId,
) -> NhResult<Vec<CredentialRecord>> {
	let rows = sqlx::query("SELECT * FROM credentials WHERE tenant_id = ?1 ORDER BY created_at DESC")
		.bind(tenant_id.as_str())
		.fetch_all(db)
		.await
		.map_err(map_exec_err)?;
	collect_rows(rows, row_to_credential)
}

/// Soft-revoke. Credentials are never physically removed.
pub(crate) async fn revoke_credential(
	db: &SqlitePool,
	tenant_id: &TenantId,
	credential_id: &str,
) -> NhResult<()> {
	let res = sqlx::query(
		"UPDATE credentials SET revoked_at = ?1
		WHERE tenant_id = ?2 AND credential_id = ?3 AND revoked_at IS NULL",
	)
	.bind(Timestamp::now().0)
	.bind(tenant_id.as_str())
	.bind(credential_id)
	.execute(db)
	.await
	.map_err(map_exec_err)?;

	if res.rows_affected() == 0 {
		return Err(Error::NotFound);
	}
	Ok(())
}

pub(crate) async fn touch_credential(db: &SqlitePool, credential_id: &str) -> NhResult<()> {
	sqlx::query("UPDATE credentials SET last_used_at = ?1 WHERE credential_id = ?2")
		.bind(Timestamp::now().0)
		.bind(credential_id)
		.execute(db)
		.await
		.map_err(map_exec_err)?;
	Ok(())
}

// vim: ts=4
