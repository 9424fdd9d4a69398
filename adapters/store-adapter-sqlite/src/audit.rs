//! Audit log persistence operations

use sqlx::{QueryBuilder, Row, SqlitePool};

use crate::utils::*;
use notifhub::prelude::*;
use notifhub::store_adapter::{AppendAuditData, AuditQuery, AuditRecord};

const DEFAULT_LIMIT: u32 = 100;
const MAX_LIMIT: u32 = 1000;

pub(crate) fn row_to_audit(row: sqlx::sqlite::SqliteRow) -> Result<AuditRecord, sqlx::Error> {
	let tenant_id: Option<String> = row.try_get("tenant_id")?;
	let detail: String = row.try_get("detail")?;
	Ok(AuditRecord {
		audit_id: row.try_get("audit_id")?,
		created_at: Timestamp(row.try_get("created_at")?),
		actor: row.try_get::<String, _>("actor")?.into(),
		action: row.try_get::<String, _>("action")?.into(),
		tenant_id: match tenant_id {
			None => None,
			Some(id) => Some(
				TenantId::parse(&id).map_err(|_| sqlx::Error::Decode("invalid tenant id".into()))?,
			),
		},
		target: row.try_get::<Option<String>, _>("target")?.map(Into::into),
		detail: serde_json::from_str(&detail).unwrap_or(serde_json::Value::Null),
		client_addr: row.try_get::<Option<String>, _>("client_addr")?.map(Into::into),
	})
}

/// Append-only; the autoincrement row id is the monotonic audit id.
pub(crate) async fn append_audit(db: &SqlitePool, data: AppendAuditData<'_>) -> NhResult<i64> {
	let detail = serde_json::to_string(data.detail).unwrap_or_else(|_| "null".to_string());
	let res = sqlx::query(
		"INSERT INTO audit_log (created_at, actor, action, tenant_id, target, detail, client_addr)
		VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
		RETURNING audit_id",
	)
	.bind(data.created_at.0)
	.bind(data.actor)
	.bind(data.action)
	.bind(data.tenant_id.map(TenantId::as_str))
	.bind(data.target)
	.bind(detail)
	.bind(data.client_addr)
	.fetch_one(db)
	.await;

	map_res(res, |row| row.try_get("audit_id"))
}

/// Filtered query, newest first, paged by id.
pub(crate) async fn query_audit(db: &SqlitePool, query: AuditQuery<'_>) -> NhResult<Vec<AuditRecord>> {
	let mut builder = QueryBuilder::new("SELECT * FROM audit_log WHERE 1=1");

	if let Some(tenant_id) = query.tenant_id {
		builder.push(" AND tenant_id = ").push_bind(tenant_id.as_str());
	}
	if let Some(action) = query.action {
		builder.push(" AND action = ").push_bind(action);
	}
	if let Some(since) = query.since {
		builder.push(" AND created_at >= ").push_bind(since.0);
	}
	if let Some(until) = query.until {
		builder.push(" AND created_at <= ").push_bind(until.0);
	}
	if let Some(before_id) = query.before_id {
		builder.push(" AND audit_id < ").push_bind(before_id);
	}

	let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
	builder.push(" ORDER BY audit_id DESC LIMIT ").push_bind(i64::from(limit));

	let rows = builder.build().fetch_all(db).await.map_err(map_exec_err)?;
	collect_rows(rows, row_to_audit)
}

// vim: ts=4
