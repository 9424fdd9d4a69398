//! Webhook subscription persistence operations

use sqlx::{Row, SqlitePool};

use crate::utils::*;
use notifhub::prelude::*;
use notifhub::store_adapter::{CreateWebhookData, UpdateWebhookData, WebhookRecord};

pub(crate) fn row_to_webhook(row: sqlx::sqlite::SqliteRow) -> Result<WebhookRecord, sqlx::Error> {
	let tenant_id: String = row.try_get("tenant_id")?;
	let topics: String = row.try_get("topics")?;
	Ok(WebhookRecord {
		webhook_id: row.try_get::<String, _>("webhook_id")?.into(),
		tenant_id: TenantId::parse(&tenant_id)
			.map_err(|_| sqlx::Error::Decode("invalid tenant id".into()))?,
		url: row.try_get::<String, _>("url")?.into(),
		topics: parse_str_list(&topics),
		secret: row.try_get::<String, _>("secret")?.into(),
		enabled: row.try_get::<i64, _>("enabled")? != 0,
		created_at: Timestamp(row.try_get("created_at")?),
		updated_at: Timestamp(row.try_get("updated_at")?),
	})
}

pub(crate) async fn create_webhook(
	db: &SqlitePool,
	data: CreateWebhookData<'_>,
) -> NhResult<WebhookRecord> {
	let now = Timestamp::now();
	let res = sqlx::query(
		"INSERT INTO webhooks (webhook_id, tenant_id, url, topics, secret, enabled, created_at, updated_at)
		VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
		RETURNING *",
	)
	.bind(data.webhook_id)
	.bind(data.tenant_id.as_str())
	.bind(data.url)
	.bind(join_str_list(data.topics))
	.bind(data.secret)
	.bind(i64::from(data.enabled))
	.bind(now.0)
	.fetch_one(db)
	.await;

	match res {
		Ok(row) => map_res(Ok(row), row_to_webhook),
		Err(err) => Err(map_exec_err(err)),
	}
}

pub(crate) async fn read_webhook(
	db: &SqlitePool,
	tenant_id: &TenantId,
	webhook_id: &str,
) -> NhResult<WebhookRecord> {
	let res = sqlx::query("SELECT * FROM webhooks WHERE tenant_id = ?1 AND webhook_id = ?2")
		.bind(tenant_id.as_str())
		.bind(webhook_id)
		.fetch_one(db)
		.await;
	map_res(res, row_to_webhook)
}

pub(crate) async fn list_webhooks(
	db: &SqlitePool,
	tenant_id: &TenantId,
	enabled_only: bool,
) -> NhResult<Vec<WebhookRecord>> {
	let rows = if enabled_only {
		sqlx::query("SELECT * FROM webhooks WHERE tenant_id = ?1 AND enabled = 1 ORDER BY created_at")
			.bind(tenant_id.as_str())
			.fetch_all(db)
			.await
	} else {
		sqlx::query("SELECT * FROM webhooks WHERE tenant_id = ?1 ORDER BY created_at")
			.bind(tenant_id.as_str())
			.fetch_all(db)
			.await
	}
	.map_err(map_exec_err)?;
	collect_rows(rows, row_to_webhook)
}

pub(crate) async fn update_webhook(
	db: &SqlitePool,
	tenant_id: &TenantId,
	webhook_id: &str,
	data: UpdateWebhookData<'_>,
) -> NhResult<WebhookRecord> {
	let res = sqlx::query(
		"UPDATE webhooks SET
			url = COALESCE(?1, url),
			topics = COALESCE(?2, topics),
			enabled = COALESCE(?3, enabled),
			updated_at = ?4
		WHERE tenant_id = ?5 AND webhook_id = ?6",
	)
	.bind(data.url)
	.bind(data.topics.map(join_str_list))
	.bind(data.enabled.map(i64::from))
	.bind(Timestamp::now().0)
	.bind(tenant_id.as_str())
	.bind(webhook_id)
	.execute(db)
	.await
	.map_err(map_exec_err)?;

	if res.rows_affected() == 0 {
		return Err(Error::NotFound);
	}
	read_webhook(db, tenant_id, webhook_id).await
}

pub(crate) async fn delete_webhook(
	db: &SqlitePool,
	tenant_id: &TenantId,
	webhook_id: &str,
) -> NhResult<()> {
	let res = sqlx::query("DELETE FROM webhooks WHERE tenant_id = ?1 AND webhook_id = ?2")
		.bind(tenant_id.as_str())
		.bind(webhook_id)
		.execute(db)
		.await
		.map_err(map_exec_err)?;

	if res.rows_affected() == 0 {
		return Err(Error::NotFound);
	}
	Ok(())
}

// vim: ts=4
