//! Delivery record persistence operations

use sqlx::{Row, SqlitePool};

use crate::utils::*;
use notifhub::prelude::*;
use notifhub::store_adapter::{DeliveryKind, DeliveryRecord, DeliveryStatus, DeliveryUpdate};

pub(crate) fn row_to_delivery(
	row: sqlx::sqlite::SqliteRow,
) -> Result<DeliveryRecord, sqlx::Error> {
	let tenant_id: String = row.try_get("tenant_id")?;
	let kind: String = row.try_get("kind")?;
	let status: String = row.try_get("status")?;
	Ok(DeliveryRecord {
		delivery_id: row.try_get::<String, _>("delivery_id")?.into(),
		event_id: row.try_get::<String, _>("event_id")?.into(),
		tenant_id: TenantId::parse(&tenant_id)
			.map_err(|_| sqlx::Error::Decode("invalid tenant id".into()))?,
		kind: DeliveryKind::parse(&kind)
			.map_err(|_| sqlx::Error::Decode("invalid delivery kind".into()))?,
		webhook_id: row.try_get::<Option<String>, _>("webhook_id")?.map(Into::into),
		consumer_group: row.try_get::<Option<String>, _>("consumer_group")?.map(Into::into),
		client_id: row.try_get::<Option<String>, _>("client_id")?.map(Into::into),
		status: DeliveryStatus::parse(&status)
			.map_err(|_| sqlx::Error::Decode("invalid delivery status".into()))?,
		attempts: row.try_get::<i64, _>("attempts")? as u32,
		created_at: Timestamp(row.try_get("created_at")?),
		delivered_at: row.try_get::<Option<i64>, _>("delivered_at")?.map(Timestamp),
		acked_at: row.try_get::<Option<i64>, _>("acked_at")?.map(Timestamp),
		error: row.try_get::<Option<String>, _>("error")?.map(Into::into),
	})
}

pub(crate) async fn insert_delivery(db: &SqlitePool, delivery: &DeliveryRecord) -> NhResult<()> {
	sqlx::query(
		"INSERT INTO deliveries (delivery_id, event_id, tenant_id, kind, webhook_id,
			consumer_group, client_id, status, attempts, created_at, delivered_at, acked_at, error)
		VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
	)
	.bind(delivery.delivery_id.as_ref())
	.bind(delivery.event_id.as_ref())
	.bind(delivery.tenant_id.as_str())
	.bind(delivery.kind.as_str())
	.bind(delivery.webhook_id.as_deref())
	.bind(delivery.consumer_group.as_deref())
	.bind(delivery.client_id.as_deref())
	.bind(delivery.status.as_str())
	.bind(i64::from(delivery.attempts))
	.bind(delivery.created_at.0)
	.bind(delivery.delivered_at.map(|t| t.0))
	.bind(delivery.acked_at.map(|t| t.0))
	.bind(delivery.error.as_deref())
	.execute(db)
	.await
	.map_err(map_exec_err)?;
	Ok(())
}

/// Partial update. Terminal states are sticky: once a delivery is acked or
/// dead-lettered, no further attempt may rewrite it.
pub(crate) async fn update_delivery(
	db: &SqlitePool,
	delivery_id: &str,
	update: DeliveryUpdate<'_>,
) -> NhResult<()> {
	let res = sqlx::query(
		"UPDATE deliveries SET
			status = COALESCE(?1, status),
			attempts = COALESCE(?2, attempts),
			delivered_at = COALESCE(?3, delivered_at),
			acked_at = COALESCE(?4, acked_at),
			error = COALESCE(?5, error)
		WHERE delivery_id = ?6 AND status NOT IN ('acked', 'dead_letter')",
	)
	.bind(update.status.map(|s| s.as_str()))
	.bind(update.attempts.map(i64::from))
	.bind(update.delivered_at.map(|t| t.0))
	.bind(update.acked_at.map(|t| t.0))
	.bind(update.error)
	.bind(delivery_id)
	.execute(db)
	.await
	.map_err(map_exec_err)?;

	if res.rows_affected() == 0 {
		// Either unknown or already terminal; both are fine for callers
		// that race with redelivery.
		debug!("delivery update skipped for {}", delivery_id);
	}
	Ok(())
}

pub(crate) async fn read_delivery(db: &SqlitePool, delivery_id: &str) -> NhResult<DeliveryRecord> {
	let res = sqlx::query("SELECT * FROM deliveries WHERE delivery_id = ?1")
		.bind(delivery_id)
		.fetch_one(db)
		.await;
	map_res(res, row_to_delivery)
}

pub(crate) async fn list_deliveries_by_event(
	db: &SqlitePool,
	tenant_id: &TenantId,
	event_id: &str,
) -> NhResult<Vec<DeliveryRecord>> {
	let rows = sqlx::query(
		"SELECT * FROM deliveries WHERE tenant_id = ?1 AND event_id = ?2 ORDER BY created_at",
	)
	.bind(tenant_id.as_str())
	.bind(event_id)
	.fetch_all(db)
	.await
	.map_err(map_exec_err)?;
	collect_rows(rows, row_to_delivery)
}

pub(crate) async fn list_deliveries_by_webhook(
	db: &SqlitePool,
	tenant_id: &TenantId,
	webhook_id: &str,
) -> NhResult<Vec<DeliveryRecord>> {
	let rows = sqlx::query(
		"SELECT * FROM deliveries WHERE tenant_id = ?1 AND webhook_id = ?2 ORDER BY created_at DESC",
	)
	.bind(tenant_id.as_str())
	.bind(webhook_id)
	.fetch_all(db)
	.await
	.map_err(map_exec_err)?;
	collect_rows(rows, row_to_delivery)
}

// vim: ts=4
