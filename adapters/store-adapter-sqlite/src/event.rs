//! Event index persistence operations

use sqlx::{Row, SqlitePool};

use crate::utils::*;
use notifhub::prelude::*;
use notifhub::store_adapter::{EventRecord, ListEventsOptions};

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 500;

pub(crate) fn row_to_event(row: sqlx::sqlite::SqliteRow) -> Result<EventRecord, sqlx::Error> {
	let tenant_id: String = row.try_get("tenant_id")?;
	Ok(EventRecord {
		event_id: row.try_get::<String, _>("event_id")?.into(),
		tenant_id: TenantId::parse(&tenant_id)
			.map_err(|_| sqlx::Error::Decode("invalid tenant id".into()))?,
		topic: row.try_get::<String, _>("topic")?.into(),
		payload_size: row.try_get("payload_size")?,
		created_at: Timestamp(row.try_get("created_at")?),
	})
}

pub(crate) async fn insert_event(db: &SqlitePool, event: &EventRecord) -> NhResult<()> {
	sqlx::query(
		"INSERT INTO events (event_id, tenant_id, topic, payload_size, created_at)
		VALUES (?1, ?2, ?3, ?4, ?5)",
	)
	.bind(event.event_id.as_ref())
	.bind(event.tenant_id.as_str())
	.bind(event.topic.as_ref())
	.bind(event.payload_size)
	.bind(event.created_at.0)
	.execute(db)
	.await
	.map_err(map_exec_err)?;
	Ok(())
}

pub(crate) async fn read_event(
	db: &SqlitePool,
	tenant_id: &TenantId,
	event_id: &str,
) -> NhResult<EventRecord> {
	let res = sqlx::query("SELECT * FROM events WHERE tenant_id = ?1 AND event_id = ?2")
		.bind(tenant_id.as_str())
		.bind(event_id)
		.fetch_one(db)
		.await;
	map_res(res, row_to_event)
}

pub(crate) async fn list_events(
	db: &SqlitePool,
	tenant_id: &TenantId,
	opts: ListEventsOptions<'_>,
) -> NhResult<Vec<EventRecord>> {
	let limit = opts.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
	let offset = opts.offset.unwrap_or(0);

	let rows = match opts.topic {
		Some(topic) => {
			sqlx::query(
				"SELECT * FROM events WHERE tenant_id = ?1 AND topic = ?2
				ORDER BY created_at DESC, event_id DESC LIMIT ?3 OFFSET ?4",
			)
			.bind(tenant_id.as_str())
			.bind(topic)
			.bind(i64::from(limit))
			.bind(i64::from(offset))
			.fetch_all(db)
			.await
		}
		None => {
			sqlx::query(
				"SELECT * FROM events WHERE tenant_id = ?1
				ORDER BY created_at DESC, event_id DESC LIMIT ?2 OFFSET ?3",
			)
			.bind(tenant_id.as_str())
			.bind(i64::from(limit))
			.bind(i64::from(offset))
			.fetch_all(db)
			.await
		}
	}
	.map_err(map_exec_err)?;

	collect_rows(rows, row_to_event)
}

// vim: ts=4
