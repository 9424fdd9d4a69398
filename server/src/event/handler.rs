//! Event ingress endpoints

use axum::{
	extract::{Path, Query, State},
	http::StatusCode,
	Json,
};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::core::{utils, Auth};
use crate::event::{HDR_EVENT_ATTEMPT, HDR_EVENT_ID, HDR_EVENT_TS};
use crate::prelude::*;
use crate::store_adapter::{DeliveryRecord, EventRecord, ListEventsOptions};
use crate::topic;
use crate::types::ApiResponse;

/// Publish timeout: fail fast when the bus is degraded; the caller retries.
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Deserialize)]
pub struct PublishEventReq {
	topic: String,
	data: serde_json::Value,
}

#[derive(Serialize)]
pub struct PublishEventRes {
	id: String,
	topic: String,
	created_at: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListEventsQuery {
	topic: Option<String>,
	limit: Option<u32>,
	offset: Option<u32>,
}

/// POST /api/v1/events
pub async fn post_event(
	State(app): State<App>,
	Auth(auth): Auth,
	Json(req): Json<PublishEventReq>,
) -> NhResult<(StatusCode, Json<ApiResponse<PublishEventRes>>)> {
	app.limiters.check(&auth.credential_id, auth.rate_limit)?;
	topic::validate_topic(&req.topic)?;

	let payload = serde_json::to_vec(&req.data)?;
	let tenant = app.store.read_tenant(&auth.tenant_id).await?;
	let mut limit = tenant.tier.caps().max_payload_bytes;
	if let Some(global) = app.settings.max_payload_size {
		limit = limit.min(global);
	}
	if payload.len() > limit {
		return Err(Error::PayloadTooLarge { limit });
	}

	let event_id = utils::new_event_id();
	let created_at = Timestamp::now();

	let mut headers = async_nats::HeaderMap::new();
	headers.insert(HDR_EVENT_ID, event_id.as_str());
	headers.insert(HDR_EVENT_ATTEMPT, "1");
	headers.insert(HDR_EVENT_TS, created_at.to_rfc3339().as_str());

	// Isolation is enforced by the bus: this connection's user claim only
	// permits publishes under the tenant's own prefix.
	let conn = app.pool.get(&auth.tenant_id)?;
	let subject = format!("events.{}.{}", auth.tenant_id, req.topic);

	let started = Instant::now();
	let ack = tokio::time::timeout(
		PUBLISH_TIMEOUT,
		conn.jetstream.publish_with_headers(subject, headers, payload.clone().into()),
	)
	.await?
	.map_err(|err| Error::StreamUnavailable(format!("publish failed: {}", err)))?;
	tokio::time::timeout(PUBLISH_TIMEOUT, ack)
		.await?
		.map_err(|err| Error::StreamUnavailable(format!("publish unacked: {}", err)))?;

	metrics::counter!("nh_events_published_total").increment(1);
	metrics::histogram!("nh_publish_latency_seconds").record(started.elapsed().as_secs_f64());

	// The index row is best-effort after the durable publish; a crash here
	// leaves the event deliverable but unindexed, surfaced as drift.
	{
		let app = app.clone();
		let record = EventRecord {
			event_id: event_id.clone().into(),
			tenant_id: auth.tenant_id.clone(),
			topic: req.topic.clone().into(),
			payload_size: payload.len() as i64,
			created_at,
		};
		tokio::spawn(async move {
			if let Err(err) = app.store.insert_event(&record).await {
				warn!("event index insert failed: {}", err);
				metrics::counter!("nh_event_index_drift_total").increment(1);
			}
		});
	}

	app.audit.log(
		&auth.credential_id,
		"event.emit",
		Some(&auth.tenant_id),
		Some(&event_id),
		serde_json::json!({ "topic": req.topic, "size": payload.len() }),
		None,
	);

	let response = ApiResponse::new(PublishEventRes {
		id: event_id,
		topic: req.topic,
		created_at: created_at.to_rfc3339(),
	});
	Ok((StatusCode::ACCEPTED, Json(response)))
}

/// GET /api/v1/events
pub async fn list_events(
	State(app): State<App>,
	Auth(auth): Auth,
	Query(query): Query<ListEventsQuery>,
) -> NhResult<Json<ApiResponse<Vec<EventRecord>>>> {
	let events = app
		.store
		.list_events(
			&auth.tenant_id,
			ListEventsOptions {
				topic: query.topic.as_deref(),
				limit: query.limit,
				offset: query.offset,
			},
		)
		.await?;
	Ok(Json(ApiResponse::new(events)))
}

/// GET /api/v1/events/{event_id}/deliveries
pub async fn list_event_deliveries(
	State(app): State<App>,
	Auth(auth): Auth,
	Path(event_id): Path<String>,
) -> NhResult<Json<ApiResponse<Vec<DeliveryRecord>>>> {
	// Scope check before listing.
	app.store.read_event(&auth.tenant_id, &event_id).await?;
	let deliveries = app.store.list_deliveries_by_event(&auth.tenant_id, &event_id).await?;
	Ok(Json(ApiResponse::new(deliveries)))
}

// vim: ts=4
