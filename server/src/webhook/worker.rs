//! Webhook delivery pipeline.
//!
//! Per tenant, two long-lived consumers: a dispatcher on `EVENTS_{tenant}`
//! that fans events out to matching webhooks as first-attempt jobs on
//! `webhook.retry.{tenant}.{webhook_id}`, and a worker pool on
//! `WEBHOOK_RETRY_{tenant}` that performs the POSTs. Retry jobs carry a
//! `deliver-at` header which the worker honours by negative-acking until
//! the job is due. Each in-flight delivery holds one acknowledgement,
//! resolved only at the terminal outcome.

use async_nats::jetstream::consumer::pull;
use async_nats::jetstream::consumer::{AckPolicy, DeliverPolicy};
use async_nats::jetstream::AckKind;
use futures::StreamExt;
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::bus::provision;
use crate::core::utils;
use crate::event;
use crate::prelude::*;
use crate::store_adapter::{DeliveryKind, DeliveryRecord, DeliveryStatus, DeliveryUpdate};
use crate::topic;
use crate::types::EventFrame;
use crate::webhook::client::PostOutcome;
use crate::webhook::{sign, url_guard};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
const WORKER_CONCURRENCY: usize = 32;
const RETRY_BASE: Duration = Duration::from_secs(5);
const RETRY_CAP: Duration = Duration::from_secs(3600);
/// Pause before reattaching a consumer after a bus hiccup.
const REATTACH_DELAY: Duration = Duration::from_secs(2);

pub const HDR_DELIVER_AT: &str = "deliver-at";

/// Delay before the next attempt: `min(cap, base * 2^(attempt-1))` with
/// jitter in [0.5, 1.5], where `attempt` is the attempt that just failed.
pub fn retry_delay(failed_attempt: u32) -> Duration {
	let exponent = failed_attempt.saturating_sub(1).min(16);
	let raw = RETRY_BASE.saturating_mul(1u32 << exponent.min(10));
	let capped = raw.min(RETRY_CAP);
	let jitter = rand::rng().random_range(0.5..=1.5);
	capped.mul_f64(jitter)
}

/// One queued delivery attempt.
#[derive(Debug, Deserialize, Serialize)]
struct DeliveryJob {
	delivery_id: Box<str>,
	webhook_id: Box<str>,
	attempt: u32,
	event: EventFrame,
}

/// Running per-tenant worker sets, keyed by tenant id.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
	tokens: Mutex<HashMap<Box<str>, CancellationToken>>,
}

impl WorkerRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	fn insert(&self, tenant_id: &TenantId, token: CancellationToken) {
		if let Some(old) = self.tokens.lock().insert(tenant_id.as_str().into(), token) {
			old.cancel();
		}
	}

	pub fn stop(&self, tenant_id: &TenantId) {
		if let Some(token) = self.tokens.lock().remove(tenant_id.as_str()) {
			token.cancel();
		}
	}
}

/// Start the dispatcher and worker pool for one tenant.
pub fn start_tenant(app: &App, tenant_id: &TenantId) {
	let token = app.shutdown.child_token();
	app.webhook_workers.insert(tenant_id, token.clone());

	{
		let app = app.clone();
		let tenant_id = tenant_id.clone();
		let token = token.clone();
		app.tracker.clone().spawn(async move { dispatcher_loop(app, tenant_id, token).await });
	}
	{
		let app = app.clone();
		let tenant_id = tenant_id.clone();
		app.tracker.clone().spawn(async move { worker_loop(app, tenant_id, token).await });
	}
}

pub fn stop_tenant(app: &App, tenant_id: &TenantId) {
	app.webhook_workers.stop(tenant_id);
}

async fn dispatcher_loop(app: App, tenant_id: TenantId, token: CancellationToken) {
	while !token.is_cancelled() {
		if let Err(err) = run_dispatcher(&app, &tenant_id, &token).await {
			warn!(tenant_id = %tenant_id, "webhook dispatcher detached: {}", err);
		}
		tokio::select! {
			() = token.cancelled() => break,
			() = tokio::time::sleep(REATTACH_DELAY) => {}
		}
	}
	debug!(tenant_id = %tenant_id, "webhook dispatcher stopped");
}

async fn run_dispatcher(app: &App, tenant_id: &TenantId, token: &CancellationToken) -> NhResult<()> {
	let conn = app.pool.get(tenant_id)?;
	let stream = conn
		.jetstream
		.get_stream(provision::events_stream(tenant_id))
		.await
		.map_err(|err| Error::StreamUnavailable(format!("events stream: {}", err)))?;

	let consumer = stream
		.get_or_create_consumer(
			"webhook-dispatch",
			pull::Config {
				durable_name: Some("webhook-dispatch".to_string()),
				deliver_policy: DeliverPolicy::New,
				ack_policy: AckPolicy::Explicit,
				..Default::default()
			},
		)
		.await
		.map_err(|err| Error::StreamUnavailable(format!("dispatch consumer: {}", err)))?;

	let mut messages = consumer
		.messages()
		.await
		.map_err(|err| Error::StreamUnavailable(format!("dispatch messages: {}", err)))?;

	loop {
		let message = tokio::select! {
			() = token.cancelled() => return Ok(()),
			message = messages.next() => match message {
				Some(Ok(message)) => message,
				Some(Err(err)) => return Err(Error::StreamUnavailable(format!("dispatch stream: {}", err))),
				None => return Ok(()),
			},
		};

		if let Err(err) = dispatch_event(app, tenant_id, &message).await {
			warn!(tenant_id = %tenant_id, "event dispatch failed: {}", err);
			let _ = message.ack_with(AckKind::Nak(Some(REATTACH_DELAY))).await;
			continue;
		}
		if let Err(err) = message.ack().await {
			warn!(tenant_id = %tenant_id, "dispatch ack failed: {}", err);
		}
	}
}

/// Fan one event out to every matching enabled webhook.
async fn dispatch_event(
	app: &App,
	tenant_id: &TenantId,
	message: &async_nats::jetstream::Message,
) -> NhResult<()> {
	let frame = event::frame_from_message(
		tenant_id,
		message.subject.as_str(),
		message.headers.as_ref(),
		&message.payload,
	)?;

	let webhooks = app.store.list_enabled_webhooks(tenant_id).await?;
	let conn = app.pool.get(tenant_id)?;

	for webhook in webhooks {
		let matched = webhook.topics.iter().any(|pattern| topic::topic_matches(pattern, &frame.topic));
		if !matched {
			continue;
		}

		let delivery_id = utils::new_delivery_id();
		let record = DeliveryRecord {
			delivery_id: delivery_id.clone().into(),
			event_id: frame.id.clone().into(),
			tenant_id: tenant_id.clone(),
			kind: DeliveryKind::Webhook,
			webhook_id: Some(webhook.webhook_id.clone()),
			consumer_group: None,
			client_id: None,
			status: DeliveryStatus::Pending,
			attempts: 0,
			created_at: Timestamp::now(),
			delivered_at: None,
			acked_at: None,
			error: None,
		};
		app.store.insert_delivery(&record).await?;

		let job = DeliveryJob {
			delivery_id: delivery_id.into(),
			webhook_id: webhook.webhook_id.clone(),
			attempt: 1,
			event: frame.clone(),
		};
		let subject = format!("webhook.retry.{}.{}", tenant_id, webhook.webhook_id);
		conn.jetstream
			.publish(subject, serde_json::to_vec(&job)?.into())
			.await
			.map_err(|err| Error::StreamUnavailable(format!("enqueue failed: {}", err)))?
			.await
			.map_err(|err| Error::StreamUnavailable(format!("enqueue unacked: {}", err)))?;
	}

	Ok(())
}

async fn worker_loop(app: App, tenant_id: TenantId, token: CancellationToken) {
	while !token.is_cancelled() {
		if let Err(err) = run_workers(&app, &tenant_id, &token).await {
			warn!(tenant_id = %tenant_id, "webhook workers detached: {}", err);
		}
		tokio::select! {
			() = token.cancelled() => break,
			() = tokio::time::sleep(REATTACH_DELAY) => {}
		}
	}
	debug!(tenant_id = %tenant_id, "webhook workers stopped");
}

async fn run_workers(app: &App, tenant_id: &TenantId, token: &CancellationToken) -> NhResult<()> {
	let conn = app.pool.get(tenant_id)?;
	let stream = conn
		.jetstream
		.get_stream(provision::webhook_retry_stream(tenant_id))
		.await
		.map_err(|err| Error::StreamUnavailable(format!("retry stream: {}", err)))?;

	let consumer = stream
		.get_or_create_consumer(
			"webhook-worker",
			pull::Config {
				durable_name: Some("webhook-worker".to_string()),
				ack_policy: AckPolicy::Explicit,
				// Attempts may legitimately wait up to the retry cap.
				ack_wait: RETRY_CAP + Duration::from_secs(60),
				..Default::default()
			},
		)
		.await
		.map_err(|err| Error::StreamUnavailable(format!("worker consumer: {}", err)))?;

	let messages = consumer
		.messages()
		.await
		.map_err(|err| Error::StreamUnavailable(format!("worker messages: {}", err)))?;

	messages
		.take_until(token.clone().cancelled_owned())
		.for_each_concurrent(WORKER_CONCURRENCY, |message| async {
			match message {
				Ok(message) => handle_retry_message(app, tenant_id, message).await,
				Err(err) => warn!(tenant_id = %tenant_id, "worker stream error: {}", err),
			}
		})
		.await;

	Ok(())
}

fn deliver_at_of(message: &async_nats::jetstream::Message) -> Option<i64> {
	message
		.headers
		.as_ref()
		.and_then(|h| h.get(HDR_DELIVER_AT))
		.and_then(|v| v.as_str().parse::<i64>().ok())
}

async fn handle_retry_message(
	app: &App,
	tenant_id: &TenantId,
	message: async_nats::jetstream::Message,
) {
	// Honour the deliver-at header: not due yet means nak with the
	// remaining delay, keeping the job on the queue.
	if let Some(due_ms) = deliver_at_of(&message) {
		let now_ms = Timestamp::now().0 * 1000;
		if due_ms > now_ms {
			let remaining = Duration::from_millis((due_ms - now_ms) as u64);
			let _ = message.ack_with(AckKind::Nak(Some(remaining))).await;
			return;
		}
	}

	let job: DeliveryJob = match serde_json::from_slice(&message.payload) {
		Ok(job) => job,
		Err(err) => {
			warn!(tenant_id = %tenant_id, "discarding malformed delivery job: {}", err);
			let _ = message.ack().await;
			return;
		}
	};

	match process_delivery(app, tenant_id, &job).await {
		Outcome::Done => {
			let _ = message.ack().await;
		}
		Outcome::Retry(delay) => {
			let next = DeliveryJob {
				delivery_id: job.delivery_id.clone(),
				webhook_id: job.webhook_id.clone(),
				attempt: job.attempt + 1,
				event: job.event,
			};
			match enqueue_retry(app, tenant_id, &next, delay).await {
				Ok(()) => {
					let _ = message.ack().await;
				}
				Err(err) => {
					// Republish failed; fall back to bus-side redelivery.
					warn!(tenant_id = %tenant_id, "retry enqueue failed: {}", err);
					let _ = message.ack_with(AckKind::Nak(Some(delay))).await;
				}
			}
		}
	}
}

enum Outcome {
	Done,
	Retry(Duration),
}

async fn enqueue_retry(
	app: &App,
	tenant_id: &TenantId,
	job: &DeliveryJob,
	delay: Duration,
) -> NhResult<()> {
	let conn = app.pool.get(tenant_id)?;
	let due_ms = Timestamp::now().0 * 1000 + delay.as_millis() as i64;
	let mut headers = async_nats::HeaderMap::new();
	headers.insert(HDR_DELIVER_AT, due_ms.to_string().as_str());

	let subject = format!("webhook.retry.{}.{}", tenant_id, job.webhook_id);
	conn.jetstream
		.publish_with_headers(subject, headers, serde_json::to_vec(job)?.into())
		.await
		.map_err(|err| Error::StreamUnavailable(format!("retry publish: {}", err)))?
		.await
		.map_err(|err| Error::StreamUnavailable(format!("retry unacked: {}", err)))?;
	Ok(())
}

async fn process_delivery(app: &App, tenant_id: &TenantId, job: &DeliveryJob) -> Outcome {
	let webhook = match app.store.read_webhook(tenant_id, &job.webhook_id).await {
		Ok(webhook) if webhook.enabled => webhook,
		// Disabled or deleted since the job was enqueued.
		_ => {
			terminal(app, job, DeliveryStatus::DeadLetter, "gone").await;
			metrics::counter!("nh_webhook_attempts_total", "outcome" => "gone").increment(1);
			return Outcome::Done;
		}
	};

	// The record may pre-date URL validation; check again before posting.
	if let Err(err) = url_guard::validate_webhook_url(&app.resolver, &webhook.url).await {
		let detail = match err {
			Error::URLRejected(category) => format!("url rejected: {}", category),
			other => format!("url rejected: {}", other),
		};
		dead_letter(app, tenant_id, job, &detail).await;
		return Outcome::Done;
	}
	if !webhook.url.starts_with("https://") {
		dead_letter(app, tenant_id, job, "tls required").await;
		return Outcome::Done;
	}

	let mut frame = job.event.clone();
	frame.attempt = job.attempt;
	let body = match serde_json::to_vec(&frame) {
		Ok(body) => body,
		Err(err) => {
			dead_letter(app, tenant_id, job, &format!("body serialization: {}", err)).await;
			return Outcome::Done;
		}
	};
	let signature = match sign::signature(&webhook.secret, &body) {
		Ok(signature) => signature,
		Err(err) => {
			dead_letter(app, tenant_id, job, &format!("signing: {}", err)).await;
			return Outcome::Done;
		}
	};

	let timestamp = Timestamp::now().to_string();
	let outcome = app.http.post_signed(&webhook.url, body, &signature, &timestamp).await;

	match outcome {
		PostOutcome::Success { latency } => {
			metrics::counter!("nh_webhook_attempts_total", "outcome" => "acked").increment(1);
			metrics::histogram!("nh_webhook_latency_seconds").record(latency.as_secs_f64());
			let now = Timestamp::now();
			let update = DeliveryUpdate {
				status: Some(DeliveryStatus::Acked),
				attempts: Some(job.attempt),
				delivered_at: Some(now),
				acked_at: Some(now),
				error: None,
			};
			if let Err(err) = app.store.update_delivery(&job.delivery_id, update).await {
				warn!("delivery update failed: {}", err);
			}
			Outcome::Done
		}
		PostOutcome::Permanent(detail) => {
			metrics::counter!("nh_webhook_attempts_total", "outcome" => "dead_letter").increment(1);
			dead_letter(app, tenant_id, job, &detail).await;
			Outcome::Done
		}
		PostOutcome::Retryable(detail) => {
			if job.attempt >= DEFAULT_MAX_ATTEMPTS {
				metrics::counter!("nh_webhook_attempts_total", "outcome" => "exhausted").increment(1);
				dead_letter(app, tenant_id, job, &detail).await;
				return Outcome::Done;
			}
			metrics::counter!("nh_webhook_attempts_total", "outcome" => "retry").increment(1);
			let update = DeliveryUpdate {
				status: Some(DeliveryStatus::Pending),
				attempts: Some(job.attempt),
				error: Some(&detail),
				..Default::default()
			};
			if let Err(err) = app.store.update_delivery(&job.delivery_id, update).await {
				warn!("delivery update failed: {}", err);
			}
			Outcome::Retry(retry_delay(job.attempt))
		}
	}
}

async fn terminal(app: &App, job: &DeliveryJob, status: DeliveryStatus, detail: &str) {
	let update = DeliveryUpdate {
		status: Some(status),
		attempts: Some(job.attempt),
		error: Some(detail),
		..Default::default()
	};
	if let Err(err) = app.store.update_delivery(&job.delivery_id, update).await {
		warn!("delivery update failed: {}", err);
	}
}

/// Mark the delivery dead-lettered and park the frame on the dead-letter
/// subject.
async fn dead_letter(app: &App, tenant_id: &TenantId, job: &DeliveryJob, detail: &str) {
	terminal(app, job, DeliveryStatus::DeadLetter, detail).await;

	if let Ok(conn) = app.pool.get(tenant_id) {
		let subject = format!("deadletter.{}.{}", tenant_id, job.event.topic);
		match serde_json::to_vec(&job.event) {
			Ok(payload) => {
				if let Err(err) = conn.jetstream.publish(subject, payload.into()).await {
					warn!(tenant_id = %tenant_id, "dead-letter publish failed: {}", err);
				}
			}
			Err(err) => warn!("dead-letter serialization failed: {}", err),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn retry_delay_doubles_from_base() {
		// Jitter is in [0.5, 1.5]; check the envelope around base * 2^(n-1).
		for (attempt, nominal) in [(1u32, 5u64), (2, 10), (3, 20), (4, 40)] {
			let delay = retry_delay(attempt);
			assert!(delay >= Duration::from_secs(nominal) / 2, "attempt {}: {:?}", attempt, delay);
			assert!(delay <= Duration::from_secs(nominal) * 3 / 2, "attempt {}: {:?}", attempt, delay);
		}
	}

	#[test]
	fn retry_delay_is_capped_at_an_hour_before_jitter() {
		for attempt in 10..40 {
			assert!(retry_delay(attempt) <= Duration::from_secs(3600) * 3 / 2);
		}
	}

	#[test]
	fn delivery_job_round_trips() {
		let job = DeliveryJob {
			delivery_id: "dlv_0".into(),
			webhook_id: "wh_0".into(),
			attempt: 3,
			event: EventFrame {
				id: "evt_0".into(),
				topic: "orders.created".into(),
				data: serde_json::json!({"id": "o1"}),
				timestamp: "2026-01-01T00:00:00Z".into(),
				attempt: 1,
			},
		};
		let bytes = serde_json::to_vec(&job).unwrap();
		let back: DeliveryJob = serde_json::from_slice(&bytes).unwrap();
		assert_eq!(back.attempt, 3);
		assert_eq!(back.event.topic, "orders.created");
	}
}

// vim: ts=4
