//! The subscribe channel protocol and its consume loop.
//!
//! Framed JSON over WebSocket. The channel walks Opening → Connected →
//! Consuming → {Closing → Closed | Errored}; each delivered frame is
//! backed by a Delivery Record created before the frame is flushed.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use async_nats::jetstream::consumer::pull;
use async_nats::jetstream::consumer::{AckPolicy, DeliverPolicy};
use async_nats::jetstream::AckKind;
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::bus::provision;
use crate::core::extract::AuthCtx;
use crate::core::utils;
use crate::event;
use crate::prelude::*;
use crate::store_adapter::{DeliveryKind, DeliveryRecord, DeliveryStatus, DeliveryUpdate};
use crate::topic;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);
const IDLE_TIMEOUT: Duration = Duration::from_secs(120);
/// Bounded attach retries at channel startup.
const ATTACH_ATTEMPTS: u32 = 3;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ChannelState {
	Opening,
	Connected,
	Consuming,
	Closing,
	Closed,
	Errored,
}

/// Frames from the client.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum ClientFrame {
	Subscribe {
		topics: Vec<String>,
		group: Option<String>,
		/// `new` (default), `all`, or an RFC 3339 instant.
		from: Option<String>,
		auto_ack: Option<bool>,
	},
	Ack {
		delivery_tag: u64,
	},
	Nack {
		delivery_tag: u64,
		/// Redelivery delay in milliseconds.
		delay: Option<u64>,
	},
}

/// Frames to the client.
#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum ServerFrame<'a> {
	Event {
		id: &'a str,
		topic: &'a str,
		data: &'a serde_json::Value,
		ts: &'a str,
		delivery_tag: u64,
	},
	Error {
		code: &'a str,
		message: &'a str,
	},
}

fn text_frame(frame: &ServerFrame) -> Option<Message> {
	serde_json::to_string(frame).ok().map(|json| Message::Text(json.into()))
}

pub async fn run_channel(socket: WebSocket, app: App, auth: AuthCtx) {
	let client_id = uuid::Uuid::new_v4().to_string();
	let mut state = ChannelState::Opening;
	info!(tenant_id = %auth.tenant_id, client_id = %client_id, "subscribe channel opening");

	let (mut ws_tx, mut ws_rx) = socket.split();

	match channel_loop(&app, &auth, &client_id, &mut ws_tx, &mut ws_rx, &mut state).await {
		Ok(()) => {
			state = ChannelState::Closed;
			let _ = ws_tx
				.send(Message::Close(Some(CloseFrame { code: 1000, reason: "bye".into() })))
				.await;
		}
		Err(err) => {
			state = ChannelState::Errored;
			let code = err.code();
			if let Some(frame) = text_frame(&ServerFrame::Error { code, message: code }) {
				let _ = ws_tx.send(frame).await;
			}
			let _ = ws_tx
				.send(Message::Close(Some(CloseFrame { code: 4400, reason: code.into() })))
				.await;
		}
	}

	info!(tenant_id = %auth.tenant_id, client_id = %client_id, state = ?state, "subscribe channel closed");
}

fn deliver_policy_of(from: Option<&str>) -> NhResult<DeliverPolicy> {
	match from {
		None | Some("new") => Ok(DeliverPolicy::New),
		Some("all") => Ok(DeliverPolicy::All),
		Some(instant) => {
			let start_time = time::OffsetDateTime::parse(
				instant,
				&time::format_description::well_known::Rfc3339,
			)
			.map_err(|_| {
				Error::ValidationFailed(format!("from must be new, all, or RFC 3339, got {:?}", instant))
			})?;
			Ok(DeliverPolicy::ByStartTime { start_time })
		}
	}
}

async fn channel_loop(
	app: &App,
	auth: &AuthCtx,
	client_id: &str,
	ws_tx: &mut (impl Sink<Message, Error = axum::Error> + Unpin),
	ws_rx: &mut (impl Stream<Item = Result<Message, axum::Error>> + Unpin),
	state: &mut ChannelState,
) -> NhResult<()> {
	*state = ChannelState::Connected;

	// Handshake: the first frame must be a subscribe.
	let first = tokio::time::timeout(HANDSHAKE_TIMEOUT, ws_rx.next())
		.await
		.map_err(|_| Error::Timeout)?;
	let Some(Ok(Message::Text(text))) = first else {
		return Err(Error::ValidationFailed("expected a subscribe frame".into()));
	};
	let ClientFrame::Subscribe { topics, group, from, auto_ack } =
		serde_json::from_str(&text)
			.map_err(|err| Error::ValidationFailed(format!("bad subscribe frame: {}", err)))?
	else {
		return Err(Error::ValidationFailed("expected a subscribe frame".into()));
	};

	if topics.is_empty() {
		return Err(Error::ValidationFailed("at least one topic is required".into()));
	}
	for pattern in &topics {
		topic::validate_pattern(pattern)?;
	}
	let filter_subjects: Vec<String> =
		topics.iter().map(|pattern| format!("events.{}.{}", auth.tenant_id, pattern)).collect();
	let deliver_policy = deliver_policy_of(from.as_deref())?;
	let auto_ack = auto_ack.unwrap_or(false);

	// The bus enforces isolation: this connection's claim cannot read
	// outside the tenant's subject tree.
	let conn = app.pool.get(&auth.tenant_id)?;

	let mut stream = Err(Error::StreamUnavailable("unattached".into()));
	for attempt in 1..=ATTACH_ATTEMPTS {
		match conn.jetstream.get_stream(provision::events_stream(&auth.tenant_id)).await {
			Ok(s) => {
				stream = Ok(s);
				break;
			}
			Err(err) => {
				warn!(tenant_id = %auth.tenant_id, "stream attach attempt {} failed: {}", attempt, err);
				tokio::time::sleep(Duration::from_millis(250 * u64::from(attempt))).await;
			}
		}
	}
	let stream = stream?;

	let config = pull::Config {
		durable_name: group.clone(),
		filter_subjects,
		deliver_policy,
		ack_policy: AckPolicy::Explicit,
		..Default::default()
	};
	let consumer = match &group {
		Some(group) => stream
			.get_or_create_consumer(group, config)
			.await
			.map_err(|err| Error::StreamUnavailable(format!("consumer attach: {}", err)))?,
		None => stream
			.create_consumer(config)
			.await
			.map_err(|err| Error::StreamUnavailable(format!("consumer attach: {}", err)))?,
	};
	let consumer_name = consumer.cached_info().name.clone();

	let mut messages = consumer
		.messages()
		.await
		.map_err(|err| Error::StreamUnavailable(format!("messages: {}", err)))?;

	*state = ChannelState::Consuming;
	info!(
		tenant_id = %auth.tenant_id,
		client_id = %client_id,
		group = group.as_deref().unwrap_or("-"),
		"subscribe channel consuming"
	);

	// delivery_tag → (bus message held for explicit ack, delivery row id)
	let mut pending: HashMap<u64, (async_nats::jetstream::Message, Box<str>)> = HashMap::new();
	let mut last_activity = Instant::now();
	let result = loop {
		tokio::select! {
			() = app.shutdown.cancelled() => {
				*state = ChannelState::Closing;
				break Ok(());
			}
			() = tokio::time::sleep_until(last_activity + IDLE_TIMEOUT) => {
				debug!(client_id = %client_id, "subscribe channel idle timeout");
				*state = ChannelState::Closing;
				break Ok(());
			}
			incoming = ws_rx.next() => {
				last_activity = Instant::now();
				match incoming {
					None | Some(Err(_)) | Some(Ok(Message::Close(_))) => {
						*state = ChannelState::Closing;
						break Ok(());
					}
					Some(Ok(Message::Text(text))) => {
						match serde_json::from_str::<ClientFrame>(&text) {
							Ok(ClientFrame::Ack { delivery_tag }) => {
								ack_delivery(app, &mut pending, delivery_tag).await;
							}
							Ok(ClientFrame::Nack { delivery_tag, delay }) => {
								nack_delivery(app, &mut pending, delivery_tag, delay).await;
							}
							Ok(ClientFrame::Subscribe { .. }) => {
								break Err(Error::ValidationFailed("already subscribed".into()));
							}
							Err(err) => {
								debug!(client_id = %client_id, "bad frame ignored: {}", err);
							}
						}
					}
					Some(Ok(_)) => {}
				}
			}
			delivery = messages.next() => {
				let message = match delivery {
					Some(Ok(message)) => message,
					Some(Err(err)) => break Err(Error::StreamUnavailable(format!("stream: {}", err))),
					None => break Ok(()),
				};
				last_activity = Instant::now();
				if let Err(err) = deliver_frame(
					app, auth, client_id, group.as_deref(), auto_ack,
					&mut pending, ws_tx, message,
				).await {
					break Err(err);
				}
			}
		}
	};

	// Ephemeral consumers are torn down with the channel; durables persist
	// for the group.
	if group.is_none() {
		if let Err(err) = stream.delete_consumer(&consumer_name).await {
			debug!("ephemeral consumer delete failed: {}", err);
		}
	}

	result
}

/// Record the delivery, then emit the frame. The record exists before the
/// frame leaves the process.
#[allow(clippy::too_many_arguments)]
async fn deliver_frame(
	app: &App,
	auth: &AuthCtx,
	client_id: &str,
	group: Option<&str>,
	auto_ack: bool,
	pending: &mut HashMap<u64, (async_nats::jetstream::Message, Box<str>)>,
	ws_tx: &mut (impl Sink<Message, Error = axum::Error> + Unpin),
	message: async_nats::jetstream::Message,
) -> NhResult<()> {
	let frame = event::frame_from_message(
		&auth.tenant_id,
		message.subject.as_str(),
		message.headers.as_ref(),
		&message.payload,
	)?;
	let delivery_tag = message
		.info()
		.map(|info| info.stream_sequence)
		.map_err(|err| Error::StreamUnavailable(format!("message info: {}", err)))?;

	let delivery_id = utils::new_delivery_id();
	let record = DeliveryRecord {
		delivery_id: delivery_id.clone().into(),
		event_id: frame.id.clone().into(),
		tenant_id: auth.tenant_id.clone(),
		kind: DeliveryKind::Streaming,
		webhook_id: None,
		consumer_group: group.map(Into::into),
		client_id: if group.is_none() { Some(client_id.into()) } else { None },
		status: DeliveryStatus::Pending,
		attempts: 1,
		created_at: Timestamp::now(),
		delivered_at: None,
		acked_at: None,
		error: None,
	};
	app.store.insert_delivery(&record).await?;

	let server_frame = ServerFrame::Event {
		id: &frame.id,
		topic: &frame.topic,
		data: &frame.data,
		ts: &frame.timestamp,
		delivery_tag,
	};
	let Some(ws_message) = text_frame(&server_frame) else {
		return Err(Error::Internal("frame serialization failed".into()));
	};
	ws_tx.send(ws_message).await.map_err(|_| Error::StreamUnavailable("socket closed".into()))?;

	metrics::counter!("nh_streaming_deliveries_total").increment(1);
	let now = Timestamp::now();
	let _ = app
		.store
		.update_delivery(
			&delivery_id,
			DeliveryUpdate {
				status: Some(DeliveryStatus::Delivered),
				delivered_at: Some(now),
				..Default::default()
			},
		)
		.await;

	if auto_ack {
		// Auto-ack resolves on successful flush.
		if let Err(err) = message.ack().await {
			warn!("auto-ack failed: {}", err);
		}
		let _ = app
			.store
			.update_delivery(
				&delivery_id,
				DeliveryUpdate {
					status: Some(DeliveryStatus::Acked),
					acked_at: Some(Timestamp::now()),
					..Default::default()
				},
			)
			.await;
	} else {
		pending.insert(delivery_tag, (message, delivery_id.into()));
	}

	Ok(())
}

async fn ack_delivery(
	app: &App,
	pending: &mut HashMap<u64, (async_nats::jetstream::Message, Box<str>)>,
	delivery_tag: u64,
) {
	let Some((message, delivery_id)) = pending.remove(&delivery_tag) else {
		debug!("ack for unknown delivery tag {}", delivery_tag);
		return;
	};
	if let Err(err) = message.ack().await {
		warn!("ack failed: {}", err);
	}
	let _ = app
		.store
		.update_delivery(
			&delivery_id,
			DeliveryUpdate {
				status: Some(DeliveryStatus::Acked),
				acked_at: Some(Timestamp::now()),
				..Default::default()
			},
		)
		.await;
}

async fn nack_delivery(
	app: &App,
	pending: &mut HashMap<u64, (async_nats::jetstream::Message, Box<str>)>,
	delivery_tag: u64,
	delay_ms: Option<u64>,
) {
	let Some((message, delivery_id)) = pending.remove(&delivery_tag) else {
		debug!("nack for unknown delivery tag {}", delivery_tag);
		return;
	};
	let delay = delay_ms.map(Duration::from_millis);
	if let Err(err) = message.ack_with(AckKind::Nak(delay)).await {
		warn!("nack failed: {}", err);
	}
	let _ = app
		.store
		.update_delivery(
			&delivery_id,
			DeliveryUpdate { status: Some(DeliveryStatus::Nacked), ..Default::default() },
		)
		.await;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn subscribe_frame_parses() {
		let frame: ClientFrame = serde_json::from_str(
			r#"{"op":"subscribe","topics":["orders.*"],"group":"g1","from":"all","auto_ack":true}"#,
		)
		.unwrap();
		match frame {
			ClientFrame::Subscribe { topics, group, from, auto_ack } => {
				assert_eq!(topics, vec!["orders.*"]);
				assert_eq!(group.as_deref(), Some("g1"));
				assert_eq!(from.as_deref(), Some("all"));
				assert_eq!(auto_ack, Some(true));
			}
			other => panic!("unexpected frame: {:?}", other),
		}
	}

	#[test]
	fn ack_and_nack_frames_parse() {
		assert!(matches!(
			serde_json::from_str::<ClientFrame>(r#"{"op":"ack","delivery_tag":7}"#).unwrap(),
			ClientFrame::Ack { delivery_tag: 7 }
		));
		assert!(matches!(
			serde_json::from_str::<ClientFrame>(r#"{"op":"nack","delivery_tag":7,"delay":500}"#).unwrap(),
			ClientFrame::Nack { delivery_tag: 7, delay: Some(500) }
		));
	}

	#[test]
	fn event_frames_serialize_with_op_tag() {
		let data = serde_json::json!({"id": "o1"});
		let frame = ServerFrame::Event {
			id: "evt_0",
			topic: "orders.created",
			data: &data,
			ts: "2026-01-01T00:00:00Z",
			delivery_tag: 12,
		};
		let json = serde_json::to_value(&frame).unwrap();
		assert_eq!(json["op"], "event");
		assert_eq!(json["delivery_tag"], 12);
		assert_eq!(json["data"]["id"], "o1");
	}

	#[test]
	fn deliver_policies_from_the_handshake() {
		assert!(matches!(deliver_policy_of(None).unwrap(), DeliverPolicy::New));
		assert!(matches!(deliver_policy_of(Some("new")).unwrap(), DeliverPolicy::New));
		assert!(matches!(deliver_policy_of(Some("all")).unwrap(), DeliverPolicy::All));
		assert!(matches!(
			deliver_policy_of(Some("2026-01-01T00:00:00Z")).unwrap(),
			DeliverPolicy::ByStartTime { .. }
		));
		assert!(deliver_policy_of(Some("yesterday")).is_err());
	}
}

// vim: ts=4
