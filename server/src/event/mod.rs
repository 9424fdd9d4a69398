//! Event ingress and the event frame wire shape.

pub mod handler;

use crate::prelude::*;
use crate::types::EventFrame;

pub const HDR_EVENT_ID: &str = "evt-id";
pub const HDR_EVENT_ATTEMPT: &str = "evt-attempt";
pub const HDR_EVENT_TS: &str = "evt-ts";

/// Strip the `events.{tenant}.` prefix from a bus subject.
pub fn topic_of_subject(tenant_id: &TenantId, subject: &str) -> Option<String> {
	subject.strip_prefix(&format!("events.{}.", tenant_id)).map(str::to_string)
}

/// Rebuild the event frame from a bus message. The payload bytes are the
/// event data; identity and timing ride in headers.
pub fn frame_from_message(
	tenant_id: &TenantId,
	subject: &str,
	headers: Option<&async_nats::HeaderMap>,
	payload: &[u8],
) -> NhResult<EventFrame> {
	let topic = topic_of_subject(tenant_id, subject)
		.ok_or_else(|| Error::Internal(format!("unexpected subject: {}", subject)))?;
	let data: serde_json::Value = serde_json::from_slice(payload)
		.map_err(|err| Error::ValidationFailed(format!("event payload is not JSON: {}", err)))?;

	let header = |name: &str| -> Option<String> {
		headers.and_then(|h| h.get(name)).map(|v| v.as_str().to_string())
	};

	let attempt = header(HDR_EVENT_ATTEMPT).and_then(|v| v.parse().ok()).unwrap_or(1);

	Ok(EventFrame {
		id: header(HDR_EVENT_ID).unwrap_or_default(),
		topic,
		data,
		timestamp: header(HDR_EVENT_TS).unwrap_or_else(|| Timestamp::now().to_rfc3339()),
		attempt,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn subject_prefix_is_stripped() {
		let tenant = TenantId::parse("t1").unwrap();
		assert_eq!(topic_of_subject(&tenant, "events.t1.orders.created").as_deref(), Some("orders.created"));
		assert_eq!(topic_of_subject(&tenant, "events.t2.orders.created"), None);
	}

	#[test]
	fn frame_rebuild_uses_headers() {
		let tenant = TenantId::parse("t1").unwrap();
		let mut headers = async_nats::HeaderMap::new();
		headers.insert(HDR_EVENT_ID, "evt_00ff");
		headers.insert(HDR_EVENT_ATTEMPT, "1");
		headers.insert(HDR_EVENT_TS, "2026-01-01T00:00:00Z");

		let frame = frame_from_message(
			&tenant,
			"events.t1.orders.created",
			Some(&headers),
			br#"{"id":"o1"}"#,
		)
		.unwrap();

		assert_eq!(frame.id, "evt_00ff");
		assert_eq!(frame.topic, "orders.created");
		assert_eq!(frame.attempt, 1);
		assert_eq!(frame.data["id"], "o1");
	}

	#[test]
	fn non_json_payload_is_an_error() {
		let tenant = TenantId::parse("t1").unwrap();
		assert!(frame_from_message(&tenant, "events.t1.x", None, b"not-json").is_err());
	}
}

// vim: ts=4
