//! WebSocket upgrade handler for `/ws/subscribe`.

use axum::{
	extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
	extract::{Query, State},
	http::HeaderMap,
	response::Response,
};
use futures::SinkExt;
use serde::Deserialize;

use crate::core::extract::authenticate_secret;
use crate::gateway::channel;
use crate::prelude::*;

#[derive(Debug, Default, Deserialize)]
pub struct SubscribeQuery {
	/// Credential secret for clients that cannot set headers.
	pub token: Option<String>,
}

/// Close the socket right after the upgrade with a taxonomy code.
async fn close_with_error(mut socket: WebSocket, code: u16, reason: &'static str) {
	let _ = socket
		.send(Message::Close(Some(CloseFrame { code, reason: reason.into() })))
		.await;
	let _ = socket.close().await;
}

/// WebSocket upgrade for the subscribe channel.
///
/// The Origin header, when present, must match the configured allow-list
/// exactly; non-browser clients without an Origin are admitted on
/// credentials alone.
pub async fn get_ws_subscribe(
	ws: WebSocketUpgrade,
	State(app): State<App>,
	headers: HeaderMap,
	Query(query): Query<SubscribeQuery>,
) -> Response {
	if let Some(origin) = headers.get(axum::http::header::ORIGIN).and_then(|v| v.to_str().ok()) {
		if !app.settings.origin_allowed(origin) {
			warn!("subscribe rejected: origin {:?} not allowed", origin);
			return ws.on_upgrade(|socket| close_with_error(socket, 4403, "OriginForbidden"));
		}
	}

	if !app.is_ready() {
		return ws.on_upgrade(|socket| close_with_error(socket, 4503, "TenantUnavailable"));
	}

	let secret = headers
		.get(axum::http::header::AUTHORIZATION)
		.and_then(|v| v.to_str().ok())
		.and_then(|v| v.strip_prefix("Bearer "))
		.map(str::trim)
		.map(str::to_string)
		.or(query.token);

	let Some(secret) = secret else {
		return ws.on_upgrade(|socket| close_with_error(socket, 4401, "AuthFailed"));
	};

	match authenticate_secret(&app, &secret).await {
		Ok(auth) => {
			debug!(tenant_id = %auth.tenant_id, "subscribe channel authenticated");
			ws.on_upgrade(move |socket| channel::run_channel(socket, app, auth))
		}
		Err(_) => ws.on_upgrade(|socket| close_with_error(socket, 4401, "AuthFailed")),
	}
}

// vim: ts=4
