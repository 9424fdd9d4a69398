//! API routes

use axum::{
	body::Body,
	extract::State,
	http::{HeaderValue, Request, StatusCode},
	middleware::{self, Next},
	response::{IntoResponse, Response},
	routing::{delete, get, post, put},
	Json, Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::event;
use crate::gateway;
use crate::prelude::*;
use crate::tenant;
use crate::webhook;

/// The external request surface refuses traffic until the bootstrapper has
/// released the readiness gate.
async fn require_ready(
	State(app): State<App>,
	req: Request<Body>,
	next: Next,
) -> NhResult<Response> {
	if !app.is_ready() {
		return Err(Error::TenantUnavailable("starting up".into()));
	}
	Ok(next.run(req).await)
}

async fn get_healthz(State(app): State<App>) -> Response {
	// 200 iff the gate is open and every tenant connection is live.
	if app.is_ready() && app.pool.all_connected() {
		(StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))).into_response()
	} else {
		(
			StatusCode::SERVICE_UNAVAILABLE,
			Json(serde_json::json!({
				"status": "unavailable",
				"ready": app.is_ready(),
				"liveTenants": app.pool.live_tenants().len(),
				"pooledTenants": app.pool.tenant_count(),
			})),
		)
			.into_response()
	}
}

async fn get_metrics(State(app): State<App>) -> Response {
	(
		StatusCode::OK,
		[(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
		app.prometheus.render(),
	)
		.into_response()
}

fn cors_layer(app: &App) -> CorsLayer {
	let origins: Vec<HeaderValue> = app
		.settings
		.allowed_origins
		.iter()
		.filter_map(|origin| HeaderValue::from_str(origin).ok())
		.collect();
	if origins.is_empty() {
		CorsLayer::new()
	} else {
		CorsLayer::new()
			.allow_origin(AllowOrigin::list(origins))
			.allow_methods(tower_http::cors::Any)
			.allow_headers(tower_http::cors::Any)
	}
}

pub fn init(app: App) -> Router {
	let api = Router::new()
		// --- Events ---
		.route("/api/v1/events", post(event::handler::post_event))
		.route("/api/v1/events", get(event::handler::list_events))
		.route("/api/v1/events/{event_id}/deliveries", get(event::handler::list_event_deliveries))

		// --- Webhooks ---
		.route("/api/v1/webhooks", post(webhook::handler::post_webhook))
		.route("/api/v1/webhooks", get(webhook::handler::list_webhooks))
		.route("/api/v1/webhooks/{webhook_id}", get(webhook::handler::get_webhook))
		.route("/api/v1/webhooks/{webhook_id}", put(webhook::handler::put_webhook))
		.route("/api/v1/webhooks/{webhook_id}", delete(webhook::handler::delete_webhook))
		.route(
			"/api/v1/webhooks/{webhook_id}/deliveries",
			get(webhook::handler::list_webhook_deliveries),
		)

		// --- Tenant administration ---
		.route("/api/v1/tenants", post(tenant::handler::post_tenant))
		.route("/api/v1/tenants", get(tenant::handler::list_tenants))
		.route("/api/v1/tenants/{tenant_id}", delete(tenant::handler::delete_tenant))
		.route("/api/v1/tenants/{tenant_id}/tier", put(tenant::handler::put_tenant_tier))
		.route("/api/v1/tenants/{tenant_id}/credentials", post(tenant::handler::post_credential))
		.route("/api/v1/tenants/{tenant_id}/credentials", get(tenant::handler::list_credentials))
		.route(
			"/api/v1/tenants/{tenant_id}/credentials/{credential_id}",
			delete(tenant::handler::revoke_credential),
		)

		// --- Subscribe channel ---
		.route("/ws/subscribe", get(gateway::handler::get_ws_subscribe))
		.layer(middleware::from_fn_with_state(app.clone(), require_ready));

	Router::new()
		.merge(api)
		.route("/healthz", get(get_healthz))
		.route("/metrics", get(get_metrics))
		.layer(TraceLayer::new_for_http())
		.layer(cors_layer(&app))
		.with_state(app)
}

// vim: ts=4
