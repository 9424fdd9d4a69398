//! Webhook subscription management endpoints

use axum::{
	extract::{Path, State},
	http::StatusCode,
	Json,
};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::core::{utils, Auth};
use crate::prelude::*;
use crate::store_adapter::{CreateWebhookData, DeliveryRecord, UpdateWebhookData, WebhookRecord};
use crate::topic;
use crate::types::ApiResponse;
use crate::webhook::url_guard;

#[derive(Deserialize)]
pub struct CreateWebhookReq {
	url: String,
	topics: Vec<String>,
	enabled: Option<bool>,
}

/// Creation response carries the signing secret exactly once.
#[skip_serializing_none]
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWebhookRes {
	#[serde(flatten)]
	webhook: WebhookRecord,
	secret: String,
}

#[derive(Deserialize)]
pub struct UpdateWebhookReq {
	url: Option<String>,
	topics: Option<Vec<String>>,
	enabled: Option<bool>,
}

fn validate_topics(topics: &[String]) -> NhResult<Vec<Box<str>>> {
	if topics.is_empty() {
		return Err(Error::ValidationFailed("at least one topic pattern is required".into()));
	}
	let mut out = Vec::with_capacity(topics.len());
	for pattern in topics {
		topic::validate_pattern(pattern)?;
		out.push(pattern.as_str().into());
	}
	Ok(out)
}

/// POST /api/v1/webhooks
pub async fn post_webhook(
	State(app): State<App>,
	Auth(auth): Auth,
	Json(req): Json<CreateWebhookReq>,
) -> NhResult<(StatusCode, Json<ApiResponse<CreateWebhookRes>>)> {
	let topics = validate_topics(&req.topics)?;
	url_guard::validate_webhook_url(&app.resolver, &req.url).await?;

	let webhook_id = utils::new_webhook_id();
	let secret = utils::new_webhook_secret();
	let webhook = app
		.store
		.create_webhook(CreateWebhookData {
			webhook_id: &webhook_id,
			tenant_id: &auth.tenant_id,
			url: req.url.trim(),
			topics: &topics,
			secret: &secret,
			enabled: req.enabled.unwrap_or(true),
		})
		.await?;

	app.audit.log(
		&auth.credential_id,
		"webhook.create",
		Some(&auth.tenant_id),
		Some(&webhook_id),
		serde_json::json!({ "url": webhook.url, "topics": webhook.topics }),
		None,
	);

	let response = ApiResponse::new(CreateWebhookRes { webhook, secret });
	Ok((StatusCode::CREATED, Json(response)))
}

/// GET /api/v1/webhooks
pub async fn list_webhooks(
	State(app): State<App>,
	Auth(auth): Auth,
) -> NhResult<Json<ApiResponse<Vec<WebhookRecord>>>> {
	let webhooks = app.store.list_webhooks(&auth.tenant_id).await?;
	Ok(Json(ApiResponse::new(webhooks)))
}

/// GET /api/v1/webhooks/{webhook_id}
pub async fn get_webhook(
	State(app): State<App>,
	Auth(auth): Auth,
	Path(webhook_id): Path<String>,
) -> NhResult<Json<ApiResponse<WebhookRecord>>> {
	let webhook = app.store.read_webhook(&auth.tenant_id, &webhook_id).await?;
	Ok(Json(ApiResponse::new(webhook)))
}

/// PUT /api/v1/webhooks/{webhook_id}
pub async fn put_webhook(
	State(app): State<App>,
	Auth(auth): Auth,
	Path(webhook_id): Path<String>,
	Json(req): Json<UpdateWebhookReq>,
) -> NhResult<Json<ApiResponse<WebhookRecord>>> {
	let topics = match &req.topics {
		Some(topics) => Some(validate_topics(topics)?),
		None => None,
	};
	if let Some(url) = &req.url {
		url_guard::validate_webhook_url(&app.resolver, url).await?;
	}

	let webhook = app
		.store
		.update_webhook(
			&auth.tenant_id,
			&webhook_id,
			UpdateWebhookData {
				url: req.url.as_deref().map(str::trim),
				topics: topics.as_deref(),
				enabled: req.enabled,
			},
		)
		.await?;

	app.audit.log(
		&auth.credential_id,
		"webhook.update",
		Some(&auth.tenant_id),
		Some(&webhook_id),
		serde_json::json!({ "url": webhook.url, "enabled": webhook.enabled }),
		None,
	);

	Ok(Json(ApiResponse::new(webhook)))
}

/// DELETE /api/v1/webhooks/{webhook_id}
pub async fn delete_webhook(
	State(app): State<App>,
	Auth(auth): Auth,
	Path(webhook_id): Path<String>,
) -> NhResult<Json<ApiResponse<()>>> {
	app.store.delete_webhook(&auth.tenant_id, &webhook_id).await?;

	app.audit.log(
		&auth.credential_id,
		"webhook.delete",
		Some(&auth.tenant_id),
		Some(&webhook_id),
		serde_json::json!({}),
		None,
	);

	Ok(Json(ApiResponse::new(())))
}

/// GET /api/v1/webhooks/{webhook_id}/deliveries
pub async fn list_webhook_deliveries(
	State(app): State<App>,
	Auth(auth): Auth,
	Path(webhook_id): Path<String>,
) -> NhResult<Json<ApiResponse<Vec<DeliveryRecord>>>> {
	// Ensure the webhook exists under this tenant before listing.
	app.store.read_webhook(&auth.tenant_id, &webhook_id).await?;
	let deliveries = app.store.list_deliveries_by_webhook(&auth.tenant_id, &webhook_id).await?;
	Ok(Json(ApiResponse::new(deliveries)))
}

// vim: ts=4
