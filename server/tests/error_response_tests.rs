//! Error taxonomy response contract tests
//!
//! The public surface must carry only the stable code and message, with
//! the two sanctioned detail fields (payload cap, URL rejection category).

use axum::http::StatusCode;
use axum::response::IntoResponse;
use http_body_util::BodyExt;

use notifhub::error::{Error, UrlReject};

async fn render(err: Error) -> (StatusCode, serde_json::Value) {
	let response = err.into_response();
	let status = response.status();
	let bytes = response.into_body().collect().await.expect("body").to_bytes();
	let json: serde_json::Value = serde_json::from_slice(&bytes).expect("json body");
	(status, json)
}

#[tokio::test]
async fn status_mapping_follows_the_taxonomy() {
	assert_eq!(render(Error::AuthFailed).await.0, StatusCode::UNAUTHORIZED);
	assert_eq!(render(Error::NotFound).await.0, StatusCode::NOT_FOUND);
	assert_eq!(render(Error::Conflict("x".into())).await.0, StatusCode::CONFLICT);
	assert_eq!(render(Error::PayloadTooLarge { limit: 1 }).await.0, StatusCode::PAYLOAD_TOO_LARGE);
	assert_eq!(render(Error::RateLimited).await.0, StatusCode::TOO_MANY_REQUESTS);
	assert_eq!(render(Error::ValidationFailed("x".into())).await.0, StatusCode::BAD_REQUEST);
	assert_eq!(render(Error::InvalidTopic("x".into())).await.0, StatusCode::BAD_REQUEST);
	assert_eq!(render(Error::URLRejected(UrlReject::Host)).await.0, StatusCode::BAD_REQUEST);
	assert_eq!(render(Error::InvalidKey("x".into())).await.0, StatusCode::BAD_REQUEST);
	assert_eq!(render(Error::Timeout).await.0, StatusCode::GATEWAY_TIMEOUT);
	assert_eq!(render(Error::TenantUnavailable("x".into())).await.0, StatusCode::SERVICE_UNAVAILABLE);
	assert_eq!(render(Error::StreamUnavailable("x".into())).await.0, StatusCode::SERVICE_UNAVAILABLE);
	assert_eq!(render(Error::Internal("x".into())).await.0, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn auth_failed_carries_no_discriminator() {
	// Unknown and revoked credentials must be indistinguishable; the body
	// is the bare code and message.
	let (_, body) = render(Error::AuthFailed).await;
	assert_eq!(body["error"]["code"], "AuthFailed");
	assert!(body["error"].get("details").is_none());
}

#[tokio::test]
async fn private_detail_never_reaches_the_body() {
	let (_, body) = render(Error::Internal("secret connection string".into())).await;
	assert_eq!(body["error"]["message"], "Internal server error");
	assert!(!body.to_string().contains("secret connection string"));

	let (_, body) = render(Error::TenantUnavailable("tenant t9 down".into())).await;
	assert!(!body.to_string().contains("t9"));
}

#[tokio::test]
async fn payload_too_large_reports_the_cap() {
	let (_, body) = render(Error::PayloadTooLarge { limit: 262144 }).await;
	assert_eq!(body["error"]["code"], "PayloadTooLarge");
	assert_eq!(body["error"]["details"]["limit"], 262144);
}

#[tokio::test]
async fn url_rejected_reports_the_category_only() {
	let (_, body) = render(Error::URLRejected(UrlReject::Encoding)).await;
	assert_eq!(body["error"]["code"], "URLRejected");
	assert_eq!(body["error"]["details"]["category"], "encoding");
	// Never an address.
	assert!(!body.to_string().contains("169.254"));
}
