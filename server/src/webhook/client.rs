//! Outbound HTTP client for webhook delivery.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper_rustls::HttpsConnectorBuilder;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::{Duration, Instant};

use crate::prelude::*;
use crate::webhook::sign;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const TOTAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of one webhook POST, classified for the retry policy.
#[derive(Debug)]
pub enum PostOutcome {
	/// 2xx.
	Success { latency: Duration },
	/// 4xx other than 408/429: do not retry.
	Permanent(String),
	/// 5xx, 408, 429, or a transport error: retry with backoff.
	Retryable(String),
}

type HttpsClient =
	Client<hyper_rustls::HttpsConnector<HttpConnector>, Full<Bytes>>;

#[derive(Clone)]
pub struct OutboundClient {
	client: HttpsClient,
}

impl std::fmt::Debug for OutboundClient {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("OutboundClient").finish()
	}
}

impl OutboundClient {
	pub fn new() -> NhResult<Self> {
		let mut http = HttpConnector::new();
		http.set_connect_timeout(Some(CONNECT_TIMEOUT));
		http.enforce_http(false);

		let connector = HttpsConnectorBuilder::new()
			.with_native_roots()
			.map_err(|err| Error::Internal(format!("tls roots unavailable: {}", err)))?
			.https_or_http()
			.enable_http1()
			.enable_http2()
			.wrap_connector(http);

		let client = Client::builder(TokioExecutor::new()).build(connector);
		Ok(Self { client })
	}

	/// POST a signed webhook body. Never raises; the outcome drives the
	/// retry policy.
	pub async fn post_signed(
		&self,
		url: &str,
		body: Vec<u8>,
		signature: &str,
		timestamp: &str,
	) -> PostOutcome {
		let request = match hyper::Request::builder()
			.method(hyper::Method::POST)
			.uri(url)
			.header(hyper::header::CONTENT_TYPE, "application/json")
			.header(hyper::header::USER_AGENT, format!("notifhub/{}", crate::core::app::VERSION))
			.header(sign::SIGNATURE_HEADER, signature)
			.header(sign::TIMESTAMP_HEADER, timestamp)
			.body(Full::new(Bytes::from(body)))
		{
			Ok(request) => request,
			Err(err) => return PostOutcome::Permanent(format!("request build error: {}", err)),
		};

		let started = Instant::now();
		let response = match tokio::time::timeout(TOTAL_TIMEOUT, self.client.request(request)).await
		{
			Err(_) => return PostOutcome::Retryable("timeout".to_string()),
			Ok(Err(err)) => return PostOutcome::Retryable(format!("transport error: {}", err)),
			Ok(Ok(response)) => response,
		};

		let status = response.status();
		if status.is_success() {
			PostOutcome::Success { latency: started.elapsed() }
		} else if status == hyper::StatusCode::REQUEST_TIMEOUT
			|| status == hyper::StatusCode::TOO_MANY_REQUESTS
			|| status.is_server_error()
		{
			PostOutcome::Retryable(format!("http {}", status.as_u16()))
		} else if status.is_client_error() {
			PostOutcome::Permanent(format!("http {}", status.as_u16()))
		} else {
			// 3xx and other unexpected classes are not retried.
			PostOutcome::Permanent(format!("http {}", status.as_u16()))
		}
	}
}

// vim: ts=4
