//! Error handling subsystem. Implements the closed error taxonomy.
//!
//! Every surface-worthy failure is converted to one of these kinds at the
//! service boundary. Public responses carry only the kind name and a short
//! stable message; the private detail stays in the process log.

use axum::{http::StatusCode, response::IntoResponse, Json};

use crate::prelude::*;
use crate::types::ErrorResponse;

pub type NhResult<T> = std::result::Result<T, Error>;

/// Category reported for a rejected webhook URL. The resolved IP is never
/// part of the public response.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UrlReject {
	Scheme,
	Host,
	Port,
	Encoding,
}

impl UrlReject {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Scheme => "scheme",
			Self::Host => "host",
			Self::Port => "port",
			Self::Encoding => "encoding",
		}
	}
}

impl std::fmt::Display for UrlReject {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug)]
pub enum Error {
	// Request authentication / admission
	AuthFailed,
	InvalidTopic(String),
	PayloadTooLarge { limit: usize },
	RateLimited,

	// Bus and connection state
	TenantUnavailable(String),
	StreamUnavailable(String),

	// Key material and claims
	InvalidKey(String),
	SignFailed(String),

	// Resource lifecycle
	DuplicateName(String),
	NotFound,
	Conflict(String),
	ValidationFailed(String),
	URLRejected(UrlReject),

	Timeout,
	Internal(String),
}

impl std::fmt::Display for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "{:?}", self)
	}
}

impl std::error::Error for Error {}

impl Error {
	/// Stable taxonomy name, used as the public error code.
	pub fn code(&self) -> &'static str {
		match self {
			Error::AuthFailed => "AuthFailed",
			Error::InvalidTopic(_) => "InvalidTopic",
			Error::PayloadTooLarge { .. } => "PayloadTooLarge",
			Error::RateLimited => "RateLimited",
			Error::TenantUnavailable(_) => "TenantUnavailable",
			Error::StreamUnavailable(_) => "StreamUnavailable",
			Error::InvalidKey(_) => "InvalidKey",
			Error::SignFailed(_) => "SignFailed",
			Error::DuplicateName(_) => "DuplicateName",
			Error::NotFound => "NotFound",
			Error::Conflict(_) => "Conflict",
			Error::ValidationFailed(_) => "ValidationFailed",
			Error::URLRejected(_) => "URLRejected",
			Error::Timeout => "Timeout",
			Error::Internal(_) => "Internal",
		}
	}
}

impl IntoResponse for Error {
	fn into_response(self) -> axum::response::Response {
		let code = self.code();
		let (status, message, details) = match self {
			// No discriminator: the caller must not be able to tell an
			// unknown credential from a revoked one.
			Error::AuthFailed => (StatusCode::UNAUTHORIZED, "Authentication failed".to_string(), None),
			Error::InvalidTopic(detail) => {
				debug!("invalid topic: {}", detail);
				(StatusCode::BAD_REQUEST, "Topic is not valid".to_string(), None)
			}
			Error::PayloadTooLarge { limit } => (
				StatusCode::PAYLOAD_TOO_LARGE,
				"Payload exceeds the allowed size".to_string(),
				Some(serde_json::json!({ "limit": limit })),
			),
			Error::RateLimited => {
				(StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded".to_string(), None)
			}
			Error::TenantUnavailable(detail) => {
				warn!("tenant unavailable: {}", detail);
				(StatusCode::SERVICE_UNAVAILABLE, "Tenant connection unavailable".to_string(), None)
			}
			Error::StreamUnavailable(detail) => {
				warn!("stream unavailable: {}", detail);
				(StatusCode::SERVICE_UNAVAILABLE, "Stream unavailable".to_string(), None)
			}
			Error::InvalidKey(detail) => {
				debug!("invalid key: {}", detail);
				(StatusCode::BAD_REQUEST, "Key material is not valid".to_string(), None)
			}
			Error::SignFailed(detail) => {
				error!("signing failed: {}", detail);
				(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string(), None)
			}
			Error::DuplicateName(detail) => {
				debug!("duplicate name: {}", detail);
				(StatusCode::CONFLICT, "Name already in use".to_string(), None)
			}
			Error::NotFound => (StatusCode::NOT_FOUND, "Resource not found".to_string(), None),
			Error::Conflict(detail) => {
				debug!("conflict: {}", detail);
				(StatusCode::CONFLICT, "Resource conflict".to_string(), None)
			}
			Error::ValidationFailed(detail) => {
				debug!("validation failed: {}", detail);
				(StatusCode::BAD_REQUEST, "Request validation failed".to_string(), None)
			}
			Error::URLRejected(category) => (
				StatusCode::BAD_REQUEST,
				"URL rejected".to_string(),
				Some(serde_json::json!({ "category": category.as_str() })),
			),
			Error::Timeout => (StatusCode::GATEWAY_TIMEOUT, "Operation timed out".to_string(), None),
			Error::Internal(detail) => {
				error!("internal error: {}", detail);
				(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string(), None)
			}
		};

		let mut error_response = ErrorResponse::new(code.to_string(), message);
		if let Some(details) = details {
			error_response = error_response.with_details(details);
		}
		(status, Json(error_response)).into_response()
	}
}

impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		warn!("io error: {}", err);
		Error::Internal("io error".into())
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		warn!("json error: {}", err);
		Error::Internal("json serialization error".into())
	}
}

impl From<tokio::task::JoinError> for Error {
	fn from(err: tokio::task::JoinError) -> Self {
		warn!("tokio join error: {}", err);
		Error::Internal("task execution failed".into())
	}
}

impl From<axum::http::Error> for Error {
	fn from(err: axum::http::Error) -> Self {
		warn!("http error: {}", err);
		Error::Internal("http error".into())
	}
}

impl From<tokio::time::error::Elapsed> for Error {
	fn from(_err: tokio::time::error::Elapsed) -> Self {
		Error::Timeout
	}
}

impl From<nkeys::error::Error> for Error {
	fn from(err: nkeys::error::Error) -> Self {
		warn!("nkeys error: {}", err);
		Error::InvalidKey("key material rejected".into())
	}
}

// vim: ts=4
