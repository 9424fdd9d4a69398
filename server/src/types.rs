//! Common types used throughout the hub.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::{Duration, SystemTime};

use crate::error::{Error, NhResult};

// TenantId //
//**********//
/// Opaque printable tenant identifier, at most 32 characters.
///
/// Tenant ids are embedded in bus subjects (`events.{tenant}.>`), so the
/// accepted alphabet excludes `.` and wildcard tokens.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct TenantId(Box<str>);

impl TenantId {
	pub const MAX_LEN: usize = 32;

	pub fn parse(s: &str) -> NhResult<Self> {
		if s.is_empty() || s.len() > Self::MAX_LEN {
			return Err(Error::ValidationFailed(format!("tenant id length {} out of range", s.len())));
		}
		if !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
			return Err(Error::ValidationFailed("tenant id contains invalid characters".into()));
		}
		Ok(TenantId(s.into()))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl std::fmt::Display for TenantId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.0)
	}
}

impl AsRef<str> for TenantId {
	fn as_ref(&self) -> &str {
		&self.0
	}
}

impl Serialize for TenantId {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&self.0)
	}
}

impl<'de> Deserialize<'de> for TenantId {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		TenantId::parse(&s).map_err(serde::de::Error::custom)
	}
}

// Timestamp //
//***********//
/// Seconds since the Unix epoch.
#[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
pub struct Timestamp(pub i64);

impl Timestamp {
	pub fn now() -> Timestamp {
		let res = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default();
		Timestamp(res.as_secs() as i64)
	}

	pub fn from_now(delta: i64) -> Timestamp {
		Timestamp(Self::now().0 + delta)
	}

	/// RFC 3339 rendering, used on every external surface.
	pub fn to_rfc3339(&self) -> String {
		chrono::DateTime::<chrono::Utc>::from_timestamp(self.0, 0)
			.unwrap_or_default()
			.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
	}
}

impl std::fmt::Display for Timestamp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl Serialize for Timestamp {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_i64(self.0)
	}
}

impl<'de> Deserialize<'de> for Timestamp {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		Ok(Timestamp(i64::deserialize(deserializer)?))
	}
}

// Tier //
//******//
/// Tenant service tier. Caps are derived, never stored, so a tier change
/// propagates on the next claim rebuild without migration.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Tier {
	Free,
	Pro,
	Enterprise,
}

/// Resource caps encoded into the tenant's account claim and stream limits.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TierCaps {
	pub max_connections: i64,
	/// Bytes in storage; -1 means unlimited.
	pub max_storage_bytes: i64,
	pub max_payload_bytes: usize,
	pub max_exports: i64,
	pub max_imports: i64,
	pub stream_max_age: Duration,
	pub stream_max_bytes: i64,
}

const GIB: i64 = 1024 * 1024 * 1024;

impl Tier {
	pub fn caps(&self) -> TierCaps {
		match self {
			Tier::Free => TierCaps {
				max_connections: 10,
				max_storage_bytes: GIB,
				max_payload_bytes: 256 * 1024,
				max_exports: 8,
				max_imports: 8,
				stream_max_age: Duration::from_secs(12 * 3600),
				stream_max_bytes: 256 * 1024 * 1024,
			},
			Tier::Pro => TierCaps {
				max_connections: 100,
				max_storage_bytes: 10 * GIB,
				max_payload_bytes: 1024 * 1024,
				max_exports: 32,
				max_imports: 32,
				stream_max_age: Duration::from_secs(24 * 3600),
				stream_max_bytes: GIB,
			},
			Tier::Enterprise => TierCaps {
				max_connections: 1000,
				max_storage_bytes: -1,
				max_payload_bytes: 1024 * 1024,
				max_exports: 256,
				max_imports: 256,
				stream_max_age: Duration::from_secs(7 * 24 * 3600),
				stream_max_bytes: 10 * GIB,
			},
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Tier::Free => "free",
			Tier::Pro => "pro",
			Tier::Enterprise => "enterprise",
		}
	}

	pub fn parse(s: &str) -> NhResult<Tier> {
		match s {
			"free" => Ok(Tier::Free),
			"pro" => Ok(Tier::Pro),
			"enterprise" => Ok(Tier::Enterprise),
			other => Err(Error::ValidationFailed(format!("unknown tier: {}", other))),
		}
	}
}

impl std::fmt::Display for Tier {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

impl Serialize for Tier {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(self.as_str())
	}
}

impl<'de> Deserialize<'de> for Tier {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		Tier::parse(&s).map_err(serde::de::Error::custom)
	}
}

// Event frame //
//*************//
/// The wire shape of an event, identical on publish responses, subscribe
/// channel frames, and webhook request bodies.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EventFrame {
	pub id: String,
	pub topic: String,
	pub data: serde_json::Value,
	/// RFC 3339.
	pub timestamp: String,
	pub attempt: u32,
}

// API envelope //
//**************//
/// Pagination information for list responses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationInfo {
	pub offset: usize,
	pub limit: usize,
	pub total: usize,
}

/// Success response envelope
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
	pub data: T,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub pagination: Option<PaginationInfo>,
	pub time: Timestamp,
}

impl<T> ApiResponse<T> {
	pub fn new(data: T) -> Self {
		Self { data, pagination: None, time: Timestamp::now() }
	}

	pub fn with_pagination(data: T, offset: usize, limit: usize, total: usize) -> Self {
		Self {
			data,
			pagination: Some(PaginationInfo { offset, limit, total }),
			time: Timestamp::now(),
		}
	}
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
	pub error: ErrorDetails,
}

/// Error details with the stable taxonomy code
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
	pub code: String,
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
	pub fn new(code: String, message: String) -> Self {
		Self { error: ErrorDetails { code, message, details: None } }
	}

	pub fn with_details(mut self, details: serde_json::Value) -> Self {
		self.error.details = Some(details);
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn tenant_id_accepts_plain_identifiers() {
		assert!(TenantId::parse("t1").is_ok());
		assert!(TenantId::parse("acme-prod_01").is_ok());
		assert!(TenantId::parse(&"a".repeat(32)).is_ok());
	}

	#[test]
	fn tenant_id_rejects_subject_breaking_input() {
		assert!(TenantId::parse("").is_err());
		assert!(TenantId::parse(&"a".repeat(33)).is_err());
		assert!(TenantId::parse("a.b").is_err());
		assert!(TenantId::parse("a b").is_err());
		assert!(TenantId::parse("a>").is_err());
		assert!(TenantId::parse("a*").is_err());
	}

	#[test]
	fn tier_caps_follow_the_tier_table() {
		assert_eq!(Tier::Free.caps().max_payload_bytes, 256 * 1024);
		assert_eq!(Tier::Pro.caps().max_payload_bytes, 1024 * 1024);
		assert_eq!(Tier::Enterprise.caps().max_storage_bytes, -1);
		assert_eq!(Tier::Free.caps().stream_max_age, Duration::from_secs(12 * 3600));
	}

	#[test]
	fn tier_round_trips_through_text() {
		for tier in [Tier::Free, Tier::Pro, Tier::Enterprise] {
			assert_eq!(Tier::parse(tier.as_str()).ok(), Some(tier));
		}
		assert!(Tier::parse("platinum").is_err());
	}
}

// vim: ts=4
