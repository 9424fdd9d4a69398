//! Adapter that persists tenants, credentials, the event index, delivery
//! records, webhook subscriptions, and the audit log.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fmt::Debug;

use crate::prelude::*;

/// A persisted tenant. The sealed seed is a secret: it is never logged and
/// never serialized onto an external surface.
#[derive(Clone, Debug)]
pub struct TenantRecord {
	pub tenant_id: TenantId,
	pub name: Box<str>,
	pub external_id: Option<Box<str>>,
	pub public_key: Box<str>,
	pub sealed_seed: Box<str>,
	pub tier: Tier,
	pub created_at: Timestamp,
	pub updated_at: Timestamp,
}

#[derive(Debug)]
pub struct CreateTenantData<'a> {
	pub tenant_id: &'a TenantId,
	pub name: &'a str,
	pub external_id: Option<&'a str>,
	pub public_key: &'a str,
	pub sealed_seed: &'a str,
	pub tier: Tier,
}

/// An API credential. Only the SHA-256 hash of the bearer secret is kept.
#[skip_serializing_none]
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
	pub credential_id: Box<str>,
	pub tenant_id: TenantId,
	#[serde(skip_serializing)]
	pub hash: Box<str>,
	pub prefix: Box<str>,
	pub label: Option<Box<str>>,
	/// Requests per second.
	pub rate_limit: u32,
	pub created_at: Timestamp,
	pub last_used_at: Option<Timestamp>,
	pub revoked_at: Option<Timestamp>,
}

#[derive(Debug)]
pub struct CreateCredentialData<'a> {
	pub credential_id: &'a str,
	pub tenant_id: &'a TenantId,
	pub hash: &'a str,
	pub prefix: &'a str,
	pub label: Option<&'a str>,
	pub rate_limit: u32,
}

/// Searchable index row for a published event. The payload itself lives on
/// the durable log.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
	pub event_id: Box<str>,
	pub tenant_id: TenantId,
	pub topic: Box<str>,
	pub payload_size: i64,
	pub created_at: Timestamp,
}

#[derive(Debug, Default)]
pub struct ListEventsOptions<'a> {
	pub topic: Option<&'a str>,
	pub limit: Option<u32>,
	pub offset: Option<u32>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeliveryKind {
	Webhook,
	Streaming,
}

impl DeliveryKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			DeliveryKind::Webhook => "webhook",
			DeliveryKind::Streaming => "streaming",
		}
	}

	pub fn parse(s: &str) -> NhResult<Self> {
		match s {
			"webhook" => Ok(DeliveryKind::Webhook),
			"streaming" => Ok(DeliveryKind::Streaming),
			other => Err(Error::Internal(format!("unknown delivery kind: {}", other))),
		}
	}
}

impl Serialize for DeliveryKind {
	fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(self.as_str())
	}
}

impl<'de> Deserialize<'de> for DeliveryKind {
	fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let s = String::deserialize(deserializer)?;
		DeliveryKind::parse(&s).map_err(serde::de::Error::custom)
	}
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeliveryStatus {
	Pending,
	Delivered,
	Acked,
	Nacked,
	DeadLetter,
}

impl DeliveryStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			DeliveryStatus::Pending => "pending",
			DeliveryStatus::Delivered => "delivered",
			DeliveryStatus::Acked => "acked",
			DeliveryStatus::Nacked => "nacked",
			DeliveryStatus::DeadLetter => "dead_letter",
		}
	}

	pub fn parse(s: &str) -> NhResult<Self> {
		match s {
			"pending" => Ok(DeliveryStatus::Pending),
			"delivered" => Ok(DeliveryStatus::Delivered),
			"acked" => Ok(DeliveryStatus::Acked),
			"nacked" => Ok(DeliveryStatus::Nacked),
			"dead_letter" => Ok(DeliveryStatus::DeadLetter),
			other => Err(Error::Internal(format!("unknown delivery status: {}", other))),
		}
	}

	/// Terminal states admit no further attempts.
	pub fn is_terminal(&self) -> bool {
		matches!(self, DeliveryStatus::Acked | DeliveryStatus::DeadLetter)
	}
}

impl Serialize for DeliveryStatus {
	fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(self.as_str())
	}
}

impl<'de> Deserialize<'de> for DeliveryStatus {
	fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let s = String::deserialize(deserializer)?;
		DeliveryStatus::parse(&s).map_err(serde::de::Error::custom)
	}
}

/// One delivery of one event to one receiver. Webhook deliveries carry a
/// webhook id; streaming deliveries carry a consumer group or a client id.
#[skip_serializing_none]
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRecord {
	pub delivery_id: Box<str>,
	pub event_id: Box<str>,
	pub tenant_id: TenantId,
	pub kind: DeliveryKind,
	pub webhook_id: Option<Box<str>>,
	pub consumer_group: Option<Box<str>>,
	pub client_id: Option<Box<str>>,
	pub status: DeliveryStatus,
	pub attempts: u32,
	pub created_at: Timestamp,
	pub delivered_at: Option<Timestamp>,
	pub acked_at: Option<Timestamp>,
	pub error: Option<Box<str>>,
}

/// Partial update applied to a delivery after an attempt resolves.
#[derive(Debug, Default)]
pub struct DeliveryUpdate<'a> {
	pub status: Option<DeliveryStatus>,
	pub attempts: Option<u32>,
	pub delivered_at: Option<Timestamp>,
	pub acked_at: Option<Timestamp>,
	pub error: Option<&'a str>,
}

/// A webhook subscription. The secret is returned only on creation.
#[skip_serializing_none]
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRecord {
	pub webhook_id: Box<str>,
	pub tenant_id: TenantId,
	pub url: Box<str>,
	pub topics: Box<[Box<str>]>,
	#[serde(skip_serializing)]
	pub secret: Box<str>,
	pub enabled: bool,
	pub created_at: Timestamp,
	pub updated_at: Timestamp,
}

#[derive(Debug)]
pub struct CreateWebhookData<'a> {
	pub webhook_id: &'a str,
	pub tenant_id: &'a TenantId,
	pub url: &'a str,
	pub topics: &'a [Box<str>],
	pub secret: &'a str,
	pub enabled: bool,
}

#[derive(Debug, Default)]
pub struct UpdateWebhookData<'a> {
	pub url: Option<&'a str>,
	pub topics: Option<&'a [Box<str>]>,
	pub enabled: Option<bool>,
}

/// An append-only audit row. `detail` is an ad-hoc JSON map with no schema.
#[skip_serializing_none]
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
	pub audit_id: i64,
	pub created_at: Timestamp,
	pub actor: Box<str>,
	pub action: Box<str>,
	pub tenant_id: Option<TenantId>,
	pub target: Option<Box<str>>,
	pub detail: serde_json::Value,
	pub client_addr: Option<Box<str>>,
}

#[derive(Debug)]
pub struct AppendAuditData<'a> {
	pub created_at: Timestamp,
	pub actor: &'a str,
	pub action: &'a str,
	pub tenant_id: Option<&'a TenantId>,
	pub target: Option<&'a str>,
	pub detail: &'a serde_json::Value,
	pub client_addr: Option<&'a str>,
}

/// Audit query: filter by tenant, action, time range; newest first; paged
/// by id.
#[derive(Debug, Default)]
pub struct AuditQuery<'a> {
	pub tenant_id: Option<&'a TenantId>,
	pub action: Option<&'a str>,
	pub since: Option<Timestamp>,
	pub until: Option<Timestamp>,
	/// Return rows with ids strictly below this one.
	pub before_id: Option<i64>,
	pub limit: Option<u32>,
}

#[async_trait]
pub trait StoreAdapter: Debug + Send + Sync {
	// Tenants
	async fn create_tenant(&self, data: CreateTenantData<'_>) -> NhResult<TenantRecord>;
	async fn read_tenant(&self, tenant_id: &TenantId) -> NhResult<TenantRecord>;
	async fn read_tenant_by_external_id(&self, external_id: &str) -> NhResult<TenantRecord>;
	async fn list_tenants(&self) -> NhResult<Vec<TenantRecord>>;
	async fn update_tenant_tier(&self, tenant_id: &TenantId, tier: Tier) -> NhResult<()>;
	async fn update_tenant_public_key(&self, tenant_id: &TenantId, public_key: &str) -> NhResult<()>;
	async fn update_tenant_seed(&self, tenant_id: &TenantId, sealed_seed: &str) -> NhResult<()>;
	/// Deletes the tenant and cascades to credentials, events, deliveries
	/// and webhooks.
	async fn delete_tenant(&self, tenant_id: &TenantId) -> NhResult<()>;

	// Credentials
	async fn create_credential(&self, data: CreateCredentialData<'_>) -> NhResult<CredentialRecord>;
	async fn read_credential_by_hash(&self, hash: &str) -> NhResult<CredentialRecord>;
	async fn list_credentials(&self, tenant_id: &TenantId) -> NhResult<Vec<CredentialRecord>>;
	async fn revoke_credential(&self, tenant_id: &TenantId, credential_id: &str) -> NhResult<()>;
	/// Best-effort last-used bump; callers never block on it.
	async fn touch_credential(&self, credential_id: &str) -> NhResult<()>;

	// Event index
	async fn insert_event(&self, event: &EventRecord) -> NhResult<()>;
	async fn read_event(&self, tenant_id: &TenantId, event_id: &str) -> NhResult<EventRecord>;
	async fn list_events(
		&self,
		tenant_id: &TenantId,
		opts: ListEventsOptions<'_>,
	) -> NhResult<Vec<EventRecord>>;

	// Deliveries
	async fn insert_delivery(&self, delivery: &DeliveryRecord) -> NhResult<()>;
	async fn update_delivery(&self, delivery_id: &str, update: DeliveryUpdate<'_>) -> NhResult<()>;
	async fn read_delivery(&self, delivery_id: &str) -> NhResult<DeliveryRecord>;
	async fn list_deliveries_by_event(&self, tenant_id: &TenantId, event_id: &str) -> NhResult<Vec<DeliveryRecord>>;
	async fn list_deliveries_by_webhook(&self, tenant_id: &TenantId, webhook_id: &str) -> NhResult<Vec<DeliveryRecord>>;

	// Webhooks
	async fn create_webhook(&self, data: CreateWebhookData<'_>) -> NhResult<WebhookRecord>;
	async fn read_webhook(&self, tenant_id: &TenantId, webhook_id: &str) -> NhResult<WebhookRecord>;
	async fn list_webhooks(&self, tenant_id: &TenantId) -> NhResult<Vec<WebhookRecord>>;
	async fn list_enabled_webhooks(&self, tenant_id: &TenantId) -> NhResult<Vec<WebhookRecord>>;
	async fn update_webhook(
		&self,
		tenant_id: &TenantId,
		webhook_id: &str,
		data: UpdateWebhookData<'_>,
	) -> NhResult<WebhookRecord>;
	async fn delete_webhook(&self, tenant_id: &TenantId, webhook_id: &str) -> NhResult<()>;

	// Audit
	async fn append_audit(&self, data: AppendAuditData<'_>) -> NhResult<i64>;
	async fn query_audit(&self, query: AuditQuery<'_>) -> NhResult<Vec<AuditRecord>>;
}

// vim: ts=4
