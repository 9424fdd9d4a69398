//! SQLite-backed store adapter for Notifhub.
//!
//! One pool, WAL journal, foreign keys on. Schema initialization is
//! idempotent and runs at construction.

use async_trait::async_trait;
use sqlx::sqlite::{self, SqlitePool};
use std::fmt::Debug;
use std::str::FromStr;

use notifhub::prelude::*;
use notifhub::store_adapter::{
	AppendAuditData, AuditQuery, AuditRecord, CreateCredentialData, CreateTenantData,
	CreateWebhookData, CredentialRecord, DeliveryRecord, DeliveryUpdate, EventRecord,
	ListEventsOptions, StoreAdapter, TenantRecord, UpdateWebhookData, WebhookRecord,
};

mod audit;
mod credential;
mod delivery;
mod event;
mod schema;
mod tenant;
mod utils;
mod webhook;

pub struct StoreAdapterSqlite {
	db: SqlitePool,
}

impl Debug for StoreAdapterSqlite {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("StoreAdapterSqlite").finish()
	}
}

impl StoreAdapterSqlite {
	/// Open (creating if missing) the database named by `database_url`.
	/// Accepts both `sqlite:` URLs and bare paths.
	pub async fn new(database_url: &str) -> NhResult<Self> {
		let opts = match sqlite::SqliteConnectOptions::from_str(database_url) {
			Ok(opts) => opts,
			Err(_) => sqlite::SqliteConnectOptions::new().filename(database_url),
		};
		let opts = opts
			.create_if_missing(true)
			.journal_mode(sqlite::SqliteJournalMode::Wal)
			.foreign_keys(true);

		let db = sqlite::SqlitePoolOptions::new()
			.max_connections(5)
			.connect_with(opts)
			.await
			.map_err(|err| {
				warn!("DB open failed: {:#?}", err);
				Error::Internal("database open failed".into())
			})?;

		schema::init_db(&db).await.map_err(|err| {
			warn!("DB init failed: {:#?}", err);
			Error::Internal("database init failed".into())
		})?;

		Ok(Self { db })
	}
}

#[async_trait]
impl StoreAdapter for StoreAdapterSqlite {
	// Tenants
	async fn create_tenant(&self, data: CreateTenantData<'_>) -> NhResult<TenantRecord> {
		tenant::create_tenant(&self.db, data).await
	}

	async fn read_tenant(&self, tenant_id: &TenantId) -> NhResult<TenantRecord> {
		tenant::read_tenant(&self.db, tenant_id).await
	}

	async fn read_tenant_by_external_id(&self, external_id: &str) -> NhResult<TenantRecord> {
		tenant::read_tenant_by_external_id(&self.db, external_id).await
	}

	async fn list_tenants(&self) -> NhResult<Vec<TenantRecord>> {
		tenant::list_tenants(&self.db).await
	}

	async fn update_tenant_tier(&self, tenant_id: &TenantId, tier: Tier) -> NhResult<()> {
		tenant::update_tenant_tier(&self.db, tenant_id, tier).await
	}

	async fn update_tenant_public_key(&self, tenant_id: &TenantId, public_key: &str) -> NhResult<()> {
		tenant::update_tenant_public_key(&self.db, tenant_id, public_key).await
	}

	async fn update_tenant_seed(&self, tenant_id: &TenantId, sealed_seed: &str) -> NhResult<()> {
		tenant::update_tenant_seed(&self.db, tenant_id, sealed_seed).await
	}

	async fn delete_tenant(&self, tenant_id: &TenantId) -> NhResult<()> {
		tenant::delete_tenant(&self.db, tenant_id).await
	}

	// Credentials
	async fn create_credential(&self, data: CreateCredentialData<'_>) -> NhResult<CredentialRecord> {
		credential::create_credential(&self.db, data).await
	}

	async fn read_credential_by_hash(&self, hash: &str) -> NhResult<CredentialRecord> {
		credential::read_credential_by_hash(&self.db, hash).await
	}

	async fn list_credentials(&self, tenant_id: &TenantId) -> NhResult<Vec<CredentialRecord>> {
		credential::list_credentials(&self.db, tenant_id).await
	}

	async fn revoke_credential(&self, tenant_id: &TenantId, credential_id: &str) -> NhResult<()> {
		credential::revoke_credential(&self.db, tenant_id, credential_id).await
	}

	async fn touch_credential(&self, credential_id: &str) -> NhResult<()> {
		credential::touch_credential(&self.db, credential_id).await
	}

	// Event index
	async fn insert_event(&self, event: &EventRecord) -> NhResult<()> {
		event::insert_event(&self.db, event).await
	}

	async fn read_event(&self, tenant_id: &TenantId, event_id: &str) -> NhResult<EventRecord> {
		event::read_event(&self.db, tenant_id, event_id).await
	}

	async fn list_events(
		&self,
		tenant_id: &TenantId,
		opts: ListEventsOptions<'_>,
	) -> NhResult<Vec<EventRecord>> {
		event::list_events(&self.db, tenant_id, opts).await
	}

	// Deliveries
	async fn insert_delivery(&self, delivery: &DeliveryRecord) -> NhResult<()> {
		delivery::insert_delivery(&self.db, delivery).await
	}

	async fn update_delivery(&self, delivery_id: &str, update: DeliveryUpdate<'_>) -> NhResult<()> {
		delivery::update_delivery(&self.db, delivery_id, update).await
	}

	async fn read_delivery(&self, delivery_id: &str) -> NhResult<DeliveryRecord> {
		delivery::read_delivery(&self.db, delivery_id).await
	}

	async fn list_deliveries_by_event(
		&self,
		tenant_id: &TenantId,
		event_id: &str,
	) -> NhResult<Vec<DeliveryRecord>> {
		delivery::list_deliveries_by_event(&self.db, tenant_id, event_id).await
	}

	async fn list_deliveries_by_webhook(
		&self,
		tenant_id: &TenantId,
		webhook_id: &str,
	) -> NhResult<Vec<DeliveryRecord>> {
		delivery::list_deliveries_by_webhook(&self.db, tenant_id, webhook_id).await
	}

	// Webhooks
	async fn create_webhook(&self, data: CreateWebhookData<'_>) -> NhResult<WebhookRecord> {
		webhook::create_webhook(&self.db, data).await
	}

	async fn read_webhook(&self, tenant_id: &TenantId, webhook_id: &str) -> NhResult<WebhookRecord> {
		webhook::read_webhook(&self.db, tenant_id, webhook_id).await
	}

	async fn list_webhooks(&self, tenant_id: &TenantId) -> NhResult<Vec<WebhookRecord>> {
		webhook::list_webhooks(&self.db, tenant_id, false).await
	}

	async fn list_enabled_webhooks(&self, tenant_id: &TenantId) -> NhResult<Vec<WebhookRecord>> {
		webhook::list_webhooks(&self.db, tenant_id, true).await
	}

	async fn update_webhook(
		&self,
		tenant_id: &TenantId,
		webhook_id: &str,
		data: UpdateWebhookData<'_>,
	) -> NhResult<WebhookRecord> {
		webhook::update_webhook(&self.db, tenant_id, webhook_id, data).await
	}

	async fn delete_webhook(&self, tenant_id: &TenantId, webhook_id: &str) -> NhResult<()> {
		webhook::delete_webhook(&self.db, tenant_id, webhook_id).await
	}

	// Audit
	async fn append_audit(&self, data: AppendAuditData<'_>) -> NhResult<i64> {
		audit::append_audit(&self.db, data).await
	}

	async fn query_audit(&self, query: AuditQuery<'_>) -> NhResult<Vec<AuditRecord>> {
		audit::query_audit(&self.db, query).await
	}
}

// vim: ts=4
