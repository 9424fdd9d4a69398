//! Store adapter CRUD tests
//!
//! Covers tenants, credentials, the event index, deliveries, and webhooks
//! against a temporary on-disk database.

use notifhub::store_adapter::*;
use notifhub::types::{TenantId, Tier, Timestamp};
use notifhub_store_adapter_sqlite::StoreAdapterSqlite;
use tempfile::TempDir;

async fn create_test_adapter() -> (StoreAdapterSqlite, TempDir) {
	let temp_dir = TempDir::new().expect("Failed to create temp directory");
	let path = temp_dir.path().join("store.db");
	let adapter = StoreAdapterSqlite::new(path.to_str().expect("utf-8 path"))
		.await
		.expect("Failed to create adapter");
	(adapter, temp_dir)
}

fn tid(s: &str) -> TenantId {
	TenantId::parse(s).expect("valid tenant id")
}

async fn seed_tenant(adapter: &StoreAdapterSqlite, id: &str) -> TenantRecord {
	adapter
		.create_tenant(CreateTenantData {
			tenant_id: &tid(id),
			name: "Acme",
			external_id: None,
			public_key: &format!("A{}PUBLICKEY", id.to_uppercase()),
			sealed_seed: "SAEXAMPLESEALEDSEED",
			tier: Tier::Free,
		})
		.await
		.expect("create tenant")
}

#[tokio::test]
async fn create_and_read_tenant() {
	let (adapter, _temp) = create_test_adapter().await;
	let created = seed_tenant(&adapter, "t1").await;
	assert_eq!(created.tenant_id.as_str(), "t1");
	assert_eq!(created.tier, Tier::Free);

	let read = adapter.read_tenant(&tid("t1")).await.expect("read tenant");
	assert_eq!(read.public_key, created.public_key);
	assert_eq!(read.sealed_seed.as_ref(), "SAEXAMPLESEALEDSEED");
}

#[tokio::test]
async fn duplicate_tenant_id_conflicts() {
	let (adapter, _temp) = create_test_adapter().await;
	seed_tenant(&adapter, "t1").await;

	let result = adapter
		.create_tenant(CreateTenantData {
			tenant_id: &tid("t1"),
			name: "Other",
			external_id: None,
			public_key: "AOTHERKEY",
			sealed_seed: "SAOTHER",
			tier: Tier::Pro,
		})
		.await;
	assert!(matches!(result, Err(notifhub::error::Error::Conflict(_))));
}

#[tokio::test]
async fn duplicate_public_key_conflicts() {
	let (adapter, _temp) = create_test_adapter().await;
	let first = seed_tenant(&adapter, "t1").await;

	let result = adapter
		.create_tenant(CreateTenantData {
			tenant_id: &tid("t2"),
			name: "Other",
			external_id: None,
			public_key: &first.public_key,
			sealed_seed: "SAOTHER",
			tier: Tier::Pro,
		})
		.await;
	assert!(matches!(result, Err(notifhub::error::Error::Conflict(_))));
}

#[tokio::test]
async fn external_id_lookup() {
	let (adapter, _temp) = create_test_adapter().await;
	adapter
		.create_tenant(CreateTenantData {
			tenant_id: &tid("t1"),
			name: "Acme",
			external_id: Some("org-42"),
			public_key: "AT1KEY",
			sealed_seed: "SAT1",
			tier: Tier::Pro,
		})
		.await
		.expect("create tenant");

	let read = adapter.read_tenant_by_external_id("org-42").await.expect("lookup");
	assert_eq!(read.tenant_id.as_str(), "t1");
	assert!(adapter.read_tenant_by_external_id("org-43").await.is_err());
}

#[tokio::test]
async fn tier_update_round_trips() {
	let (adapter, _temp) = create_test_adapter().await;
	seed_tenant(&adapter, "t1").await;

	adapter.update_tenant_tier(&tid("t1"), Tier::Enterprise).await.expect("update tier");
	let read = adapter.read_tenant(&tid("t1")).await.expect("read tenant");
	assert_eq!(read.tier, Tier::Enterprise);
	assert!(read.updated_at >= read.created_at);
}

#[tokio::test]
async fn delete_cascades_and_recreate_is_permitted() {
	let (adapter, _temp) = create_test_adapter().await;
	let tenant = seed_tenant(&adapter, "t1").await;

	adapter
		.create_credential(CreateCredentialData {
			credential_id: "cred_1",
			tenant_id: &tenant.tenant_id,
			hash: &"a".repeat(64),
			prefix: "nsh_abcd",
			label: Some("ci"),
			rate_limit: 10,
		})
		.await
		.expect("create credential");
	adapter
		.insert_event(&EventRecord {
			event_id: "evt_1".into(),
			tenant_id: tenant.tenant_id.clone(),
			topic: "orders.created".into(),
			payload_size: 12,
			created_at: Timestamp::now(),
		})
		.await
		.expect("insert event");
	adapter
		.create_webhook(CreateWebhookData {
			webhook_id: "wh_1",
			tenant_id: &tenant.tenant_id,
			url: "https://sink.example.com/h",
			topics: &["orders.*".into()],
			secret: &"0".repeat(64),
			enabled: true,
		})
		.await
		.expect("create webhook");

	adapter.delete_tenant(&tid("t1")).await.expect("delete tenant");

	assert!(adapter.read_tenant(&tid("t1")).await.is_err());
	assert!(adapter.read_credential_by_hash(&"a".repeat(64)).await.is_err());
	assert!(adapter.read_event(&tid("t1"), "evt_1").await.is_err());
	assert!(adapter.read_webhook(&tid("t1"), "wh_1").await.is_err());

	// Recreating the same id must work and may carry a fresh key.
	let again = adapter
		.create_tenant(CreateTenantData {
			tenant_id: &tid("t1"),
			name: "Acme",
			external_id: None,
			public_key: "AFRESHKEY",
			sealed_seed: "SAFRESH",
			tier: Tier::Free,
		})
		.await
		.expect("recreate tenant");
	assert_eq!(again.public_key.as_ref(), "AFRESHKEY");
}

#[tokio::test]
async fn credential_revoke_is_soft() {
	let (adapter, _temp) = create_test_adapter().await;
	let tenant = seed_tenant(&adapter, "t1").await;
	let hash = "b".repeat(64);

	adapter
		.create_credential(CreateCredentialData {
			credential_id: "cred_1",
			tenant_id: &tenant.tenant_id,
			hash: &hash,
			prefix: "nsh_abcd",
			label: None,
			rate_limit: 5,
		})
		.await
		.expect("create credential");

	adapter.revoke_credential(&tid("t1"), "cred_1").await.expect("revoke");

	// The row survives, carrying its revocation timestamp.
	let read = adapter.read_credential_by_hash(&hash).await.expect("read revoked");
	assert!(read.revoked_at.is_some());

	// Revoking twice is NotFound: the unrevoked row no longer exists.
	assert!(adapter.revoke_credential(&tid("t1"), "cred_1").await.is_err());
}

#[tokio::test]
async fn event_listing_filters_and_pages() {
	let (adapter, _temp) = create_test_adapter().await;
	let tenant = seed_tenant(&adapter, "t1").await;

	for i in 0..5 {
		adapter
			.insert_event(&EventRecord {
				event_id: format!("evt_{}", i).into(),
				tenant_id: tenant.tenant_id.clone(),
				topic: if i % 2 == 0 { "orders.created".into() } else { "orders.cancelled".into() },
				payload_size: 10 + i,
				created_at: Timestamp(1000 + i),
			})
			.await
			.expect("insert event");
	}

	let all = adapter
		.list_events(&tid("t1"), ListEventsOptions::default())
		.await
		.expect("list events");
	assert_eq!(all.len(), 5);
	// Newest first.
	assert_eq!(all[0].event_id.as_ref(), "evt_4");

	let created_only = adapter
		.list_events(
			&tid("t1"),
			ListEventsOptions { topic: Some("orders.created"), limit: None, offset: None },
		)
		.await
		.expect("list filtered");
	assert_eq!(created_only.len(), 3);

	let page = adapter
		.list_events(&tid("t1"), ListEventsOptions { topic: None, limit: Some(2), offset: Some(2) })
		.await
		.expect("list page");
	assert_eq!(page.len(), 2);
	assert_eq!(page[0].event_id.as_ref(), "evt_2");
}

fn webhook_delivery(tenant: &TenantId, id: &str) -> DeliveryRecord {
	DeliveryRecord {
		delivery_id: id.into(),
		event_id: "evt_1".into(),
		tenant_id: tenant.clone(),
		kind: DeliveryKind::Webhook,
		webhook_id: Some("wh_1".into()),
		consumer_group: None,
		client_id: None,
		status: DeliveryStatus::Pending,
		attempts: 0,
		created_at: Timestamp::now(),
		delivered_at: None,
		acked_at: None,
		error: None,
	}
}

#[tokio::test]
async fn delivery_updates_stop_at_terminal_states() {
	let (adapter, _temp) = create_test_adapter().await;
	let tenant = seed_tenant(&adapter, "t1").await;

	adapter
		.insert_delivery(&webhook_delivery(&tenant.tenant_id, "dlv_1"))
		.await
		.expect("insert delivery");

	adapter
		.update_delivery(
			"dlv_1",
			DeliveryUpdate {
				status: Some(DeliveryStatus::Acked),
				attempts: Some(2),
				acked_at: Some(Timestamp::now()),
				..Default::default()
			},
		)
		.await
		.expect("terminal update");

	// A late retry must not rewrite an acked delivery.
	adapter
		.update_delivery(
			"dlv_1",
			DeliveryUpdate {
				status: Some(DeliveryStatus::Pending),
				attempts: Some(3),
				..Default::default()
			},
		)
		.await
		.expect("late update is a no-op");

	let read = adapter.read_delivery("dlv_1").await.expect("read delivery");
	assert_eq!(read.status, DeliveryStatus::Acked);
	assert_eq!(read.attempts, 2);
}

#[tokio::test]
async fn deliveries_list_by_event_and_webhook() {
	let (adapter, _temp) = create_test_adapter().await;
	let tenant = seed_tenant(&adapter, "t1").await;

	adapter.insert_delivery(&webhook_delivery(&tenant.tenant_id, "dlv_1")).await.expect("insert");
	adapter.insert_delivery(&webhook_delivery(&tenant.tenant_id, "dlv_2")).await.expect("insert");

	let by_event = adapter.list_deliveries_by_event(&tid("t1"), "evt_1").await.expect("by event");
	assert_eq!(by_event.len(), 2);

	let by_webhook = adapter.list_deliveries_by_webhook(&tid("t1"), "wh_1").await.expect("by webhook");
	assert_eq!(by_webhook.len(), 2);
}

#[tokio::test]
async fn webhook_update_and_topics_round_trip() {
	let (adapter, _temp) = create_test_adapter().await;
	let tenant = seed_tenant(&adapter, "t1").await;

	let created = adapter
		.create_webhook(CreateWebhookData {
			webhook_id: "wh_1",
			tenant_id: &tenant.tenant_id,
			url: "https://sink.example.com/h",
			topics: &["orders.*".into(), "invoices.>".into()],
			secret: &"0".repeat(64),
			enabled: true,
		})
		.await
		.expect("create webhook");
	assert_eq!(created.topics.len(), 2);
	assert_eq!(created.topics[1].as_ref(), "invoices.>");

	let updated = adapter
		.update_webhook(
			&tid("t1"),
			"wh_1",
			UpdateWebhookData { url: None, topics: None, enabled: Some(false) },
		)
		.await
		.expect("update webhook");
	assert!(!updated.enabled);
	// Untouched fields survive the partial update.
	assert_eq!(updated.url.as_ref(), "https://sink.example.com/h");

	let enabled = adapter.list_enabled_webhooks(&tid("t1")).await.expect("enabled list");
	assert!(enabled.is_empty());
	let all = adapter.list_webhooks(&tid("t1")).await.expect("full list");
	assert_eq!(all.len(), 1);
}
