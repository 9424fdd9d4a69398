//! Audit log persistence tests

use notifhub::store_adapter::*;
use notifhub::types::{TenantId, Timestamp};
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

async fn append(
	adapter: &StoreAdapterSqlite,
	action: &str,
	tenant: Option<&TenantId>,
	at: i64,
) -> i64 {
	adapter
		.append_audit(AppendAuditData {
			created_at: Timestamp(at),
			actor: "test",
			action,
			tenant_id: tenant,
			target: None,
			detail: &serde_json::json!({ "n": at }),
			client_addr: None,
		})
		.await
		.expect("append audit")
}

#[tokio::test]
async fn audit_ids_are_monotonic() {
	let (adapter, _temp) = create_test_adapter().await;
	let mut last = 0;
	for i in 0..10 {
		let id = append(&adapter, "event.emit", None, 1000 + i).await;
		assert!(id > last, "id {} not greater than {}", id, last);
		last = id;
	}
}

#[tokio::test]
async fn query_is_newest_first_and_pages_by_id() {
	let (adapter, _temp) = create_test_adapter().await;
	for i in 0..10 {
		append(&adapter, "event.emit", None, 1000 + i).await;
	}

	let first_page = adapter
		.query_audit(AuditQuery { limit: Some(4), ..Default::default() })
		.await
		.expect("query");
	assert_eq!(first_page.len(), 4);
	assert!(first_page[0].audit_id > first_page[3].audit_id);

	let cursor = first_page[3].audit_id;
	let second_page = adapter
		.query_audit(AuditQuery { limit: Some(4), before_id: Some(cursor), ..Default::default() })
		.await
		.expect("query");
	assert_eq!(second_page.len(), 4);
	assert!(second_page[0].audit_id < cursor);
}

#[tokio::test]
async fn query_filters_by_tenant_action_and_time() {
	let (adapter, _temp) = create_test_adapter().await;
	let t1 = tid("t1");
	let t2 = tid("t2");

	append(&adapter, "event.emit", Some(&t1), 1000).await;
	append(&adapter, "event.emit", Some(&t2), 1001).await;
	append(&adapter, "webhook.create", Some(&t1), 1002).await;
	append(&adapter, "event.emit", Some(&t1), 2000).await;

	let t1_rows = adapter
		.query_audit(AuditQuery { tenant_id: Some(&t1), ..Default::default() })
		.await
		.expect("query");
	assert_eq!(t1_rows.len(), 3);

	let emits = adapter
		.query_audit(AuditQuery {
			tenant_id: Some(&t1),
			action: Some("event.emit"),
			..Default::default()
		})
		.await
		.expect("query");
	assert_eq!(emits.len(), 2);

	let windowed = adapter
		.query_audit(AuditQuery {
			since: Some(Timestamp(1001)),
			until: Some(Timestamp(1500)),
			..Default::default()
		})
		.await
		.expect("query");
	assert_eq!(windowed.len(), 2);
}

#[tokio::test]
async fn detail_blob_round_trips_without_schema() {
	let (adapter, _temp) = create_test_adapter().await;
	let detail = serde_json::json!({ "nested": { "k": [1, 2, 3] }, "note": "free-form" });
	adapter
		.append_audit(AppendAuditData {
			created_at: Timestamp(1000),
			actor: "admin",
			action: "tenant.create",
			tenant_id: None,
			target: Some("APUBKEY"),
			detail: &detail,
			client_addr: Some("203.0.113.9"),
		})
		.await
		.expect("append audit");

	let rows = adapter.query_audit(AuditQuery::default()).await.expect("query");
	assert_eq!(rows.len(), 1);
	assert_eq!(rows[0].detail, detail);
	assert_eq!(rows[0].client_addr.as_deref(), Some("203.0.113.9"));
}
