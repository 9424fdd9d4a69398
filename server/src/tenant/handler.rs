//! Tenant and credential administration endpoints

use axum::{
	extract::{Path, State},
	http::StatusCode,
	Json,
};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::core::extract::hash_secret;
use crate::core::{utils, AdminAuth};
use crate::prelude::*;
use crate::store_adapter::{
	CreateCredentialData, CreateTenantData, CredentialRecord, TenantRecord,
};
use crate::tenant::lifecycle;
use crate::types::ApiResponse;
use crate::keys::{self, KeyKind};

const DEFAULT_CREDENTIAL_RATE: u32 = 100;

/// External view of a tenant. The sealed seed never leaves the store.
#[skip_serializing_none]
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantInfo {
	pub tenant_id: TenantId,
	pub name: Box<str>,
	pub external_id: Option<Box<str>>,
	pub public_key: Box<str>,
	pub tier: Tier,
	pub created_at: Timestamp,
	pub updated_at: Timestamp,
}

impl From<TenantRecord> for TenantInfo {
	fn from(record: TenantRecord) -> Self {
		Self {
			tenant_id: record.tenant_id,
			name: record.name,
			external_id: record.external_id,
			public_key: record.public_key,
			tier: record.tier,
			created_at: record.created_at,
			updated_at: record.updated_at,
		}
	}
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTenantReq {
	id: String,
	name: String,
	external_id: Option<String>,
	tier: Option<Tier>,
}

#[derive(Deserialize)]
pub struct UpdateTierReq {
	tier: Tier,
}

/// POST /api/v1/tenants
pub async fn post_tenant(
	State(app): State<App>,
	_admin: AdminAuth,
	Json(req): Json<CreateTenantReq>,
) -> NhResult<(StatusCode, Json<ApiResponse<TenantInfo>>)> {
	let tenant_id = TenantId::parse(&req.id)?;
	if req.name.trim().is_empty() {
		return Err(Error::ValidationFailed("tenant name must not be empty".into()));
	}
	let tier = req.tier.unwrap_or(Tier::Free);

	// Fresh account key pair; the seed is stored sealed, the public half
	// becomes the tenant's bus identity.
	let account = keys::generate(KeyKind::Account);
	let public_key = keys::public_key(&account);
	let sealed_seed = keys::seed(&account)?;

	let record = app
		.store
		.create_tenant(CreateTenantData {
			tenant_id: &tenant_id,
			name: req.name.trim(),
			external_id: req.external_id.as_deref(),
			public_key: &public_key,
			sealed_seed: &sealed_seed,
			tier,
		})
		.await?;

	if let Err(err) = lifecycle::prepare_tenant(&app, &record).await {
		// Roll the row back so creation stays all-or-nothing.
		error!(tenant_id = %tenant_id, "tenant activation failed: {}", err);
		let _ = app.store.delete_tenant(&tenant_id).await;
		return Err(err);
	}

	app.audit.log(
		"admin",
		"tenant.create",
		Some(&tenant_id),
		Some(&public_key),
		serde_json::json!({ "tier": tier, "name": record.name }),
		None,
	);

	Ok((StatusCode::CREATED, Json(ApiResponse::new(record.into()))))
}

/// GET /api/v1/tenants
pub async fn list_tenants(
	State(app): State<App>,
	_admin: AdminAuth,
) -> NhResult<Json<ApiResponse<Vec<TenantInfo>>>> {
	let tenants = app.store.list_tenants().await?;
	Ok(Json(ApiResponse::new(tenants.into_iter().map(Into::into).collect())))
}

/// DELETE /api/v1/tenants/{tenant_id}
pub async fn delete_tenant(
	State(app): State<App>,
	_admin: AdminAuth,
	Path(tenant_id): Path<String>,
) -> NhResult<Json<ApiResponse<()>>> {
	let tenant_id = TenantId::parse(&tenant_id)?;
	let record = app.store.read_tenant(&tenant_id).await?;

	lifecycle::teardown_tenant(&app, &record).await;
	app.store.delete_tenant(&tenant_id).await?;

	app.audit.log(
		"admin",
		"tenant.delete",
		Some(&tenant_id),
		Some(&record.public_key),
		serde_json::json!({}),
		None,
	);

	Ok(Json(ApiResponse::new(())))
}

/// PUT /api/v1/tenants/{tenant_id}/tier
pub async fn put_tenant_tier(
	State(app): State<App>,
	_admin: AdminAuth,
	Path(tenant_id): Path<String>,
	Json(req): Json<UpdateTierReq>,
) -> NhResult<Json<ApiResponse<TenantInfo>>> {
	let tenant_id = TenantId::parse(&tenant_id)?;
	app.store.update_tenant_tier(&tenant_id, req.tier).await?;
	let record = app.store.read_tenant(&tenant_id).await?;

	// New caps propagate by rebuilding the claim and re-provisioning.
	lifecycle::push_claim(&app, &record).await?;
	if let Ok(conn) = app.pool.get(&tenant_id) {
		crate::bus::provision::provision(&conn.jetstream, &tenant_id, record.tier).await?;
	}

	app.audit.log(
		"admin",
		"tenant.tier_update",
		Some(&tenant_id),
		None,
		serde_json::json!({ "tier": req.tier }),
		None,
	);

	Ok(Json(ApiResponse::new(record.into())))
}

// Credentials //
//*************//

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCredentialReq {
	label: Option<String>,
	rate_limit: Option<u32>,
}

/// Creation response carries the plaintext secret exactly once.
#[skip_serializing_none]
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCredentialRes {
	#[serde(flatten)]
	credential: CredentialRecord,
	secret: String,
}

/// POST /api/v1/tenants/{tenant_id}/credentials
pub async fn post_credential(
	State(app): State<App>,
	_admin: AdminAuth,
	Path(tenant_id): Path<String>,
	Json(req): Json<CreateCredentialReq>,
) -> NhResult<(StatusCode, Json<ApiResponse<CreateCredentialRes>>)> {
	let tenant_id = TenantId::parse(&tenant_id)?;
	app.store.read_tenant(&tenant_id).await?;

	let rate_limit = req.rate_limit.unwrap_or(DEFAULT_CREDENTIAL_RATE);
	if rate_limit == 0 {
		return Err(Error::ValidationFailed("rate limit must be positive".into()));
	}

	let credential_id = utils::new_credential_id();
	let secret = utils::new_credential_secret();
	let prefix = &secret[..8];

	let credential = app
		.store
		.create_credential(CreateCredentialData {
			credential_id: &credential_id,
			tenant_id: &tenant_id,
			hash: &hash_secret(&secret),
			prefix,
			label: req.label.as_deref(),
			rate_limit,
		})
		.await?;

	app.audit.log(
		"admin",
		"credential.create",
		Some(&tenant_id),
		Some(&credential_id),
		serde_json::json!({ "prefix": prefix, "rateLimit": rate_limit }),
		None,
	);

	let response = ApiResponse::new(CreateCredentialRes { credential, secret });
	Ok((StatusCode::CREATED, Json(response)))
}

/// GET /api/v1/tenants/{tenant_id}/credentials
pub async fn list_credentials(
	State(app): State<App>,
	_admin: AdminAuth,
	Path(tenant_id): Path<String>,
) -> NhResult<Json<ApiResponse<Vec<CredentialRecord>>>> {
	let tenant_id = TenantId::parse(&tenant_id)?;
	let credentials = app.store.list_credentials(&tenant_id).await?;
	Ok(Json(ApiResponse::new(credentials)))
}

/// DELETE /api/v1/tenants/{tenant_id}/credentials/{credential_id}
///
/// Credentials are soft-revoked, never removed.
pub async fn revoke_credential(
	State(app): State<App>,
	_admin: AdminAuth,
	Path((tenant_id, credential_id)): Path<(String, String)>,
) -> NhResult<Json<ApiResponse<()>>> {
	let tenant_id = TenantId::parse(&tenant_id)?;
	app.store.revoke_credential(&tenant_id, &credential_id).await?;
	app.limiters.forget(&credential_id);

	app.audit.log(
		"admin",
		"credential.revoke",
		Some(&tenant_id),
		Some(&credential_id),
		serde_json::json!({}),
		None,
	);

	Ok(Json(ApiResponse::new(())))
}

// vim: ts=4
