//! Request authentication extractors.

use axum::{extract::FromRequestParts, http::request::Parts};
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

use crate::prelude::*;
use crate::store_adapter::CredentialRecord;

/// Context for a request authenticated by API credential.
#[derive(Clone, Debug)]
pub struct AuthCtx {
	pub credential_id: Box<str>,
	pub tenant_id: TenantId,
	pub rate_limit: u32,
}

fn secret_regex() -> &'static regex::Regex {
	static RE: OnceLock<regex::Regex> = OnceLock::new();
	RE.get_or_init(|| {
		#[allow(clippy::unwrap_used)] // the pattern is a literal
		regex::Regex::new("^nsh_[A-Za-z0-9]{28}$").unwrap()
	})
}

/// Hex SHA-256 of a bearer secret, the only form ever persisted.
pub fn hash_secret(secret: &str) -> String {
	hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Authenticate a bearer secret: format check, hash lookup, revocation
/// check, best-effort last-used bump.
///
/// Deliberately collapses "unknown", "malformed" and "revoked" into the
/// same `AuthFailed`.
pub async fn authenticate_secret(app: &App, secret: &str) -> NhResult<AuthCtx> {
	if !secret_regex().is_match(secret) {
		return Err(Error::AuthFailed);
	}

	let hash = hash_secret(secret);
	let credential: CredentialRecord = match app.store.read_credential_by_hash(&hash).await {
		Ok(credential) => credential,
		Err(Error::NotFound) => return Err(Error::AuthFailed),
		Err(err) => return Err(err),
	};
	if credential.revoked_at.is_some() {
		return Err(Error::AuthFailed);
	}

	// Last-used update never blocks the request.
	{
		let app = app.clone();
		let credential_id = credential.credential_id.clone();
		tokio::spawn(async move {
			if let Err(err) = app.store.touch_credential(&credential_id).await {
				debug!("credential touch failed: {}", err);
			}
		});
	}

	Ok(AuthCtx {
		credential_id: credential.credential_id,
		tenant_id: credential.tenant_id,
		rate_limit: credential.rate_limit,
	})
}

fn bearer_from_parts(parts: &Parts) -> NhResult<&str> {
	let header = parts
		.headers
		.get(axum::http::header::AUTHORIZATION)
		.and_then(|h| h.to_str().ok())
		.ok_or(Error::AuthFailed)?;
	header.strip_prefix("Bearer ").map(str::trim).ok_or(Error::AuthFailed)
}

/// Extractor for credential-authenticated routes.
pub struct Auth(pub AuthCtx);

impl FromRequestParts<App> for Auth {
	type Rejection = Error;

	async fn from_request_parts(parts: &mut Parts, state: &App) -> Result<Self, Self::Rejection> {
		let secret = bearer_from_parts(parts)?;
		let ctx = authenticate_secret(state, secret).await?;
		Ok(Auth(ctx))
	}
}

/// Extractor for the tenant/credential admin surface.
pub struct AdminAuth;

impl FromRequestParts<App> for AdminAuth {
	type Rejection = Error;

	async fn from_request_parts(parts: &mut Parts, state: &App) -> Result<Self, Self::Rejection> {
		let Some(expected) = state.settings.admin_token.as_deref() else {
			return Err(Error::AuthFailed);
		};
		let presented = bearer_from_parts(parts)?;
		if presented != expected {
			return Err(Error::AuthFailed);
		}
		Ok(AdminAuth)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn secret_format_is_strict() {
		assert!(secret_regex().is_match("nsh_AbCdEfGhIjKlMnOpQrStUvWxYz01"));
		assert!(!secret_regex().is_match("nsh_short"));
		assert!(!secret_regex().is_match("xsh_AbCdEfGhIjKlMnOpQrStUvWxYz01"));
		assert!(!secret_regex().is_match("nsh_AbCdEfGhIjKlMnOpQrStUvWxYz0!"));
		assert!(!secret_regex().is_match("nsh_AbCdEfGhIjKlMnOpQrStUvWxYz012"));
	}

	#[test]
	fn hashes_are_64_hex() {
		let hash = hash_secret("nsh_AbCdEfGhIjKlMnOpQrStUvWxYz01");
		assert_eq!(hash.len(), 64);
		assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
	}
}

// vim: ts=4
