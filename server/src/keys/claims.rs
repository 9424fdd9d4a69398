//! Signed claim tokens.
//!
//! Account claims are signed by the operator and embed the tier-derived
//! resource caps. User claims are signed by the tenant's account key and
//! scope publish/subscribe to the tenant's subject tree. Tokens are rebuilt
//! from durable state on demand and never stored.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use nkeys::KeyPair;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::keys;
use crate::prelude::*;

const JWT_HEADER: &str = r#"{"typ":"JWT","alg":"ed25519-nkey"}"#;

/// Default claim validity; claims are refreshed from durable state well
/// before this elapses.
const CLAIM_TTL_SECS: i64 = 30 * 24 * 3600;

#[derive(Debug, Serialize)]
struct AccountLimits {
	conn: i64,
	data: i64,
	payload: i64,
	imports: i64,
	exports: i64,
}

#[derive(Debug, Serialize)]
struct AccountNats {
	limits: AccountLimits,
}

#[derive(Debug, Serialize)]
struct AccountClaims {
	jti: String,
	iat: i64,
	exp: i64,
	iss: String,
	sub: String,
	name: String,
	nats: AccountNats,
}

#[derive(Debug, Serialize)]
struct Permission {
	allow: Vec<String>,
}

#[derive(Debug, Serialize)]
struct UserNats {
	#[serde(rename = "pub")]
	publish: Permission,
	sub: Permission,
}

#[derive(Debug, Serialize)]
struct UserClaims {
	jti: String,
	iat: i64,
	exp: i64,
	iss: String,
	sub: String,
	name: String,
	nats: UserNats,
}

fn encode_segment(bytes: &[u8]) -> String {
	URL_SAFE_NO_PAD.encode(bytes)
}

fn sign_token(body_json: String, signer: &KeyPair) -> NhResult<String> {
	let header = encode_segment(JWT_HEADER.as_bytes());
	let body = encode_segment(body_json.as_bytes());
	let signing_input = format!("{}.{}", header, body);
	let signature = keys::sign(signer, signing_input.as_bytes())?;
	Ok(format!("{}.{}", signing_input, encode_segment(&signature)))
}

fn jti_for(body_json: &str) -> String {
	hex::encode(Sha256::digest(body_json.as_bytes()))
}

/// Build the account claim for a tenant, signed by the operator key.
///
/// Caps are recomputed from the tier on every call, so tier changes
/// propagate on the next rebuild.
pub fn build_account_claim(
	operator: &KeyPair,
	account_public: &str,
	name: &str,
	tier: Tier,
) -> NhResult<String> {
	let caps = tier.caps();
	let now = Timestamp::now().0;
	let mut claims = AccountClaims {
		jti: String::new(),
		iat: now,
		exp: now + CLAIM_TTL_SECS,
		iss: keys::public_key(operator),
		sub: account_public.to_string(),
		name: name.to_string(),
		nats: AccountNats {
			limits: AccountLimits {
				conn: caps.max_connections,
				data: caps.max_storage_bytes,
				payload: caps.max_payload_bytes as i64,
				imports: caps.max_imports,
				exports: caps.max_exports,
			},
		},
	};
	claims.jti = jti_for(&serde_json::to_string(&claims)?);
	sign_token(serde_json::to_string(&claims)?, operator)
}

/// Build an ephemeral user claim scoped to one tenant's subject tree,
/// signed by the tenant's account key.
///
/// Streams live inside the tenant's own account, so granting the JetStream
/// API wholesale is still tenant-scoped.
pub fn build_user_claim(
	account: &KeyPair,
	user_public: &str,
	tenant_id: &TenantId,
) -> NhResult<String> {
	let now = Timestamp::now().0;
	let publish = vec![
		format!("events.{}.>", tenant_id),
		format!("deadletter.{}.>", tenant_id),
		format!("webhook.retry.{}.>", tenant_id),
		"$JS.API.>".to_string(),
	];
	let subscribe = vec![
		format!("events.{}.>", tenant_id),
		format!("deadletter.{}.>", tenant_id),
		format!("webhook.retry.{}.>", tenant_id),
		"_INBOX.>".to_string(),
	];
	let mut claims = UserClaims {
		jti: String::new(),
		iat: now,
		exp: now + CLAIM_TTL_SECS,
		iss: keys::public_key(account),
		sub: user_public.to_string(),
		name: format!("{}-gateway", tenant_id),
		nats: UserNats { publish: Permission { allow: publish }, sub: Permission { allow: subscribe } },
	};
	claims.jti = jti_for(&serde_json::to_string(&claims)?);
	sign_token(serde_json::to_string(&claims)?, account)
}

#[derive(Debug, Serialize)]
struct DeleteNats {
	accounts: Vec<String>,
}

#[derive(Debug, Serialize)]
struct DeleteClaims {
	jti: String,
	iat: i64,
	iss: String,
	sub: String,
	nats: DeleteNats,
}

/// Build the operator-signed claim that removes an account from the bus.
pub fn build_delete_claim(operator: &KeyPair, account_public: &str) -> NhResult<String> {
	let operator_public = keys::public_key(operator);
	let mut claims = DeleteClaims {
		jti: String::new(),
		iat: Timestamp::now().0,
		iss: operator_public.clone(),
		sub: operator_public,
		nats: DeleteNats { accounts: vec![account_public.to_string()] },
	};
	claims.jti = jti_for(&serde_json::to_string(&claims)?);
	sign_token(serde_json::to_string(&claims)?, operator)
}

/// Decode the claims body of a token without verifying the signature.
pub fn decode_claims(token: &str) -> NhResult<serde_json::Value> {
	let mut parts = token.split('.');
	let (Some(_header), Some(body), Some(_sig)) = (parts.next(), parts.next(), parts.next()) else {
		return Err(Error::ValidationFailed("malformed claim token".into()));
	};
	let bytes = URL_SAFE_NO_PAD
		.decode(body)
		.map_err(|_| Error::ValidationFailed("malformed claim token body".into()))?;
	Ok(serde_json::from_slice(&bytes)?)
}

/// Verify a token signature against the signer's public key.
pub fn verify(token: &str, signer_public: &str) -> NhResult<()> {
	let mut parts = token.rsplitn(2, '.');
	let (Some(sig), Some(signing_input)) = (parts.next(), parts.next()) else {
		return Err(Error::ValidationFailed("malformed claim token".into()));
	};
	let signature = URL_SAFE_NO_PAD
		.decode(sig)
		.map_err(|_| Error::ValidationFailed("malformed claim signature".into()))?;
	let public = KeyPair::from_public_key(signer_public)
		.map_err(|err| Error::InvalidKey(format!("public key rejected: {}", err)))?;
	public
		.verify(signing_input.as_bytes(), &signature)
		.map_err(|_| Error::ValidationFailed("claim signature mismatch".into()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::keys::KeyKind;

	#[test]
	fn account_claim_embeds_tier_caps_and_subject() {
		let operator = keys::generate(KeyKind::Operator);
		let account = keys::generate(KeyKind::Account);
		let account_public = keys::public_key(&account);

		let token = build_account_claim(&operator, &account_public, "acme", Tier::Free).unwrap();
		let claims = decode_claims(&token).unwrap();

		assert_eq!(claims["sub"], account_public.as_str());
		assert_eq!(claims["iss"], keys::public_key(&operator).as_str());
		assert_eq!(claims["nats"]["limits"]["conn"], 10);
		assert_eq!(claims["nats"]["limits"]["payload"], 256 * 1024);
		verify(&token, &keys::public_key(&operator)).unwrap();
	}

	#[test]
	fn rebuilding_a_claim_reflects_a_tier_change() {
		let operator = keys::generate(KeyKind::Operator);
		let account_public = keys::public_key(&keys::generate(KeyKind::Account));

		let free = build_account_claim(&operator, &account_public, "acme", Tier::Free).unwrap();
		let pro = build_account_claim(&operator, &account_public, "acme", Tier::Pro).unwrap();

		assert_eq!(decode_claims(&free).unwrap()["nats"]["limits"]["conn"], 10);
		assert_eq!(decode_claims(&pro).unwrap()["nats"]["limits"]["conn"], 100);
	}

	#[test]
	fn user_claim_is_scoped_to_the_tenant_tree() {
		let account = keys::generate(KeyKind::Account);
		let user_public = keys::public_key(&keys::generate(KeyKind::User));
		let tenant = TenantId::parse("t1").unwrap();

		let token = build_user_claim(&account, &user_public, &tenant).unwrap();
		let claims = decode_claims(&token).unwrap();

		let allow = claims["nats"]["pub"]["allow"].as_array().unwrap();
		assert!(allow.iter().any(|s| s == "events.t1.>"));
		assert!(!allow.iter().any(|s| s.as_str().is_some_and(|s| s.starts_with("events.t2"))));
		verify(&token, &keys::public_key(&account)).unwrap();
	}

	#[test]
	fn tampered_tokens_fail_verification() {
		let operator = keys::generate(KeyKind::Operator);
		let account_public = keys::public_key(&keys::generate(KeyKind::Account));
		let token = build_account_claim(&operator, &account_public, "acme", Tier::Pro).unwrap();

		let other = keys::generate(KeyKind::Operator);
		assert!(verify(&token, &keys::public_key(&other)).is_err());
	}
}

// vim: ts=4
