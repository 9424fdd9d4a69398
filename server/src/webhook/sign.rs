//! Webhook request signing.
//!
//! The signature covers the exact body bytes with HMAC-SHA256 under the
//! subscription's secret. Receivers are expected to timing-safe-compare.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{Error, NhResult};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Notif-Signature";
pub const TIMESTAMP_HEADER: &str = "X-Notif-Timestamp";

/// `sha256=<hex>` over the body bytes.
pub fn signature(secret: &str, body: &[u8]) -> NhResult<String> {
	let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
		.map_err(|err| Error::SignFailed(format!("hmac key rejected: {}", err)))?;
	mac.update(body);
	Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn signature_is_stable_for_identical_bytes() {
		let body = br#"{"id":"evt_0","topic":"orders.created"}"#;
		let a = signature("s", body).unwrap();
		let b = signature("s", body).unwrap();
		assert_eq!(a, b);
		assert!(a.starts_with("sha256="));
		assert_eq!(a.len(), 7 + 64);
	}

	#[test]
	fn signature_changes_with_secret_and_body() {
		let body = b"payload";
		assert_ne!(signature("s1", body).unwrap(), signature("s2", body).unwrap());
		assert_ne!(signature("s1", body).unwrap(), signature("s1", b"payload2").unwrap());
	}

	#[test]
	fn known_vector() {
		// HMAC-SHA256("secret", "hello") from independent tooling.
		let sig = signature("secret", b"hello").unwrap();
		assert_eq!(
			sig,
			"sha256=88aab3ede8d3adf94d26ab90d3bafd4a2083070c3bcce9c014ee04a443847c0b"
		);
	}
}

// vim: ts=4
