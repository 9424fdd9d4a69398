//! Per-credential rate limiting.
//!
//! Each credential gets its own lock-free token bucket sized from its
//! stored per-second cap. Buckets are created lazily and shared behind the
//! map lock, which is held only for the lookup.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::error::{Error, NhResult};

#[derive(Debug, Default)]
pub struct CredentialLimiters {
	buckets: RwLock<HashMap<Box<str>, Arc<DefaultDirectRateLimiter>>>,
}

impl CredentialLimiters {
	pub fn new() -> Self {
		Self::default()
	}

	/// Check one request against the credential's bucket.
	pub fn check(&self, credential_id: &str, rate: u32) -> NhResult<()> {
		let limiter = self.get_or_insert(credential_id, rate);
		match limiter.check() {
			Ok(()) => Ok(()),
			Err(_) => {
				metrics::counter!("nh_rate_limited_total").increment(1);
				Err(Error::RateLimited)
			}
		}
	}

	fn get_or_insert(&self, credential_id: &str, rate: u32) -> Arc<DefaultDirectRateLimiter> {
		if let Some(limiter) = self.buckets.read().get(credential_id) {
			return limiter.clone();
		}
		let rate = NonZeroU32::new(rate).unwrap_or(NonZeroU32::MIN);
		let limiter = Arc::new(RateLimiter::direct(Quota::per_second(rate)));
		let mut buckets = self.buckets.write();
		buckets.entry(credential_id.into()).or_insert(limiter).clone()
	}

	/// Drop the bucket for a revoked credential.
	pub fn forget(&self, credential_id: &str) {
		self.buckets.write().remove(credential_id);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn exactly_rate_requests_pass_then_deny() {
		let limiters = CredentialLimiters::new();
		for _ in 0..5 {
			assert!(limiters.check("cred_a", 5).is_ok());
		}
		assert!(matches!(limiters.check("cred_a", 5), Err(Error::RateLimited)));
	}

	#[test]
	fn buckets_are_independent_per_credential() {
		let limiters = CredentialLimiters::new();
		for _ in 0..3 {
			assert!(limiters.check("cred_a", 3).is_ok());
		}
		assert!(limiters.check("cred_a", 3).is_err());
		assert!(limiters.check("cred_b", 3).is_ok());
	}
}

// vim: ts=4
