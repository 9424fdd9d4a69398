//! DNS resolution for outbound URL validation.

use hickory_resolver::{
	config::ResolverConfig, name_server::TokioConnectionProvider, TokioResolver,
};
use std::net::IpAddr;

use crate::prelude::*;

/// Build the resolver used by the URL guard.
pub fn create_resolver() -> TokioResolver {
	TokioResolver::builder_with_config(ResolverConfig::default(), TokioConnectionProvider::default())
		.build()
}

/// Resolve every address of a hostname. An empty answer is an error; the
/// caller must check each returned address.
pub async fn resolve_all(resolver: &TokioResolver, host: &str) -> NhResult<Vec<IpAddr>> {
	let lookup = resolver
		.lookup_ip(host)
		.await
		.map_err(|err| Error::ValidationFailed(format!("dns lookup failed for {}: {}", host, err)))?;

	let addrs: Vec<IpAddr> = lookup.iter().collect();
	if addrs.is_empty() {
		return Err(Error::ValidationFailed(format!("no addresses for {}", host)));
	}
	Ok(addrs)
}

// vim: ts=4
