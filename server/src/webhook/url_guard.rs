//! SSRF guard for outbound webhook URLs.
//!
//! A syntactic validator plus a resolver check. Every rejection names one
//! of four categories (scheme, host, port, encoding); the resolved IP is
//! never echoed back.

use hickory_resolver::TokioResolver;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::core::dns;
use crate::error::{Error, NhResult, UrlReject};
use crate::prelude::*;

const BLOCKED_PORTS: [u16; 10] = [22, 25, 3306, 5432, 6379, 9200, 11211, 27017, 2379, 8500];

/// Cluster-internal names, metadata hostnames, and common dev-loopback
/// resolvers.
const BLOCKED_HOSTS: [&str; 12] = [
	"metadata.google.internal",
	"metadata.internal",
	"metadata",
	"instance-data",
	"instance-data.ec2.internal",
	"kubernetes.default.svc.cluster.local",
	"kubernetes.default.svc",
	"kubernetes.default",
	"kubernetes",
	"consul",
	"rancher-metadata",
	"docker.for.mac.localhost",
];

/// Wildcard DNS services that resolve to caller-chosen addresses.
const REBINDING_SUFFIXES: [&str; 7] = [
	".nip.io",
	".sslip.io",
	".xip.io",
	".localtest.me",
	".lvh.me",
	".vcap.me",
	".traefik.me",
];

const METADATA_V4: [Ipv4Addr; 2] =
	[Ipv4Addr::new(169, 254, 169, 254), Ipv4Addr::new(100, 100, 100, 200)];

#[derive(Debug)]
pub enum CheckedHost {
	Name(String),
	Ip(IpAddr),
}

#[derive(Debug)]
pub struct CheckedUrl {
	pub host: CheckedHost,
	pub port: u16,
}

fn reject(category: UrlReject) -> Error {
	Error::URLRejected(category)
}

/// True for destination addresses the hub must never POST to.
pub fn blocked_ip(ip: &IpAddr) -> bool {
	match ip {
		IpAddr::V4(v4) => {
			v4.is_loopback()
				|| v4.is_private()
				|| v4.is_link_local()
				|| v4.is_unspecified()
				|| v4.is_broadcast()
				|| METADATA_V4.contains(v4)
		}
		IpAddr::V6(v6) => {
			if let Some(mapped) = v6.to_ipv4_mapped() {
				return blocked_ip(&IpAddr::V4(mapped));
			}
			v6.is_loopback()
				|| v6.is_unspecified()
				|| v6.is_unique_local()
				|| v6.is_unicast_link_local()
		}
	}
}

fn numeric_host(host: &str) -> bool {
	if host.is_empty() {
		return false;
	}
	if let Some(hex) = host.strip_prefix("0x") {
		return !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit());
	}
	host.chars().all(|c| c.is_ascii_digit())
}

/// Pure syntactic validation. Does not touch the network.
pub fn check_syntax(raw: &str) -> NhResult<CheckedUrl> {
	let trimmed = raw.trim();
	if trimmed.is_empty() {
		return Err(reject(UrlReject::Host));
	}
	if trimmed.contains('\\') {
		return Err(reject(UrlReject::Encoding));
	}

	let lower = trimmed.to_ascii_lowercase();
	for escape in ["%00", "%0d", "%0a"] {
		if lower.contains(escape) {
			return Err(reject(UrlReject::Encoding));
		}
	}
	if lower.contains("::ffff:") {
		return Err(reject(UrlReject::Encoding));
	}

	let url = url::Url::parse(trimmed).map_err(|_| reject(UrlReject::Encoding))?;

	match url.scheme() {
		"http" | "https" => {}
		_ => return Err(reject(UrlReject::Scheme)),
	}
	if !url.username().is_empty() || url.password().is_some() {
		return Err(reject(UrlReject::Encoding));
	}
	if url.fragment().is_some() {
		return Err(reject(UrlReject::Encoding));
	}

	let port = url.port_or_known_default().ok_or_else(|| reject(UrlReject::Port))?;
	if BLOCKED_PORTS.contains(&port) {
		return Err(reject(UrlReject::Port));
	}

	let host = match url.host() {
		None => return Err(reject(UrlReject::Host)),
		// Bracketed IPv6 is rejected wholesale.
		Some(url::Host::Ipv6(_)) => return Err(reject(UrlReject::Encoding)),
		Some(url::Host::Ipv4(v4)) => {
			let ip = IpAddr::V4(v4);
			if blocked_ip(&ip) {
				return Err(reject(UrlReject::Host));
			}
			return Ok(CheckedUrl { host: CheckedHost::Ip(ip), port });
		}
		Some(url::Host::Domain(name)) => name.trim_end_matches('.').to_ascii_lowercase(),
	};

	if host.is_empty() {
		return Err(reject(UrlReject::Host));
	}
	if host.contains("localhost") {
		return Err(reject(UrlReject::Host));
	}
	if BLOCKED_HOSTS.contains(&host.as_str()) {
		return Err(reject(UrlReject::Host));
	}
	if REBINDING_SUFFIXES.iter().any(|suffix| host.ends_with(suffix)) {
		return Err(reject(UrlReject::Host));
	}
	// Decimal/octal/hex integer hostnames are address-literal smuggling.
	if numeric_host(&host) {
		return Err(reject(UrlReject::Host));
	}

	Ok(CheckedUrl { host: CheckedHost::Name(host), port })
}

/// Full validation: syntax plus resolution. Every resolved address must be
/// acceptable.
pub async fn validate_webhook_url(resolver: &TokioResolver, raw: &str) -> NhResult<()> {
	let checked = check_syntax(raw)?;
	match checked.host {
		CheckedHost::Ip(_) => Ok(()),
		CheckedHost::Name(name) => {
			let addrs = dns::resolve_all(resolver, &name).await.map_err(|err| {
				debug!("webhook url resolution failed: {}", err);
				reject(UrlReject::Host)
			})?;
			if addrs.iter().any(blocked_ip) {
				return Err(reject(UrlReject::Host));
			}
			Ok(())
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn category(raw: &str) -> UrlReject {
		match check_syntax(raw) {
			Err(Error::URLRejected(category)) => category,
			other => panic!("expected rejection for {}, got {:?}", raw, other),
		}
	}

	#[test]
	fn accepts_public_https() {
		assert!(check_syntax("https://sink.example.com/hooks").is_ok());
		assert!(check_syntax("http://sink.example.com:8080/hooks").is_ok());
	}

	#[test]
	fn rejects_non_http_schemes() {
		assert_eq!(category("ftp://example.com/"), UrlReject::Scheme);
		assert_eq!(category("file:///etc/passwd"), UrlReject::Scheme);
		assert_eq!(category("gopher://example.com/"), UrlReject::Scheme);
	}

	#[test]
	fn rejects_metadata_addresses() {
		assert_eq!(category("http://169.254.169.254/latest/meta-data/"), UrlReject::Host);
		assert_eq!(category("http://100.100.100.200/"), UrlReject::Host);
		assert_eq!(category("http://metadata.google.internal/"), UrlReject::Host);
	}

	#[test]
	fn rejects_loopback_and_private_literals() {
		assert_eq!(category("http://127.0.0.1/"), UrlReject::Host);
		assert_eq!(category("http://10.0.0.8/"), UrlReject::Host);
		assert_eq!(category("http://192.168.1.1/"), UrlReject::Host);
		assert_eq!(category("http://0.0.0.0/"), UrlReject::Host);
	}

	#[test]
	fn rejects_localhost_in_any_disguise() {
		assert_eq!(category("http://localhost/"), UrlReject::Host);
		assert_eq!(category("http://LOCALHOST/"), UrlReject::Host);
		assert_eq!(category("http://localhost./"), UrlReject::Host);
		assert_eq!(category("  http://localhost/  "), UrlReject::Host);
		assert_eq!(category("http://notlocalhost.example.com/"), UrlReject::Host);
	}

	#[test]
	fn rejects_integer_hostnames() {
		// The url crate normalizes these to IPv4 literals; either path
		// must end in a host rejection.
		assert_eq!(category("http://2130706433/"), UrlReject::Host);
		assert_eq!(category("http://0x7f000001/"), UrlReject::Host);
		assert_eq!(category("http://017700000001/"), UrlReject::Host);
	}

	#[test]
	fn rejects_encoding_tricks() {
		assert_eq!(category("http://user@example.com/"), UrlReject::Encoding);
		assert_eq!(category("http://user:pw@example.com/"), UrlReject::Encoding);
		assert_eq!(category("http://example.com/path#frag"), UrlReject::Encoding);
		assert_eq!(category("http://example.com/%00"), UrlReject::Encoding);
		assert_eq!(category("http://example.com/%0D%0Apath"), UrlReject::Encoding);
		assert_eq!(category("http://example.com\\path"), UrlReject::Encoding);
		assert_eq!(category("http://[::1]/"), UrlReject::Encoding);
		assert_eq!(category("http://[::ffff:127.0.0.1]/"), UrlReject::Encoding);
	}

	#[test]
	fn rejects_rebinding_services() {
		assert_eq!(category("http://127.0.0.1.nip.io/"), UrlReject::Host);
		assert_eq!(category("http://app.localtest.me/"), UrlReject::Host);
		assert_eq!(category("http://foo.lvh.me/"), UrlReject::Host);
	}

	#[test]
	fn rejects_blocked_ports() {
		assert_eq!(category("http://example.com:22/"), UrlReject::Port);
		assert_eq!(category("http://example.com:5432/"), UrlReject::Port);
		assert_eq!(category("http://example.com:6379/"), UrlReject::Port);
		assert_eq!(category("http://example.com:8500/"), UrlReject::Port);
	}

	#[test]
	fn blocked_ip_covers_v6_forms() {
		assert!(blocked_ip(&"::1".parse().unwrap()));
		assert!(blocked_ip(&"fe80::1".parse().unwrap()));
		assert!(blocked_ip(&"fd00::1".parse().unwrap()));
		assert!(blocked_ip(&"::".parse().unwrap()));
		assert!(blocked_ip(&"::ffff:127.0.0.1".parse().unwrap()));
		assert!(!blocked_ip(&"2606:4700::1111".parse().unwrap()));
	}

	#[test]
	fn accepts_unrelated_public_ips() {
		assert!(!blocked_ip(&"93.184.216.34".parse().unwrap()));
		assert!(!blocked_ip(&"8.8.8.8".parse().unwrap()));
	}
}

// vim: ts=4
