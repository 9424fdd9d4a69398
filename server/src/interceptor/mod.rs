//! Interceptor pipeline: durable subscribe-transform-publish loops with
//! loop prevention via a chain header.

pub mod engine;
pub mod query;

use serde::Deserialize;

use crate::prelude::*;
use crate::topic;

pub const CHAIN_HEADER: &str = "X-Interceptor-Chain";

/// Static interceptor definition, fixed at startup.
#[derive(Clone, Debug, Deserialize)]
pub struct InterceptorConfig {
	/// Unique name; it is recorded in the chain header, so commas are
	/// not allowed.
	pub name: Box<str>,
	/// Source subject pattern, e.g. `events.t1.in.>`.
	pub source: Box<str>,
	/// Target subject pattern, e.g. `events.t1.out.>`.
	pub target: Box<str>,
	/// Optional transform query (see [`query`]).
	#[serde(default)]
	pub query: Option<Box<str>>,
	#[serde(default = "default_enabled")]
	pub enabled: bool,
}

fn default_enabled() -> bool {
	true
}

impl InterceptorConfig {
	pub fn validate(&self) -> NhResult<()> {
		if self.name.is_empty() || self.name.contains(',') {
			return Err(Error::ValidationFailed(format!(
				"interceptor name {:?} must be non-empty and comma-free",
				self.name
			)));
		}
		topic::validate_pattern(&self.source)?;
		topic::validate_pattern(&self.target)?;
		self.tenant_of()?;
		Ok(())
	}

	/// The tenant whose stream this interceptor consumes, taken from the
	/// second segment of the source pattern. It must be static.
	pub fn tenant_of(&self) -> NhResult<TenantId> {
		let mut segments = self.source.split('.');
		match (segments.next(), segments.next()) {
			(Some("events"), Some(tenant)) if tenant != "*" && tenant != ">" => {
				TenantId::parse(tenant)
			}
			_ => Err(Error::ValidationFailed(format!(
				"interceptor source {:?} must start with events.{{tenant}}",
				self.source
			))),
		}
	}
}

/// True when the chain header already names this interceptor.
pub fn chain_contains(chain: &str, name: &str) -> bool {
	chain.split(',').any(|entry| entry.trim() == name)
}

/// Extend the chain header with this interceptor's name.
pub fn chain_append(chain: Option<&str>, name: &str) -> String {
	match chain {
		None | Some("") => name.to_string(),
		Some(existing) => format!("{},{}", existing, name),
	}
}

/// Largest leading run of dot-segments containing no wildcard.
pub fn static_prefix(pattern: &str) -> String {
	pattern
		.split('.')
		.take_while(|segment| !segment.contains('*') && !segment.contains('>'))
		.collect::<Vec<_>>()
		.join(".")
}

/// Map an incoming subject from the source tree to the target tree.
///
/// The longest static prefix of the source pattern is replaced with the
/// longest static prefix of the target pattern; subjects outside the
/// source prefix get the target prefix prepended. This rule is inherited
/// behavior; its corner cases are pinned by the tests below.
pub fn map_subject(source_pattern: &str, target_pattern: &str, subject: &str) -> String {
	let source_prefix = static_prefix(source_pattern);
	let target_prefix = static_prefix(target_pattern);

	if !source_prefix.is_empty() {
		if subject == source_prefix {
			return target_prefix;
		}
		if let Some(rest) = subject.strip_prefix(&format!("{}.", source_prefix)) {
			if target_prefix.is_empty() {
				return rest.to_string();
			}
			return format!("{}.{}", target_prefix, rest);
		}
	}

	if target_prefix.is_empty() {
		subject.to_string()
	} else {
		format!("{}.{}", target_prefix, subject)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn chain_membership_is_trimmed() {
		assert!(chain_contains("reshape", "reshape"));
		assert!(chain_contains("a, reshape ,b", "reshape"));
		assert!(!chain_contains("reshaper", "reshape"));
		assert!(!chain_contains("", "reshape"));
	}

	#[test]
	fn chain_append_grows_monotonically() {
		let first = chain_append(None, "a");
		let second = chain_append(Some(&first), "b");
		assert_eq!(first, "a");
		assert_eq!(second, "a,b");
		assert!(second.len() > first.len());
	}

	#[test]
	fn static_prefix_stops_at_wildcards() {
		assert_eq!(static_prefix("events.t1.in.>"), "events.t1.in");
		assert_eq!(static_prefix("events.*.in"), "events");
		assert_eq!(static_prefix(">"), "");
		assert_eq!(static_prefix("a.b.c"), "a.b.c");
	}

	#[test]
	fn mapping_replaces_the_source_prefix() {
		assert_eq!(
			map_subject("events.t1.in.>", "events.t1.out.>", "events.t1.in.msg"),
			"events.t1.out.msg"
		);
		assert_eq!(
			map_subject("events.t1.in.>", "events.t1.out.>", "events.t1.in.a.b"),
			"events.t1.out.a.b"
		);
	}

	#[test]
	fn mapping_prepends_when_the_subject_is_outside_the_source() {
		assert_eq!(
			map_subject("events.t1.in.>", "events.t1.out.>", "events.t1.other.msg"),
			"events.t1.out.events.t1.other.msg"
		);
	}

	#[test]
	fn mapping_handles_exact_prefix_subjects() {
		assert_eq!(map_subject("events.t1.in.>", "events.t1.out.>", "events.t1.in"), "events.t1.out");
	}

	#[test]
	fn mapping_with_leading_wildcards_prepends() {
		// A fully-wildcarded source has an empty static prefix.
		assert_eq!(map_subject(">", "events.t1.out", "events.t1.in.msg"), "events.t1.out.events.t1.in.msg");
		assert_eq!(map_subject(">", ">", "events.t1.in.msg"), "events.t1.in.msg");
	}

	#[test]
	fn mapping_with_mixed_wildcards_uses_the_leading_static_run() {
		assert_eq!(
			map_subject("events.t1.*.audit", "events.t1.audited.>", "events.t1.x.audit"),
			"events.t1.audited.x.audit"
		);
	}

	#[test]
	fn config_validation() {
		let config = InterceptorConfig {
			name: "reshape".into(),
			source: "events.t1.in.>".into(),
			target: "events.t1.out.>".into(),
			query: None,
			enabled: true,
		};
		assert!(config.validate().is_ok());
		assert_eq!(config.tenant_of().unwrap().as_str(), "t1");

		let bad_name = InterceptorConfig { name: "a,b".into(), ..config.clone() };
		assert!(bad_name.validate().is_err());

		let bad_source = InterceptorConfig { source: "other.t1.>".into(), ..config.clone() };
		assert!(bad_source.validate().is_err());

		let wildcard_tenant = InterceptorConfig { source: "events.*.in".into(), ..config };
		assert!(wildcard_tenant.validate().is_err());
	}
}

// vim: ts=4
