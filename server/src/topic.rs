//! Topic grammar and pattern matching.
//!
//! Topics are dot-delimited segments of `[A-Za-z0-9_-]+`. Patterns may use
//! `*` for exactly one segment and a trailing `>` for one or more segments.

use crate::error::{Error, NhResult};

pub const MAX_TOPIC_LEN: usize = 255;

fn is_segment_char(c: char) -> bool {
	c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Validate a concrete topic as accepted on the publish path.
pub fn validate_topic(topic: &str) -> NhResult<()> {
	if topic.is_empty() {
		return Err(Error::InvalidTopic("empty topic".into()));
	}
	if topic.len() > MAX_TOPIC_LEN {
		return Err(Error::InvalidTopic(format!("topic length {} exceeds {}", topic.len(), MAX_TOPIC_LEN)));
	}
	for segment in topic.split('.') {
		if segment.is_empty() {
			return Err(Error::InvalidTopic("empty topic segment".into()));
		}
		if !segment.chars().all(is_segment_char) {
			return Err(Error::InvalidTopic(format!("invalid segment: {}", segment)));
		}
	}
	Ok(())
}

/// Validate a subscription pattern (`*` single segment, `>` trailing tail).
pub fn validate_pattern(pattern: &str) -> NhResult<()> {
	if pattern.is_empty() || pattern.len() > MAX_TOPIC_LEN {
		return Err(Error::ValidationFailed("pattern length out of range".into()));
	}
	let segments: Vec<&str> = pattern.split('.').collect();
	for (i, segment) in segments.iter().enumerate() {
		match *segment {
			"" => return Err(Error::ValidationFailed("empty pattern segment".into())),
			"*" => {}
			">" => {
				if i != segments.len() - 1 {
					return Err(Error::ValidationFailed("`>` is only valid as the last segment".into()));
				}
			}
			other => {
				if !other.chars().all(is_segment_char) {
					return Err(Error::ValidationFailed(format!("invalid pattern segment: {}", other)));
				}
			}
		}
	}
	Ok(())
}

/// Match a concrete topic against a pattern.
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
	let mut pat = pattern.split('.');
	let mut top = topic.split('.').peekable();

	loop {
		match (pat.next(), top.peek()) {
			(Some(">"), Some(_)) => return true,
			(Some(">"), None) => return false,
			(Some("*"), Some(_)) => {
				top.next();
			}
			(Some(p), Some(t)) => {
				if p != *t {
					return false;
				}
				top.next();
			}
			(Some(_), None) => return false,
			(None, Some(_)) => return false,
			(None, None) => return true,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn topic_boundaries() {
		assert!(validate_topic(&"a".repeat(255)).is_ok());
		assert!(validate_topic(&"a".repeat(256)).is_err());
		assert!(validate_topic("orders.created").is_ok());
		assert!(validate_topic("orders..created").is_err());
		assert!(validate_topic(".orders").is_err());
		assert!(validate_topic("orders.").is_err());
		assert!(validate_topic("orders created").is_err());
		assert!(validate_topic("orders.*").is_err());
	}

	#[test]
	fn pattern_validation() {
		assert!(validate_pattern("orders.*").is_ok());
		assert!(validate_pattern("orders.>").is_ok());
		assert!(validate_pattern(">").is_ok());
		assert!(validate_pattern("orders.>.eu").is_err());
		assert!(validate_pattern("orders..x").is_err());
	}

	#[test]
	fn single_segment_wildcard() {
		assert!(topic_matches("orders.*", "orders.created"));
		assert!(!topic_matches("orders.*", "orders.created.eu"));
		assert!(!topic_matches("orders.*", "orders"));
	}

	#[test]
	fn tail_wildcard() {
		assert!(topic_matches("orders.>", "orders.created"));
		assert!(topic_matches("orders.>", "orders.created.eu"));
		assert!(!topic_matches("orders.>", "orders"));
		assert!(!topic_matches("orders.>", "invoices.created"));
	}

	#[test]
	fn literal_patterns() {
		assert!(topic_matches("orders.created", "orders.created"));
		assert!(!topic_matches("orders.created", "orders.cancelled"));
		assert!(topic_matches("*.created", "orders.created"));
	}
}

// vim: ts=4
