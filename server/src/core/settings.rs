//! Environment configuration.
//!
//! Parsed once at startup; an invalid environment is a fatal error that the
//! binary maps to exit code 2.

use std::time::Duration;

use crate::prelude::*;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogFormat {
	Text,
	Json,
}

#[derive(Clone, Debug)]
pub struct Settings {
	/// Durable store for tenants, events, webhooks, deliveries, audit.
	pub database_url: Box<str>,
	/// Address of the message bus.
	pub bus_url: Box<str>,
	/// Sealed seed for the operator key.
	pub operator_seed: Box<str>,
	/// Seed for the system account. Generated at boot when absent.
	pub system_account_seed: Option<Box<str>>,
	pub port: u16,
	pub shutdown_timeout: Duration,
	/// Grace before exiting after a bootstrap failure, so the failure is
	/// visible in logs and audit before orchestration restarts us.
	pub bootstrap_grace: Duration,
	/// How long the system connection may stay down before the process
	/// gives up (exit code 3).
	pub bus_grace_window: Duration,
	/// Global payload ceiling applied on top of the tier cap.
	pub max_payload_size: Option<usize>,
	pub log_level: Box<str>,
	pub log_format: LogFormat,
	/// Exact-match WebSocket origin allow-list. No wildcards.
	pub allowed_origins: Box<[Box<str>]>,
	/// Bearer token protecting the tenant/credential admin surface.
	/// When unset, the admin surface rejects everything.
	pub admin_token: Option<Box<str>>,
}

fn required(name: &str) -> NhResult<Box<str>> {
	match std::env::var(name) {
		Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_owned().into_boxed_str()),
		_ => Err(Error::ValidationFailed(format!("missing required environment variable {}", name))),
	}
}

fn optional(name: &str) -> Option<Box<str>> {
	std::env::var(name).ok().map(|v| v.trim().to_owned()).filter(|v| !v.is_empty()).map(String::into_boxed_str)
}

fn parse_secs(name: &str, default: u64) -> NhResult<Duration> {
	match optional(name) {
		None => Ok(Duration::from_secs(default)),
		Some(v) => v
			.parse::<u64>()
			.map(Duration::from_secs)
			.map_err(|_| Error::ValidationFailed(format!("{} must be a number of seconds", name))),
	}
}

impl Settings {
	pub fn from_env() -> NhResult<Settings> {
		let port = match optional("PORT") {
			None => 8080,
			Some(v) => v
				.parse::<u16>()
				.map_err(|_| Error::ValidationFailed("PORT must be a valid port number".into()))?,
		};

		let max_payload_size = match optional("MAX_PAYLOAD_SIZE") {
			None => None,
			Some(v) => Some(
				v.parse::<usize>()
					.map_err(|_| Error::ValidationFailed("MAX_PAYLOAD_SIZE must be a byte count".into()))?,
			),
		};

		let log_format = match optional("LOG_FORMAT").as_deref() {
			None | Some("text") => LogFormat::Text,
			Some("json") => LogFormat::Json,
			Some(other) => {
				return Err(Error::ValidationFailed(format!("LOG_FORMAT must be text or json, got {}", other)))
			}
		};

		let allowed_origins: Box<[Box<str>]> = optional("ALLOWED_ORIGINS")
			.map(|v| {
				v.split(',')
					.map(str::trim)
					.filter(|s| !s.is_empty())
					.map(|s| s.to_owned().into_boxed_str())
					.collect()
			})
			.unwrap_or_default();
		for origin in &allowed_origins {
			if origin.contains('*') {
				return Err(Error::ValidationFailed("ALLOWED_ORIGINS entries must not contain wildcards".into()));
			}
		}

		Ok(Settings {
			database_url: required("DATABASE_URL")?,
			bus_url: required("BUS_URL")?,
			operator_seed: required("OPERATOR_SEED")?,
			system_account_seed: optional("SYSTEM_ACCOUNT_SEED"),
			port,
			shutdown_timeout: parse_secs("SHUTDOWN_TIMEOUT", 30)?,
			bootstrap_grace: parse_secs("BOOTSTRAP_TIMEOUT", 30)?,
			bus_grace_window: parse_secs("BUS_GRACE_WINDOW", 120)?,
			max_payload_size,
			log_level: optional("LOG_LEVEL").unwrap_or_else(|| "info".into()),
			log_format,
			allowed_origins,
			admin_token: optional("ADMIN_TOKEN"),
		})
	}

	/// True when the Origin header of a WebSocket upgrade is acceptable.
	pub fn origin_allowed(&self, origin: &str) -> bool {
		self.allowed_origins.iter().any(|o| o.as_ref() == origin)
	}
}

// vim: ts=4
