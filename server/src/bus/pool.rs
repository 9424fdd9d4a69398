//! Bus connection pool.
//!
//! One privileged connection to the system account, plus one tenant-scoped
//! connection per tenant. Tenant connections authenticate with an ephemeral
//! user key and a user claim signed on the fly by the tenant's account key;
//! neither ever touches durable media.

use async_nats::jetstream;
use async_nats::{Client, ConnectOptions};
use nkeys::KeyPair;
use parking_lot::RwLock;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};

use crate::keys::{self, claims, KeyKind};
use crate::prelude::*;

const RECONNECT_BASE: Duration = Duration::from_millis(500);
const RECONNECT_CAP: Duration = Duration::from_secs(30);

/// A live tenant-scoped connection with its JetStream context.
pub struct TenantConn {
	pub client: Client,
	pub jetstream: jetstream::Context,
}

impl TenantConn {
	pub fn is_connected(&self) -> bool {
		self.client.connection_state() == async_nats::connection::State::Connected
	}
}

pub struct ClientPool {
	bus_url: Box<str>,
	system: RwLock<Option<Client>>,
	conns: RwLock<HashMap<Box<str>, Arc<TenantConn>>>,
	/// In-flight opens, so concurrent `open` calls for one tenant share a
	/// single dial attempt.
	opening: Mutex<HashMap<Box<str>, Arc<OnceCell<Arc<TenantConn>>>>>,
}

impl std::fmt::Debug for ClientPool {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ClientPool")
			.field("bus_url", &self.bus_url)
			.field("tenants", &self.conns.read().len())
			.finish()
	}
}

/// Bounded exponential backoff: base 500 ms, cap 30 s, jitter ±20%.
fn reconnect_delay(attempts: usize) -> Duration {
	let shift = attempts.saturating_sub(1).min(16) as u32;
	let raw = RECONNECT_BASE.saturating_mul(1u32 << shift.min(6));
	let capped = raw.min(RECONNECT_CAP);
	let jitter = rand::rng().random_range(0.8..=1.2);
	capped.mul_f64(jitter)
}

impl ClientPool {
	pub fn new(bus_url: impl Into<Box<str>>) -> Self {
		Self {
			bus_url: bus_url.into(),
			system: RwLock::new(None),
			conns: RwLock::new(HashMap::new()),
			opening: Mutex::new(HashMap::new()),
		}
	}

	/// Open the privileged system connection. Called once, at boot.
	pub async fn connect_system(&self, system_seed: &str) -> NhResult<()> {
		let client = ConnectOptions::with_nkey(system_seed.to_string())
			.name("notifhub-system")
			.reconnect_delay_callback(reconnect_delay)
			.event_callback(|event| async move {
				match event {
					async_nats::Event::Disconnected => warn!("system bus connection lost"),
					async_nats::Event::Connected => info!("system bus connection (re)established"),
					other => debug!("system bus event: {}", other),
				}
			})
			.connect(self.bus_url.as_ref())
			.await
			.map_err(|err| Error::StreamUnavailable(format!("system connect failed: {}", err)))?;

		*self.system.write() = Some(client);
		Ok(())
	}

	/// Current state of the system connection, if one was opened.
	pub fn system_state(&self) -> Option<async_nats::connection::State> {
		self.system.read().as_ref().map(Client::connection_state)
	}

	/// Push an operator-signed account claim to the bus.
	pub async fn push_account_claim(&self, claim: &str) -> NhResult<()> {
		let client = self.system.read().clone().ok_or_else(|| {
			Error::StreamUnavailable("system connection not established".into())
		})?;
		client
			.request("$SYS.REQ.CLAIMS.UPDATE", claim.to_string().into())
			.await
			.map_err(|err| Error::StreamUnavailable(format!("claims update failed: {}", err)))?;
		Ok(())
	}

	/// Remove a tenant's account claim from the bus.
	pub async fn delete_account_claim(&self, operator: &KeyPair, account_public: &str) -> NhResult<()> {
		let client = self.system.read().clone().ok_or_else(|| {
			Error::StreamUnavailable("system connection not established".into())
		})?;
		let claim = claims::build_delete_claim(operator, account_public)?;
		client
			.request("$SYS.REQ.CLAIMS.DELETE", claim.into())
			.await
			.map_err(|err| Error::StreamUnavailable(format!("claims delete failed: {}", err)))?;
		Ok(())
	}

	/// Open (or join an in-flight open of) the tenant's connection.
	pub async fn open(&self, tenant_id: &TenantId, account: &KeyPair) -> NhResult<Arc<TenantConn>> {
		if let Some(conn) = self.conns.read().get(tenant_id.as_str()) {
			if conn.is_connected() {
				return Ok(conn.clone());
			}
		}

		let cell = {
			let mut opening = self.opening.lock().await;
			opening.entry(tenant_id.as_str().into()).or_default().clone()
		};

		let result = cell
			.get_or_try_init(|| async {
				let conn = self.dial(tenant_id, account).await?;
				self.conns.write().insert(tenant_id.as_str().into(), conn.clone());
				Ok::<_, Error>(conn)
			})
			.await
			.cloned();

		self.opening.lock().await.remove(tenant_id.as_str());
		result
	}

	async fn dial(&self, tenant_id: &TenantId, account: &KeyPair) -> NhResult<Arc<TenantConn>> {
		// Fresh user key per connection, held only in memory.
		let user = Arc::new(keys::generate(KeyKind::User));
		let jwt = claims::build_user_claim(account, &keys::public_key(&user), tenant_id)?;

		let signer = user.clone();
		let tenant = tenant_id.clone();
		let client = ConnectOptions::with_jwt(jwt, move |nonce| {
			let signer = signer.clone();
			async move { signer.sign(&nonce).map_err(async_nats::AuthError::new) }
		})
		.name(format!("notifhub-tenant-{}", tenant_id))
		.reconnect_delay_callback(reconnect_delay)
		.event_callback(move |event| {
			let tenant = tenant.clone();
			async move {
				match event {
					async_nats::Event::Disconnected => {
						warn!(tenant_id = %tenant, "tenant bus connection lost")
					}
					async_nats::Event::Connected => {
						info!(tenant_id = %tenant, "tenant bus connection (re)established")
					}
					other => debug!(tenant_id = %tenant, "tenant bus event: {}", other),
				}
			}
		})
		.connect(self.bus_url.as_ref())
		.await
		.map_err(|err| {
			Error::TenantUnavailable(format!("connect failed for {}: {}", tenant_id, err))
		})?;

		let jetstream = jetstream::new(client.clone());
		Ok(Arc::new(TenantConn { client, jetstream }))
	}

	/// Cached handle for a tenant. Fails while the connection is down;
	/// the reconnect loop runs inside the client.
	pub fn get(&self, tenant_id: &TenantId) -> NhResult<Arc<TenantConn>> {
		let conns = self.conns.read();
		let conn = conns
			.get(tenant_id.as_str())
			.ok_or_else(|| Error::TenantUnavailable(format!("no connection for {}", tenant_id)))?;
		if !conn.is_connected() {
			return Err(Error::TenantUnavailable(format!("connection down for {}", tenant_id)));
		}
		Ok(conn.clone())
	}

	/// Close and forget a tenant's connection.
	pub async fn close(&self, tenant_id: &TenantId) {
		let conn = self.conns.write().remove(tenant_id.as_str());
		if let Some(conn) = conn {
			if let Err(err) = conn.client.drain().await {
				debug!(tenant_id = %tenant_id, "drain failed: {}", err);
			}
		}
	}

	/// Ordered shutdown: tenants first, system last.
	pub async fn close_all(&self) {
		let conns: Vec<Arc<TenantConn>> = {
			let mut map = self.conns.write();
			map.drain().map(|(_, conn)| conn).collect()
		};
		for conn in conns {
			let _ = conn.client.drain().await;
		}
		let system = self.system.write().take();
		if let Some(client) = system {
			let _ = client.drain().await;
		}
	}

	/// The cross-cutting "live tenants" view: ids with a currently
	/// connected handle.
	pub fn live_tenants(&self) -> Vec<Box<str>> {
		self.conns
			.read()
			.iter()
			.filter(|(_, conn)| conn.is_connected())
			.map(|(id, _)| id.clone())
			.collect()
	}

	/// True when every pooled tenant connection is currently connected.
	pub fn all_connected(&self) -> bool {
		self.conns.read().values().all(|conn| conn.is_connected())
	}

	pub fn tenant_count(&self) -> usize {
		self.conns.read().len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn reconnect_delay_is_bounded() {
		for attempts in 1..64 {
			let delay = reconnect_delay(attempts);
			assert!(delay >= Duration::from_millis(400), "attempt {}: {:?}", attempts, delay);
			assert!(delay <= Duration::from_secs(36), "attempt {}: {:?}", attempts, delay);
		}
	}

	#[test]
	fn reconnect_delay_grows_from_base() {
		// First attempt stays near the base even with jitter.
		let first = reconnect_delay(1);
		assert!(first <= Duration::from_millis(600));
	}
}

// vim: ts=4
