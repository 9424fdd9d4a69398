//! Audit log with dual-write semantics.
//!
//! Every call synchronously emits a structured record on the always-on
//! `audit` log target, then places the entry on a bounded channel for the
//! durable persister. A full channel drops the durable write and bumps a
//! counter; the caller is never blocked.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::prelude::*;
use crate::store_adapter::{AppendAuditData, StoreAdapter};

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

#[derive(Clone, Debug)]
pub struct AuditEntry {
	pub created_at: Timestamp,
	pub actor: Box<str>,
	pub action: Box<str>,
	pub tenant_id: Option<TenantId>,
	pub target: Option<Box<str>>,
	pub detail: serde_json::Value,
	pub client_addr: Option<Box<str>>,
}

#[derive(Debug)]
pub struct AuditLog {
	tx: flume::Sender<AuditEntry>,
	dropped: AtomicU64,
}

impl AuditLog {
	/// Returns the log handle and the receiver to hand to the persister.
	pub fn new(capacity: usize) -> (Self, flume::Receiver<AuditEntry>) {
		let (tx, rx) = flume::bounded(capacity);
		(Self { tx, dropped: AtomicU64::new(0) }, rx)
	}

	/// Record an audit event. Synchronous and non-blocking.
	pub fn log(
		&self,
		actor: &str,
		action: &str,
		tenant_id: Option<&TenantId>,
		target: Option<&str>,
		detail: serde_json::Value,
		client_addr: Option<&str>,
	) {
		// The structured echo is the one write that always happens.
		info!(
			target: "audit",
			actor = %actor,
			action = %action,
			tenant_id = tenant_id.map(TenantId::as_str).unwrap_or("-"),
			audit_target = target.unwrap_or("-"),
			detail = %detail,
			client_addr = client_addr.unwrap_or("-"),
			"audit"
		);

		let entry = AuditEntry {
			created_at: Timestamp::now(),
			actor: actor.into(),
			action: action.into(),
			tenant_id: tenant_id.cloned(),
			target: target.map(Into::into),
			detail,
			client_addr: client_addr.map(Into::into),
		};

		if self.tx.try_send(entry).is_err() {
			self.dropped.fetch_add(1, Ordering::Relaxed);
			metrics::counter!("nh_audit_dropped_total").increment(1);
		}
	}

	/// Number of entries whose durable write was dropped.
	pub fn dropped(&self) -> u64 {
		self.dropped.load(Ordering::Relaxed)
	}
}

/// Drain the audit channel into the durable store. Runs as a single task;
/// append order gives the monotonic id.
pub async fn run_persister(
	store: Arc<dyn StoreAdapter>,
	rx: flume::Receiver<AuditEntry>,
	cancel: CancellationToken,
) {
	loop {
		let entry = tokio::select! {
			entry = rx.recv_async() => match entry {
				Ok(entry) => entry,
				Err(_) => break,
			},
			() = cancel.cancelled() => {
				// Drain what is already queued, then stop.
				while let Ok(entry) = rx.try_recv() {
					persist(&store, entry).await;
				}
				break;
			}
		};
		persist(&store, entry).await;
	}
	debug!("audit persister stopped");
}

async fn persist(store: &Arc<dyn StoreAdapter>, entry: AuditEntry) {
	let data = AppendAuditData {
		created_at: entry.created_at,
		actor: &entry.actor,
		action: &entry.action,
		tenant_id: entry.tenant_id.as_ref(),
		target: entry.target.as_deref(),
		detail: &entry.detail,
		client_addr: entry.client_addr.as_deref(),
	};
	if let Err(err) = store.append_audit(data).await {
		// Local-recoverable: the structured echo already happened.
		warn!("audit persist failed: {}", err);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn full_channel_never_blocks_and_counts_drops() {
		let (audit, rx) = AuditLog::new(2);
		for _ in 0..5 {
			audit.log("system", "test.action", None, None, serde_json::json!({}), None);
		}
		assert_eq!(rx.len(), 2);
		assert_eq!(audit.dropped(), 3);
	}
}

// vim: ts=4
