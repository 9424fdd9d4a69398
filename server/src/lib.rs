//! Multi-tenant event hub core.
//!
//! Organizations publish JSON events on hierarchical topics; subscribers
//! receive them over long-lived streaming channels or signed webhook
//! deliveries, backed by per-tenant durable streams on a
//! token-authenticated bus.
//!
//! Known crash window: the event index row is inserted after the bus
//! publish is accepted. A crash between the two leaves the event durable
//! and deliverable but unindexed; this drift is surfaced on the
//! `nh_event_index_drift_total` counter and is not repaired automatically.

use std::sync::Arc;
use std::time::Duration;

pub mod audit;
pub mod bootstrap;
pub mod bus;
pub mod core;
pub mod error;
pub mod event;
pub mod gateway;
pub mod interceptor;
pub mod keys;
pub mod prelude;
pub mod routes;
pub mod store_adapter;
pub mod tenant;
pub mod topic;
pub mod types;
pub mod webhook;

use crate::audit::AuditLog;
use crate::bus::ClientPool;
use crate::core::app::new_app_state;
use crate::core::settings::{LogFormat, Settings};
use crate::core::{dns, metrics as core_metrics};
use crate::interceptor::InterceptorConfig;
use crate::keys::KeyKind;
use crate::prelude::*;
use crate::store_adapter::StoreAdapter;

/// Process exit code for irrecoverable bus loss.
pub const EXIT_BUS_LOST: i32 = 3;

pub struct Builder {
	settings: Option<Settings>,
	store: Option<Arc<dyn StoreAdapter>>,
	interceptors: Vec<InterceptorConfig>,
}

impl Builder {
	pub fn new() -> Self {
		Builder { settings: None, store: None, interceptors: Vec::new() }
	}

	/// Use pre-parsed settings instead of reading the environment.
	pub fn settings(&mut self, settings: Settings) -> &mut Self {
		self.settings = Some(settings);
		self
	}

	pub fn store_adapter(&mut self, store: Arc<dyn StoreAdapter>) -> &mut Self {
		self.store = Some(store);
		self
	}

	pub fn interceptors(&mut self, interceptors: impl IntoIterator<Item = InterceptorConfig>) -> &mut Self {
		self.interceptors.extend(interceptors);
		self
	}

	/// Run the hub. Returns the process exit code on orderly termination;
	/// errors indicate configuration or bootstrap failure.
	pub async fn run(self) -> NhResult<i32> {
		let settings = match self.settings {
			Some(settings) => settings,
			None => Settings::from_env()?,
		};

		init_tracing(&settings);

		let store = self
			.store
			.ok_or_else(|| Error::ValidationFailed("no store adapter configured".into()))?;
		let prometheus = core_metrics::init()?;
		let operator = keys::from_seed(KeyKind::Operator, &settings.operator_seed)?;
		let pool = Arc::new(ClientPool::new(settings.bus_url.clone()));
		let (audit, audit_rx) = AuditLog::new(audit::DEFAULT_QUEUE_CAPACITY);
		let resolver = dns::create_resolver();
		let http = webhook::client::OutboundClient::new()?;

		let port = settings.port;
		let shutdown_timeout = settings.shutdown_timeout;
		let bootstrap_grace = settings.bootstrap_grace;

		let app = new_app_state(
			settings,
			store.clone(),
			pool,
			operator,
			audit,
			resolver,
			http,
			prometheus,
			self.interceptors.into_boxed_slice(),
		);

		{
			let cancel = app.shutdown.child_token();
			app.tracker.spawn(audit::run_persister(store, audit_rx, cancel));
		}

		if let Err(err) = bootstrap::run(&app).await {
			error!("bootstrap failed: {}", err);
			// Give logs and audit a chance to land before orchestration
			// restarts us.
			tokio::time::sleep(bootstrap_grace.min(Duration::from_secs(300))).await;
			app.shutdown.cancel();
			return Err(err);
		}

		let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
		info!("listening on port {}", port);

		let router = routes::init(app.clone());
		let serve = {
			let signal_app = app.clone();
			async move {
				axum::serve(listener, router)
					.with_graceful_shutdown(async move { shutdown_signal(&signal_app).await })
					.await
			}
		};

		let exit_code = tokio::select! {
			result = serve => {
				result?;
				0
			}
			() = bus_lost(&app) => {
				error!("bus connection lost beyond the grace window");
				EXIT_BUS_LOST
			}
		};

		// Coordinated shutdown: cancel the scope, drain, then give up.
		app.shutdown.cancel();
		app.pool.close_all().await;
		app.tracker.close();
		if tokio::time::timeout(shutdown_timeout, app.tracker.wait()).await.is_err() {
			warn!("shutdown timeout elapsed with tasks still running");
		}

		info!("shutdown complete");
		Ok(exit_code)
	}
}

impl Default for Builder {
	fn default() -> Self {
		Self::new()
	}
}

fn init_tracing(settings: &Settings) {
	// The audit target is always on, whatever LOG_LEVEL says.
	let filter = tracing_subscriber::EnvFilter::try_new(format!("{},audit=info", settings.log_level))
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,audit=info"));

	match settings.log_format {
		LogFormat::Json => {
			tracing_subscriber::fmt().with_env_filter(filter).with_target(false).json().init()
		}
		LogFormat::Text => {
			tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init()
		}
	}
}

async fn shutdown_signal(app: &App) {
	let ctrl_c = tokio::signal::ctrl_c();

	#[cfg(unix)]
	{
		let mut term = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
			Ok(term) => term,
			Err(err) => {
				warn!("SIGTERM handler unavailable: {}", err);
				tokio::select! {
					_ = ctrl_c => {}
					() = app.shutdown.cancelled() => {}
				}
				return;
			}
		};
		tokio::select! {
			_ = ctrl_c => info!("interrupt received"),
			_ = term.recv() => info!("terminate received"),
			() = app.shutdown.cancelled() => {}
		}
	}

	#[cfg(not(unix))]
	{
		tokio::select! {
			_ = ctrl_c => info!("interrupt received"),
			() = app.shutdown.cancelled() => {}
		}
	}
}

/// Resolves when the system connection has been down continuously for
/// longer than the configured grace window.
async fn bus_lost(app: &App) {
	let grace = app.settings.bus_grace_window;
	let mut down_since: Option<tokio::time::Instant> = None;
	let mut ticker = tokio::time::interval(Duration::from_secs(5));
	loop {
		ticker.tick().await;
		let connected = matches!(
			app.pool.system_state(),
			Some(async_nats::connection::State::Connected)
		);
		if connected {
			down_since = None;
			continue;
		}
		let since = *down_since.get_or_insert_with(tokio::time::Instant::now);
		if since.elapsed() > grace {
			return;
		}
		warn!("system bus connection down for {:?}", since.elapsed());
	}
}

// vim: ts=4
