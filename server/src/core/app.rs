//! App state type

use hickory_resolver::TokioResolver;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::audit::AuditLog;
use crate::bus::ClientPool;
use crate::core::rate_limit::CredentialLimiters;
use crate::core::settings::Settings;
use crate::interceptor::InterceptorConfig;
use crate::store_adapter::StoreAdapter;
use crate::webhook::client::OutboundClient;
use crate::webhook::worker::WorkerRegistry;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct AppState {
	pub settings: Settings,
	pub store: Arc<dyn StoreAdapter>,
	pub pool: Arc<ClientPool>,
	/// Operator key pair, derived from the sealed seed at boot. Lives only
	/// in process memory.
	pub operator: nkeys::KeyPair,
	pub audit: AuditLog,
	pub limiters: CredentialLimiters,
	pub resolver: TokioResolver,
	pub http: OutboundClient,
	pub prometheus: PrometheusHandle,
	/// Interceptor definitions, fixed at startup.
	pub interceptors: Box<[InterceptorConfig]>,
	pub webhook_workers: WorkerRegistry,

	/// The readiness gate. External traffic is refused until the
	/// bootstrapper releases it.
	ready: AtomicBool,
	pub shutdown: CancellationToken,
	pub tracker: TaskTracker,
}

pub type App = Arc<AppState>;

impl AppState {
	pub fn release_readiness_gate(&self) {
		self.ready.store(true, Ordering::Release);
	}

	pub fn is_ready(&self) -> bool {
		self.ready.load(Ordering::Acquire)
	}
}

#[allow(clippy::too_many_arguments)]
pub fn new_app_state(
	settings: Settings,
	store: Arc<dyn StoreAdapter>,
	pool: Arc<ClientPool>,
	operator: nkeys::KeyPair,
	audit: AuditLog,
	resolver: TokioResolver,
	http: OutboundClient,
	prometheus: PrometheusHandle,
	interceptors: Box<[InterceptorConfig]>,
) -> App {
	Arc::new(AppState {
		settings,
		store,
		pool,
		operator,
		audit,
		limiters: CredentialLimiters::new(),
		resolver,
		http,
		prometheus,
		interceptors,
		webhook_workers: WorkerRegistry::new(),
		ready: AtomicBool::new(false),
		shutdown: CancellationToken::new(),
		tracker: TaskTracker::new(),
	})
}

// vim: ts=4
