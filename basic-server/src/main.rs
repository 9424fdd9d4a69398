use std::process::ExitCode;
use std::sync::Arc;

use notifhub::core::settings::Settings;
use notifhub::interceptor::InterceptorConfig;
use notifhub_store_adapter_sqlite::StoreAdapterSqlite;

/// Interceptor definitions, as a JSON array in the environment.
fn interceptors_from_env() -> Result<Vec<InterceptorConfig>, String> {
	match std::env::var("INTERCEPTORS") {
		Err(_) => Ok(Vec::new()),
		Ok(raw) if raw.trim().is_empty() => Ok(Vec::new()),
		Ok(raw) => serde_json::from_str(&raw).map_err(|err| format!("INTERCEPTORS: {}", err)),
	}
}

#[tokio::main]
async fn main() -> ExitCode {
	// Exit codes: 0 clean, 1 bootstrap/server failure, 2 invalid
	// configuration, 3 irrecoverable bus loss.
	let settings = match Settings::from_env() {
		Ok(settings) => settings,
		Err(err) => {
			eprintln!("configuration invalid: {}", err);
			return ExitCode::from(2);
		}
	};

	let interceptors = match interceptors_from_env() {
		Ok(interceptors) => interceptors,
		Err(err) => {
			eprintln!("configuration invalid: {}", err);
			return ExitCode::from(2);
		}
	};

	let store = match StoreAdapterSqlite::new(&settings.database_url).await {
		Ok(store) => Arc::new(store),
		Err(err) => {
			eprintln!("store unavailable: {}", err);
			return ExitCode::from(2);
		}
	};

	let mut builder = notifhub::Builder::new();
	builder.settings(settings).store_adapter(store).interceptors(interceptors);

	match builder.run().await {
		Ok(code) => ExitCode::from(code as u8),
		Err(err) => {
			tracing::error!("fatal: {}", err);
			ExitCode::from(1)
		}
	}
}

// vim: ts=4
