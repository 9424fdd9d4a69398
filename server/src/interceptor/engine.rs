//! Interceptor engine: one durable consumer per enabled interceptor.

use async_nats::jetstream::consumer::pull;
use async_nats::jetstream::consumer::{AckPolicy, DeliverPolicy};
use async_nats::jetstream::AckKind;
use futures::StreamExt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::bus::provision;
use crate::interceptor::{chain_append, chain_contains, map_subject, query, InterceptorConfig, CHAIN_HEADER};
use crate::prelude::*;

const REATTACH_DELAY: Duration = Duration::from_secs(2);

struct Runner {
	config: InterceptorConfig,
	tenant_id: TenantId,
	compiled: Option<query::Query>,
}

/// Start every enabled interceptor. If any consumer cannot be opened, the
/// already-started ones are stopped before the error is returned.
pub async fn start(app: &App) -> NhResult<()> {
	let token = app.shutdown.child_token();
	let mut started: Vec<CancellationToken> = Vec::new();

	for config in app.interceptors.iter().filter(|c| c.enabled) {
		config.validate()?;
		let tenant_id = config.tenant_of()?;

		let compiled = match &config.query {
			None => None,
			Some(src) => match query::compile(src) {
				Ok(compiled) => Some(compiled),
				Err(err) => {
					// A broken query disables the interceptor rather than
					// blocking the engine.
					error!(interceptor = %config.name, "query rejected, interceptor disabled: {}", err);
					continue;
				}
			},
		};

		let runner = Runner { config: config.clone(), tenant_id, compiled };

		// Prove the consumer can be attached before spawning the loop.
		if let Err(err) = attach_consumer(app, &runner).await {
			for token in started {
				token.cancel();
			}
			return Err(Error::Internal(format!(
				"interceptor {} startup failed: {}",
				runner.config.name, err
			)));
		}

		let child = token.child_token();
		started.push(child.clone());
		let app = app.clone();
		app.tracker.clone().spawn(async move { runner_loop(app, runner, child).await });
	}

	Ok(())
}

async fn attach_consumer(
	app: &App,
	runner: &Runner,
) -> NhResult<async_nats::jetstream::consumer::Consumer<pull::Config>> {
	let conn = app.pool.get(&runner.tenant_id)?;
	let stream = conn
		.jetstream
		.get_stream(provision::events_stream(&runner.tenant_id))
		.await
		.map_err(|err| Error::StreamUnavailable(format!("events stream: {}", err)))?;

	let durable = format!("interceptor-{}", runner.config.name);
	stream
		.get_or_create_consumer(
			&durable,
			pull::Config {
				durable_name: Some(durable.clone()),
				filter_subject: runner.config.source.to_string(),
				deliver_policy: DeliverPolicy::New,
				ack_policy: AckPolicy::Explicit,
				..Default::default()
			},
		)
		.await
		.map_err(|err| Error::StreamUnavailable(format!("consumer {}: {}", durable, err)))
}

async fn runner_loop(app: App, runner: Runner, token: CancellationToken) {
	while !token.is_cancelled() {
		if let Err(err) = consume(&app, &runner, &token).await {
			warn!(interceptor = %runner.config.name, "interceptor detached: {}", err);
		}
		tokio::select! {
			() = token.cancelled() => break,
			() = tokio::time::sleep(REATTACH_DELAY) => {}
		}
	}
	debug!(interceptor = %runner.config.name, "interceptor stopped");
}

async fn consume(app: &App, runner: &Runner, token: &CancellationToken) -> NhResult<()> {
	let consumer = attach_consumer(app, runner).await?;
	let mut messages = consumer
		.messages()
		.await
		.map_err(|err| Error::StreamUnavailable(format!("messages: {}", err)))?;

	loop {
		let message = tokio::select! {
			() = token.cancelled() => return Ok(()),
			message = messages.next() => match message {
				Some(Ok(message)) => message,
				Some(Err(err)) => return Err(Error::StreamUnavailable(format!("stream: {}", err))),
				None => return Ok(()),
			},
		};
		handle_message(app, runner, message).await;
	}
}

async fn handle_message(app: &App, runner: &Runner, message: async_nats::jetstream::Message) {
	let name = runner.config.name.as_ref();
	let chain = message
		.headers
		.as_ref()
		.and_then(|h| h.get(CHAIN_HEADER))
		.map(|v| v.as_str().to_string());

	// Loop prevention: never process a message that already passed here.
	if let Some(chain) = &chain {
		if chain_contains(chain, name) {
			metrics::counter!("nh_interceptor_messages_total", "outcome" => "loop_drop").increment(1);
			let _ = message.ack().await;
			return;
		}
	}

	let payload = match transform(runner, &message.payload) {
		Transformed::Value(payload) => payload,
		Transformed::Dropped => {
			metrics::counter!("nh_interceptor_messages_total", "outcome" => "filtered").increment(1);
			let _ = message.ack().await;
			return;
		}
		Transformed::Failed(detail) => {
			warn!(interceptor = %name, "transform failed, message skipped: {}", detail);
			metrics::counter!("nh_interceptor_messages_total", "outcome" => "error").increment(1);
			let _ = message.ack().await;
			return;
		}
	};

	let mapped = map_subject(&runner.config.source, &runner.config.target, message.subject.as_str());

	let mut headers = message.headers.clone().unwrap_or_default();
	headers.insert(CHAIN_HEADER, chain_append(chain.as_deref(), name).as_str());

	let published = match app.pool.get(&runner.tenant_id) {
		Err(err) => Err(err),
		Ok(conn) => conn
			.jetstream
			.publish_with_headers(mapped, headers, payload.into())
			.await
			.map_err(|err| Error::StreamUnavailable(format!("publish: {}", err))),
	};

	match published {
		Ok(ack) => match ack.await {
			Ok(_) => {
				metrics::counter!("nh_interceptor_messages_total", "outcome" => "republished")
					.increment(1);
				let _ = message.ack().await;
			}
			Err(err) => {
				warn!(interceptor = %name, "publish unacked: {}", err);
				let _ = message.ack_with(AckKind::Nak(Some(REATTACH_DELAY))).await;
			}
		},
		Err(err) => {
			warn!(interceptor = %name, "publish failed: {}", err);
			let _ = message.ack_with(AckKind::Nak(Some(REATTACH_DELAY))).await;
		}
	}
}

enum Transformed {
	Value(Vec<u8>),
	Dropped,
	Failed(String),
}

fn transform(runner: &Runner, payload: &[u8]) -> Transformed {
	let Some(compiled) = &runner.compiled else {
		return Transformed::Value(payload.to_vec());
	};

	let input: serde_json::Value = match serde_json::from_slice(payload) {
		Ok(input) => input,
		Err(err) => return Transformed::Failed(format!("payload is not JSON: {}", err)),
	};

	match compiled.run(&input) {
		Err(err) => Transformed::Failed(format!("query error: {}", err)),
		Ok(None) => Transformed::Dropped,
		Ok(Some(output)) => match serde_json::to_vec(&output) {
			Ok(bytes) => Transformed::Value(bytes),
			Err(err) => Transformed::Failed(format!("reserialization: {}", err)),
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn runner_with_query(src: &str) -> Runner {
		let config = InterceptorConfig {
			name: "reshape".into(),
			source: "events.t1.in.>".into(),
			target: "events.t1.out.>".into(),
			query: Some(src.into()),
			enabled: true,
		};
		let tenant_id = config.tenant_of().unwrap();
		let compiled = Some(query::compile(src).unwrap());
		Runner { config, tenant_id, compiled }
	}

	#[test]
	fn transform_projects_payloads() {
		let runner = runner_with_query("{text: .t, who: .u}");
		let out = transform(&runner, br#"{"t":"hi","u":"a","extra":"x"}"#);
		match out {
			Transformed::Value(bytes) => {
				let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
				assert_eq!(value, serde_json::json!({"text": "hi", "who": "a"}));
			}
			_ => panic!("expected transformed value"),
		}
	}

	#[test]
	fn transform_drops_filtered_documents() {
		let runner = runner_with_query(r#"select(.kind == "x")"#);
		assert!(matches!(transform(&runner, br#"{"kind":"y"}"#), Transformed::Dropped));
	}

	#[test]
	fn transform_reports_non_json_payloads() {
		let runner = runner_with_query(".");
		assert!(matches!(transform(&runner, b"not json"), Transformed::Failed(_)));
	}

	#[test]
	fn passthrough_without_query() {
		let config = InterceptorConfig {
			name: "fwd".into(),
			source: "events.t1.in.>".into(),
			target: "events.t1.out.>".into(),
			query: None,
			enabled: true,
		};
		let tenant_id = config.tenant_of().unwrap();
		let runner = Runner { config, tenant_id, compiled: None };
		assert!(matches!(transform(&runner, b"raw-bytes"), Transformed::Value(v) if v == b"raw-bytes"));
	}
}

// vim: ts=4
