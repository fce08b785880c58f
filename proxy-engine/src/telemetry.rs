//! Structured telemetry emitted at fixed points in the proxy lifecycle
//! (spec §5 "Telemetry points", §8 properties P1/P2).
//!
//! The default sink logs through `tracing`, the same way
//! `agentgateway::client` emits an `event!` per outbound send. Tests use
//! [`RecordingTelemetry`] to assert ordering instead of scraping logs.

use std::sync::Mutex;

use http::StatusCode;
use tracing::{event, Level};

use crate::error::ProxyError;

/// A lifecycle checkpoint the engine reports through [`ProxyTelemetry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyStage {
	SendAsyncStart,
	SendAsyncStop,
	RequestContentTransferStart,
	ResponseUpgrade,
}

impl ProxyStage {
	fn name(self) -> &'static str {
		match self {
			ProxyStage::SendAsyncStart => "send_async_start",
			ProxyStage::SendAsyncStop => "send_async_stop",
			ProxyStage::RequestContentTransferStart => "request_content_transfer_start",
			ProxyStage::ResponseUpgrade => "response_upgrade",
		}
	}
}

/// Sink for proxy lifecycle events. Kept as a plain (non-async) trait: every
/// implementation only needs to record or log, never to await anything, and
/// a sync trait lets callers hold `&dyn ProxyTelemetry` without extra
/// indirection.
pub trait ProxyTelemetry: Send + Sync {
	/// Fired once, at the top of `ProxyEngine::proxy`, before anything else
	/// (spec §6 `ProxyStart(destinationPrefix: string)`).
	fn on_start(&self, destination_prefix: &str) {
		let _ = destination_prefix;
	}

	/// Fired at each checkpoint named in [`ProxyStage`]. Order is part of
	/// the contract: `SendAsyncStart` precedes `SendAsyncStop`, and on a
	/// successful proxied exchange `on_stop` follows both.
	fn on_stage(&self, stage: ProxyStage) {
		let _ = stage;
	}

	/// Fired when the exchange ends in a [`ProxyError`]. `on_stop` is not
	/// additionally fired for the same exchange.
	fn on_failed(&self, error: &ProxyError) {
		let _ = error;
	}

	/// Fired once the response (or, for an upgrade, the tunnel) has fully
	/// completed without error, carrying the status code finally reported to
	/// the inbound side (spec §6 `ProxyStop(statusCode: int)`, P1).
	fn on_stop(&self, status: StatusCode) {
		let _ = status;
	}
}

/// Default sink: emits one `tracing` event per checkpoint, matching the
/// `target: "proxy"`-qualified style the teacher uses for request telemetry.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl ProxyTelemetry for TracingTelemetry {
	fn on_start(&self, destination_prefix: &str) {
		event!(target: "proxy", Level::DEBUG, destination_prefix, "proxy start");
	}

	fn on_stage(&self, stage: ProxyStage) {
		event!(target: "proxy", Level::TRACE, stage = stage.name(), "proxy stage");
	}

	fn on_failed(&self, error: &ProxyError) {
		event!(target: "proxy", Level::WARN, error = %error, "proxy failed");
	}

	fn on_stop(&self, status: StatusCode) {
		event!(target: "proxy", Level::DEBUG, status = status.as_u16(), "proxy stop");
	}
}

/// A single recorded telemetry call, used by tests to assert ordering
/// (spec §8 P1/P2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedEvent {
	Start(String),
	Stage(ProxyStage),
	Failed(String),
	Stop(StatusCode),
}

/// Test double that records every call in order instead of logging it.
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
	events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingTelemetry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn events(&self) -> Vec<RecordedEvent> {
		self.events.lock().unwrap().clone()
	}
}

impl ProxyTelemetry for RecordingTelemetry {
	fn on_start(&self, destination_prefix: &str) {
		self
			.events
			.lock()
			.unwrap()
			.push(RecordedEvent::Start(destination_prefix.to_string()));
	}

	fn on_stage(&self, stage: ProxyStage) {
		self.events.lock().unwrap().push(RecordedEvent::Stage(stage));
	}

	fn on_failed(&self, error: &ProxyError) {
		self
			.events
			.lock()
			.unwrap()
			.push(RecordedEvent::Failed(error.to_string()));
	}

	fn on_stop(&self, status: StatusCode) {
		self.events.lock().unwrap().push(RecordedEvent::Stop(status));
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn records_in_call_order() {
		let t = RecordingTelemetry::new();
		t.on_start("https://backend/");
		t.on_stage(ProxyStage::SendAsyncStart);
		t.on_stage(ProxyStage::SendAsyncStop);
		t.on_stop(StatusCode::OK);

		assert_eq!(
			t.events(),
			vec![
				RecordedEvent::Start("https://backend/".to_string()),
				RecordedEvent::Stage(ProxyStage::SendAsyncStart),
				RecordedEvent::Stage(ProxyStage::SendAsyncStop),
				RecordedEvent::Stop(StatusCode::OK),
			]
		);
	}

	#[test]
	fn failed_excludes_stop() {
		let t = RecordingTelemetry::new();
		t.on_start("https://backend/");
		t.on_failed(&ProxyError::RequestTimedOut);

		let events = t.events();
		assert_eq!(events.len(), 2);
		assert!(matches!(events[1], RecordedEvent::Failed(_)));
	}
}
