//! `InboundContext`: the per-request facade the hosting HTTP runtime
//! implements (spec §6).
//!
//! Kept as a generic trait bound (rather than `dyn`) on
//! [`crate::engine::ProxyEngine::proxy`] so each inbound runtime
//! monomorphizes its own call path, the way `agentgateway::proxy::httpproxy`
//! is generic over its connection types rather than boxing them.

use async_trait::async_trait;
use http::{HeaderMap, Version};
use proxy_core::ByteSource;

use crate::duplex::BoxedDuplex;
use crate::error::ProxyErrorFeature;

/// Capability probe for streaming an HTTP/1.1 `Upgrade` into a raw duplex
/// tunnel (spec §6, §4.6).
#[async_trait]
pub trait UpgradeCapability: Send + Sync {
	fn is_upgradeable(&self) -> bool;
	async fn upgrade(&mut self) -> std::io::Result<BoxedDuplex>;
}

/// Capability probe letting the inbound runtime answer "does this request
/// have a body" directly, short-circuiting the header-based heuristics in
/// spec §4.5 step 5.
pub trait BodyDetection: Send + Sync {
	fn can_have_body(&self) -> bool;
}

/// Per-request feature surface. Every field is independently optional
/// because different inbound runtimes expose different subsets (spec §6).
#[derive(Default)]
pub struct InboundFeatures {
	pub min_request_body_data_rate: bool,
	pub max_request_body_size: bool,
	pub response_trailers: bool,
}

/// The facade an inbound HTTP runtime must implement for the engine to
/// drive a proxied exchange over it.
#[async_trait]
pub trait InboundContext: Send + Sync {
	type RequestBody: ByteSource + Send + 'static;

	fn method(&self) -> &http::Method;
	fn version(&self) -> Version;
	fn scheme(&self) -> &str;
	fn host(&self) -> &str;
	fn path(&self) -> &str;
	fn query(&self) -> Option<&str>;
	fn request_headers(&self) -> &HeaderMap;

	/// Takes ownership of the request body source. Called at most once per
	/// exchange, from [`crate::request_builder::RequestBuilder::build`].
	fn take_request_body(&mut self) -> Self::RequestBody;

	/// `None` when the inbound runtime exposes no body-detection feature,
	/// in which case the header heuristics in spec §4.5 step 5 apply.
	fn body_detection(&self) -> Option<&dyn BodyDetection> {
		None
	}

	fn upgrade_capability(&mut self) -> Option<&mut dyn UpgradeCapability> {
		None
	}

	fn features(&self) -> InboundFeatures {
		InboundFeatures::default()
	}

	/// Best-effort disabling of body-size/rate limits for a streaming
	/// request (spec §4.5 step 6). Implementations that can't honor this
	/// after reads have begun should log and return `Ok(())` anyway (spec
	/// §9 open question on `HttpMaxRequestBodySize` being read-only).
	fn disable_request_body_limits(&mut self) {}

	/// Cancellation token tied to the inbound connection's lifetime.
	fn abort_token(&self) -> &tokio_util::sync::CancellationToken;
	fn abort(&mut self);

	fn has_response_started(&self) -> bool;
	/// The status currently set on the response, so telemetry can report it
	/// at `ProxyStop` (spec §6 "`ProxyStop(statusCode: int)`").
	fn response_status(&self) -> http::StatusCode;
	fn set_response_status(&mut self, status: http::StatusCode);
	fn response_headers_mut(&mut self) -> &mut HeaderMap;
	fn clear_response(&mut self);

	/// Sink the response body is written to via
	/// [`proxy_core::StreamCopier::copy`].
	type ResponseBodySink: proxy_core::ByteSink + Send + 'static;
	fn response_body_sink(&mut self) -> Self::ResponseBodySink;

	fn response_trailers_mut(&mut self) -> Option<&mut HeaderMap> {
		None
	}

	/// Flushes headers/body/trailers for a streaming request (spec §4.7
	/// step 11).
	async fn complete(&mut self) {}

	/// HTTP/2 reset with the given error code, or a transport abort if
	/// reset is unavailable (spec §7, glossary "reset vs abort").
	fn reset(&mut self, code: crate::error::ResetCode) {
		let _ = code;
		self.abort();
	}

	/// Records the terminal outcome for observability (spec §6 "Error
	/// feature").
	fn set_error_feature(&mut self, feature: ProxyErrorFeature) {
		let _ = feature;
	}
}
