//! Test doubles for the traits in [`crate::inbound`] and [`crate::outbound`],
//! modeled on `core::drain`'s hand-written `DummyConnection` — enough state
//! to drive the scenarios in spec §8 without a real network stack.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use proxy_core::{ByteSink, ByteSource};
use tokio_util::sync::CancellationToken;

use crate::duplex::BoxedDuplex;
use crate::error::{ProxyErrorFeature, ResetCode};
use crate::inbound::{BodyDetection, InboundContext, InboundFeatures, UpgradeCapability};
use crate::outbound::{OutboundClient, SendError};
use crate::types::{Request, Response};

/// A finite, in-memory [`ByteSource`]; the test equivalent of an inbound or
/// outbound body stream.
pub struct VecByteSource {
	chunks: VecDeque<std::io::Result<Bytes>>,
	delay_before_first_read: Option<Duration>,
}

impl VecByteSource {
	pub fn empty() -> Self {
		Self {
			chunks: VecDeque::new(),
			delay_before_first_read: None,
		}
	}

	pub fn from_bytes(data: impl Into<Bytes>) -> Self {
		Self {
			chunks: VecDeque::from([Ok(data.into())]),
			delay_before_first_read: None,
		}
	}

	/// A source whose first read fails, for scenario 5 (request body fails
	/// on first read).
	pub fn failing() -> Self {
		Self {
			chunks: VecDeque::from([Err(std::io::Error::new(std::io::ErrorKind::Other, "read failed"))]),
			delay_before_first_read: None,
		}
	}

	/// A source that sleeps before its first read, so a test can race a
	/// cancellation against an in-flight body copy (scenario 6: post-response
	/// request-body cancellation). Pair with `#[tokio::test(start_paused =
	/// true)]` so the race resolves deterministically on virtual time.
	pub fn delayed(data: impl Into<Bytes>, delay: Duration) -> Self {
		Self {
			chunks: VecDeque::from([Ok(data.into())]),
			delay_before_first_read: Some(delay),
		}
	}
}

#[async_trait]
impl ByteSource for VecByteSource {
	async fn read_chunk(&mut self) -> std::io::Result<Option<Bytes>> {
		if let Some(delay) = self.delay_before_first_read.take() {
			tokio::time::sleep(delay).await;
		}
		match self.chunks.pop_front() {
			None => Ok(None),
			Some(Ok(b)) => Ok(Some(b)),
			Some(Err(e)) => Err(e),
		}
	}
}

/// A [`ByteSink`] that records every chunk it receives into a shared
/// buffer, so tests can assert what actually reached the inbound response.
#[derive(Clone, Default)]
pub struct RecordingSink(Arc<Mutex<Vec<u8>>>);

impl RecordingSink {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn bytes(&self) -> Vec<u8> {
		self.0.lock().unwrap().clone()
	}
}

#[async_trait]
impl ByteSink for RecordingSink {
	async fn write_chunk(&mut self, chunk: Bytes) -> std::io::Result<()> {
		self.0.lock().unwrap().extend_from_slice(&chunk);
		Ok(())
	}
}

/// A canned [`UpgradeCapability`] handing out a single pre-built duplex half,
/// the way a real inbound runtime hands out the raw connection it was
/// holding underneath the HTTP/1.1 parser.
pub struct MockUpgrade {
	duplex: Option<BoxedDuplex>,
}

impl MockUpgrade {
	pub fn new(duplex: BoxedDuplex) -> Self {
		Self { duplex: Some(duplex) }
	}
}

#[async_trait]
impl UpgradeCapability for MockUpgrade {
	fn is_upgradeable(&self) -> bool {
		true
	}

	async fn upgrade(&mut self) -> std::io::Result<BoxedDuplex> {
		self
			.duplex
			.take()
			.ok_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "already upgraded"))
	}
}

/// A minimal [`InboundContext`] backed by plain fields instead of a real
/// HTTP connection.
pub struct MockInboundContext {
	method: Method,
	host: String,
	path: String,
	query: Option<String>,
	request_headers: HeaderMap,
	request_body: Option<VecByteSource>,
	abort: CancellationToken,
	response_started: bool,
	response_cleared: bool,
	response_status: StatusCode,
	response_headers: HeaderMap,
	response_body: RecordingSink,
	response_trailers: HeaderMap,
	error_feature: Option<ProxyErrorFeature>,
	reset_code: Option<ResetCode>,
	aborted: bool,
	upgrade: Option<MockUpgrade>,
	request_version: http::Version,
}

impl MockInboundContext {
	pub fn new(method: Method, host: &str, path: &str, query: Option<&str>) -> Self {
		Self {
			method,
			host: host.to_string(),
			path: path.to_string(),
			query: query.map(|q| q.to_string()),
			request_headers: HeaderMap::new(),
			request_body: Some(VecByteSource::empty()),
			abort: CancellationToken::new(),
			response_started: false,
			response_cleared: false,
			response_status: StatusCode::OK,
			response_headers: HeaderMap::new(),
			response_body: RecordingSink::new(),
			response_trailers: HeaderMap::new(),
			error_feature: None,
			reset_code: None,
			aborted: false,
			upgrade: None,
			request_version: http::Version::HTTP_2,
		}
	}

	pub fn with_body(mut self, body: VecByteSource) -> Self {
		self.request_body = Some(body);
		self
	}

	pub fn with_upgrade(mut self, duplex: BoxedDuplex) -> Self {
		self.upgrade = Some(MockUpgrade::new(duplex));
		self
	}

	pub fn with_version(mut self, version: http::Version) -> Self {
		self.request_version = version;
		self
	}

	pub fn request_headers_mut(&mut self) -> &mut HeaderMap {
		&mut self.request_headers
	}

	pub fn abort_handle(&self) -> CancellationToken {
		self.abort.clone()
	}

	pub fn response_status(&self) -> StatusCode {
		self.response_status
	}

	pub fn response_headers(&self) -> &HeaderMap {
		&self.response_headers
	}

	pub fn response_body(&self) -> RecordingSink {
		self.response_body.clone()
	}

	pub fn response_trailers(&self) -> &HeaderMap {
		&self.response_trailers
	}

	pub fn error_feature(&self) -> Option<&ProxyErrorFeature> {
		self.error_feature.as_ref()
	}

	pub fn reset_code(&self) -> Option<ResetCode> {
		self.reset_code
	}

	pub fn was_aborted(&self) -> bool {
		self.aborted
	}

	pub fn was_cleared(&self) -> bool {
		self.response_cleared
	}
}

#[async_trait]
impl InboundContext for MockInboundContext {
	type RequestBody = VecByteSource;
	type ResponseBodySink = RecordingSink;

	fn method(&self) -> &Method {
		&self.method
	}

	fn version(&self) -> http::Version {
		self.request_version
	}

	fn scheme(&self) -> &str {
		"http"
	}

	fn host(&self) -> &str {
		&self.host
	}

	fn path(&self) -> &str {
		&self.path
	}

	fn query(&self) -> Option<&str> {
		self.query.as_deref()
	}

	fn request_headers(&self) -> &HeaderMap {
		&self.request_headers
	}

	fn take_request_body(&mut self) -> Self::RequestBody {
		self.request_body.take().unwrap_or_else(VecByteSource::empty)
	}

	fn body_detection(&self) -> Option<&dyn BodyDetection> {
		None
	}

	fn upgrade_capability(&mut self) -> Option<&mut dyn UpgradeCapability> {
		self.upgrade.as_mut().map(|u| u as &mut dyn UpgradeCapability)
	}

	fn features(&self) -> InboundFeatures {
		InboundFeatures::default()
	}

	fn abort_token(&self) -> &CancellationToken {
		&self.abort
	}

	fn abort(&mut self) {
		self.aborted = true;
		self.abort.cancel();
	}

	fn has_response_started(&self) -> bool {
		self.response_started
	}

	fn response_status(&self) -> StatusCode {
		self.response_status
	}

	fn set_response_status(&mut self, status: StatusCode) {
		self.response_started = true;
		self.response_status = status;
	}

	fn response_headers_mut(&mut self) -> &mut HeaderMap {
		&mut self.response_headers
	}

	fn clear_response(&mut self) {
		self.response_cleared = true;
		self.response_started = false;
		self.response_headers.clear();
	}

	fn response_body_sink(&mut self) -> Self::ResponseBodySink {
		self.response_body.clone()
	}

	fn response_trailers_mut(&mut self) -> Option<&mut HeaderMap> {
		Some(&mut self.response_trailers)
	}

	fn set_error_feature(&mut self, feature: ProxyErrorFeature) {
		self.error_feature = Some(feature);
	}

	fn reset(&mut self, code: ResetCode) {
		self.reset_code = Some(code);
		self.aborted = true;
	}
}

/// An [`OutboundClient`] returning a canned response, a canned failure, or
/// hanging forever (for timeout/cancellation scenarios). `Respond` actually
/// drains the outbound request body to completion before returning, the way
/// a real `hyper` client pulls the whole body during `send` unless it is
/// streamed past the first byte — this is what drives a
/// [`crate::body::StreamCopyContent`] from `Unstarted` through to
/// `Completed` in these tests.
pub enum MockOutboundClient {
	Respond(Mutex<Option<Response>>),
	/// Like `Respond`, but hands the outbound response's body over to
	/// [`crate::upgrade::UpgradeDriver`] via `open_upgrade` instead of the
	/// normal response-body copy path.
	RespondWithUpgrade {
		response: Mutex<Option<Response>>,
		outbound_duplex: Mutex<Option<BoxedDuplex>>,
	},
	/// Like `Respond`, but returns the response as soon as the request body
	/// has been *started*, continuing to drain it in the background instead
	/// of blocking `send` on it — the way an HTTP/2 client may flush a
	/// response while still receiving the tail of a streamed request
	/// (spec §8 scenario 6: post-response request-body cancellation).
	RespondEarly(Mutex<Option<Response>>),
	Fail(String),
	Hang,
	Buffers,
}

impl MockOutboundClient {
	pub fn respond(response: Response) -> Self {
		MockOutboundClient::Respond(Mutex::new(Some(response)))
	}

	pub fn respond_with_upgrade(response: Response, outbound_duplex: BoxedDuplex) -> Self {
		MockOutboundClient::RespondWithUpgrade {
			response: Mutex::new(Some(response)),
			outbound_duplex: Mutex::new(Some(outbound_duplex)),
		}
	}

	pub fn respond_early(response: Response) -> Self {
		MockOutboundClient::RespondEarly(Mutex::new(Some(response)))
	}
}

#[async_trait]
impl OutboundClient for MockOutboundClient {
	async fn send(&self, request: Request, cancel: CancellationToken) -> Result<Response, SendError> {
		match self {
			MockOutboundClient::Respond(resp) | MockOutboundClient::RespondWithUpgrade { response: resp, .. } => {
				use http_body_util::BodyExt;
				request
					.into_body()
					.collect()
					.await
					.map_err(|e| SendError::Failed(anyhow::anyhow!(e)))?;
				let resp = resp.lock().unwrap().take().expect("response already consumed");
				Ok(resp)
			},
			MockOutboundClient::RespondEarly(resp) => {
				use http_body::Body as _;
				use http_body_util::BodyExt;
				let mut body = request.into_body();
				// Force the body past `Unstarted` synchronously (spec §3's
				// invariant) without waiting for it to finish.
				std::future::poll_fn(|cx| {
					let _ = std::pin::Pin::new(&mut body).poll_frame(cx);
					std::task::Poll::Ready(())
				})
				.await;
				tokio::spawn(async move {
					let _ = body.collect().await;
				});
				let resp = resp.lock().unwrap().take().expect("response already consumed");
				Ok(resp)
			},
			MockOutboundClient::Fail(msg) => Err(SendError::Failed(anyhow::anyhow!(msg.clone()))),
			MockOutboundClient::Hang => {
				cancel.cancelled().await;
				Err(SendError::Canceled)
			},
			MockOutboundClient::Buffers => unreachable!("buffers_response() should short-circuit send"),
		}
	}

	fn buffers_response(&self) -> bool {
		matches!(self, MockOutboundClient::Buffers)
	}

	async fn open_upgrade(&self, _response: Response) -> std::io::Result<BoxedDuplex> {
		match self {
			MockOutboundClient::RespondWithUpgrade { outbound_duplex, .. } => outbound_duplex
				.lock()
				.unwrap()
				.take()
				.ok_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "upgrade duplex already taken")),
			_ => Err(std::io::Error::new(
				std::io::ErrorKind::Unsupported,
				"this mock does not support upgrades",
			)),
		}
	}
}
