//! `StreamCopyContent`: the outbound request body producer (spec §4.2).
//!
//! `http_body::Body::poll_frame` is pull-based: the outbound client (hyper)
//! asks for the next frame, and that pull is what drives the underlying
//! copy from the inbound body. We run the copy on a background task and
//! hand frames to the poller over a bounded channel, so the copy keeps
//! making progress even while the poller is busy elsewhere — the same
//! "runs as a concurrent sibling task" model the spec describes in §5.

use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};
use proxy_core::{ByteSink, ByteSource, CopyObserver, StreamCopier, StreamCopyResult};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

const UNSTARTED: u8 = 0;
const STARTED: u8 = 1;
const COMPLETED: u8 = 2;

/// Observable state of a [`StreamCopyContent`], exposed so the engine can
/// perform the "coding defect" check in spec §3 ("Started must be observed
/// before the outbound client's send call returns").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyState {
	Unstarted,
	Started,
	Completed,
}

type BodyFrame = Result<Bytes, std::io::Error>;

struct ChannelSink {
	tx: mpsc::Sender<BodyFrame>,
	auto_flush: bool,
}

#[async_trait::async_trait]
impl ByteSink for ChannelSink {
	async fn write_chunk(&mut self, chunk: Bytes) -> std::io::Result<()> {
		self
			.tx
			.send(Ok(chunk))
			.await
			.map_err(|_| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "body consumer dropped"))?;
		if self.auto_flush {
			tokio::task::yield_now().await;
		}
		Ok(())
	}
}

/// Turns a non-`Success` [`StreamCopyResult`] into the terminal error frame
/// pushed down the channel so the outbound client's `poll_frame` sees the
/// failure instead of a silent EOF — otherwise a body read failure would
/// look identical to a clean end of stream, and the engine's defect check in
/// spec §4.7 step 5 would have nothing to observe. Canceled copies surface as
/// `Interrupted` since the spec treats them as a distinct outcome from an
/// I/O error on either side.
fn terminal_error(result: &StreamCopyResult) -> Option<std::io::Error> {
	match result {
		StreamCopyResult::Success => None,
		StreamCopyResult::InputError(e) | StreamCopyResult::OutputError(e) => {
			Some(std::io::Error::new(e.kind(), e.to_string()))
		},
		StreamCopyResult::Canceled => Some(std::io::Error::new(
			std::io::ErrorKind::Interrupted,
			"stream copy canceled",
		)),
	}
}

/// Handle shared between a [`StreamCopyContent`] and the task driving its
/// underlying copy, so callers can poll `state()` without owning the body.
#[derive(Clone)]
pub struct BodyStateHandle(Arc<AtomicU8>);

impl BodyStateHandle {
	pub fn state(&self) -> BodyState {
		match self.0.load(Ordering::Acquire) {
			STARTED => BodyState::Started,
			COMPLETED => BodyState::Completed,
			_ => BodyState::Unstarted,
		}
	}
}

/// A single-use outbound request body. Exposes no length (chunked framing),
/// matching spec §4.2.
pub struct StreamCopyContent<S> {
	source: Option<S>,
	auto_flush: bool,
	cancel: CancellationToken,
	observer: Arc<dyn CopyObserver>,
	state: Arc<AtomicU8>,
	receiver: mpsc::Receiver<BodyFrame>,
	sender: Option<mpsc::Sender<BodyFrame>>,
	completion_tx: Option<oneshot::Sender<StreamCopyResult>>,
	completion_rx: Option<oneshot::Receiver<StreamCopyResult>>,
}

impl<S: ByteSource + Send + 'static> StreamCopyContent<S> {
	pub fn new(source: S, auto_flush: bool, cancel: CancellationToken, observer: Arc<dyn CopyObserver>) -> Self {
		let (tx, rx) = mpsc::channel(16);
		let (completion_tx, completion_rx) = oneshot::channel();
		Self {
			source: Some(source),
			auto_flush,
			cancel,
			observer,
			state: Arc::new(AtomicU8::new(UNSTARTED)),
			receiver: rx,
			sender: Some(tx),
			completion_tx: Some(completion_tx),
			completion_rx: Some(completion_rx),
		}
	}

	pub fn state_handle(&self) -> BodyStateHandle {
		BodyStateHandle(self.state.clone())
	}

	/// The consumption task's one-shot result, awaited by the engine at the
	/// end of `proxy(...)` (spec §4.7 step 12). Must be called at most once;
	/// panics (a defect in this crate, not caller misuse) if the body was
	/// never started.
	pub fn consumption_task(&mut self) -> oneshot::Receiver<StreamCopyResult> {
		self
			.completion_rx
			.take()
			.expect("consumption_task polled more than once")
	}

	fn start(&mut self) {
		self.state.store(STARTED, Ordering::Release);
		let source = self.source.take().expect("StreamCopyContent started twice");
		let tx = self.sender.take().expect("StreamCopyContent started twice");
		let terminal_tx = tx.clone();
		let sink = ChannelSink {
			tx,
			auto_flush: self.auto_flush,
		};
		let cancel = self.cancel.clone();
		let observer = self.observer.clone();
		let state = self.state.clone();
		let completion_tx = self
			.completion_tx
			.take()
			.expect("StreamCopyContent started twice");

		tokio::spawn(async move {
			let result = StreamCopier::copy(true, source, sink, &cancel, &*observer).await;
			state.store(COMPLETED, Ordering::Release);
			if let Some(err) = terminal_error(&result) {
				let _ = terminal_tx.send(Err(err)).await;
			}
			let _ = completion_tx.send(result);
		});
	}
}

impl<S: ByteSource + Send + 'static> Body for StreamCopyContent<S> {
	type Data = Bytes;
	type Error = std::io::Error;

	fn poll_frame(
		mut self: Pin<&mut Self>,
		cx: &mut Context<'_>,
	) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
		if self.state.load(Ordering::Acquire) == UNSTARTED {
			self.start();
		}
		match self.receiver.poll_recv(cx) {
			Poll::Ready(Some(Ok(chunk))) => Poll::Ready(Some(Ok(Frame::data(chunk)))),
			Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e))),
			Poll::Ready(None) => Poll::Ready(None),
			Poll::Pending => Poll::Pending,
		}
	}

	fn is_end_stream(&self) -> bool {
		self.state.load(Ordering::Acquire) == COMPLETED && self.receiver.is_empty()
	}

	fn size_hint(&self) -> SizeHint {
		SizeHint::default()
	}
}

/// Shared handle a [`HttpBodySource`] publishes any trailer frame to, so the
/// caller can read it back out once the copy has finished (spec §4.7 step
/// 10: trailers must be copied from the *outbound* response, not synthesized
/// or discarded).
#[derive(Clone, Default)]
pub struct TrailersHandle(Arc<std::sync::Mutex<Option<http::HeaderMap>>>);

impl TrailersHandle {
	/// Takes the captured trailers, if the source observed a trailers frame
	/// before reaching EOF.
	pub fn take(&self) -> Option<http::HeaderMap> {
		self.0.lock().unwrap().take()
	}
}

/// Adapts any `http_body::Body` (the outbound response body, or the
/// inbound request body exposed through [`crate::types::Body`]) into a
/// [`ByteSource`], so [`StreamCopier`] can drive response-body and
/// upgrade-tunnel copies the same way it drives request bodies. Trailer
/// frames carry no bytes for the copy itself, so they're captured into
/// `trailers` as they're observed rather than dropped.
pub struct HttpBodySource<B> {
	inner: B,
	trailers: TrailersHandle,
}

impl<B> HttpBodySource<B> {
	pub fn new(inner: B) -> Self {
		Self {
			inner,
			trailers: TrailersHandle::default(),
		}
	}

	/// A handle to this source's captured trailers. Must be cloned out before
	/// the source is handed to [`StreamCopier::copy`] by value.
	pub fn trailers_handle(&self) -> TrailersHandle {
		self.trailers.clone()
	}
}

#[async_trait::async_trait]
impl<B> ByteSource for HttpBodySource<B>
where
	B: Body<Data = Bytes> + Unpin + Send,
	B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
	async fn read_chunk(&mut self) -> std::io::Result<Option<Bytes>> {
		use http_body_util::BodyExt;
		loop {
			match self.inner.frame().await {
				None => return Ok(None),
				Some(Err(e)) => {
					return Err(std::io::Error::new(std::io::ErrorKind::Other, e.into()));
				},
				Some(Ok(frame)) => match frame.into_data() {
					Ok(data) => return Ok(Some(data)),
					// A trailers-only frame carries no bytes for this direction;
					// capture it for the caller and keep pulling for data or EOF.
					Err(frame) => {
						if let Ok(trailers) = frame.into_trailers() {
							let mut slot = self.trailers.0.lock().unwrap();
							match slot.as_mut() {
								Some(existing) => existing.extend(trailers),
								None => *slot = Some(trailers),
							}
						}
						continue;
					},
				},
			}
		}
	}
}

#[cfg(test)]
mod test {
	use std::io;

	use bytes::Bytes;
	use http_body_util::BodyExt;
	use proxy_core::NoopObserver;

	use super::*;

	struct OnceSource(Option<Bytes>);

	#[async_trait::async_trait]
	impl ByteSource for OnceSource {
		async fn read_chunk(&mut self) -> io::Result<Option<Bytes>> {
			Ok(self.0.take())
		}
	}

	#[tokio::test]
	async fn starts_on_first_poll_and_completes() {
		let source = OnceSource(Some(Bytes::from_static(b"hello")));
		let mut content = StreamCopyContent::new(
			source,
			false,
			CancellationToken::new(),
			Arc::new(NoopObserver),
		);
		let handle = content.state_handle();
		assert_eq!(handle.state(), BodyState::Unstarted);

		let collected = content.collect().await.unwrap().to_bytes();
		assert_eq!(&collected[..], b"hello");
		assert_eq!(handle.state(), BodyState::Completed);
	}

	#[tokio::test]
	async fn propagates_input_error_instead_of_silent_eof() {
		struct FailingSource;
		#[async_trait::async_trait]
		impl ByteSource for FailingSource {
			async fn read_chunk(&mut self) -> io::Result<Option<Bytes>> {
				Err(io::Error::new(io::ErrorKind::Other, "read failed"))
			}
		}

		let mut content = StreamCopyContent::new(
			FailingSource,
			false,
			CancellationToken::new(),
			Arc::new(NoopObserver),
		);
		let consumption = content.consumption_task();

		let err = content.collect().await.unwrap_err();
		assert_eq!(err.to_string(), "read failed");

		let result = consumption.await.unwrap();
		assert!(matches!(result, StreamCopyResult::InputError(_)));
	}

	#[tokio::test]
	async fn consumption_task_reports_success() {
		let source = OnceSource(Some(Bytes::from_static(b"x")));
		let mut content = StreamCopyContent::new(
			source,
			false,
			CancellationToken::new(),
			Arc::new(NoopObserver),
		);
		let consumption = content.consumption_task();
		let _ = content.collect().await.unwrap();

		let result = consumption.await.unwrap();
		assert!(result.is_success());
	}
}
