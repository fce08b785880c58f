//! `UpgradeDriver`: handles a 101 outbound response by tunneling raw bytes
//! both directions (spec §4.6). Grounded on `httpproxy::handle_upgrade`'s
//! use of `agent_core::copy::copy_bidirectional`, generalized here to two
//! independent [`StreamCopier`] runs so the asymmetric error mapping (which
//! direction failed first) stays explicit.

use proxy_core::{AsyncReadSource, AsyncWriteSink, NoopObserver, StreamCopier, StreamCopyResult};
use tokio::io::split;

use crate::error::ProxyError;
use crate::inbound::InboundContext;
use crate::outbound::OutboundClient;
use crate::telemetry::{ProxyStage, ProxyTelemetry};
use crate::types::Response;

pub struct UpgradeDriver;

impl UpgradeDriver {
	pub async fn run<Ctx, Client>(
		inbound: &mut Ctx,
		outbound_client: &Client,
		response: Response,
		telemetry: &dyn ProxyTelemetry,
	) -> Result<(), ProxyError>
	where
		Ctx: InboundContext,
		Client: OutboundClient,
	{
		// 1.
		telemetry.on_stage(ProxyStage::ResponseUpgrade);

		// 2. Acquire the inbound raw stream. A failure here is reported as
		// `UpgradeResponseClient` per spec §4.6 step 2 (the 101 has already
		// been emitted, so this is classified on the response side).
		let inbound_stream = {
			let cap = inbound
				.upgrade_capability()
				.ok_or(ProxyError::UpgradeResponseClient(std::io::Error::new(
					std::io::ErrorKind::Unsupported,
					"inbound runtime exposes no upgrade capability",
				)))?;
			cap
				.upgrade()
				.await
				.map_err(ProxyError::UpgradeResponseClient)?
		};

		// 3. Open the outbound response stream.
		let outbound_stream = outbound_client
			.open_upgrade(response)
			.await
			.map_err(ProxyError::UpgradeRequestDestination)?;

		// 4. Linked cancellation token.
		let linked = inbound.abort_token().child_token();

		let (inbound_read, inbound_write) = split(inbound_stream);
		let (outbound_read, outbound_write) = split(outbound_stream);

		// 5. Two concurrent copies.
		let request_direction = StreamCopier::copy(
			true,
			AsyncReadSource::new(inbound_read),
			AsyncWriteSink::new(outbound_write),
			&linked,
			&NoopObserver,
		);
		let response_direction = StreamCopier::copy(
			false,
			AsyncReadSource::new(outbound_read),
			AsyncWriteSink::new(inbound_write),
			&linked,
			&NoopObserver,
		);

		tokio::pin!(request_direction);
		tokio::pin!(response_direction);

		// 6. Await the first to complete, then cancel and drain the other.
		let (first, second_fut): (Result<(), ProxyError>, _) = tokio::select! {
			res = &mut request_direction => (map_request_result(res), Either::Response(response_direction)),
			res = &mut response_direction => (map_response_result(res), Either::Request(request_direction)),
		};

		if first.is_err() {
			linked.cancel();
		}

		let second = match second_fut {
			Either::Request(fut) => map_request_result(fut.await),
			Either::Response(fut) => map_response_result(fut.await),
		};

		first.and(second)
	}
}

enum Either<A, B> {
	Request(A),
	Response(B),
}

fn map_request_result(result: StreamCopyResult) -> Result<(), ProxyError> {
	match result {
		StreamCopyResult::Success => Ok(()),
		StreamCopyResult::InputError(e) => Err(ProxyError::UpgradeRequestClient(e)),
		StreamCopyResult::OutputError(e) => Err(ProxyError::UpgradeRequestDestination(e)),
		StreamCopyResult::Canceled => Err(ProxyError::UpgradeRequestCanceled),
	}
}

fn map_response_result(result: StreamCopyResult) -> Result<(), ProxyError> {
	match result {
		StreamCopyResult::Success => Ok(()),
		StreamCopyResult::InputError(e) => Err(ProxyError::UpgradeResponseDestination(e)),
		StreamCopyResult::OutputError(e) => Err(ProxyError::UpgradeResponseClient(e)),
		StreamCopyResult::Canceled => Err(ProxyError::UpgradeResponseCanceled),
	}
}

