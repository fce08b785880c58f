//! `OutboundClient`: the outbound HTTP send capability the engine drives
//! (spec §4.7 step 4, §6).

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::duplex::BoxedDuplex;
use crate::types::{Request, Response};

#[derive(thiserror::Error, Debug)]
pub enum SendError {
	#[error(transparent)]
	Failed(anyhow::Error),
	#[error("send canceled")]
	Canceled,
}

/// A client capable of sending a fully-built outbound request and returning
/// its response, pulling the request's body producer as it sends (spec
/// §4.2, §4.7 step 4).
#[async_trait]
pub trait OutboundClient: Send + Sync {
	async fn send(&self, request: Request, cancel: CancellationToken) -> Result<Response, SendError>;

	/// Must be `false`. A client that pre-buffers the entire response
	/// before returning breaks the engine's streaming contract and is
	/// rejected by [`crate::engine::ProxyEngine::proxy`] (spec §4.7
	/// preconditions, scenario 8).
	fn buffers_response(&self) -> bool {
		false
	}

	/// Opens the outbound side of an upgrade tunnel after a 101 response
	/// (spec §4.6 step 3). The default implementation errs; clients that
	/// support upgrades (i.e. that proxy to an HTTP/1.1 backend over a raw
	/// connection) override this.
	async fn open_upgrade(&self, response: Response) -> std::io::Result<BoxedDuplex> {
		let _ = response;
		Err(std::io::Error::new(
			std::io::ErrorKind::Unsupported,
			"this outbound client does not support protocol upgrades",
		))
	}
}
