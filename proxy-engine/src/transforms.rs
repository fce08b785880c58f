//! `Transforms` (spec §4.4): three bool flags plus three optional hooks,
//! supplied externally and invoked at fixed points. A data value, not a
//! middleware chain, the way `agentgateway::http::filters::HeaderModifier`
//! is a small declarative struct rather than an arbitrary callback.

use std::future::Future;
use std::pin::Pin;

use crate::types::{Request, Response};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Called after the outbound request has been built but before it is sent.
/// Receives the destination prefix it was built against (spec §4.4). May
/// mutate the request freely, including replacing its body producer; a
/// null/absent hook means "skip", and the engine fills in a default URI
/// when one wasn't set.
pub type OnRequestHook = Box<
	dyn for<'a> Fn(&'a mut Request, &'a str) -> BoxFuture<'a, anyhow::Result<()>> + Send + Sync,
>;

/// Called after the outbound response has been received but before its
/// headers are copied to the inbound response.
pub type OnResponseHook =
	Box<dyn for<'a> Fn(&'a mut Response) -> BoxFuture<'a, anyhow::Result<()>> + Send + Sync>;

/// Called once response trailers (if any) have arrived.
pub type OnResponseTrailersHook = Box<
	dyn for<'a> Fn(&'a mut http::HeaderMap) -> BoxFuture<'a, anyhow::Result<()>> + Send + Sync,
>;

/// A data value with three optional hooks and three bool flags, invoked at
/// fixed points by [`crate::engine::ProxyEngine::proxy`] and
/// [`crate::request_builder::RequestBuilder::build`].
pub struct Transforms {
	pub copy_request_headers: bool,
	pub copy_response_headers: bool,
	pub copy_response_trailers: bool,

	pub on_request: Option<OnRequestHook>,
	pub on_response: Option<OnResponseHook>,
	pub on_response_trailers: Option<OnResponseTrailersHook>,
}

impl Default for Transforms {
	fn default() -> Self {
		Self {
			copy_request_headers: true,
			copy_response_headers: true,
			copy_response_trailers: true,
			on_request: None,
			on_response: None,
			on_response_trailers: None,
		}
	}
}

impl Transforms {
	pub fn new() -> Self {
		Self::default()
	}

	/// The empty transform: all three copy flags on, no hooks. Used by
	/// property L2 ("applying Transforms::empty produces the same outbound
	/// request as skipping the pipeline").
	pub fn empty() -> Self {
		Self::default()
	}

	pub async fn run_on_request(&self, request: &mut Request, destination_prefix: &str) -> anyhow::Result<()> {
		if let Some(hook) = &self.on_request {
			hook(request, destination_prefix).await
		} else {
			Ok(())
		}
	}

	pub async fn run_on_response(&self, response: &mut Response) -> anyhow::Result<()> {
		if let Some(hook) = &self.on_response {
			hook(response).await
		} else {
			Ok(())
		}
	}

	pub async fn run_on_response_trailers(&self, trailers: &mut http::HeaderMap) -> anyhow::Result<()> {
		if let Some(hook) = &self.on_response_trailers {
			hook(trailers).await
		} else {
			Ok(())
		}
	}
}
