//! The proxy error taxonomy (spec §3, §7) and its mapping to HTTP status
//! codes and HTTP/2 reset codes.

use http::StatusCode;

/// Every failure mode the engine can classify a proxied exchange into.
///
/// `NoAvailableDestinations` is kept in the taxonomy for completeness (spec
/// §3 lists it) but is never constructed by this crate: destination
/// selection happens entirely in the external router, before
/// [`crate::engine::ProxyEngine::proxy`] is ever called.
#[derive(thiserror::Error, Debug)]
pub enum ProxyError {
	#[error("outbound send failed before a response was received")]
	Request(#[source] anyhow::Error),
	#[error("outbound send exceeded the configured timeout")]
	RequestTimedOut,
	#[error("inbound request was aborted before the outbound send completed")]
	RequestCanceled,
	#[error("request body copy was canceled")]
	RequestBodyCanceled,
	#[error("read from the inbound request body failed")]
	RequestBodyClient(#[source] std::io::Error),
	#[error("write to the outbound request body failed")]
	RequestBodyDestination(#[source] std::io::Error),
	#[error("response body copy was canceled")]
	ResponseBodyCanceled,
	#[error("write to the inbound response body failed")]
	ResponseBodyClient(#[source] std::io::Error),
	#[error("read from the outbound response body failed")]
	ResponseBodyDestination(#[source] std::io::Error),
	#[error("upgrade tunnel: request direction canceled")]
	UpgradeRequestCanceled,
	#[error("upgrade tunnel: read from the inbound connection failed")]
	UpgradeRequestClient(#[source] std::io::Error),
	#[error("upgrade tunnel: write to the outbound connection failed")]
	UpgradeRequestDestination(#[source] std::io::Error),
	#[error("upgrade tunnel: response direction canceled")]
	UpgradeResponseCanceled,
	#[error("upgrade tunnel: write to the inbound connection failed")]
	UpgradeResponseClient(#[source] std::io::Error),
	#[error("upgrade tunnel: read from the outbound connection failed")]
	UpgradeResponseDestination(#[source] std::io::Error),
	#[error("no available destinations")]
	NoAvailableDestinations,
}

impl ProxyError {
	/// The default status policy from spec §7. Returns `None` for the
	/// upgrade-branch errors and for errors whose status has already been
	/// sent (the caller must reset/abort instead of overwriting a status).
	pub fn default_status(&self) -> Option<StatusCode> {
		use ProxyError::*;
		match self {
			Request(_) => Some(StatusCode::BAD_GATEWAY),
			RequestTimedOut => Some(StatusCode::GATEWAY_TIMEOUT),
			RequestCanceled => Some(StatusCode::BAD_GATEWAY),
			RequestBodyClient(_) => Some(StatusCode::BAD_REQUEST),
			RequestBodyDestination(_) => Some(StatusCode::BAD_GATEWAY),
			RequestBodyCanceled => Some(StatusCode::BAD_GATEWAY),
			ResponseBodyDestination(_) | ResponseBodyClient(_) | ResponseBodyCanceled => {
				Some(StatusCode::BAD_GATEWAY)
			},
			NoAvailableDestinations => Some(StatusCode::SERVICE_UNAVAILABLE),
			UpgradeRequestCanceled
			| UpgradeRequestClient(_)
			| UpgradeRequestDestination(_)
			| UpgradeResponseCanceled
			| UpgradeResponseClient(_)
			| UpgradeResponseDestination(_) => None,
		}
	}

	/// Whether this is one of the upgrade-branch variants, which never get a
	/// status code (the 101 response is already on the wire).
	pub fn is_upgrade(&self) -> bool {
		matches!(
			self,
			ProxyError::UpgradeRequestCanceled
				| ProxyError::UpgradeRequestClient(_)
				| ProxyError::UpgradeRequestDestination(_)
				| ProxyError::UpgradeResponseCanceled
				| ProxyError::UpgradeResponseClient(_)
				| ProxyError::UpgradeResponseDestination(_)
		)
	}
}

/// HTTP/2 RST_STREAM error codes used when a failure arrives after the
/// response has already started (spec §4.7 request-failure / response-body
/// error handlers): `Cancel` for a canceled copy, `Internal` for anything
/// else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetCode {
	Cancel = 2,
	Internal = 8,
}

impl ResetCode {
	pub fn for_error(err: &ProxyError) -> Self {
		match err {
			ProxyError::RequestBodyCanceled
			| ProxyError::ResponseBodyCanceled
			| ProxyError::RequestCanceled
			| ProxyError::UpgradeRequestCanceled
			| ProxyError::UpgradeResponseCanceled => ResetCode::Cancel,
			_ => ResetCode::Internal,
		}
	}
}

/// The per-request feature the engine sets on failure, so inbound middleware
/// can observe what happened (spec §6 "Error feature").
#[derive(Debug)]
pub struct ProxyErrorFeature {
	pub error: ProxyError,
	pub exception: Option<anyhow::Error>,
}

impl ProxyErrorFeature {
	pub fn new(error: ProxyError) -> Self {
		Self {
			error,
			exception: None,
		}
	}

	pub fn with_exception(mut self, exception: anyhow::Error) -> Self {
		self.exception = Some(exception);
		self
	}
}
