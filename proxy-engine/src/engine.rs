//! `ProxyEngine`: the nine-step orchestration of a single proxied exchange
//! (spec §4.7).

use std::sync::Arc;
use std::time::Duration;

use proxy_core::{CopyObserver, StreamCopier, StreamCopyResult};
use tokio_util::sync::CancellationToken;

use crate::body::HttpBodySource;
use crate::error::{ProxyError, ProxyErrorFeature, ResetCode};
use crate::headers::HeaderPipeline;
use crate::inbound::InboundContext;
use crate::options::RequestProxyOptions;
use crate::outbound::{OutboundClient, SendError};
use crate::request_builder::{BuiltRequest, RequestBuilder};
use crate::telemetry::{ProxyStage, ProxyTelemetry};
use crate::transforms::Transforms;

pub struct ProxyEngine;

struct StageObserver<'a>(&'a dyn ProxyTelemetry);

impl CopyObserver for StageObserver<'_> {
	fn on_first_byte(&self, is_request: bool) {
		if is_request {
			self.0.on_stage(ProxyStage::RequestContentTransferStart);
		}
	}
}

impl ProxyEngine {
	pub async fn proxy<Ctx, Client>(
		inbound: &mut Ctx,
		destination_prefix: &str,
		outbound_client: &Client,
		transforms: &Transforms,
		options: &RequestProxyOptions,
		telemetry: &dyn ProxyTelemetry,
	) -> anyhow::Result<()>
	where
		Ctx: InboundContext,
		Client: OutboundClient,
	{
		if outbound_client.buffers_response() {
			anyhow::bail!("outbound client buffers responses; ProxyEngine requires a streaming client");
		}

		// Step 1.
		telemetry.on_start(destination_prefix);
		let result = Self::run(inbound, destination_prefix, outbound_client, transforms, options, telemetry).await;
		telemetry.on_stop(inbound.response_status());
		result
	}

	async fn run<Ctx, Client>(
		inbound: &mut Ctx,
		destination_prefix: &str,
		outbound_client: &Client,
		transforms: &Transforms,
		options: &RequestProxyOptions,
		telemetry: &dyn ProxyTelemetry,
	) -> anyhow::Result<()>
	where
		Ctx: InboundContext,
		Client: OutboundClient,
	{
		// Step 2.
		let abort_token = inbound.abort_token().clone();
		let is_client_http2 = inbound.version() == http::Version::HTTP_2;
		let is_streaming_request = is_client_http2
			&& inbound
				.request_headers()
				.get(http::header::CONTENT_TYPE)
				.and_then(|v| v.to_str().ok())
				.map(|v| v.starts_with("application/grpc"))
				.unwrap_or(false);

		let observer: Arc<dyn CopyObserver> = Arc::new(StageObserver(telemetry));

		// Step 3.
		let BuiltRequest { request, mut body } = RequestBuilder::build(
			inbound,
			destination_prefix,
			transforms,
			options,
			is_streaming_request,
			&abort_token,
			observer,
		)
		.await?;

		// Step 4.
		let linked = abort_token.child_token();
		let timeout_token = linked.clone();
		let timeout_duration = options.timeout;
		let timeout = tokio::spawn(async move {
			tokio::time::sleep(timeout_duration).await;
			timeout_token.cancel();
		});

		telemetry.on_stage(ProxyStage::SendAsyncStart);
		let send_result = outbound_client.send(request, linked.clone()).await;
		timeout.abort();

		let mut response = match send_result {
			Ok(resp) => {
				telemetry.on_stage(ProxyStage::SendAsyncStop);
				resp
			},
			Err(SendError::Canceled) => {
				let error = if abort_token.is_cancelled() {
					ProxyError::RequestCanceled
				} else {
					ProxyError::RequestTimedOut
				};
				Self::fail(inbound, telemetry, error, None);
				return Ok(());
			},
			Err(SendError::Failed(e)) => {
				Self::handle_request_failure(inbound, telemetry, &mut body, e).await;
				return Ok(());
			},
		};

		// Step 5: defect check.
		if let Some(handle) = &body {
			if handle.state.state() == crate::body::BodyState::Unstarted {
				anyhow::bail!(
					"coding defect: outbound client returned without ever pulling the request body"
				);
			}
		}

		// Step 6: downgrade detection.
		if is_client_http2 && response.version() != http::Version::HTTP_2 {
			tracing::debug!(target: "proxy", "outbound response downgraded from HTTP/2");
		}

		// Step 7.
		inbound.set_response_status(response.status());
		if transforms.copy_response_headers {
			HeaderPipeline::copy_response_headers(response.headers(), inbound.response_headers_mut());
		}
		transforms.run_on_response(&mut response).await?;

		// Step 8: upgrade branch.
		if response.status() == http::StatusCode::SWITCHING_PROTOCOLS {
			if let Err(error) = crate::upgrade::UpgradeDriver::run(inbound, outbound_client, response, telemetry).await
			{
				Self::fail(inbound, telemetry, error, None);
			}
			Self::await_consumption(inbound, body, telemetry).await;
			return Ok(());
		}

		// Step 9: response body copy.
		let response_body_source = HttpBodySource::new(response.into_body());
		let outbound_trailers = response_body_source.trailers_handle();
		let response_sink = inbound.response_body_sink();
		let copy_result = StreamCopier::copy(false, response_body_source, response_sink, &abort_token, &proxy_core::NoopObserver).await;

		if !copy_result.is_success() {
			Self::handle_response_body_failure(inbound, telemetry, &mut body, copy_result).await;
			Self::await_consumption(inbound, body, telemetry).await;
			return Ok(());
		}

		// Step 10: trailers, copied from the outbound response (captured by
		// `HttpBodySource` while step 9's copy drained the body), not from
		// whatever the inbound side already held.
		if let Some(dest_trailers) = inbound.response_trailers_mut() {
			if transforms.copy_response_trailers {
				if let Some(trailers) = outbound_trailers.take() {
					dest_trailers.extend(trailers);
				}
			}
			transforms.run_on_response_trailers(dest_trailers).await?;
		}

		// Step 11.
		if is_streaming_request {
			inbound.complete().await;
		}

		// Step 12.
		Self::await_consumption(inbound, body, telemetry).await;

		Ok(())
	}

	async fn await_consumption<Ctx: InboundContext>(
		inbound: &mut Ctx,
		body: Option<crate::request_builder::BodyHandle>,
		telemetry: &dyn ProxyTelemetry,
	) {
		let Some(handle) = body else { return };
		match handle.consumption.await {
			Ok(StreamCopyResult::Success) | Err(_) => {},
			Ok(result) => {
				// Post-response body failure: report it, but the status the
				// inbound already sent never changes (spec §4.7 step 12, §7).
				let error = request_body_error(result);
				telemetry.on_failed(&error);
				inbound.set_error_feature(ProxyErrorFeature::new(error));
			},
		}
	}

	async fn handle_request_failure<Ctx: InboundContext>(
		inbound: &mut Ctx,
		telemetry: &dyn ProxyTelemetry,
		body: &mut Option<crate::request_builder::BodyHandle>,
		exception: anyhow::Error,
	) {
		if let Some(handle) = body.as_mut() {
			if handle.state.state() == crate::body::BodyState::Completed {
				if let Ok(result) = handle.consumption.try_recv() {
					if !result.is_success() {
						let error = request_body_error(result);
						Self::fail(inbound, telemetry, error, Some(exception));
						return;
					}
				}
			}
		}
		Self::fail(inbound, telemetry, ProxyError::Request(exception), None);
	}

	async fn handle_response_body_failure<Ctx: InboundContext>(
		inbound: &mut Ctx,
		telemetry: &dyn ProxyTelemetry,
		body: &mut Option<crate::request_builder::BodyHandle>,
		result: StreamCopyResult,
	) {
		if let Some(handle) = body.as_mut() {
			if handle.state.state() == crate::body::BodyState::Completed {
				if let Ok(body_result) = handle.consumption.try_recv() {
					if !body_result.is_success() {
						let error = request_body_error(body_result);
						Self::fail(inbound, telemetry, error, None);
						return;
					}
				}
			}
		}
		let error = response_body_error(result);
		Self::fail(inbound, telemetry, error, None);
	}

	fn fail<Ctx: InboundContext>(
		inbound: &mut Ctx,
		telemetry: &dyn ProxyTelemetry,
		error: ProxyError,
		exception: Option<anyhow::Error>,
	) {
		telemetry.on_failed(&error);
		let status = error.default_status();
		let reset_code = ResetCode::for_error(&error);
		let feature = match exception {
			Some(e) => ProxyErrorFeature::new(error).with_exception(e),
			None => ProxyErrorFeature::new(error),
		};

		if !inbound.has_response_started() {
			inbound.clear_response();
			if let Some(status) = status {
				inbound.set_response_status(status);
			}
		} else {
			inbound.reset(reset_code);
		}
		inbound.set_error_feature(feature);
	}
}

fn request_body_error(result: StreamCopyResult) -> ProxyError {
	match result {
		StreamCopyResult::Success => unreachable!("caller checked for non-success"),
		StreamCopyResult::InputError(e) => ProxyError::RequestBodyClient(e),
		StreamCopyResult::OutputError(e) => ProxyError::RequestBodyDestination(e),
		StreamCopyResult::Canceled => ProxyError::RequestBodyCanceled,
	}
}

fn response_body_error(result: StreamCopyResult) -> ProxyError {
	match result {
		StreamCopyResult::Success => unreachable!("caller checked for non-success"),
		StreamCopyResult::InputError(e) => ProxyError::ResponseBodyDestination(e),
		StreamCopyResult::OutputError(e) => ProxyError::ResponseBodyClient(e),
		StreamCopyResult::Canceled => ProxyError::ResponseBodyCanceled,
	}
}
