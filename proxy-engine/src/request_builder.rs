//! `RequestBuilder`: builds the outbound request (spec §4.5).

use std::sync::Arc;

use http::{HeaderValue, Method, Uri, Version};
use proxy_core::CopyObserver;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::body::{BodyStateHandle, StreamCopyContent};
use crate::headers::HeaderPipeline;
use crate::inbound::InboundContext;
use crate::options::{RequestProxyOptions, VersionPolicy};
use crate::transforms::Transforms;
use crate::types::{Body, Request};

const MIN_DESTINATION_PREFIX_LEN: usize = 8; // "http://a"

/// Handle to a request body still being driven by its background copy
/// task, kept by the engine so it can perform the defect check (spec §3)
/// and the final consumption-task await (spec §4.7 step 12).
pub struct BodyHandle {
	pub state: BodyStateHandle,
	pub consumption: oneshot::Receiver<proxy_core::StreamCopyResult>,
}

pub struct BuiltRequest {
	pub request: Request,
	pub body: Option<BodyHandle>,
}

pub struct RequestBuilder;

impl RequestBuilder {
	#[allow(clippy::too_many_arguments)]
	pub async fn build<Ctx: InboundContext>(
		inbound: &mut Ctx,
		destination_prefix: &str,
		transforms: &Transforms,
		options: &RequestProxyOptions,
		is_streaming: bool,
		cancel: &CancellationToken,
		observer: Arc<dyn CopyObserver>,
	) -> anyhow::Result<BuiltRequest> {
		// 1. Validate destination prefix.
		if destination_prefix.len() < MIN_DESTINATION_PREFIX_LEN {
			anyhow::bail!("destination prefix too short to be an absolute URI: {destination_prefix:?}");
		}
		let base = url::Url::parse(destination_prefix)
			.map_err(|e| anyhow::anyhow!("invalid destination prefix {destination_prefix:?}: {e}"))?;

		// 2. Method, case-preserving.
		let method: Method = inbound.method().clone();

		// 3. Upgrade detection.
		let upgrade_requested = inbound
			.request_headers()
			.get(http::header::UPGRADE)
			.and_then(|v| v.to_str().ok())
			.map(|v| v.eq_ignore_ascii_case("websocket") || v.to_ascii_uppercase().starts_with("SPDY/"))
			.unwrap_or(false);
		let is_upgrade = upgrade_requested
			&& inbound
				.upgrade_capability()
				.map(|u| u.is_upgradeable())
				.unwrap_or(false);

		// 4. Version and version policy.
		let version = if is_upgrade {
			Version::HTTP_11
		} else {
			options.version
		};
		let _version_policy = if is_upgrade {
			VersionPolicy::RequestVersionOrLower
		} else {
			options.version_policy
		};

		// 5. Body presence.
		let has_body = Self::decide_body_presence(inbound, version, &method);

		let mut request = Request::builder().method(method).version(version);

		// 6. Body producer, plus best-effort limit disabling for streaming.
		let mut body_handle = None;
		let body = if has_body {
			if is_streaming {
				inbound.disable_request_body_limits();
			}
			let source = inbound.take_request_body();
			let mut content = StreamCopyContent::new(source, is_streaming, cancel.clone(), observer);
			let state = content.state_handle();
			let consumption = content.consumption_task();
			body_handle = Some(BodyHandle { state, consumption });
			Body::new(content)
		} else {
			Body::empty()
		};

		// 7. Header copy.
		if transforms.copy_request_headers {
			let split = HeaderPipeline::copy_request_headers(inbound.request_headers());
			for (name, value) in split.merge() {
				if let Some(name) = name {
					request.headers_mut().unwrap().append(name, value);
				}
			}
		}
		if is_upgrade {
			// HeaderPipeline strips `Upgrade`/`Connection` as hop-by-hop, but an
			// upgrade request must still present them to the destination or it
			// will never answer 101 (spec §4.6 precondition).
			if let Some(upgrade_value) = inbound.request_headers().get(http::header::UPGRADE).cloned() {
				request.headers_mut().unwrap().insert(http::header::UPGRADE, upgrade_value);
				request
					.headers_mut()
					.unwrap()
					.insert(http::header::CONNECTION, HeaderValue::from_static("Upgrade"));
			}
		}
		if !inbound.host().is_empty() {
			if let Ok(v) = HeaderValue::from_str(inbound.host()) {
				request.headers_mut().unwrap().insert(http::header::HOST, v);
			}
		}

		let mut request = request.body(body)?;

		// 8. Default URI.
		let default_uri = Self::join_uri(&base, inbound.path(), inbound.query())?;
		*request.uri_mut() = default_uri.clone();

		// 9. OnRequest hook; fill in URI only if the hook left it unset.
		let uri_before = request.uri().clone();
		transforms.run_on_request(&mut request, destination_prefix).await?;
		if request.uri() == &uri_before {
			*request.uri_mut() = default_uri;
		}

		Ok(BuiltRequest {
			request,
			body: body_handle,
		})
	}

	fn decide_body_presence<Ctx: InboundContext>(inbound: &Ctx, version: Version, method: &Method) -> bool {
		if let Some(detector) = inbound.body_detection() {
			return detector.can_have_body();
		}
		let headers = inbound.request_headers();
		let chunked = headers
			.get(http::header::TRANSFER_ENCODING)
			.and_then(|v| v.to_str().ok())
			.map(|v| v.eq_ignore_ascii_case("chunked"))
			.unwrap_or(false);
		if chunked {
			return true;
		}
		if let Some(len) = headers
			.get(http::header::CONTENT_LENGTH)
			.and_then(|v| v.to_str().ok())
			.and_then(|v| v.parse::<u64>().ok())
		{
			return len > 0;
		}
		if version < Version::HTTP_2 {
			return false;
		}
		!matches!(
			*method,
			Method::GET | Method::HEAD | Method::DELETE | Method::CONNECT | Method::TRACE
		)
	}

	fn join_uri(base: &url::Url, path: &str, query: Option<&str>) -> anyhow::Result<Uri> {
		let base_path = base.path().trim_end_matches('/');
		let mut path_and_query = format!("{base_path}{path}");
		if let Some(q) = query {
			if !q.is_empty() {
				path_and_query.push('?');
				path_and_query.push_str(q.trim_start_matches('?'));
			}
		}
		let mut builder = Uri::builder().scheme(base.scheme()).path_and_query(path_and_query.as_str());
		let authority = match base.port() {
			Some(port) => format!("{}:{}", base.host_str().unwrap_or_default(), port),
			None => base.host_str().unwrap_or_default().to_string(),
		};
		builder = builder.authority(authority);
		Ok(builder.build()?)
	}
}

#[cfg(test)]
mod test {
	use std::sync::Arc;

	use http::{HeaderMap, Method};
	use proxy_core::NoopObserver;
	use tokio_util::sync::CancellationToken;

	use super::*;
	use crate::testing::MockInboundContext;

	#[tokio::test]
	async fn builds_default_uri_from_prefix_path_and_query() {
		let mut ctx = MockInboundContext::new(Method::GET, "example.com:3456", "/api/test", Some("a=b&c=d"));
		let transforms = Transforms::new();
		let options = RequestProxyOptions::default();

		let built = RequestBuilder::build(
			&mut ctx,
			"https://localhost:123/a/b/",
			&transforms,
			&options,
			false,
			&CancellationToken::new(),
			Arc::new(NoopObserver),
		)
		.await
		.unwrap();

		assert_eq!(
			built.request.uri().to_string(),
			"https://localhost:123/a/b/api/test?a=b&c=d"
		);
		assert_eq!(
			built.request.headers().get(http::header::HOST).unwrap(),
			"example.com:3456"
		);
		assert!(built.request.headers().get(":authority").is_none());
	}

	#[tokio::test]
	async fn rejects_too_short_destination_prefix() {
		let mut ctx = MockInboundContext::new(Method::GET, "example.com", "/", None);
		let transforms = Transforms::new();
		let options = RequestProxyOptions::default();

		let result = RequestBuilder::build(
			&mut ctx,
			"http:",
			&transforms,
			&options,
			false,
			&CancellationToken::new(),
			Arc::new(NoopObserver),
		)
		.await;

		assert!(result.is_err());
	}

	#[tokio::test]
	async fn head_request_has_no_body_over_http2() {
		let mut ctx = MockInboundContext::new(Method::HEAD, "example.com", "/", None);
		let transforms = Transforms::new();
		let options = RequestProxyOptions::default();

		let built = RequestBuilder::build(
			&mut ctx,
			"http://localhost/",
			&transforms,
			&options,
			false,
			&CancellationToken::new(),
			Arc::new(NoopObserver),
		)
		.await
		.unwrap();

		assert!(built.body.is_none());
	}

	#[tokio::test]
	async fn post_with_content_length_has_body() {
		let mut ctx = MockInboundContext::new(Method::POST, "example.com", "/", None);
		ctx.request_headers_mut()
			.insert(http::header::CONTENT_LENGTH, HeaderValue::from_static("1"));
		let transforms = Transforms::new();
		let options = RequestProxyOptions::default();

		let built = RequestBuilder::build(
			&mut ctx,
			"http://localhost/",
			&transforms,
			&options,
			false,
			&CancellationToken::new(),
			Arc::new(NoopObserver),
		)
		.await
		.unwrap();

		assert!(built.body.is_some());
		let _ = HeaderMap::new();
	}
}
