//! Header forwarding rules (spec §4.5 step 7, §4.4 response header copy).
//!
//! Hop-by-hop handling follows the skip-list `trillium-proxy` builds from
//! RFC 7230 §6.1 plus the values actually named in the request's
//! `Connection` header; header-value preservation (including repeated
//! headers, which `HeaderMap::into_iter` yields as `(None, value)` after the
//! first) follows `agentgateway::proxy::request_builder::replace_headers`.

use http::{HeaderMap, HeaderName, HeaderValue};

use crate::types::is_content_header;

/// Headers that are meaningful only for a single hop and must never be
/// forwarded verbatim.
const HOP_BY_HOP: &[&str] = &[
	"connection",
	"keep-alive",
	"proxy-authenticate",
	"proxy-authorization",
	"te",
	"trailer",
	"transfer-encoding",
	"upgrade",
];

fn is_hop_by_hop(name: &HeaderName, extra: &[String]) -> bool {
	HOP_BY_HOP.iter().any(|h| name.as_str().eq_ignore_ascii_case(h))
		|| extra.iter().any(|h| name.as_str().eq_ignore_ascii_case(h))
}

/// Header names additionally listed in a request's `Connection` header,
/// which RFC 7230 §6.1 says must also be stripped hop-by-hop.
fn connection_listed_headers(headers: &HeaderMap) -> Vec<String> {
	headers
		.get_all(http::header::CONNECTION)
		.iter()
		.filter_map(|v| v.to_str().ok())
		.flat_map(|v| v.split(','))
		.map(|s| s.trim().to_string())
		.filter(|s| !s.is_empty())
		.collect()
}

/// The two header bags produced while building an outbound request: general
/// headers and content-specific headers (spec §4.5 step 7). Kept separate
/// only long enough for a transform hook to treat them differently; they are
/// merged into a single `HeaderMap` before the request is sent.
#[derive(Default)]
pub struct SplitHeaders {
	pub general: HeaderMap,
	pub content: HeaderMap,
}

impl SplitHeaders {
	pub fn merge(self) -> HeaderMap {
		let mut merged = self.general;
		merged.extend(self.content);
		merged
	}
}

pub struct HeaderPipeline;

impl HeaderPipeline {
	/// Copies inbound request headers into an outbound `SplitHeaders`,
	/// skipping hop-by-hop headers, pseudo-headers (`:`-prefixed, already
	/// consumed by the HTTP/2 layer and never real header names in `http`),
	/// and empty values, and folding repeated `cookie` headers into one
	/// `; `-joined value the way most HTTP/1.1 backends expect.
	pub fn copy_request_headers(source: &HeaderMap) -> SplitHeaders {
		let extra_hop_by_hop = connection_listed_headers(source);
		let mut out = SplitHeaders::default();
		let mut cookie_parts: Vec<String> = Vec::new();

		for (name, value) in source.iter() {
			if name.as_str().starts_with(':') {
				continue;
			}
			if is_hop_by_hop(name, &extra_hop_by_hop) {
				continue;
			}
			if value.is_empty() {
				continue;
			}
			if name == http::header::COOKIE {
				if let Ok(s) = value.to_str() {
					cookie_parts.push(s.to_string());
				}
				continue;
			}
			let bag = if is_content_header(name) {
				&mut out.content
			} else {
				&mut out.general
			};
			bag.append(name.clone(), value.clone());
		}

		if !cookie_parts.is_empty() {
			if let Ok(v) = HeaderValue::from_str(&cookie_parts.join("; ")) {
				out.general.insert(http::header::COOKIE, v);
			}
		}

		out
	}

	/// Copies outbound response headers into the inbound response. Spec §4.3
	/// only calls for skipping `Transfer-Encoding` (the outbound runtime
	/// manages its own framing) — everything else, including `Connection`,
	/// `Trailer` and `Upgrade`, is copied verbatim with repeated headers
	/// preserved (no folding): unlike request cookies, response headers such
	/// as `Set-Cookie` must stay as separate values.
	pub fn copy_response_headers(source: &HeaderMap, dest: &mut HeaderMap) {
		for (name, value) in source.iter() {
			if name == http::header::TRANSFER_ENCODING {
				continue;
			}
			dest.append(name.clone(), value.clone());
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn strips_hop_by_hop_and_connection_listed_headers() {
		let mut src = HeaderMap::new();
		src.insert(http::header::CONNECTION, HeaderValue::from_static("x-custom"));
		src.insert("x-custom", HeaderValue::from_static("drop me"));
		src.insert(http::header::HOST, HeaderValue::from_static("example.com"));

		let split = HeaderPipeline::copy_request_headers(&src);
		let merged = split.merge();

		assert!(!merged.contains_key("x-custom"));
		assert!(!merged.contains_key(http::header::CONNECTION));
		assert_eq!(merged.get(http::header::HOST).unwrap(), "example.com");
	}

	#[test]
	fn folds_repeated_cookies_joining_with_semicolon() {
		let mut src = HeaderMap::new();
		src.append(http::header::COOKIE, HeaderValue::from_static("a=1"));
		src.append(http::header::COOKIE, HeaderValue::from_static("b=2"));

		let merged = HeaderPipeline::copy_request_headers(&src).merge();

		assert_eq!(merged.get(http::header::COOKIE).unwrap(), "a=1; b=2");
	}

	#[test]
	fn routes_content_headers_to_the_content_bag() {
		let mut src = HeaderMap::new();
		src.insert(http::header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
		src.insert(http::header::HOST, HeaderValue::from_static("example.com"));

		let split = HeaderPipeline::copy_request_headers(&src);

		assert!(split.content.contains_key(http::header::CONTENT_TYPE));
		assert!(split.general.contains_key(http::header::HOST));
	}

	#[test]
	fn response_headers_preserve_repeated_values() {
		let mut src = HeaderMap::new();
		src.append(http::header::SET_COOKIE, HeaderValue::from_static("a=1"));
		src.append(http::header::SET_COOKIE, HeaderValue::from_static("b=2"));
		let mut dest = HeaderMap::new();

		HeaderPipeline::copy_response_headers(&src, &mut dest);

		assert_eq!(dest.get_all(http::header::SET_COOKIE).iter().count(), 2);
	}

	#[test]
	fn response_headers_skip_only_transfer_encoding() {
		let mut src = HeaderMap::new();
		src.insert(http::header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
		src.insert(http::header::CONNECTION, HeaderValue::from_static("keep-alive"));
		src.insert(http::header::TRAILER, HeaderValue::from_static("x-checksum"));
		let mut dest = HeaderMap::new();

		HeaderPipeline::copy_response_headers(&src, &mut dest);

		assert!(!dest.contains_key(http::header::TRANSFER_ENCODING));
		assert_eq!(dest.get(http::header::CONNECTION).unwrap(), "keep-alive");
		assert_eq!(dest.get(http::header::TRAILER).unwrap(), "x-checksum");
	}
}
