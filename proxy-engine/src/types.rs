//! Shared HTTP type aliases, mirroring `agentgateway::http`'s `Body` /
//! `Request` / `Response` aliases so the rest of the crate doesn't repeat
//! the body type parameter everywhere.

pub use axum_core::body::Body;

pub type Request = http::Request<Body>;
pub type Response = http::Response<Body>;

/// Header names the engine treats as "content-specific" rather than
/// "general" (spec §4.5 step 7). .NET's `HttpRequestMessage` splits headers
/// between the message and its `HttpContent`; `http::Request` has a single
/// header bag, so we fold both sets into it but keep this list to decide
/// ordering/grouping when a transform hook asks to distinguish them.
pub const CONTENT_HEADER_NAMES: &[&str] = &[
	"content-type",
	"content-length",
	"content-encoding",
	"content-language",
	"content-location",
	"content-md5",
	"content-range",
	"expires",
	"last-modified",
];

pub fn is_content_header(name: &http::HeaderName) -> bool {
	CONTENT_HEADER_NAMES
		.iter()
		.any(|n| name.as_str().eq_ignore_ascii_case(n))
}
