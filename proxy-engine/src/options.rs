//! `RequestProxyOptions` (spec §3) and the HTTP version policy it carries.

use std::time::Duration;

use http::Version;

/// How the outbound request's HTTP version is chosen relative to the
/// inbound request's version (spec §4.5 step 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionPolicy {
	/// Use the inbound request's version, or `options.version` if that's
	/// lower. This is the default.
	RequestVersionOrLower,
	/// Always use exactly this version, regardless of what the inbound
	/// request negotiated.
	Exact,
}

/// Immutable per-call configuration (spec §3).
#[derive(Debug, Clone)]
pub struct RequestProxyOptions {
	pub timeout: Duration,
	pub version: Version,
	pub version_policy: VersionPolicy,
}

impl Default for RequestProxyOptions {
	fn default() -> Self {
		Self {
			timeout: Duration::from_secs(100),
			version: Version::HTTP_2,
			version_policy: VersionPolicy::RequestVersionOrLower,
		}
	}
}
