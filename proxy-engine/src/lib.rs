//! The proxy engine core: given a routed inbound request, a destination
//! prefix, and an outbound HTTP client handle, drives the end-to-end
//! proxying of a single request/response exchange (construction of the
//! outbound request, concurrent body copying, protocol-upgrade tunneling,
//! the error taxonomy, the transform pipeline, and lifecycle telemetry).
//!
//! Destination selection, connection pooling/TLS, inbound listening and
//! parsing, the transform-rule DSL builder, and log sinks all live outside
//! this crate; it reaches them only through the [`inbound::InboundContext`]
//! and [`outbound::OutboundClient`] traits.

pub mod body;
pub mod duplex;
pub mod engine;
pub mod error;
pub mod headers;
pub mod inbound;
pub mod options;
pub mod outbound;
pub mod request_builder;
pub mod telemetry;
pub mod transforms;
pub mod types;
pub mod upgrade;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use engine::ProxyEngine;
pub use error::{ProxyError, ProxyErrorFeature, ResetCode};
pub use inbound::InboundContext;
pub use options::{RequestProxyOptions, VersionPolicy};
pub use outbound::{OutboundClient, SendError};
pub use telemetry::{ProxyStage, ProxyTelemetry, RecordingTelemetry, TracingTelemetry};
pub use transforms::Transforms;
