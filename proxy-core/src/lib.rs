//! Generic, transport-agnostic byte copying primitives shared by the proxy
//! engine: a cancellable, classifying copy loop used both for HTTP body
//! forwarding and for the raw-socket upgrade tunnel.

pub mod copy;

pub use copy::{
	AsyncReadSource, AsyncWriteSink, ByteSink, ByteSource, CopyObserver, NoopObserver,
	StreamCopier, StreamCopyResult,
};
