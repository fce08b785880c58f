//! The raw byte-stream abstraction used once a request has been upgraded
//! (spec §6 "raw byte channel").

use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};

/// Marker trait for anything that can serve as one half of an upgrade
/// tunnel: a duplex, unpinned, `Send` byte stream. Blanket-implemented over
/// any type satisfying the bound, the way `agent-core` treats raw TCP/TLS
/// streams interchangeably once a connection is established.
pub trait AsyncDuplex: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncDuplex for T {}

/// A boxed, type-erased duplex stream. Used wherever the engine needs to
/// hold "the inbound connection" or "the outbound connection" without
/// knowing its concrete transport (TCP, TLS, a test double, ...).
pub type BoxedDuplex = Pin<Box<dyn AsyncDuplex>>;
