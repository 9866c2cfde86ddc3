//! Response writers and the decoration protocol.
//!
//! A handler answers a request by writing into a [`ResponseWriter`]: it edits the header map,
//! optionally sets a status with [`write_header`](ResponseWriter::write_header), then writes body
//! bytes. The status and headers are committed by the first `write_header` or `write`, whichever
//! comes first; later header edits are not sent.
//!
//! Middlewares decorate the writer they receive with one of their own. A decorator must not
//! pretend to support more than the writer it wraps, so the optional capabilities
//! ([`Flusher`], [`Hijacker`], [`Pusher`]) are exposed through probe methods that default to
//! `None`. Decorators [`probe`](Capabilities::probe) the wrapped writer once, at wrap time, and
//! answer exactly that set afterwards.

mod recorder;

pub use recorder::Recorder;

use crate::error::Error;
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use std::fmt;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

pub trait ResponseWriter: Send {
    /// The header map that will be sent on commit.
    fn headers(&self) -> &HeaderMap;

    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Commits the status and headers. Only the first call has an effect.
    fn write_header(&mut self, status: StatusCode);

    /// Writes body bytes, committing `200 OK` first if nothing was committed yet.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    fn as_flusher(&mut self) -> Option<&mut dyn Flusher> {
        None
    }

    fn as_hijacker(&mut self) -> Option<&mut dyn Hijacker> {
        None
    }

    fn as_pusher(&mut self) -> Option<&mut dyn Pusher> {
        None
    }
}

/// Sends buffered data to the client immediately.
pub trait Flusher {
    fn flush(&mut self) -> io::Result<()>;
}

/// Takes over the underlying connection, e.g. for a protocol upgrade.
pub trait Hijacker {
    fn hijack(&mut self) -> Result<Upgraded, Error>;
}

/// Initiates an HTTP/2 server push.
pub trait Pusher {
    fn push(&mut self, target: &str, opts: &PushOptions) -> Result<(), Error>;
}

/// A raw bidirectional connection taken over from the server.
pub trait Connection: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Connection for T {}

pub type Upgraded = Box<dyn Connection>;

/// Options of a server push, see [`Pusher`].
#[derive(Debug, Clone)]
pub struct PushOptions {
    pub method: Method,
    pub headers: HeaderMap,
}

impl Default for PushOptions {
    fn default() -> Self {
        Self { method: Method::GET, headers: HeaderMap::new() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Flush,
    Hijack,
    Push,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Capability::Flush => "flush",
            Capability::Hijack => "hijack",
            Capability::Push => "push",
        })
    }
}

/// The optional capabilities a writer answers for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub flush: bool,
    pub hijack: bool,
    pub push: bool,
}

impl Capabilities {
    pub const NONE: Capabilities = Capabilities { flush: false, hijack: false, push: false };
    pub const ALL: Capabilities = Capabilities { flush: true, hijack: true, push: true };

    /// Asks `writer` which capabilities it supports.
    pub fn probe(writer: &mut dyn ResponseWriter) -> Self {
        Self {
            flush: writer.as_flusher().is_some(),
            hijack: writer.as_hijacker().is_some(),
            push: writer.as_pusher().is_some(),
        }
    }

    pub fn contains(&self, capability: Capability) -> bool {
        match capability {
            Capability::Flush => self.flush,
            Capability::Hijack => self.hijack,
            Capability::Push => self.push,
        }
    }
}

/// Flushes `writer`, or reports that it cannot.
pub fn flush(writer: &mut dyn ResponseWriter) -> Result<(), Error> {
    match writer.as_flusher() {
        Some(flusher) => flusher.flush().map_err(Error::io),
        None => Err(Error::not_supported(Capability::Flush)),
    }
}

/// Hijacks the connection behind `writer`, or reports that it cannot.
pub fn hijack(writer: &mut dyn ResponseWriter) -> Result<Upgraded, Error> {
    match writer.as_hijacker() {
        Some(hijacker) => hijacker.hijack(),
        None => Err(Error::not_supported(Capability::Hijack)),
    }
}

/// Pushes `target` through `writer`, or reports that it cannot.
pub fn push(writer: &mut dyn ResponseWriter, target: &str, opts: &PushOptions) -> Result<(), Error> {
    match writer.as_pusher() {
        Some(pusher) => pusher.push(target, opts),
        None => Err(Error::not_supported(Capability::Push)),
    }
}

/// Writes all of `buf`, retrying short writes.
pub fn write_all(writer: &mut dyn ResponseWriter, mut buf: &[u8]) -> io::Result<()> {
    while !buf.is_empty() {
        match writer.write(buf) {
            Ok(0) => return Err(io::Error::new(io::ErrorKind::WriteZero, "failed to write whole buffer")),
            Ok(n) => buf = &buf[n..],
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Adapts a response writer to [`std::io::Write`] so `write!` and encoders can target it.
pub struct BodyWriter<'a>(pub &'a mut dyn ResponseWriter);

impl fmt::Debug for BodyWriter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BodyWriter").finish_non_exhaustive()
    }
}

impl io::Write for BodyWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.0.as_flusher() {
            Some(flusher) => flusher.flush(),
            None => Ok(()),
        }
    }
}

/// Builds a header value from configuration, dropping it if it is not a valid header value.
pub(crate) fn header_value(value: &str) -> Option<HeaderValue> {
    match HeaderValue::from_str(value) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(value, cause = %e, "dropping invalid header value");
            None
        }
    }
}

/// Tracks whether a decorator already injected its header.
///
/// Every entry point of a decorator calls [`commit`](HeaderState::commit) first; only the first
/// call returns true, so the injection runs exactly once no matter which entry point came first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum HeaderState {
    #[default]
    Pending,
    Committed,
}

impl HeaderState {
    pub(crate) fn commit(&mut self) -> bool {
        match self {
            HeaderState::Pending => {
                *self = HeaderState::Committed;
                true
            }
            HeaderState::Committed => false,
        }
    }
}

/// Implements the capability probes of a decorator by forwarding to its `inner` writer.
///
/// The decorator needs an `inner: &mut dyn ResponseWriter` field and a `capabilities` field
/// filled by [`Capabilities::probe`] when it was created. With `on_flush: method`, `method` runs
/// before the flush is forwarded, so a flush commits the decorator's header like a write does.
macro_rules! forward_capabilities {
    ($writer:ident $(, on_flush: $hook:ident)?) => {
        impl $crate::writer::Flusher for $writer<'_> {
            fn flush(&mut self) -> std::io::Result<()> {
                $(self.$hook();)?
                match $crate::writer::ResponseWriter::as_flusher(&mut *self.inner) {
                    Some(flusher) => flusher.flush(),
                    None => Err(std::io::Error::new(std::io::ErrorKind::Unsupported, "flush is not supported")),
                }
            }
        }

        impl $crate::writer::Hijacker for $writer<'_> {
            fn hijack(&mut self) -> Result<$crate::writer::Upgraded, $crate::Error> {
                $crate::writer::hijack(&mut *self.inner)
            }
        }

        impl $crate::writer::Pusher for $writer<'_> {
            fn push(&mut self, target: &str, opts: &$crate::writer::PushOptions) -> Result<(), $crate::Error> {
                $crate::writer::push(&mut *self.inner, target, opts)
            }
        }
    };
}

/// Expands to the three probe methods of [`ResponseWriter`] answering from `self.capabilities`.
macro_rules! probe_capabilities {
    () => {
        fn as_flusher(&mut self) -> Option<&mut dyn $crate::writer::Flusher> {
            if self.capabilities.flush { Some(self) } else { None }
        }

        fn as_hijacker(&mut self) -> Option<&mut dyn $crate::writer::Hijacker> {
            if self.capabilities.hijack { Some(self) } else { None }
        }

        fn as_pusher(&mut self) -> Option<&mut dyn $crate::writer::Pusher> {
            if self.capabilities.push { Some(self) } else { None }
        }
    };
}

pub(crate) use forward_capabilities;
pub(crate) use probe_capabilities;
