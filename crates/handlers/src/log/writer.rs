use crate::error::Error;
use crate::writer::{Capabilities, Flusher, Hijacker, PushOptions, Pusher, ResponseWriter, Upgraded};
use http::{HeaderMap, StatusCode};
use std::io;

/// Records the status and the body size of a response on its way out. Headers pass untouched.
pub(crate) struct LogWriter<'a> {
    inner: &'a mut dyn ResponseWriter,
    status: Option<StatusCode>,
    size: u64,
    capabilities: Capabilities,
}

impl<'a> LogWriter<'a> {
    pub(crate) fn new(inner: &'a mut dyn ResponseWriter) -> Self {
        let capabilities = Capabilities::probe(inner);
        Self { inner, status: None, size: 0, capabilities }
    }

    /// The first status written, if any.
    ///
    /// A later `write_header` is superfluous on the wire, so it is not what the client saw and is
    /// not recorded either.
    pub(crate) fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Total body bytes accepted by the wrapped writer.
    pub(crate) fn size(&self) -> u64 {
        self.size
    }
}

impl ResponseWriter for LogWriter<'_> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        self.status.get_or_insert(status);
        self.inner.write_header(status);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.status.get_or_insert(StatusCode::OK);
        let n = self.inner.write(buf)?;
        self.size += n as u64;
        Ok(n)
    }

    fn as_flusher(&mut self) -> Option<&mut dyn Flusher> {
        if self.capabilities.flush { Some(self) } else { None }
    }

    fn as_hijacker(&mut self) -> Option<&mut dyn Hijacker> {
        if self.capabilities.hijack { Some(self) } else { None }
    }

    fn as_pusher(&mut self) -> Option<&mut dyn Pusher> {
        if self.capabilities.push { Some(self) } else { None }
    }
}

impl Flusher for LogWriter<'_> {
    fn flush(&mut self) -> io::Result<()> {
        match self.inner.as_flusher() {
            Some(flusher) => flusher.flush(),
            None => Err(io::Error::new(io::ErrorKind::Unsupported, "flush is not supported")),
        }
    }
}

impl Hijacker for LogWriter<'_> {
    fn hijack(&mut self) -> Result<Upgraded, Error> {
        let upgraded = crate::writer::hijack(&mut *self.inner)?;
        self.status.get_or_insert(StatusCode::SWITCHING_PROTOCOLS);
        Ok(upgraded)
    }
}

impl Pusher for LogWriter<'_> {
    fn push(&mut self, target: &str, opts: &PushOptions) -> Result<(), Error> {
        crate::writer::push(&mut *self.inner, target, opts)
    }
}
