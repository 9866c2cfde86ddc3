use crate::handler::Handler;
use crate::request::Request;
use crate::writer::{Recorder, ResponseWriter, write_all};
use async_trait::async_trait;
use http::{HeaderMap, header};
use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::trace;

/// The environment variable that turns traffic dumps on, when set to `true`.
pub const DEBUG_HTTP_TRAFFIC: &str = "DEBUG_HTTP_TRAFFIC";

const BINARY_OMITTED: &[u8] = b"[binary data omitted]";

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Dumps every request and its response to a diagnostic output when `DEBUG_HTTP_TRAFFIC=true`.
///
/// The variable is read on every request. While enabled, the inner handler runs against a
/// [`Recorder`] so the whole exchange can be written in one go, then the recorded response is
/// replayed to the real writer. Responses are buffered in full, so keep it off for large bodies.
pub struct DebugTraffic<H> {
    handler: H,
    out: Arc<Mutex<Box<dyn Write + Send>>>,
    lookup: EnvLookup,
}

impl<H: fmt::Debug> fmt::Debug for DebugTraffic<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugTraffic").field("handler", &self.handler).finish_non_exhaustive()
    }
}

/// Dumps to stderr, reading the toggle from the process environment.
pub fn debug<H: Handler>(handler: H) -> DebugTraffic<H> {
    DebugTraffic {
        handler,
        out: Arc::new(Mutex::new(Box::new(io::stderr()))),
        lookup: Arc::new(|key| std::env::var(key).ok()),
    }
}

impl<H: Handler> DebugTraffic<H> {
    /// Sends the dumps to `out` instead of stderr.
    #[must_use]
    pub fn with_output<W: Write + Send + 'static>(mut self, out: W) -> Self {
        self.out = Arc::new(Mutex::new(Box::new(out)));
        self
    }

    /// Reads the toggle through `lookup` instead of the process environment.
    #[must_use]
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.lookup = Arc::new(lookup);
        self
    }

    fn enabled(&self) -> bool {
        (self.lookup)(DEBUG_HTTP_TRAFFIC).as_deref() == Some("true")
    }

    fn emit(&self, dump: &[u8]) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = out.write_all(dump).and_then(|()| out.flush()) {
            trace!(cause = %e, "failed to write traffic dump");
        }
    }
}

#[async_trait]
impl<H: Handler> Handler for DebugTraffic<H> {
    async fn serve(&self, req: Request, w: &mut dyn ResponseWriter) {
        if !self.enabled() {
            self.handler.serve(req, w).await;
            return;
        }

        let mut dump = dump_request(&req);
        let mut recorder = Recorder::new();
        self.handler.serve(req, &mut recorder).await;

        let status = recorder.status();
        let headers = recorder.sent_headers();
        let _ = write!(dump, "HTTP/1.1 {}\r\n", status.as_u16());
        dump_headers(&mut dump, headers);
        dump.extend_from_slice(b"\r\n");
        if headers.contains_key(header::CONTENT_ENCODING) {
            dump.extend_from_slice(BINARY_OMITTED);
        } else {
            dump.extend_from_slice(recorder.body());
        }

        for name in headers.keys() {
            w.headers_mut().remove(name);
        }
        for (name, value) in headers {
            w.headers_mut().append(name, value.clone());
        }
        w.write_header(status);
        if let Err(e) = write_all(w, recorder.body()) {
            trace!(cause = %e, "failed to replay recorded body");
        }

        self.emit(&dump);
    }
}

fn dump_request(req: &Request) -> Vec<u8> {
    let mut dump = Vec::with_capacity(256 + req.body().len());
    let _ = write!(dump, "{} {} {:?}\r\n", req.method(), req.request_uri(), req.version());
    if !req.headers().contains_key(header::HOST)
        && let Some(host) = req.host()
    {
        let _ = write!(dump, "Host: {host}\r\n");
    }
    dump_headers(&mut dump, req.headers());
    dump.extend_from_slice(b"\r\n");
    dump.extend_from_slice(req.body());
    if !req.body().is_empty() {
        dump.extend_from_slice(b"\r\n");
    }
    dump
}

fn dump_headers(dump: &mut Vec<u8>, headers: &HeaderMap) {
    for (name, value) in headers {
        dump.extend_from_slice(name.as_str().as_bytes());
        dump.extend_from_slice(b": ");
        dump.extend_from_slice(value.as_bytes());
        dump.extend_from_slice(b"\r\n");
    }
}
