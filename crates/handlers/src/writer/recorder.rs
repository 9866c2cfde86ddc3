use crate::writer::{Flusher, ResponseWriter};
use bytes::{Bytes, BytesMut};
use http::{HeaderMap, Response, StatusCode, header};
use std::io;
use tracing::debug;

/// An in-memory [`ResponseWriter`].
///
/// The recorder keeps the header map as it was at commit time, the committed status and the
/// whole body. It is what the debug middleware runs handlers against, what the tests assert on,
/// and the bridge to servers that want a finished [`http::Response`]: run the handler chain
/// against a recorder, then hand [`Recorder::into_response`] to the transport.
#[derive(Debug, Default)]
pub struct Recorder {
    headers: HeaderMap,
    committed: Option<(StatusCode, HeaderMap)>,
    body: BytesMut,
    flushed: bool,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The committed status, `200 OK` if nothing was committed.
    pub fn status(&self) -> StatusCode {
        self.committed.as_ref().map_or(StatusCode::OK, |(status, _)| *status)
    }

    /// Returns true once a status was committed.
    pub fn is_committed(&self) -> bool {
        self.committed.is_some()
    }

    /// The headers a client would receive: the snapshot taken at commit, or the live map if the
    /// handler never committed.
    pub fn sent_headers(&self) -> &HeaderMap {
        self.committed.as_ref().map_or(&self.headers, |(_, headers)| headers)
    }

    /// The first value of `name` among the sent headers.
    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.sent_headers().get(name).and_then(|value| value.to_str().ok())
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    pub fn into_response(self) -> Response<Bytes> {
        let (status, headers) = match self.committed {
            Some(committed) => committed,
            None => (StatusCode::OK, self.headers),
        };

        let mut response = Response::new(self.body.freeze());
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }

    fn commit(&mut self, status: StatusCode) {
        if self.committed.is_none() {
            self.committed = Some((status, self.headers.clone()));
        }
    }
}

impl ResponseWriter for Recorder {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        if let Some((committed, _)) = &self.committed {
            debug!(committed = %committed, ignored = %status, "superfluous write_header call");
            return;
        }
        self.commit(status);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.commit(StatusCode::OK);
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn as_flusher(&mut self) -> Option<&mut dyn Flusher> {
        Some(self)
    }
}

impl Flusher for Recorder {
    fn flush(&mut self) -> io::Result<()> {
        self.commit(StatusCode::OK);
        self.flushed = true;
        Ok(())
    }
}

impl From<Recorder> for Response<Bytes> {
    fn from(recorder: Recorder) -> Self {
        recorder.into_response()
    }
}
