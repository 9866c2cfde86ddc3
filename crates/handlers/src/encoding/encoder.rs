use crate::encoding::{ContentCoding, Writer};
use crate::error::Error;
use crate::handler::Handler;
use crate::request::Request;
use crate::writer::{
    Capabilities, Flusher, HeaderState, Hijacker, PushOptions, Pusher, ResponseWriter, Upgraded, write_all,
};
use async_trait::async_trait;
use bytes::Bytes;
use flate2::Compression;
use flate2::write::{GzEncoder, ZlibEncoder};
use http::{HeaderMap, HeaderValue, StatusCode, header};
use std::io;
use std::io::Write;
use tracing::{debug, trace};
// adapted from actix-http: https://github.com/actix/actix-web/blob/master/actix-http/src/encoding/encoder.rs

/// Represents different types of content encoding.
enum Encoder {
    /// Gzip encoding.
    Gzip(GzEncoder<Writer>),
    /// Deflate encoding.
    Deflate(ZlibEncoder<Writer>),
}

impl Encoder {
    fn new(coding: ContentCoding) -> Self {
        match coding {
            ContentCoding::Gzip => Self::Gzip(GzEncoder::new(Writer::new(), Compression::default())),
            ContentCoding::Deflate => Self::Deflate(ZlibEncoder::new(Writer::new(), Compression::default())),
        }
    }

    /// Writes data to the encoder.
    fn write(&mut self, data: &[u8]) -> Result<(), io::Error> {
        let result = match self {
            Self::Gzip(encoder) => encoder.write_all(data),
            Self::Deflate(encoder) => encoder.write_all(data),
        };
        if let Err(err) = &result {
            trace!("Error encoding {}: {}", self.name(), err);
        }
        result
    }

    /// Emits everything written so far as a sync flush block.
    fn flush(&mut self) -> Result<(), io::Error> {
        match self {
            Self::Gzip(encoder) => encoder.flush(),
            Self::Deflate(encoder) => encoder.flush(),
        }
    }

    /// Takes the encoded data from the encoder.
    fn take(&mut self) -> Bytes {
        match self {
            Self::Gzip(encoder) => encoder.get_mut().take(),
            Self::Deflate(encoder) => encoder.get_mut().take(),
        }
    }

    /// Finishes the encoding process and returns the remaining encoded data.
    fn finish(self) -> Result<Bytes, io::Error> {
        match self {
            Self::Gzip(encoder) => encoder.finish().map(|mut writer| writer.take()),
            Self::Deflate(encoder) => encoder.finish().map(|mut writer| writer.take()),
        }
    }

    /// Returns the name of the encoding.
    fn name(&self) -> &'static str {
        match self {
            Encoder::Gzip(_) => ContentCoding::Gzip.as_str(),
            Encoder::Deflate(_) => ContentCoding::Deflate.as_str(),
        }
    }
}

/// Compresses response bodies with the coding negotiated from `Accept-Encoding`.
///
/// A response whose `Content-Encoding` is already set by the inner handler passes through
/// untouched, and so do bodiless statuses.
#[derive(Debug)]
pub struct Compress<H> {
    handler: H,
}

pub fn compress<H: Handler>(handler: H) -> Compress<H> {
    Compress { handler }
}

#[async_trait]
impl<H: Handler> Handler for Compress<H> {
    async fn serve(&self, req: Request, w: &mut dyn ResponseWriter) {
        let Some(coding) = ContentCoding::for_request(&req) else {
            self.handler.serve(req, w).await;
            return;
        };

        let mut writer = CompressWriter::new(w, coding);
        self.handler.serve(req, &mut writer).await;
        if let Err(e) = writer.finish() {
            debug!(cause = %e, "failed to finish compressed body");
        }
    }
}

struct CompressWriter<'a> {
    inner: &'a mut dyn ResponseWriter,
    coding: ContentCoding,
    // set once the response is committed with compression on
    encoder: Option<Encoder>,
    state: HeaderState,
    capabilities: Capabilities,
}

impl<'a> CompressWriter<'a> {
    fn new(inner: &'a mut dyn ResponseWriter, coding: ContentCoding) -> Self {
        let capabilities = Capabilities::probe(inner);
        Self { inner, coding, encoder: None, state: HeaderState::default(), capabilities }
    }

    fn commit(&mut self, status: StatusCode) {
        if !self.state.commit() {
            return;
        }

        // no body to compress
        if status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED || status.is_informational() {
            return;
        }

        let headers = self.inner.headers_mut();
        // response has already encoded
        if headers.contains_key(header::CONTENT_ENCODING) {
            return;
        }

        headers.remove(header::CONTENT_LENGTH);
        headers.insert(header::CONTENT_ENCODING, self.coding.header_value());
        headers.append(header::VARY, HeaderValue::from_static("accept-encoding"));
        self.encoder = Some(Encoder::new(self.coding));
    }

    fn drain(&mut self) -> io::Result<()> {
        let Some(encoder) = self.encoder.as_mut() else {
            return Ok(());
        };

        let bytes = encoder.take();
        if bytes.is_empty() {
            return Ok(());
        }
        write_all(&mut *self.inner, &bytes)
    }

    /// Writes the compressor's trailer. Nothing happens if the handler never wrote.
    fn finish(mut self) -> io::Result<()> {
        match self.encoder.take() {
            Some(encoder) => {
                let bytes = encoder.finish()?;
                write_all(&mut *self.inner, &bytes)
            }
            None => Ok(()),
        }
    }
}

impl ResponseWriter for CompressWriter<'_> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        self.commit(status);
        self.inner.write_header(status);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.commit(StatusCode::OK);
        match self.encoder.as_mut() {
            Some(encoder) => {
                encoder.write(buf)?;
                self.drain()?;
                Ok(buf.len())
            }
            None => self.inner.write(buf),
        }
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

impl Flusher for CompressWriter<'_> {
    fn flush(&mut self) -> io::Result<()> {
        self.commit(StatusCode::OK);
        if let Some(encoder) = self.encoder.as_mut() {
            encoder.flush()?;
            self.drain()?;
        }

        match self.inner.as_flusher() {
            Some(flusher) => flusher.flush(),
            None => Err(io::Error::new(io::ErrorKind::Unsupported, "flush is not supported")),
        }
    }
}

impl Hijacker for CompressWriter<'_> {
    fn hijack(&mut self) -> Result<Upgraded, Error> {
        crate::writer::hijack(&mut *self.inner)
    }
}

impl Pusher for CompressWriter<'_> {
    fn push(&mut self, target: &str, opts: &PushOptions) -> Result<(), Error> {
        crate::writer::push(&mut *self.inner, target, opts)
    }
}
