//! Response compression.
//!
//! [`compress`] negotiates `gzip` or `deflate` from `Accept-Encoding` and streams the response
//! body through a flate2 encoder. The encoder writes into an in-memory [`Writer`] that is drained
//! into the wrapped response writer after every write, so nothing is buffered beyond what the
//! compressor itself holds back.
//!
//! The implementation is inspired by the actix-http crate's encoding functionality.

use crate::request::Request;
use bytes::{Bytes, BytesMut};
use http::{HeaderValue, header};
use std::io;

mod encoder;

pub use encoder::{Compress, compress};

/// The content codings this crate can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentCoding {
    Gzip,
    /// zlib wrapped deflate, which is what `Content-Encoding: deflate` means on the wire.
    Deflate,
}

impl ContentCoding {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentCoding::Gzip => "gzip",
            ContentCoding::Deflate => "deflate",
        }
    }

    fn header_value(self) -> HeaderValue {
        HeaderValue::from_static(self.as_str())
    }

    /// Picks the first of `gzip` and `deflate` listed in `accept_encoding`, skipping entries
    /// refused with `q=0`.
    pub fn negotiate(accept_encoding: &str) -> Option<Self> {
        accept_encoding.split(',').find_map(|entry| {
            let mut params = entry.split(';');
            let name = params.next()?.trim();
            let coding = if name.eq_ignore_ascii_case("gzip") {
                ContentCoding::Gzip
            } else if name.eq_ignore_ascii_case("deflate") {
                ContentCoding::Deflate
            } else {
                return None;
            };

            let refused = params.any(|param| {
                param
                    .trim()
                    .strip_prefix("q=")
                    .and_then(|q| q.trim().parse::<f32>().ok())
                    .is_some_and(|q| q <= 0.0)
            });
            if refused { None } else { Some(coding) }
        })
    }

    /// The coding to use for `req`, if any. Upgrade requests are never compressed.
    pub fn for_request(req: &Request) -> Option<Self> {
        if req.headers().contains_key(header::UPGRADE) {
            return None;
        }
        Self::negotiate(req.header(header::ACCEPT_ENCODING)?)
    }
}

// inspired by from actix-http
pub(crate) struct Writer {
    buf: BytesMut,
}

impl Writer {
    fn new() -> Self {
        Self { buf: BytesMut::with_capacity(4096) }
    }

    fn take(&mut self) -> Bytes {
        self.buf.split().freeze()
    }
}

impl io::Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
