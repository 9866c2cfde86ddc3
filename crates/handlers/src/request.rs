//! Inbound request type handed from one middleware to the next.
//!
//! A [`Request`] owns an [`http::Request`] with a fully buffered body, the transport-level peer
//! address, and the per-request [`Context`] bag.

use crate::context::Context;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use http::{HeaderMap, Method, Uri, Version, header};
use std::net::SocketAddr;

#[derive(Debug)]
pub struct Request {
    inner: http::Request<Bytes>,
    remote_addr: Option<SocketAddr>,
    context: Context,
}

impl Request {
    pub fn new(inner: http::Request<Bytes>) -> Self {
        Self { inner, remote_addr: None, context: Context::new() }
    }

    /// Sets the transport-level peer address.
    #[must_use]
    pub fn with_remote_addr(mut self, remote_addr: SocketAddr) -> Self {
        self.remote_addr = Some(remote_addr);
        self
    }

    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    /// The path component of the request uri.
    pub fn path(&self) -> &str {
        self.inner.uri().path()
    }

    pub fn query(&self) -> Option<&str> {
        self.inner.uri().query()
    }

    /// Path and query, as sent on the request line.
    pub fn request_uri(&self) -> &str {
        self.inner.uri().path_and_query().map_or("/", |pq| pq.as_str())
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    /// Returns the first value of `name` if it is present and valid visible ascii.
    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.inner.headers().get(name).and_then(|value| value.to_str().ok())
    }

    pub fn body(&self) -> &Bytes {
        self.inner.body()
    }

    /// The `Host` header, falling back to the authority of an absolute request uri.
    pub fn host(&self) -> Option<&str> {
        self.header(header::HOST).or_else(|| self.inner.uri().authority().map(|authority| authority.as_str()))
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.header(header::USER_AGENT)
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Replaces the context bag.
    #[must_use]
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// Derives a new context bag from the current one.
    #[must_use]
    pub fn map_context<F>(mut self, f: F) -> Self
    where
        F: FnOnce(Context) -> Context,
    {
        self.context = f(std::mem::take(&mut self.context));
        self
    }

    /// Parses `Authorization: Basic <base64(user:password)>`.
    ///
    /// Returns `None` when the header is missing, uses another scheme, or is not valid base64
    /// of a utf-8 `user:password` pair.
    pub fn basic_auth(&self) -> Option<(String, String)> {
        let value = self.header(header::AUTHORIZATION)?;
        let (scheme, encoded) = value.split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }

        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (user, password) = decoded.split_once(':')?;
        Some((user.to_string(), password.to_string()))
    }

    pub fn into_inner(self) -> http::Request<Bytes> {
        self.inner
    }
}

impl From<http::Request<Bytes>> for Request {
    fn from(inner: http::Request<Bytes>) -> Self {
        Self::new(inner)
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::Request;
    use bytes::Bytes;

    pub(crate) fn request(method: &str, uri: &str) -> Request {
        Request::new(http::Request::builder().method(method).uri(uri).body(Bytes::new()).unwrap())
    }

    pub(crate) fn request_with_headers(method: &str, uri: &str, headers: &[(&str, &str)]) -> Request {
        let mut builder = http::Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        Request::new(builder.body(Bytes::new()).unwrap())
    }
}
