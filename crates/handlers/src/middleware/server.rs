use crate::handler::Handler;
use crate::request::Request;
use crate::writer::{
    Capabilities, HeaderState, ResponseWriter, forward_capabilities, header_value, probe_capabilities,
};
use async_trait::async_trait;
use http::{HeaderMap, HeaderValue, StatusCode, header};
use std::io;

/// Sets `Server: <name>` on every response, replacing whatever the inner handler set.
#[derive(Debug)]
pub struct Server<H> {
    handler: H,
    name: Option<HeaderValue>,
}

pub fn server<H: Handler>(handler: H, name: &str) -> Server<H> {
    Server { handler, name: header_value(name) }
}

#[async_trait]
impl<H: Handler> Handler for Server<H> {
    async fn serve(&self, req: Request, w: &mut dyn ResponseWriter) {
        let mut writer = ServerWriter::new(w, self.name.as_ref());
        self.handler.serve(req, &mut writer).await;
    }
}

struct ServerWriter<'a> {
    inner: &'a mut dyn ResponseWriter,
    name: Option<&'a HeaderValue>,
    state: HeaderState,
    capabilities: Capabilities,
}

impl<'a> ServerWriter<'a> {
    fn new(inner: &'a mut dyn ResponseWriter, name: Option<&'a HeaderValue>) -> Self {
        let capabilities = Capabilities::probe(inner);
        Self { inner, name, state: HeaderState::default(), capabilities }
    }

    fn commit(&mut self) {
        if self.state.commit()
            && let Some(name) = self.name
        {
            self.inner.headers_mut().insert(header::SERVER, name.clone());
        }
    }
}

/// Sets the header if the handler wrote nothing, also when it panicked or was dropped.
impl Drop for ServerWriter<'_> {
    fn drop(&mut self) {
        self.commit();
    }
}

impl ResponseWriter for ServerWriter<'_> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        self.commit();
        self.inner.write_header(status);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.commit();
        self.inner.write(buf)
    }

    probe_capabilities!();
}

forward_capabilities!(ServerWriter, on_flush: commit);
