use crate::handler::Handler;
use crate::request::Request;
use crate::writer::ResponseWriter;
use async_trait::async_trait;
use http::HeaderValue;
use std::fmt;
use tracing::trace;
use uuid::Uuid;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Source of fresh request ids.
#[cfg_attr(test, mockall::automock)]
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> Uuid;
}

/// Random version 4 UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidV4;

impl IdGenerator for UuidV4 {
    fn generate(&self) -> Uuid {
        Uuid::new_v4()
    }
}

/// Makes sure every request carries an `X-Request-Id`.
///
/// A request without one (or with an empty one) gets a fresh id, set on the request headers, on
/// the response headers and in the [`Context`](crate::Context). An inbound id that parses as a
/// UUID is bound to the context and echoed on the response.
pub struct RequestId<H, G = UuidV4> {
    handler: H,
    generator: G,
}

impl<H: fmt::Debug, G> fmt::Debug for RequestId<H, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestId").field("handler", &self.handler).finish_non_exhaustive()
    }
}

pub fn request_id<H: Handler>(handler: H) -> RequestId<H> {
    RequestId { handler, generator: UuidV4 }
}

pub fn request_id_with<H: Handler, G: IdGenerator>(handler: H, generator: G) -> RequestId<H, G> {
    RequestId { handler, generator }
}

#[async_trait]
impl<H: Handler, G: IdGenerator> Handler for RequestId<H, G> {
    async fn serve(&self, mut req: Request, w: &mut dyn ResponseWriter) {
        let inbound = req.header(X_REQUEST_ID).filter(|id| !id.is_empty()).map(str::to_string);

        let req = match inbound {
            None => {
                let id = self.generator.generate();
                let value = header_value(id);
                req.headers_mut().insert(X_REQUEST_ID, value.clone());
                w.headers_mut().insert(X_REQUEST_ID, value);
                req.context().add_log_field(X_REQUEST_ID_FIELD, id);
                req.map_context(|ctx| ctx.with_request_id(id))
            }
            Some(inbound) => match Uuid::parse_str(&inbound) {
                Ok(id) => {
                    w.headers_mut().insert(X_REQUEST_ID, header_value(id));
                    req.map_context(|ctx| ctx.with_request_id(id))
                }
                Err(e) => {
                    trace!(id = %inbound, cause = %e, "inbound request id is not a uuid");
                    req
                }
            },
        };

        self.handler.serve(req, w).await;
    }
}

const X_REQUEST_ID_FIELD: &str = "request_id";

fn header_value(id: Uuid) -> HeaderValue {
    let mut buf = Uuid::encode_buffer();
    // a hyphenated uuid is always a valid header value
    HeaderValue::from_str(id.hyphenated().encode_lower(&mut buf)).unwrap_or_else(|_| HeaderValue::from_static(""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::test_util::{request, request_with_headers};
    use crate::writer::{Recorder, write_all};

    /// Echoes the id it sees in the context and on the request headers.
    struct Echo;

    #[async_trait]
    impl Handler for Echo {
        async fn serve(&self, req: Request, w: &mut dyn ResponseWriter) {
            let from_context = req.context().request_id().map(|id| id.to_string()).unwrap_or_default();
            let from_header = req.header(X_REQUEST_ID).unwrap_or_default().to_string();
            write_all(w, format!("{from_context}|{from_header}").as_bytes()).unwrap();
        }
    }

    fn fixed_id() -> Uuid {
        Uuid::parse_str("2c6d7f57-4b8f-4f0e-9c43-6e5a63d1c2a1").unwrap()
    }

    #[tokio::test]
    async fn generates_a_missing_id() {
        let mut generator = MockIdGenerator::new();
        generator.expect_generate().times(1).returning(fixed_id);

        let mut recorder = Recorder::new();
        request_id_with(Echo, generator).serve(request("GET", "/"), &mut recorder).await;

        let id = fixed_id().to_string();
        assert_eq!(recorder.header(X_REQUEST_ID), Some(id.as_str()));
        assert_eq!(recorder.body(), format!("{id}|{id}").as_bytes());
    }

    #[tokio::test]
    async fn empty_header_counts_as_missing() {
        let mut generator = MockIdGenerator::new();
        generator.expect_generate().times(1).returning(fixed_id);

        let mut recorder = Recorder::new();
        let req = request_with_headers("GET", "/", &[("x-request-id", "")]);
        request_id_with(Echo, generator).serve(req, &mut recorder).await;

        assert_eq!(recorder.header(X_REQUEST_ID), Some(fixed_id().to_string().as_str()));
    }

    #[tokio::test]
    async fn propagates_an_inbound_id() {
        let mut generator = MockIdGenerator::new();
        generator.expect_generate().never();

        let id = fixed_id().to_string();
        let mut recorder = Recorder::new();
        let req = request_with_headers("GET", "/", &[("x-request-id", id.as_str())]);
        request_id_with(Echo, generator).serve(req, &mut recorder).await;

        assert_eq!(recorder.header(X_REQUEST_ID), Some(id.as_str()));
        assert_eq!(recorder.body(), format!("{id}|{id}").as_bytes());
    }

    #[tokio::test]
    async fn keeps_an_opaque_inbound_id_on_the_request_only() {
        let mut recorder = Recorder::new();
        let req = request_with_headers("GET", "/", &[("x-request-id", "abc-123")]);
        request_id(Echo).serve(req, &mut recorder).await;

        assert_eq!(recorder.header(X_REQUEST_ID), None);
        assert_eq!(recorder.body(), b"|abc-123");
    }

    #[tokio::test]
    async fn default_generator_yields_v4() {
        let mut recorder = Recorder::new();
        request_id(Echo).serve(request("GET", "/"), &mut recorder).await;

        let id = Uuid::parse_str(recorder.header(X_REQUEST_ID).unwrap()).unwrap();
        assert_eq!(id.get_version_num(), 4);
    }
}
