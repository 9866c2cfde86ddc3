//! Middlewares that set a fixed response header before delegating.

use crate::handler::Handler;
use crate::request::Request;
use crate::writer::ResponseWriter;
use async_trait::async_trait;
use http::{HeaderValue, header};

const JSON_UTF_8: &str = "application/json; charset=utf-8";
const ONE_YEAR_PRELOAD: &str = "max-age=31536000; preload";

/// Sets `Content-Type: application/json; charset=utf-8`.
#[derive(Debug)]
pub struct Json<H> {
    handler: H,
}

pub fn json<H: Handler>(handler: H) -> Json<H> {
    Json { handler }
}

#[async_trait]
impl<H: Handler> Handler for Json<H> {
    async fn serve(&self, req: Request, w: &mut dyn ResponseWriter) {
        w.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_static(JSON_UTF_8));
        self.handler.serve(req, w).await;
    }
}

/// Sets `Strict-Transport-Security` with a one year max-age and the preload flag.
#[derive(Debug)]
pub struct Sts<H> {
    handler: H,
}

pub fn sts<H: Handler>(handler: H) -> Sts<H> {
    Sts { handler }
}

#[async_trait]
impl<H: Handler> Handler for Sts<H> {
    async fn serve(&self, req: Request, w: &mut dyn ResponseWriter) {
        w.headers_mut().insert(header::STRICT_TRANSPORT_SECURITY, HeaderValue::from_static(ONE_YEAR_PRELOAD));
        self.handler.serve(req, w).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::test_util::request;
    use crate::writer::{Recorder, write_all};

    struct Plain;

    #[async_trait]
    impl Handler for Plain {
        async fn serve(&self, _req: Request, w: &mut dyn ResponseWriter) {
            write_all(w, b"{}").unwrap();
        }
    }

    struct Html;

    #[async_trait]
    impl Handler for Html {
        async fn serve(&self, _req: Request, w: &mut dyn ResponseWriter) {
            w.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
        }
    }

    #[tokio::test]
    async fn json_sets_the_content_type() {
        let mut recorder = Recorder::new();
        json(Plain).serve(request("GET", "/"), &mut recorder).await;

        assert_eq!(recorder.header(header::CONTENT_TYPE), Some(JSON_UTF_8));
        assert_eq!(recorder.body(), b"{}");
    }

    #[tokio::test]
    async fn inner_handler_may_override_json() {
        let mut recorder = Recorder::new();
        json(Html).serve(request("GET", "/"), &mut recorder).await;
        assert_eq!(recorder.header(header::CONTENT_TYPE), Some("text/html"));
    }

    #[tokio::test]
    async fn sts_sets_hsts() {
        let mut recorder = Recorder::new();
        sts(Plain).serve(request("GET", "/"), &mut recorder).await;
        assert_eq!(recorder.header(header::STRICT_TRANSPORT_SECURITY), Some("max-age=31536000; preload"));
    }
}
