use bytes::Bytes;
use micro_handlers::encoding::compress;
use micro_handlers::middleware::{all, basic_auth, with_timeout};
use micro_handlers::writer::{Recorder, ResponseWriter, write_all};
use micro_handlers::{Handler, Methods, Request, Router, handler_fn};
use regex::Regex;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

struct Users;

#[async_trait::async_trait]
impl Handler for Users {
    async fn serve(&self, req: Request, w: &mut dyn ResponseWriter) {
        req.context().add_log_field("users", 2);
        let _ = write_all(w, b"[{\"name\":\"alice\"},{\"name\":\"bob\"}]\n");
    }
}

fn router() -> Router {
    let health = handler_fn(|_req, w| {
        Box::pin(async move {
            let _ = write_all(w, b"{\"status\":\"ok\"}\n");
        })
    });

    Router::new()
        .route(Regex::new("^/v1/users$").unwrap(), ["GET", "POST"], basic_auth(Users, "users", [("alice", "secret")]))
        .route(Regex::new("^/health$").unwrap(), Methods::Any, health)
}

async fn send<H: Handler>(handler: &H, method: &str, uri: &str, headers: &[(&str, &str)]) {
    let mut builder = http::Request::builder().method(method).uri(uri).header("host", "localhost:8080");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let req = Request::new(builder.body(Bytes::new()).unwrap());

    let mut recorder = Recorder::new();
    handler.serve(req, &mut recorder).await;

    let response = recorder.into_response();
    println!("{method} {uri} -> {}", response.status());
    for (name, value) in response.headers() {
        println!("  {name}: {value:?}");
    }
    println!("  body: {} bytes\n", response.body().len());
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let handler = all(compress(with_timeout(router(), Duration::from_secs(5))), "micro-handlers");

    // alice:secret
    let alice = ("authorization", "Basic YWxpY2U6c2VjcmV0");

    send(&handler, "GET", "/health", &[]).await;
    send(&handler, "GET", "/v1/users", &[alice, ("accept-encoding", "gzip")]).await;
    send(&handler, "GET", "/v1/users", &[]).await;
    send(&handler, "DELETE", "/v1/users", &[alice]).await;
    send(&handler, "OPTIONS", "/v1/users", &[]).await;
    send(&handler, "GET", "/v1/users/", &[]).await;
    send(&handler, "GET", "/missing", &[]).await;
}
