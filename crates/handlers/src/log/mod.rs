//! Access logging.
//!
//! [`with_logger`] emits one [`Record`] per request once the inner handler returned. The base
//! fields come first, in this order:
//!
//! `method path time bytes status remote_addr host user_agent [user] [request_id]`
//!
//! followed by the fields inner handlers appended with
//! [`Context::add_log_field`](crate::Context::add_log_field). An appended field never replaces a
//! base field.

mod sink;
mod writer;

pub use sink::{LogSink, LogfmtSink, Record, TracingSink};

use crate::context::LogFields;
use crate::handler::Handler;
use crate::middleware::X_REQUEST_ID;
use crate::request::Request;
use crate::writer::ResponseWriter;
use async_trait::async_trait;
use http::StatusCode;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;
use writer::LogWriter;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

#[derive(Debug)]
pub struct Logger<H, S> {
    handler: H,
    sink: S,
}

/// Logs every request through `sink`. Sink errors are ignored.
pub fn with_logger<H: Handler, S: LogSink>(handler: H, sink: S) -> Logger<H, S> {
    Logger { handler, sink }
}

/// Logs every request as a `tracing` event, see [`TracingSink`].
pub fn log<H: Handler>(handler: H) -> Logger<H, TracingSink> {
    with_logger(handler, TracingSink)
}

#[async_trait]
impl<H: Handler, S: LogSink> Handler for Logger<H, S> {
    async fn serve(&self, req: Request, w: &mut dyn ResponseWriter) {
        let start = Instant::now();
        let mut record = Record::new();
        let base = BaseFields::of(&req);

        let fields = LogFields::default();
        let req = req.map_context(|ctx| ctx.with_log_fields(fields.clone()));

        let mut writer = LogWriter::new(w);
        self.handler.serve(req, &mut writer).await;

        record.push("method", base.method);
        record.push("path", base.path);
        record.push("time", millis(start.elapsed()));
        record.push("bytes", writer.size());
        record.push("status", writer.status().unwrap_or(StatusCode::OK).as_u16());
        record.push("remote_addr", base.remote_addr);
        record.push("host", base.host);
        record.push("user_agent", base.user_agent);
        if let Some(user) = base.user {
            record.push("user", user);
        }
        if let Some(id) = base.request_id {
            record.push("request_id", id);
        }
        for (key, value) in fields.take() {
            if !record.push(key, value) {
                trace!("dropping log field colliding with an existing one");
            }
        }

        if let Err(e) = self.sink.record(&record) {
            trace!(cause = %e, "failed to write access log");
        }
    }
}

/// Request fields captured before the request moves into the handler.
struct BaseFields {
    method: String,
    path: String,
    remote_addr: String,
    host: String,
    user_agent: String,
    user: Option<String>,
    request_id: Option<String>,
}

impl BaseFields {
    fn of(req: &Request) -> Self {
        Self {
            method: req.method().to_string(),
            path: req.request_uri().to_string(),
            remote_addr: remote_addr(req),
            host: req.host().unwrap_or_default().to_string(),
            user_agent: req.user_agent().unwrap_or_default().to_string(),
            user: req.basic_auth().map(|(user, _)| user).filter(|user| !user.is_empty()),
            request_id: req.header(X_REQUEST_ID).filter(|id| !id.is_empty()).map(str::to_string),
        }
    }
}

/// The first `X-Forwarded-For` entry, else the peer address.
fn remote_addr(req: &Request) -> String {
    if let Some(forwarded) = req.header(X_FORWARDED_FOR).filter(|value| !value.is_empty()) {
        return forwarded.split(',').next().unwrap_or_default().trim().to_string();
    }
    req.remote_addr().map(|addr| addr.to_string()).unwrap_or_default()
}

/// Whole milliseconds, rounded to the nearest.
fn millis(elapsed: Duration) -> u128 {
    (elapsed.as_nanos() + 500_000) / 1_000_000
}

#[cfg(test)]
mod tests {
    use super::sink::MockLogSink;
    use super::*;
    use crate::request::test_util::{request, request_with_headers};
    use crate::writer::{Recorder, write_all};
    use mockall::predicate::function;
    use std::io;
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};

    struct Greeter {
        delay: Duration,
    }

    #[async_trait]
    impl Handler for Greeter {
        async fn serve(&self, req: Request, w: &mut dyn ResponseWriter) {
            tokio::time::advance(self.delay).await;
            req.context().add_log_field("user_id", 42);
            req.context().add_log_field("status", 500);
            w.write_header(StatusCode::CREATED);
            write_all(w, b"hello").unwrap();
        }
    }

    #[derive(Clone, Default)]
    struct Collect(Arc<Mutex<Vec<Record>>>);

    impl LogSink for Collect {
        fn record(&self, record: &Record) -> io::Result<()> {
            self.0.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    async fn serve<H: Handler>(handler: H, req: Request) -> Record {
        let sink = Collect::default();
        let mut recorder = Recorder::new();
        with_logger(handler, sink.clone()).serve(req, &mut recorder).await;

        let mut records = sink.0.lock().unwrap();
        assert_eq!(records.len(), 1);
        records.remove(0)
    }

    #[tokio::test(start_paused = true)]
    async fn logs_base_fields_in_order() {
        let req = request_with_headers(
            "POST",
            "/v1/things?dry=1",
            &[
                ("host", "example.com"),
                ("user-agent", "curl/8.0"),
                ("x-forwarded-for", " 10.0.0.1 , 10.0.0.2"),
                ("x-request-id", "abc"),
                // alice:secret
                ("authorization", "Basic YWxpY2U6c2VjcmV0"),
            ],
        );
        let record = serve(Greeter { delay: Duration::from_micros(2_600) }, req).await;

        assert_eq!(
            record.keys().collect::<Vec<_>>(),
            [
                "method",
                "path",
                "time",
                "bytes",
                "status",
                "remote_addr",
                "host",
                "user_agent",
                "user",
                "request_id",
                "user_id"
            ]
        );
        assert_eq!(record.get("method"), Some("POST"));
        assert_eq!(record.get("path"), Some("/v1/things?dry=1"));
        assert_eq!(record.get("time"), Some("3"));
        assert_eq!(record.get("bytes"), Some("5"));
        assert_eq!(record.get("status"), Some("201"));
        assert_eq!(record.get("remote_addr"), Some("10.0.0.1"));
        assert_eq!(record.get("host"), Some("example.com"));
        assert_eq!(record.get("user_agent"), Some("curl/8.0"));
        assert_eq!(record.get("user"), Some("alice"));
        assert_eq!(record.get("request_id"), Some("abc"));
        assert_eq!(record.get("user_id"), Some("42"));
    }

    struct Silent;

    #[async_trait]
    impl Handler for Silent {
        async fn serve(&self, _req: Request, _w: &mut dyn ResponseWriter) {}
    }

    #[tokio::test]
    async fn optional_fields_are_omitted() {
        let peer: SocketAddr = "192.0.2.7:4711".parse().unwrap();
        let req = request("GET", "/").with_remote_addr(peer);
        let record = serve(Silent, req).await;

        assert_eq!(record.get("status"), Some("200"));
        assert_eq!(record.get("bytes"), Some("0"));
        assert_eq!(record.get("remote_addr"), Some("192.0.2.7:4711"));
        assert_eq!(record.get("host"), Some(""));
        assert_eq!(record.get("user"), None);
        assert_eq!(record.get("request_id"), None);
        assert_eq!(record.len(), 8);
    }

    #[tokio::test]
    async fn sink_errors_are_swallowed() {
        let mut sink = MockLogSink::new();
        sink.expect_record()
            .with(function(|record: &Record| record.get("method") == Some("GET")))
            .times(1)
            .returning(|_| Err(io::Error::other("disk full")));

        let mut recorder = Recorder::new();
        with_logger(Silent, sink).serve(request("GET", "/"), &mut recorder).await;
        assert!(!recorder.is_committed());
    }

    #[test]
    fn millis_round_to_nearest() {
        assert_eq!(millis(Duration::from_micros(499)), 0);
        assert_eq!(millis(Duration::from_micros(500)), 1);
        assert_eq!(millis(Duration::from_micros(1_499)), 1);
        assert_eq!(millis(Duration::from_millis(250)), 250);
    }
}
