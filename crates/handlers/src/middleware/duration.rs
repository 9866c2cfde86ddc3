use crate::handler::Handler;
use crate::request::Request;
use crate::writer::{Capabilities, HeaderState, ResponseWriter, forward_capabilities, probe_capabilities};
use async_trait::async_trait;
use http::{HeaderMap, HeaderName, StatusCode};
use std::fmt::Write;
use std::io;
use std::time::{Duration as StdDuration, SystemTime};
use tokio::time::Instant;
use tracing::debug;

pub const X_REQUEST_DURATION: &str = "x-request-duration";

const GRANULARITY_NANOS: u128 = 100_000;

/// Records the start of the request in the [`Context`](crate::Context) and sets
/// `X-Request-Duration` to the time spent until the response was committed.
///
/// Put it outermost to capture the whole chain.
#[derive(Debug)]
pub struct Duration<H> {
    handler: H,
}

pub fn duration<H: Handler>(handler: H) -> Duration<H> {
    Duration { handler }
}

#[async_trait]
impl<H: Handler> Handler for Duration<H> {
    async fn serve(&self, req: Request, w: &mut dyn ResponseWriter) {
        let start = Instant::now();
        let req = req.map_context(|ctx| ctx.with_start(SystemTime::now(), start));

        let mut writer = DurationWriter::new(w, start);
        self.handler.serve(req, &mut writer).await;
    }
}

struct DurationWriter<'a> {
    inner: &'a mut dyn ResponseWriter,
    start: Instant,
    state: HeaderState,
    capabilities: Capabilities,
}

impl<'a> DurationWriter<'a> {
    fn new(inner: &'a mut dyn ResponseWriter, start: Instant) -> Self {
        let capabilities = Capabilities::probe(inner);
        Self { inner, start, state: HeaderState::default(), capabilities }
    }

    fn commit(&mut self) {
        if !self.state.commit() {
            return;
        }

        let elapsed = format_duration(truncate(self.start.elapsed()));
        match elapsed.parse() {
            Ok(value) => {
                self.inner.headers_mut().insert(HeaderName::from_static(X_REQUEST_DURATION), value);
            }
            Err(e) => debug!(%elapsed, cause = %e, "skipping request duration header"),
        }
    }
}

/// Sets the header if nothing was written, however the handler ended.
impl Drop for DurationWriter<'_> {
    fn drop(&mut self) {
        self.commit();
    }
}

impl ResponseWriter for DurationWriter<'_> {
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

forward_capabilities!(DurationWriter, on_flush: commit);

/// Rounds `d` down to a multiple of 100µs.
fn truncate(d: StdDuration) -> StdDuration {
    let nanos = d.as_nanos();
    let truncated = nanos - nanos % GRANULARITY_NANOS;
    StdDuration::from_nanos(u64::try_from(truncated).unwrap_or(u64::MAX))
}

/// Renders `d` the way Go's `time.Duration` prints itself: `0s`, `250ns`, `1.5us`, `1.2ms`,
/// `3.05s`, `1m2.5s`, `2h0m0s`.
///
/// Microseconds are written `us` so the value stays a plain ascii header value.
pub fn format_duration(d: StdDuration) -> String {
    let nanos = d.as_nanos();
    match nanos {
        0 => "0s".to_string(),
        1..1_000 => format!("{nanos}ns"),
        1_000..1_000_000 => with_fraction(nanos, 1_000, "us"),
        1_000_000..1_000_000_000 => with_fraction(nanos, 1_000_000, "ms"),
        _ => {
            let secs = d.as_secs();
            let (hours, minutes, seconds) = (secs / 3600, secs / 60 % 60, secs % 60);

            let mut out = String::new();
            if hours > 0 {
                let _ = write!(out, "{hours}h");
            }
            if hours > 0 || minutes > 0 {
                let _ = write!(out, "{minutes}m");
            }
            out.push_str(&with_fraction(
                u128::from(seconds) * 1_000_000_000 + u128::from(d.subsec_nanos()),
                1_000_000_000,
                "s",
            ));
            out
        }
    }
}

fn with_fraction(value: u128, unit: u128, suffix: &str) -> String {
    let whole = value / unit;
    let fraction = value % unit;
    if fraction == 0 {
        return format!("{whole}{suffix}");
    }

    let width = unit.ilog10() as usize;
    let digits = format!("{fraction:0width$}");
    format!("{whole}.{}{suffix}", digits.trim_end_matches('0'))
}
