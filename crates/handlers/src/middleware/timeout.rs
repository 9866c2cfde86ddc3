use crate::context::Deadline;
use crate::error::Error;
use crate::handler::Handler;
use crate::request::Request;
use crate::writer::ResponseWriter;
use async_trait::async_trait;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

// what tokio uses for "never"
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Publishes a deadline `timeout` from now in the request [`Context`](crate::Context).
///
/// The inner handler is never interrupted. It observes the deadline through
/// [`Context::deadline`](crate::Context::deadline), [`Context::is_cancelled`](crate::Context::is_cancelled)
/// or [`Context::cancelled`](crate::Context::cancelled). A shorter deadline set by an outer layer
/// wins, and cancelling the outer token cancels this one too.
///
/// The timer is polled alongside the inner handler and needs the tokio time driver. Outside a
/// tokio runtime the deadline is still published but the token is only cancelled once the
/// request ends.
#[derive(Debug)]
pub struct Timeout<H> {
    handler: H,
    timeout: Duration,
}

pub fn with_timeout<H: Handler>(handler: H, timeout: Duration) -> Timeout<H> {
    Timeout { handler, timeout }
}

impl<H: Handler> Timeout<H> {
    /// Builds the middleware from a timeout in seconds, rejecting negative, NaN and overflowing
    /// values.
    pub fn try_from_secs_f64(handler: H, secs: f64) -> Result<Self, Error> {
        let timeout = Duration::try_from_secs_f64(secs).map_err(Error::invalid_timeout)?;
        Ok(Self { handler, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl<H: Handler> Handler for Timeout<H> {
    async fn serve(&self, req: Request, w: &mut dyn ResponseWriter) {
        let now = Instant::now();
        let own = now.checked_add(self.timeout).unwrap_or(now + FAR_FUTURE);

        let (at, token) = match req.context().deadline() {
            Some(parent) => (own.min(parent.at()), parent.token().child_token()),
            None => (own, CancellationToken::new()),
        };

        let _guard = DeadlineGuard { token: token.clone() };
        let req = req.map_context(|ctx| ctx.with_deadline(Deadline::new(at, token.clone())));
        let mut serve = self.handler.serve(req, w);

        if Handle::try_current().is_err() {
            trace!("no tokio runtime, deadline is not timed");
            serve.await;
            return;
        }

        let timer = tokio::time::sleep_until(at);
        tokio::pin!(timer);
        tokio::select! {
            biased;
            () = &mut serve => return,
            () = &mut timer => {
                trace!("request deadline passed");
                token.cancel();
            }
        }
        // the handler is never interrupted, only told
        serve.await;
    }
}

/// Cancels the token however the request ends.
struct DeadlineGuard {
    token: CancellationToken,
}

impl Drop for DeadlineGuard {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
