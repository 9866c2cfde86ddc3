//! Per-request context bag.
//!
//! A [`Context`] travels with every [`Request`](crate::Request) and carries the values the
//! middlewares publish for the layers inside them:
//! - the request id set by [`request_id`](crate::middleware::request_id)
//! - the wall-clock and monotonic start recorded by [`duration`](crate::middleware::duration)
//! - the deadline and cancellation token published by [`with_timeout`](crate::middleware::with_timeout)
//! - the extra access-log fields collected by [`with_logger`](crate::log::with_logger)
//!
//! The bag is never mutated in place. Every `with_*` method consumes the current bag and returns
//! a derived one, so a clone held by an outer layer keeps seeing the values it was built with.

use std::fmt;
use std::future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct Context {
    request_id: Option<Uuid>,
    start: Option<Start>,
    deadline: Option<Deadline>,
    log_fields: Option<LogFields>,
}

#[derive(Debug, Clone, Copy)]
struct Start {
    wall: SystemTime,
    mono: Instant,
}

/// The absolute deadline of a request and the token that is cancelled when it passes.
#[derive(Debug, Clone)]
pub struct Deadline {
    at: Instant,
    token: CancellationToken,
}

impl Deadline {
    pub(crate) fn new(at: Instant, token: CancellationToken) -> Self {
        Self { at, token }
    }

    pub fn at(&self) -> Instant {
        self.at
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `id` as the request id. Calling it twice keeps the last id.
    #[must_use]
    pub fn with_request_id(mut self, id: Uuid) -> Self {
        self.request_id = Some(id);
        self
    }

    /// Returns the request id, if one was bound.
    pub fn request_id(&self) -> Option<Uuid> {
        self.request_id
    }

    /// Records the start of the request. `mono` is used for every duration computation, `wall`
    /// only for display.
    #[must_use]
    pub fn with_start(mut self, wall: SystemTime, mono: Instant) -> Self {
        self.start = Some(Start { wall, mono });
        self
    }

    /// Wall-clock time the duration middleware started handling the request.
    pub fn start_time(&self) -> Option<SystemTime> {
        self.start.map(|start| start.wall)
    }

    /// Time elapsed since the recorded start, or zero if no start was recorded.
    pub fn elapsed(&self) -> Duration {
        match self.start {
            Some(start) => start.mono.elapsed(),
            None => Duration::ZERO,
        }
    }

    #[must_use]
    pub(crate) fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn deadline(&self) -> Option<&Deadline> {
        self.deadline.as_ref()
    }

    /// Returns true once the deadline passed or the owning middleware released it.
    pub fn is_cancelled(&self) -> bool {
        self.deadline.as_ref().is_some_and(|deadline| deadline.token.is_cancelled())
    }

    /// Resolves when the request's cancellation token fires. Never resolves without a deadline.
    pub async fn cancelled(&self) {
        match &self.deadline {
            Some(deadline) => deadline.token.cancelled().await,
            None => future::pending().await,
        }
    }

    #[must_use]
    pub(crate) fn with_log_fields(mut self, fields: LogFields) -> Self {
        self.log_fields = Some(fields);
        self
    }

    /// Appends a key/value pair to the access-log record of this request.
    ///
    /// Returns false when no access logger wraps the request, in which case the pair is dropped.
    pub fn add_log_field(&self, key: impl Into<String>, value: impl fmt::Display) -> bool {
        match &self.log_fields {
            Some(fields) => {
                fields.push(key.into(), value.to_string());
                true
            }
            None => false,
        }
    }
}

/// Accumulator shared between the access logger and the handlers it wraps.
#[derive(Debug, Clone, Default)]
pub(crate) struct LogFields {
    inner: Arc<Mutex<Vec<(String, String)>>>,
}

impl LogFields {
    fn push(&self, key: String, value: String) {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).push((key, value));
    }

    pub(crate) fn take(&self) -> Vec<(String, String)> {
        std::mem::take(&mut *self.inner.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_round_trip() {
        let ctx = Context::new();
        assert_eq!(ctx.request_id(), None);

        let id = Uuid::new_v4();
        let ctx = ctx.with_request_id(id);
        assert_eq!(ctx.request_id(), Some(id));
        assert_eq!(ctx.request_id().unwrap().to_string(), id.to_string());
    }

    #[test]
    fn last_request_id_wins() {
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let ctx = Context::new().with_request_id(first).with_request_id(second);
        assert_eq!(ctx.request_id(), Some(second));
    }

    #[test]
    fn derived_bag_leaves_original_untouched() {
        let base = Context::new();
        let derived = base.clone().with_request_id(Uuid::new_v4());
        assert!(base.request_id().is_none());
        assert!(derived.request_id().is_some());
    }

    #[test]
    fn elapsed_is_zero_without_start() {
        assert_eq!(Context::new().elapsed(), Duration::ZERO);
        assert!(Context::new().start_time().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_uses_monotonic_start() {
        let wall = SystemTime::now();
        let ctx = Context::new().with_start(wall, Instant::now());
        tokio::time::advance(Duration::from_millis(3)).await;
        assert_eq!(ctx.elapsed(), Duration::from_millis(3));
        assert_eq!(ctx.start_time(), Some(wall));
    }

    #[test]
    fn log_fields_need_a_logger() {
        let ctx = Context::new();
        assert!(!ctx.add_log_field("user_id", 42));

        let fields = LogFields::default();
        let ctx = ctx.with_log_fields(fields.clone());
        assert!(ctx.add_log_field("user_id", 42));
        assert_eq!(fields.take(), vec![("user_id".to_string(), "42".to_string())]);
        assert!(fields.take().is_empty());
    }

    #[test]
    fn no_deadline_is_never_cancelled() {
        let ctx = Context::new();
        assert!(ctx.deadline().is_none());
        assert!(!ctx.is_cancelled());
    }
}
