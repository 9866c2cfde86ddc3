//! Composable async HTTP middlewares.
//!
//! Every middleware wraps a [`Handler`] into another [`Handler`] with the same calling convention,
//! so they stack in any order:
//!
//! - [`middleware`]: request id, duration, timeout, server name, JSON and STS headers, slash and
//!   protocol redirects, basic auth, traffic debugging, and [`middleware::all`]
//! - [`encoding`]: gzip/deflate response compression
//! - [`log`]: one access-log record per request
//! - [`problem`]: the JSON error bodies behind `401`, `403`, `404` and `405`
//! - [`Router`]: first-match-wins regex routing with `OPTIONS`, `405` and `404` handling
//!
//! Middlewares that need to see the response decorate the [`ResponseWriter`](writer::ResponseWriter)
//! they receive. Decorators keep exactly the optional capabilities (flush, hijack, push) of the
//! writer they wrap, see [`writer`].
//!
//! No server loop is included: feed [`Request`]s in and collect the response with a
//! [`Recorder`](writer::Recorder) or any other writer.

mod context;
mod error;
mod handler;
mod request;
mod router;

pub mod encoding;
pub mod log;
pub mod middleware;
pub mod problem;
pub mod wrapper;
pub mod writer;

pub use context::{Context, Deadline};
pub use error::Error;
pub use handler::{FnHandler, Handler, handler_fn};
pub use problem::Problem;
pub use request::Request;
pub use router::{Methods, Router};
