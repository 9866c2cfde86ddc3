//! The middlewares. Each one wraps a [`Handler`] into another handler adding one concern.

mod auth;
mod debug;
mod duration;
mod headers;
mod redirect;
mod request_id;
mod server;
mod timeout;

pub use auth::{BasicAuth, basic_auth};
pub use debug::{DEBUG_HTTP_TRAFFIC, DebugTraffic, debug};
pub use duration::{Duration, X_REQUEST_DURATION, duration, format_duration};
pub use headers::{Json, Sts, json, sts};
pub use redirect::{
    RedirectProto, TrailingSlashRedirect, X_FORWARDED_PROTO, clean_path, redirect, redirect_proto,
    trailing_slash_redirect,
};
pub use request_id::{IdGenerator, RequestId, UuidV4, X_REQUEST_ID, request_id, request_id_with};
pub use server::{Server, server};
pub use timeout::{Timeout, with_timeout};

use crate::handler::Handler;
use crate::log::log;
use crate::wrapper::{IdentityWrappers, Wrapper, wrapper_fn};

/// Wraps `handler` with the usual stack, outermost first: duration, access log, traffic debug,
/// request id, trailing slash redirect, json and server name.
pub fn all<H: Handler>(handler: H, server_name: &str) -> impl Handler {
    let name = server_name.to_string();
    IdentityWrappers::<H>::default()
        .and_then(wrapper_fn(move |h: H| server(h, &name)))
        .and_then(wrapper_fn(json))
        .and_then(wrapper_fn(trailing_slash_redirect))
        .and_then(wrapper_fn(request_id))
        .and_then(wrapper_fn(debug))
        .and_then(wrapper_fn(log))
        .and_then(wrapper_fn(duration))
        .wrap(handler)
}
