//! A small regex router.
//!
//! Routes are tried in registration order and the first one whose pattern matches the request
//! path and accepts its method wins. There is no longest-match preference, so overlapping
//! patterns must be registered most specific first.
//!
//! - `HEAD` is accepted wherever `GET` is.
//! - `OPTIONS` is answered by the router itself with an `Allow` header, unless a route declares
//!   `OPTIONS` explicitly.
//! - a path that matched with the wrong method is a `405`, no match at all is a `404`.
//!
//! ```
//! use micro_handlers::{Methods, Router, handler_fn};
//! use micro_handlers::writer::write_all;
//! use regex::Regex;
//!
//! let router = Router::new()
//!     .route(
//!         Regex::new("^/v1/users$").unwrap(),
//!         ["GET", "POST"],
//!         handler_fn(|_req, w| {
//!             Box::pin(async move {
//!                 let _ = write_all(w, b"[]");
//!             })
//!         }),
//!     )
//!     .route(
//!         Regex::new("^/health$").unwrap(),
//!         Methods::Any,
//!         handler_fn(|_req, w| {
//!             Box::pin(async move {
//!                 let _ = write_all(w, b"ok");
//!             })
//!         }),
//!     );
//! # let _ = router;
//! ```

use crate::error::Error;
use crate::handler::Handler;
use crate::problem;
use crate::request::Request;
use crate::writer::ResponseWriter;
use async_trait::async_trait;
use http::{HeaderValue, Method, StatusCode, header};
use regex::Regex;
use std::fmt;
use tracing::trace;

/// Verbs listed in `Allow` when no route narrows them down.
const DEFAULT_ALLOW: &str = "GET, POST, PUT, PATCH, DELETE, CONNECT, TRACE, OPTIONS";

/// The methods a route accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Methods {
    /// Every method but `OPTIONS`.
    Any,
    /// Only these, compared case-insensitively. `GET` also admits `HEAD`.
    Only(Vec<String>),
}

impl Methods {
    fn admits(&self, method: &str) -> bool {
        match self {
            Methods::Any => method != Method::OPTIONS.as_str(),
            Methods::Only(methods) => methods.iter().any(|m| {
                m.eq_ignore_ascii_case(method)
                    || (method == Method::HEAD.as_str() && m.eq_ignore_ascii_case(Method::GET.as_str()))
            }),
        }
    }
}

impl<S: Into<String>> From<Vec<S>> for Methods {
    fn from(methods: Vec<S>) -> Self {
        Methods::Only(methods.into_iter().map(Into::into).collect())
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for Methods {
    fn from(methods: [S; N]) -> Self {
        Methods::Only(methods.into_iter().map(Into::into).collect())
    }
}

impl From<Method> for Methods {
    fn from(method: Method) -> Self {
        Methods::Only(vec![method.as_str().to_string()])
    }
}

struct Route {
    pattern: Regex,
    methods: Methods,
    handler: Box<dyn Handler>,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route").field("pattern", &self.pattern.as_str()).field("methods", &self.methods).finish()
    }
}

/// Dispatches requests to the first matching route. Read-only once serving.
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a route.
    pub fn handle<H>(&mut self, pattern: Regex, methods: impl Into<Methods>, handler: H) -> &mut Self
    where
        H: Handler + 'static,
    {
        self.routes.push(Route { pattern, methods: methods.into(), handler: Box::new(handler) });
        self
    }

    /// Builder form of [`handle`](Router::handle).
    #[must_use]
    pub fn route<H>(mut self, pattern: Regex, methods: impl Into<Methods>, handler: H) -> Self
    where
        H: Handler + 'static,
    {
        self.handle(pattern, methods, handler);
        self
    }

    /// Compiles `pattern` and appends a route.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] if `pattern` is not a valid regex.
    pub fn handle_str<H>(&mut self, pattern: &str, methods: impl Into<Methods>, handler: H) -> Result<&mut Self, Error>
    where
        H: Handler + 'static,
    {
        let pattern = Regex::new(pattern)?;
        Ok(self.handle(pattern, methods, handler))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[async_trait]
impl Handler for Router {
    async fn serve(&self, req: Request, w: &mut dyn ResponseWriter) {
        let method = req.method().as_str().to_ascii_uppercase();
        let is_options = method == Method::OPTIONS.as_str();
        let mut path_matched = false;
        let mut allowed: Vec<String> = Vec::new();

        for route in &self.routes {
            if !route.pattern.is_match(req.path()) {
                continue;
            }
            path_matched = true;

            if route.methods.admits(&method) {
                trace!(pattern = route.pattern.as_str(), %method, "dispatching");
                route.handler.serve(req, w).await;
                return;
            }

            if is_options && let Methods::Only(methods) = &route.methods {
                allowed.extend(methods.iter().cloned());
            }
        }

        if is_options {
            // `Any` routes add nothing, the default set only shows when no route narrowed it
            let allow = if allowed.is_empty() {
                DEFAULT_ALLOW.to_string()
            } else {
                allowed.push(Method::OPTIONS.as_str().to_string());
                allowed.join(", ")
            };
            if let Ok(allow) = HeaderValue::from_str(&allow) {
                w.headers_mut().insert(header::ALLOW, allow);
            }
            w.write_header(StatusCode::OK);
            return;
        }

        if path_matched {
            trace!(path = req.path(), %method, "method not allowed");
            problem::method_not_allowed(w, &req);
        } else {
            problem::not_found(w, &req);
        }
    }
}
