//! Composition of middlewares.
//!
//! A [`Wrapper`] turns one handler into another. [`Wrappers`] chains them, the first wrapper
//! added ends up innermost:
//!
//! ```
//! use micro_handlers::middleware::{json, server};
//! use micro_handlers::wrapper::{IdentityWrappers, Wrapper, wrapper_fn};
//! # use micro_handlers::{Handler, Request, writer::ResponseWriter};
//! # struct Hello;
//! # #[async_trait::async_trait]
//! # impl Handler for Hello {
//! #     async fn serve(&self, _req: Request, _w: &mut dyn ResponseWriter) {}
//! # }
//!
//! let wrappers = IdentityWrappers::<Hello>::default()
//!     .and_then(wrapper_fn(|h: Hello| server(h, "micro")))
//!     .and_then(wrapper_fn(json));
//!
//! // json(server(Hello, "micro"))
//! let handler = wrappers.wrap(Hello);
//! # let _ = handler;
//! ```

use std::fmt;
use std::marker::PhantomData;

/// Turns a handler into a middleware-wrapped handler.
pub trait Wrapper<H> {
    /// The wrapped handler.
    type Out;

    fn wrap(&self, handler: H) -> Self::Out;
}

/// Two wrappers applied in sequence: `inner` first, then `outer` around its result.
pub struct Wrappers<Inner, Outer, H> {
    inner: Inner,
    outer: Outer,
    _handler: PhantomData<fn(H)>,
}

impl<Inner: fmt::Debug, Outer: fmt::Debug, H> fmt::Debug for Wrappers<Inner, Outer, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wrappers").field("inner", &self.inner).field("outer", &self.outer).finish()
    }
}

/// The empty chain, a starting point for [`and_then`](Wrappers::and_then).
pub type IdentityWrappers<H> = Wrappers<IdentityWrapper, IdentityWrapper, H>;

impl<H> Default for IdentityWrappers<H> {
    fn default() -> Self {
        Self { inner: IdentityWrapper, outer: IdentityWrapper, _handler: PhantomData }
    }
}

/// Hands the handler back untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityWrapper;

impl<H> Wrapper<H> for IdentityWrapper {
    type Out = H;

    #[inline]
    fn wrap(&self, handler: H) -> Self::Out {
        handler
    }
}

impl<Inner, Outer, H> Wrappers<Inner, Outer, H>
where
    Inner: Wrapper<H>,
    Outer: Wrapper<Inner::Out>,
{
    /// Adds `middleware` around everything chained so far.
    pub fn and_then<M>(self, middleware: M) -> Wrappers<Self, M, H>
    where
        M: Wrapper<Outer::Out>,
    {
        Wrappers { inner: self, outer: middleware, _handler: PhantomData }
    }
}

impl<Inner, Outer, H> Wrapper<H> for Wrappers<Inner, Outer, H>
where
    Inner: Wrapper<H>,
    Outer: Wrapper<Inner::Out>,
{
    type Out = Outer::Out;

    fn wrap(&self, handler: H) -> Self::Out {
        self.outer.wrap(self.inner.wrap(handler))
    }
}

/// A [`Wrapper`] backed by a middleware constructor such as [`json`](crate::middleware::json).
#[derive(Clone, Copy)]
pub struct WrapperFn<F> {
    f: F,
}

impl<F> fmt::Debug for WrapperFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrapperFn").finish_non_exhaustive()
    }
}

pub fn wrapper_fn<In, Out, F>(f: F) -> WrapperFn<F>
where
    F: Fn(In) -> Out,
{
    WrapperFn { f }
}

impl<In, Out, F> Wrapper<In> for WrapperFn<F>
where
    F: Fn(In) -> Out,
{
    type Out = Out;

    fn wrap(&self, handler: In) -> Self::Out {
        (self.f)(handler)
    }
}
