use crate::request::Request;
use crate::writer::ResponseWriter;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;

/// Processes one request by writing a response into `w`.
///
/// Every middleware in this crate is itself a `Handler` wrapping an inner one, so decorated
/// handlers keep the exact calling convention of the handler they wrap.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn serve(&self, req: Request, w: &mut dyn ResponseWriter);
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Arc<H> {
    async fn serve(&self, req: Request, w: &mut dyn ResponseWriter) {
        (**self).serve(req, w).await;
    }
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Box<H> {
    async fn serve(&self, req: Request, w: &mut dyn ResponseWriter) {
        (**self).serve(req, w).await;
    }
}

/// a closure holder which represents any async fn handler
pub struct FnHandler<F> {
    f: F,
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

/// Turns a closure returning a boxed future into a [`Handler`].
///
/// ```
/// use micro_handlers::handler_fn;
/// use micro_handlers::writer::write_all;
///
/// let hello = handler_fn(|_req, w| {
///     Box::pin(async move {
///         let _ = write_all(w, b"hello");
///     })
/// });
/// # let _ = hello;
/// ```
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: for<'a> Fn(Request, &'a mut dyn ResponseWriter) -> BoxFuture<'a, ()> + Send + Sync,
{
    FnHandler { f }
}

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: for<'a> Fn(Request, &'a mut dyn ResponseWriter) -> BoxFuture<'a, ()> + Send + Sync,
{
    async fn serve(&self, req: Request, w: &mut dyn ResponseWriter) {
        (self.f)(req, w).await;
    }
}
