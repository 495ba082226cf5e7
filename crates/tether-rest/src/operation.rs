use std::future::Future;
use std::pin::Pin;

use tether_core::{Envelope, Fault, Request};

pub type OperationFuture = Pin<Box<dyn Future<Output = Result<Envelope, Fault>> + Send>>;

/// A handler bound to one verb and path.
///
/// Any `async fn(Request) -> Result<Envelope, Fault>` or closure of the
/// same shape qualifies.
pub trait Operation: Send + Sync + 'static {
    fn call(&self, req: Request) -> OperationFuture;
}

impl<F, Fut> Operation for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Envelope, Fault>> + Send + 'static,
{
    fn call(&self, req: Request) -> OperationFuture {
        Box::pin(self(req))
    }
}
