//! Subscriber trait and closure adapter.

use async_trait::async_trait;

use crate::bus::Message;

/// Error type returned by handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// A subscriber invoked by the delivery worker.
///
/// Handlers run one at a time on the worker, so an implementation never
/// races with another handler invocation.
#[async_trait]
pub trait EventHandler<M: Message>: Send + Sync {
    /// Name used when logging failures.
    fn name(&self) -> &str;

    /// Handles a single message.
    async fn handle(&self, message: &M) -> Result<(), HandlerError>;
}

/// Adapts a synchronous closure into an [`EventHandler`].
pub struct FnHandler<F> {
    name: String,
    f: F,
}

impl<F> FnHandler<F> {
    /// Wraps `f` under the given handler name.
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<M, F> EventHandler<M> for FnHandler<F>
where
    M: Message,
    F: Fn(&M) -> Result<(), HandlerError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, message: &M) -> Result<(), HandlerError> {
        (self.f)(message)
    }
}
