//! Handler callbacks and the context they receive.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use oscprims_codec::Message;

/// Error type a handler may return.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result of one handler invocation.
pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Boxed future returned by [`Handler::call`].
pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send + 'static>>;

/// A callback invoked for every message whose address matches its pattern.
///
/// Closures are registered directly through the dispatcher; implement this
/// trait for handlers that carry their own state.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, ctx: DispatchContext) -> HandlerFuture;
}

struct FnHandler<F>(F);

impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(DispatchContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, ctx: DispatchContext) -> HandlerFuture {
        Box::pin((self.0)(ctx))
    }
}

/// Runs a synchronous callback on the blocking thread pool.
struct BlockingHandler<F>(Arc<F>);

impl<F> Handler for BlockingHandler<F>
where
    F: Fn(DispatchContext) -> HandlerResult + Send + Sync + 'static,
{
    fn call(&self, ctx: DispatchContext) -> HandlerFuture {
        let callback = Arc::clone(&self.0);
        Box::pin(async move {
            match tokio::task::spawn_blocking(move || callback(ctx)).await {
                Ok(result) => result,
                // Re-raise so the dispatcher reports it like any other panic.
                Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                Err(err) => Err(err.into()),
            }
        })
    }
}

pub(crate) fn from_fn<F, Fut>(handler: F) -> Arc<dyn Handler>
where
    F: Fn(DispatchContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(FnHandler(handler))
}

pub(crate) fn from_blocking<F>(handler: F) -> Arc<dyn Handler>
where
    F: Fn(DispatchContext) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(BlockingHandler(Arc::new(handler)))
}

/// Identifier assigned to each registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(pub(crate) u64);

impl HandlerId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}

/// What a handler receives: the message, the named groups its pattern
/// captured, and which registration matched.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    message: Arc<Message>,
    captures: HashMap<String, String>,
    pattern: Arc<str>,
    handler_id: HandlerId,
}

impl DispatchContext {
    pub(crate) fn new(
        message: Arc<Message>,
        captures: HashMap<String, String>,
        pattern: Arc<str>,
        handler_id: HandlerId,
    ) -> Self {
        Self {
            message,
            captures,
            pattern,
            handler_id,
        }
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Shared handle to the message, for handlers that outlive the call.
    pub fn message_arc(&self) -> Arc<Message> {
        Arc::clone(&self.message)
    }

    /// Named groups captured from the address. Groups that did not
    /// participate in the match are absent.
    pub fn captures(&self) -> &HashMap<String, String> {
        &self.captures
    }

    pub fn capture(&self, name: &str) -> Option<&str> {
        self.captures.get(name).map(String::as_str)
    }

    /// Source of the pattern that matched.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn handler_id(&self) -> HandlerId {
        self.handler_id
    }
}

/// One entry of a route table: a pattern and the handler it selects.
///
/// A component that owns several handlers lists them as routes and
/// registers them in one call.
pub struct Route {
    pub(crate) pattern: String,
    pub(crate) handler: Arc<dyn Handler>,
}

impl Route {
    /// Route to an async closure.
    pub fn new<F, Fut>(pattern: impl Into<String>, handler: F) -> Self
    where
        F: Fn(DispatchContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self::from_handler(pattern, from_fn(handler))
    }

    /// Route to a synchronous closure run on the blocking pool.
    pub fn blocking<F>(pattern: impl Into<String>, handler: F) -> Self
    where
        F: Fn(DispatchContext) -> HandlerResult + Send + Sync + 'static,
    {
        Self::from_handler(pattern, from_blocking(handler))
    }

    /// Route to an existing handler.
    pub fn from_handler(pattern: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        Self {
            pattern: pattern.into(),
            handler,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}
