//! Pattern registry and concurrent fan-out of messages to handlers.
//!
//! Patterns are regular expressions searched (unanchored) against the
//! message address. Every matching handler runs as its own task; a fault in
//! one never prevents or cancels the others.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use oscprims_codec::Message;
use regex::{Captures, Regex};
use tracing::{debug, trace, warn};

use crate::error::{HandlerFault, Result};
use crate::handler::{
    from_blocking, from_fn, DispatchContext, Handler, HandlerId, HandlerResult, Route,
};

struct Registration {
    id: HandlerId,
    pattern: Regex,
    source: Arc<str>,
    handler: Arc<dyn Handler>,
}

impl Registration {
    fn context(&self, message: &Arc<Message>, caps: &Captures<'_>) -> DispatchContext {
        let captures: HashMap<String, String> = self
            .pattern
            .capture_names()
            .flatten()
            .filter_map(|name| caps.name(name).map(|m| (name.to_string(), m.as_str().to_string())))
            .collect();

        DispatchContext::new(
            Arc::clone(message),
            captures,
            Arc::clone(&self.source),
            self.id,
        )
    }
}

type Snapshot = Arc<Vec<Arc<Registration>>>;

/// Summary of one dispatch.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// Number of handlers whose pattern matched.
    pub matched: usize,
    /// Handlers that returned an error, panicked, or were cancelled.
    pub faults: Vec<HandlerFault>,
}

impl DispatchOutcome {
    /// Whether every matched handler completed normally.
    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }
}

/// Registry of (pattern, handler) pairs.
///
/// Registration may happen at any time, including from inside a handler.
/// Each dispatch works on a snapshot of the registry taken when it starts,
/// so a registration racing with a dispatch may or may not see that message.
///
/// The registry is copy-on-write behind an `RwLock`. A dispatch holds the
/// read lock only long enough to clone the snapshot `Arc`, and an append
/// holds the write lock only while building the next vector. Handlers never
/// run under the lock, so a dispatch in progress never blocks registration.
/// A snapshot taken during an append waits for that copy to finish.
pub struct Dispatcher {
    routes: RwLock<Snapshot>,
    next_id: AtomicU64,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            routes: RwLock::new(Arc::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register an async handler for addresses matching `pattern`.
    pub fn register<F, Fut>(&self, pattern: &str, handler: F) -> Result<HandlerId>
    where
        F: Fn(DispatchContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let pattern = Regex::new(pattern)?;
        Ok(self.register_handler(pattern, from_fn(handler)))
    }

    /// Register an async handler with a precompiled pattern.
    pub fn register_regex<F, Fut>(&self, pattern: Regex, handler: F) -> HandlerId
    where
        F: Fn(DispatchContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register_handler(pattern, from_fn(handler))
    }

    /// Register a synchronous handler. Each call runs on the blocking pool.
    pub fn register_blocking<F>(&self, pattern: &str, handler: F) -> Result<HandlerId>
    where
        F: Fn(DispatchContext) -> HandlerResult + Send + Sync + 'static,
    {
        let pattern = Regex::new(pattern)?;
        Ok(self.register_handler(pattern, from_blocking(handler)))
    }

    /// Register any [`Handler`] implementation.
    pub fn register_handler(&self, pattern: Regex, handler: Arc<dyn Handler>) -> HandlerId {
        let registration = self.registration(pattern, handler);
        let id = registration.id;
        self.append(vec![registration]);
        id
    }

    /// Register a route table.
    ///
    /// Every pattern is compiled before anything is added: on error the
    /// registry is unchanged.
    pub fn register_routes(&self, routes: impl IntoIterator<Item = Route>) -> Result<Vec<HandlerId>> {
        let compiled = routes
            .into_iter()
            .map(|route| -> Result<_> { Ok((Regex::new(&route.pattern)?, route.handler)) })
            .collect::<Result<Vec<_>>>()?;

        let registrations: Vec<_> = compiled
            .into_iter()
            .map(|(pattern, handler)| self.registration(pattern, handler))
            .collect();
        let ids = registrations.iter().map(|r| r.id).collect();
        self.append(registrations);
        Ok(ids)
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Patterns of all registrations, in registration order.
    pub fn patterns(&self) -> Vec<String> {
        self.snapshot()
            .iter()
            .map(|r| r.source.to_string())
            .collect()
    }

    /// Run every handler whose pattern matches the message address.
    ///
    /// Handlers run concurrently as separate tasks. Completes once all of
    /// them have finished or faulted.
    pub async fn dispatch(&self, message: Arc<Message>) -> DispatchOutcome {
        let routes = self.snapshot();
        let mut running = Vec::new();

        for route in routes.iter() {
            let Some(caps) = route.pattern.captures(message.address()) else {
                continue;
            };
            let ctx = route.context(&message, &caps);
            let handler = Arc::clone(&route.handler);
            trace!(address = message.address(), handler = %route.id, "handler matched");
            running.push((Arc::clone(route), tokio::spawn(async move { handler.call(ctx).await })));
        }

        let matched = running.len();
        if matched == 0 {
            debug!(address = message.address(), "no handler matched");
        }

        let mut faults = Vec::new();
        for (route, task) in running {
            let pattern = route.source.to_string();
            let address = message.address().to_string();
            let fault = match task.await {
                Ok(Ok(())) => continue,
                Ok(Err(source)) => HandlerFault::Failed {
                    pattern,
                    address,
                    source,
                },
                Err(err) if err.is_panic() => HandlerFault::Panicked {
                    pattern,
                    address,
                    message: panic_message(err.into_panic()),
                },
                Err(_) => HandlerFault::Cancelled { pattern, address },
            };
            warn!(handler = %route.id, error = %fault, "handler fault");
            faults.push(fault);
        }

        DispatchOutcome { matched, faults }
    }

    fn registration(&self, pattern: Regex, handler: Arc<dyn Handler>) -> Registration {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(handler = %id, pattern = pattern.as_str(), "registered handler");
        Registration {
            id,
            source: Arc::from(pattern.as_str()),
            pattern,
            handler,
        }
    }

    fn append(&self, registrations: Vec<Registration>) {
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = Vec::with_capacity(routes.len() + registrations.len());
        next.extend(routes.iter().cloned());
        next.extend(registrations.into_iter().map(Arc::new));
        *routes = Arc::new(next);
    }

    fn snapshot(&self) -> Snapshot {
        Arc::clone(&self.routes.read().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("patterns", &self.patterns())
            .finish()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use tokio::sync::Barrier;

    use super::*;
    use crate::handler::HandlerError;

    type Hits = Arc<Mutex<Vec<String>>>;

    fn recorder(
        hits: &Hits,
        label: &'static str,
    ) -> impl Fn(DispatchContext) -> std::future::Ready<HandlerResult> + Send + Sync + 'static {
        let hits = Arc::clone(hits);
        move |ctx: DispatchContext| {
            let entry = match ctx.capture("no") {
                Some(no) => format!("{label}:{no}"),
                None => label.to_string(),
            };
            hits.lock().unwrap().push(entry);
            std::future::ready(Ok(()))
        }
    }

    fn sorted(hits: &Hits) -> Vec<String> {
        let mut v = hits.lock().unwrap().clone();
        v.sort();
        v
    }

    #[tokio::test]
    async fn only_matching_handlers_run() {
        let dispatcher = Dispatcher::new();
        let hits: Hits = Arc::default();

        dispatcher
            .register("/track/(?<no>[0-9]+)/select", recorder(&hits, "numbered"))
            .unwrap();
        dispatcher
            .register("/track/3/.*", recorder(&hits, "wildcard"))
            .unwrap();
        dispatcher.register("/clip/.*", recorder(&hits, "clip")).unwrap();

        let message = Arc::new(Message::new("/track/3/select").arg_value(1));
        let outcome = dispatcher.dispatch(message).await;

        assert_eq!(outcome.matched, 2);
        assert!(outcome.is_clean());
        assert_eq!(sorted(&hits), vec!["numbered:3", "wildcard"]);
    }

    #[tokio::test]
    async fn patterns_search_unanchored() {
        let dispatcher = Dispatcher::new();
        let hits: Hits = Arc::default();
        dispatcher.register("volume", recorder(&hits, "volume")).unwrap();
        dispatcher.register("^volume", recorder(&hits, "anchored")).unwrap();

        let outcome = dispatcher
            .dispatch(Arc::new(Message::new("/track/1/volume")))
            .await;
        assert_eq!(outcome.matched, 1);
        assert_eq!(sorted(&hits), vec!["volume"]);
    }

    #[tokio::test]
    async fn no_match_is_not_an_error() {
        let dispatcher = Dispatcher::new();
        let hits: Hits = Arc::default();
        dispatcher.register("/clip/.*", recorder(&hits, "clip")).unwrap();

        let outcome = dispatcher.dispatch(Arc::new(Message::new("/ping"))).await;
        assert_eq!(outcome.matched, 0);
        assert!(outcome.is_clean());
        assert!(hits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn handlers_run_concurrently() {
        let dispatcher = Dispatcher::new();
        let barrier = Arc::new(Barrier::new(2));

        for _ in 0..2 {
            let barrier = Arc::clone(&barrier);
            dispatcher
                .register("/sync", move |_ctx: DispatchContext| {
                    let barrier = Arc::clone(&barrier);
                    async move {
                        barrier.wait().await;
                        Ok::<_, HandlerError>(())
                    }
                })
                .unwrap();
        }

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            dispatcher.dispatch(Arc::new(Message::new("/sync"))),
        )
        .await
        .expect("both handlers should reach the barrier together");
        assert_eq!(outcome.matched, 2);
        assert!(outcome.is_clean());
    }

    #[tokio::test]
    async fn failing_handler_does_not_affect_others() {
        let dispatcher = Dispatcher::new();
        let hits: Hits = Arc::default();

        dispatcher
            .register("/track", |_ctx: DispatchContext| async {
                Err::<(), HandlerError>("boom".into())
            })
            .unwrap();
        let slow_hits = Arc::clone(&hits);
        dispatcher
            .register("/track", move |_ctx: DispatchContext| {
                let hits = Arc::clone(&slow_hits);
                async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    hits.lock().unwrap().push("slow".to_string());
                    Ok::<_, HandlerError>(())
                }
            })
            .unwrap();

        let outcome = dispatcher.dispatch(Arc::new(Message::new("/track/1"))).await;
        assert_eq!(outcome.matched, 2);
        assert_eq!(outcome.faults.len(), 1);
        assert!(matches!(outcome.faults[0], HandlerFault::Failed { .. }));
        assert_eq!(outcome.faults[0].address(), "/track/1");
        assert_eq!(sorted(&hits), vec!["slow"]);
    }

    #[tokio::test]
    async fn panicking_handler_is_reported() {
        let dispatcher = Dispatcher::new();
        let hits: Hits = Arc::default();

        dispatcher
            .register("/boom", |_ctx: DispatchContext| async {
                if true {
                    panic!("handler exploded");
                }
                Ok::<_, HandlerError>(())
            })
            .unwrap();
        dispatcher.register("/boom", recorder(&hits, "survivor")).unwrap();

        let outcome = dispatcher.dispatch(Arc::new(Message::new("/boom"))).await;
        assert_eq!(outcome.matched, 2);
        assert_eq!(outcome.faults.len(), 1);
        match &outcome.faults[0] {
            HandlerFault::Panicked { message, pattern, .. } => {
                assert_eq!(message, "handler exploded");
                assert_eq!(pattern, "/boom");
            }
            other => panic!("unexpected fault: {other:?}"),
        }
        assert_eq!(sorted(&hits), vec!["survivor"]);
    }

    #[tokio::test]
    async fn blocking_handler_runs_and_panics_are_reported() {
        let dispatcher = Dispatcher::new();
        let hits: Hits = Arc::default();

        let blocking_hits = Arc::clone(&hits);
        dispatcher
            .register_blocking("/sync", move |ctx| {
                std::thread::sleep(Duration::from_millis(5));
                blocking_hits
                    .lock()
                    .unwrap()
                    .push(ctx.message().address().to_string());
                Ok(())
            })
            .unwrap();
        dispatcher
            .register_blocking("/sync/fail", |_ctx| panic!("blocking exploded"))
            .unwrap();

        let outcome = dispatcher.dispatch(Arc::new(Message::new("/sync/ok"))).await;
        assert!(outcome.is_clean());

        let outcome = dispatcher.dispatch(Arc::new(Message::new("/sync/fail"))).await;
        assert_eq!(outcome.matched, 2);
        assert_eq!(outcome.faults.len(), 1);
        assert!(matches!(outcome.faults[0], HandlerFault::Panicked { .. }));
        assert_eq!(sorted(&hits), vec!["/sync/fail", "/sync/ok"]);
    }

    #[tokio::test]
    async fn handler_may_register_during_dispatch() {
        let dispatcher = Arc::new(Dispatcher::new());
        let hits: Hits = Arc::default();

        let inner = Arc::clone(&dispatcher);
        let inner_hits = Arc::clone(&hits);
        dispatcher
            .register("/setup", move |_ctx: DispatchContext| {
                let result = inner
                    .register("/late", recorder(&inner_hits, "late"))
                    .map(|_| ())
                    .map_err(HandlerError::from);
                std::future::ready(result)
            })
            .unwrap();

        let outcome = dispatcher.dispatch(Arc::new(Message::new("/setup"))).await;
        assert!(outcome.is_clean());
        assert_eq!(dispatcher.len(), 2);

        dispatcher.dispatch(Arc::new(Message::new("/late"))).await;
        assert_eq!(sorted(&hits), vec!["late"]);
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let dispatcher = Dispatcher::new();
        let result = dispatcher.register("/track/(", |_ctx: DispatchContext| async {
            Ok::<_, HandlerError>(())
        });
        assert!(matches!(result, Err(crate::PeerError::InvalidPattern(_))));
        assert!(dispatcher.is_empty());
    }

    #[test]
    fn route_table_is_all_or_nothing() {
        let dispatcher = Dispatcher::new();
        let hits: Hits = Arc::default();

        let result = dispatcher.register_routes(vec![
            Route::new("/a", recorder(&hits, "a")),
            Route::new("/b(", recorder(&hits, "b")),
        ]);
        assert!(result.is_err());
        assert!(dispatcher.is_empty());

        let ids = dispatcher
            .register_routes(vec![
                Route::new("/a", recorder(&hits, "a")),
                Route::blocking("/b", |_ctx| Ok(())),
            ])
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
        assert_eq!(dispatcher.patterns(), vec!["/a", "/b"]);
    }
}
