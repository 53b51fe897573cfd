//! `HandlerRegistry`: maps a command's string `action` to a boxed async
//! handler (redesign flag: replaces the source's dynamic string-keyed
//! dispatch with a typed lookup that fails loudly on an unknown action,
//! instead of a silent no-op).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use fleetlink_domain::CommandOutcome;
use serde_json::Value;

/// Error returned when a dispatched action has no registered handler.
#[derive(Debug, thiserror::Error)]
#[error("unknown action: {0}")]
pub struct UnknownActionError(pub String);

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A single action's handler: takes the command's `params` and produces
/// its outcome document.
pub trait ActionHandler: Send + Sync {
    fn call<'a>(&'a self, params: Value) -> BoxFuture<'a, CommandOutcome>;
}

impl<F, Fut> ActionHandler for F
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = CommandOutcome> + Send + 'static,
{
    fn call<'a>(&'a self, params: Value) -> BoxFuture<'a, CommandOutcome> {
        Box::pin(self(params))
    }
}

/// A string-keyed table of action handlers, injected at construction
/// (no process-wide registration).
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self { handlers: HashMap::new() }
    }

    /// Register a handler for `action`. Overwrites any prior registration.
    pub fn register(&mut self, action: impl Into<String>, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(action.into(), handler);
    }

    /// Dispatch `action` with `params`, or `Err` if nothing is registered.
    pub async fn dispatch(
        &self,
        action: &str,
        params: Value,
    ) -> Result<CommandOutcome, UnknownActionError> {
        match self.handlers.get(action) {
            Some(handler) => Ok(handler.call(params).await),
            None => Err(UnknownActionError(action.to_string())),
        }
    }

    #[must_use]
    pub fn is_registered(&self, action: &str) -> bool {
        self.handlers.contains_key(action)
    }
}
