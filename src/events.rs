//! Flux-style event dispatcher plugins hook into.
//!
//! Listeners receive every event of the type they subscribed to.
//! Interceptors see every event first and may swallow it.

use crate::guard;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Handle returned by [`EventBus::subscribe`] and [`EventBus::intercept`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

type Handler = Box<dyn FnMut(&Value)>;
type Interceptor = Box<dyn FnMut(&str, &Value) -> bool>;

/// What happened to a dispatched event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Delivered to this many listeners without panicking
    Delivered(usize),
    /// Swallowed by an interceptor before reaching listeners
    Intercepted,
}

#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    listeners: HashMap<String, Vec<(ListenerId, Handler)>>,
    interceptors: Vec<(ListenerId, Interceptor)>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> ListenerId {
        self.next_id += 1;
        ListenerId(self.next_id)
    }

    pub fn subscribe<F>(&mut self, event: &str, handler: F) -> ListenerId
    where
        F: FnMut(&Value) + 'static,
    {
        let id = self.allocate();
        self.listeners
            .entry(event.to_string())
            .or_default()
            .push((id, Box::new(handler)));
        id
    }

    /// Register an interceptor. Returning `true` swallows the event.
    pub fn intercept<F>(&mut self, interceptor: F) -> ListenerId
    where
        F: FnMut(&str, &Value) -> bool + 'static,
    {
        let id = self.allocate();
        self.interceptors.push((id, Box::new(interceptor)));
        id
    }

    /// Remove a listener or interceptor. Returns false for unknown ids.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        if let Some(pos) = self.interceptors.iter().position(|(i, _)| *i == id) {
            self.interceptors.remove(pos);
            return true;
        }
        for handlers in self.listeners.values_mut() {
            if let Some(pos) = handlers.iter().position(|(i, _)| *i == id) {
                handlers.remove(pos);
                return true;
            }
        }
        false
    }

    /// Deliver `payload` to every listener of `event`.
    ///
    /// A panicking interceptor or listener is logged and skipped; the
    /// remaining ones still run.
    pub fn dispatch(&mut self, event: &str, payload: &Value) -> Dispatch {
        for (id, interceptor) in self.interceptors.iter_mut() {
            match guard::catch(|| interceptor(event, payload)) {
                Ok(true) => {
                    tracing::debug!(event, listener = %id, "event intercepted");
                    return Dispatch::Intercepted;
                }
                Ok(false) => {}
                Err(panic) => {
                    tracing::error!(event, listener = %id, "interceptor panicked: {panic}");
                }
            }
        }

        let Some(handlers) = self.listeners.get_mut(event) else {
            return Dispatch::Delivered(0);
        };
        let mut delivered = 0;
        for (id, handler) in handlers.iter_mut() {
            match guard::catch(|| handler(payload)) {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    tracing::error!(event, listener = %id, "listener panicked: {panic}");
                }
            }
        }
        Dispatch::Delivered(delivered)
    }

    /// Listeners plus interceptors currently installed.
    pub fn listener_count(&self) -> usize {
        self.interceptors.len() + self.listeners.values().map(Vec::len).sum::<usize>()
    }

    pub fn listener_count_for(&self, event: &str) -> usize {
        self.listeners.get(event).map_or(0, Vec::len)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut events: Vec<_> = self
            .listeners
            .iter()
            .map(|(event, handlers)| (event.as_str(), handlers.len()))
            .collect();
        events.sort();
        f.debug_struct("EventBus")
            .field("listeners", &events)
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}
