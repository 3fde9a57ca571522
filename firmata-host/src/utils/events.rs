//! Defines the Firmata-Host event manager system.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

type Callback = Box<dyn FnMut(Arc<dyn Any + Send + Sync>) -> bool + Send>;
type SyncedCallbackMap = Mutex<HashMap<String, Vec<CallbackWrapper>>>;

/// Identifies a registered callback, to be given to [`EventManager::unregister`].
pub type EventHandler = usize;

/// Publish/subscribe registry keyed by event names.
///
/// Callbacks are run synchronously by [`EventManager::emit`], in registration order, on the
/// thread that emits. Cloning the manager shares the registry.
#[derive(Clone, Default)]
pub struct EventManager {
    callbacks: Arc<SyncedCallbackMap>,
    next_id: Arc<AtomicUsize>,
}

#[derive(Clone)]
struct CallbackWrapper {
    id: EventHandler,
    once: bool,
    callback: Arc<Mutex<Callback>>,
}

impl EventManager {
    /// Register event handler for a specific event name.
    ///
    /// # Parameters
    /// * `event` - The event name (any type that matches an Into<String>)
    /// * `callback` - A callback that accepts a single parameter as an argument.
    ///                The argument can be anything that might be both `Send + Sync + Clone`.
    ///                You can trick multiple parameters by turning them in a single tuple.
    ///
    /// # Return
    /// Returns an EventHandler that can be used by the `unregister()` method.
    ///
    /// # Errors
    /// If the callback parameter does not match the emitted payload type exactly, the callback is
    /// skipped (and a warning is logged).
    ///
    /// # Example
    /// ```
    /// use firmata_host::utils::events::EventManager;
    ///
    /// let events: EventManager = Default::default();
    /// events.on("analog-read-0", |value: u16| println!("A0 = {}", value));
    /// events.on("ready", |(name, age): (&str, u8)| println!("{} {}", name, age));
    ///
    /// events.emit("analog-read-0", 512u16);
    /// events.emit("ready", ("foo", 69u8));
    /// ```
    pub fn on<S, F, T>(&self, event: S, mut callback: F) -> EventHandler
    where
        S: Into<String>,
        T: 'static + Send + Sync + Clone,
        F: FnMut(T) + Send + 'static,
    {
        let event_name = event.into();
        let callback_event = event_name.clone();
        self.register(
            event_name,
            false,
            Box::new(move |arg: Arc<dyn Any + Send + Sync>| match arg.downcast_ref::<T>() {
                Some(arg) => {
                    callback(arg.clone());
                    true
                }
                None => {
                    log::warn!(
                        "The callback for event '{}' could not be called because parameter does not match",
                        callback_event
                    );
                    false
                }
            }),
        )
    }

    /// Register an event handler that is removed after its first successful call.
    pub fn once<S, F, T>(&self, event: S, callback: F) -> EventHandler
    where
        S: Into<String>,
        T: 'static + Send + Sync + Clone,
        F: FnOnce(T) + Send + 'static,
    {
        let event_name = event.into();
        let callback_event = event_name.clone();
        let mut callback = Some(callback);
        self.register(
            event_name,
            true,
            Box::new(move |arg: Arc<dyn Any + Send + Sync>| match arg.downcast_ref::<T>() {
                Some(arg) => {
                    if let Some(callback) = callback.take() {
                        callback(arg.clone());
                    }
                    true
                }
                None => {
                    log::warn!(
                        "The callback for event '{}' could not be called because parameter does not match",
                        callback_event
                    );
                    false
                }
            }),
        )
    }

    fn register(&self, event: String, once: bool, callback: Callback) -> EventHandler {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks
            .lock()
            .entry(event)
            .or_default()
            .push(CallbackWrapper {
                id,
                once,
                callback: Arc::new(Mutex::new(callback)),
            });
        id
    }

    /// Invoke all event handlers registered for a specific event name.
    /// Only the callbacks whose parameter type matches the payload are called.
    ///
    /// The registry is not locked while callbacks run: a callback may register, unregister or
    /// emit. A callback is never re-entered by an emission it triggered itself.
    pub fn emit<S, T>(&self, event: S, payload: T)
    where
        S: Into<String>,
        T: 'static + Send + Sync,
    {
        let event = event.into();
        let payload: Arc<dyn Any + Send + Sync> = Arc::new(payload);
        let snapshot = match self.callbacks.lock().get(&event) {
            Some(callbacks) => callbacks.clone(),
            None => return,
        };

        for wrapper in snapshot {
            let called = match wrapper.callback.try_lock() {
                Some(mut callback) => callback(payload.clone()),
                None => false,
            };
            if called && wrapper.once {
                self.unregister(wrapper.id);
            }
        }
    }

    /// Unregister a given handler if found.
    pub fn unregister(&self, handler: EventHandler) {
        let mut callbacks = self.callbacks.lock();
        callbacks
            .values_mut()
            .for_each(|v| v.retain(|cb| cb.id != handler));
        callbacks.retain(|_, v| !v.is_empty());
    }

    /// Unregister all handlers of an event.
    pub fn unregister_all<S: Into<String>>(&self, event: S) {
        self.callbacks.lock().remove(&event.into());
    }

    /// Number of handlers currently registered for an event.
    pub fn listener_count<S: Into<String>>(&self, event: S) -> usize {
        self.callbacks
            .lock()
            .get(&event.into())
            .map_or(0, |callbacks| callbacks.len())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU8};

    use super::*;

    #[test]
    fn test_register_and_emit_event() {
        let events: EventManager = Default::default();
        let payload = Arc::new(AtomicBool::new(false));

        events.on("register", |flag: Arc<AtomicBool>| {
            flag.store(true, Ordering::SeqCst);
        });
        events.emit("register", payload.clone());

        assert!(
            payload.load(Ordering::SeqCst),
            "The flag have been set by the triggered event."
        );
    }

    #[test]
    fn test_unregister_event_handler() {
        let events: EventManager = Default::default();
        let flag = Arc::new(AtomicBool::new(false));

        let handler = events.on("unregister", |flag: Arc<AtomicBool>| {
            flag.store(true, Ordering::SeqCst);
        });
        events.unregister(handler);
        events.emit("unregister", flag.clone());

        assert!(
            !flag.load(Ordering::SeqCst),
            "The event was unregistered: the flag have not been set."
        );
        assert_eq!(events.listener_count("unregister"), 0);
    }

    #[test]
    fn test_multiple_handlers() {
        let events: EventManager = Default::default();
        let flag = Arc::new(AtomicUsize::new(0));

        events.on("multiple", |flag: Arc<AtomicUsize>| {
            flag.fetch_add(1, Ordering::SeqCst);
        });
        events.on("multiple", |flag: Arc<AtomicUsize>| {
            flag.fetch_add(1, Ordering::SeqCst);
        });
        events.on(
            "multiple",
            |(_not_matching, flag): (u8, Arc<AtomicUsize>)| {
                flag.fetch_add(1, Ordering::SeqCst);
            },
        );

        events.emit("multiple", flag.clone());
        assert_eq!(
            flag.load(Ordering::SeqCst),
            2,
            "The flag have been increased by 2."
        );
    }

    #[test]
    fn test_event_with_complex_payload() {
        let events: EventManager = Default::default();
        let flag = Arc::new(AtomicU8::new(0));

        events.on(
            "payload",
            |(number1, number2, container): (u8, u8, Arc<AtomicU8>)| {
                container.store(number1 + number2, Ordering::SeqCst);
            },
        );
        events.emit("payload", (42u8, 69u8, flag.clone()));

        assert_eq!(
            flag.load(Ordering::SeqCst),
            111,
            "The complex flag has been properly received."
        );
    }

    #[test]
    fn test_once_handler() {
        let events: EventManager = Default::default();
        let counter = Arc::new(AtomicUsize::new(0));

        let clone = counter.clone();
        events.once("once", move |value: u8| {
            clone.fetch_add(value as usize, Ordering::SeqCst);
        });
        events.emit("once", "not matching");
        assert_eq!(events.listener_count("once"), 1, "Mismatch keeps the handler");

        events.emit("once", 3u8);
        events.emit("once", 3u8);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(events.listener_count("once"), 0);
    }

    #[test]
    fn test_emit_from_callback() {
        let events: EventManager = Default::default();
        let counter = Arc::new(AtomicUsize::new(0));

        let inner = events.clone();
        events.on("outer", move |_: ()| inner.emit("inner", ()));
        let clone = counter.clone();
        events.on("inner", move |_: ()| {
            clone.fetch_add(1, Ordering::SeqCst);
        });

        events.emit("outer", ());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregister_all() {
        let events: EventManager = Default::default();
        events.on("serial-data-8", |_: Vec<u8>| {});
        events.on("serial-data-8", |_: Vec<u8>| {});
        events.on("serial-data-9", |_: Vec<u8>| {});
        events.unregister_all("serial-data-8");
        assert_eq!(events.listener_count("serial-data-8"), 0);
        assert_eq!(events.listener_count("serial-data-9"), 1);
    }

    #[test]
    fn test_no_handlers_for_event() {
        let events: EventManager = Default::default();
        events.emit("no_event", ());
        assert_eq!(events.listener_count("no_event"), 0, "Nothing to do.");
    }
}
