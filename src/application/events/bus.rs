//! Event bus - typed publish/subscribe keyed by the exact event type

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Callback registered for events of type `T`
///
/// Identity is the `Arc` allocation: keep the handle to remove it later.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

type ErasedListener = Arc<dyn Fn(&dyn Any) + Send + Sync>;

#[derive(Clone)]
struct Subscriber {
    identity: usize,
    active: Arc<AtomicBool>,
    once: bool,
    invoke: ErasedListener,
}

/// Synchronous publish/subscribe bus shared by the mapper, plugins and host code
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<HashMap<TypeId, Vec<Subscriber>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for events of exactly type `T`
    pub fn add_listener<T: Any>(&self, listener: Listener<T>) {
        let identity = identity_of(&listener);
        self.insert::<T>(identity, false, erase(listener));
    }

    /// Wrap a closure, register it and return the handle for later removal
    pub fn on<T, F>(&self, f: F) -> Listener<T>
    where
        T: Any,
        F: Fn(&T) + Send + Sync + 'static,
    {
        let listener: Listener<T> = Arc::new(f);
        self.add_listener(listener.clone());
        listener
    }

    /// Register a listener that unregisters itself the first time it fires
    ///
    /// The returned handle removes it early if it has not fired yet.
    pub fn once<T, F>(&self, f: F) -> Listener<T>
    where
        T: Any,
        F: Fn(&T) + Send + Sync + 'static,
    {
        let listener: Listener<T> = Arc::new(f);
        let identity = identity_of(&listener);
        self.insert::<T>(identity, true, erase(listener.clone()));
        listener
    }

    /// Unregister the most recent registration of `listener`
    ///
    /// Returns `false` when the listener was not registered.
    pub fn remove_listener<T: Any>(&self, listener: &Listener<T>) -> bool {
        let identity = identity_of(listener);
        let mut subscribers = self.subscribers.write().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = subscribers.get_mut(&TypeId::of::<T>()) else {
            return false;
        };
        let Some(index) = list.iter().rposition(|s| s.identity == identity) else {
            return false;
        };
        let removed = list.remove(index);
        removed.active.store(false, Ordering::SeqCst);
        if list.is_empty() {
            subscribers.remove(&TypeId::of::<T>());
        }
        true
    }

    /// Deliver `event` to every listener registered for `T`, in registration order
    pub fn emit<T: Any>(&self, event: &T) {
        let snapshot = {
            let subscribers = self.subscribers.read().unwrap_or_else(PoisonError::into_inner);
            match subscribers.get(&TypeId::of::<T>()) {
                Some(list) => list.clone(),
                None => return,
            }
        };

        for subscriber in snapshot {
            if subscriber.once {
                if !subscriber.active.swap(false, Ordering::SeqCst) {
                    continue;
                }
                self.detach::<T>(&subscriber.active);
            } else if !subscriber.active.load(Ordering::SeqCst) {
                continue;
            }
            (subscriber.invoke)(event);
        }
    }

    /// Number of listeners currently registered for `T`
    pub fn listener_count<T: Any>(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&TypeId::of::<T>())
            .map(|list| list.len())
            .unwrap_or(0)
    }

    fn insert<T: Any>(&self, identity: usize, once: bool, invoke: ErasedListener) {
        let subscriber = Subscriber {
            identity,
            active: Arc::new(AtomicBool::new(true)),
            once,
            invoke,
        };
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(TypeId::of::<T>())
            .or_default()
            .push(subscriber);
    }

    fn detach<T: Any>(&self, active: &Arc<AtomicBool>) {
        let mut subscribers = self.subscribers.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(list) = subscribers.get_mut(&TypeId::of::<T>()) {
            list.retain(|s| !Arc::ptr_eq(&s.active, active));
            if list.is_empty() {
                subscribers.remove(&TypeId::of::<T>());
            }
        }
    }
}

fn identity_of<T: ?Sized>(listener: &Arc<T>) -> usize {
    Arc::as_ptr(listener) as *const () as usize
}

fn erase<T: Any>(listener: Listener<T>) -> ErasedListener {
    Arc::new(move |event: &dyn Any| {
        if let Some(event) = event.downcast_ref::<T>() {
            listener(event);
        }
    })
}
