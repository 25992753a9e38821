//! Raw event handler table shared by the gateway adapters

use std::sync::{PoisonError, RwLock};

use crate::domain::traits::{RawEvent, RawEventHandler, RawEventKind};

/// Handlers per raw event kind, invoked in subscription order
#[derive(Default)]
pub struct HandlerTable {
    handlers: RwLock<Vec<(RawEventKind, RawEventHandler)>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, kind: RawEventKind, handler: RawEventHandler) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((kind, handler));
    }

    /// Invoke every handler for the event's kind on the caller's thread
    pub fn raise(&self, event: RawEvent) {
        let matching: Vec<RawEventHandler> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(kind, _)| *kind == event.kind)
            .map(|(_, handler)| handler.clone())
            .collect();

        for handler in matching {
            handler(&event);
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn raises_only_matching_kind_in_order() {
        let table = HandlerTable::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = seen.clone();
        table.subscribe(RawEventKind::Log, Arc::new(move |_| s.lock().unwrap().push("log-1")));
        let s = seen.clone();
        table.subscribe(RawEventKind::Ready, Arc::new(move |_| s.lock().unwrap().push("ready")));
        let s = seen.clone();
        table.subscribe(RawEventKind::Log, Arc::new(move |_| s.lock().unwrap().push("log-2")));

        table.raise(RawEvent::text(RawEventKind::Log, "x"));
        assert_eq!(*seen.lock().unwrap(), vec!["log-1", "log-2"]);
        assert_eq!(table.len(), 3);
    }
}
