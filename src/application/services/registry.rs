//! Dependency registry - a mutable collection finalized into an immutable provider

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::application::errors::BotError;

struct Entry {
    name: &'static str,
    instance: Arc<dyn Any + Send + Sync>,
}

/// Registration surface used before plugins load
#[derive(Default)]
pub struct ServiceCollection {
    services: HashMap<TypeId, Entry>,
}

impl ServiceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a singleton; a later registration of the same type replaces it
    pub fn add_singleton<T: Any + Send + Sync>(&mut self, instance: Arc<T>) -> &mut Self {
        let previous = self.services.insert(
            TypeId::of::<T>(),
            Entry {
                name: type_name::<T>(),
                instance,
            },
        );
        if previous.is_some() {
            tracing::debug!("Replacing registered service: {}", type_name::<T>());
        }
        self
    }

    pub fn contains<T: Any>(&self) -> bool {
        self.services.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Freeze the collection
    pub fn build(self) -> ServiceProvider {
        ServiceProvider {
            services: self.services,
        }
    }
}

/// Immutable resolver handed to plugin constructors
pub struct ServiceProvider {
    services: HashMap<TypeId, Entry>,
}

impl ServiceProvider {
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.services
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.instance.clone().downcast::<T>().ok())
    }

    pub fn require<T: Any + Send + Sync>(&self) -> Result<Arc<T>, BotError> {
        self.get::<T>().ok_or_else(|| {
            BotError::config(format!("service not registered: {}", type_name::<T>()))
        })
    }

    pub fn contains<T: Any>(&self) -> bool {
        self.services.contains_key(&TypeId::of::<T>())
    }

    /// Type names of every registered service, sorted
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.services.values().map(|e| e.name).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// Registry slot owned by the host: open until startup seals it
pub enum Registry {
    Open(ServiceCollection),
    Sealed(Arc<ServiceProvider>),
}

impl Registry {
    pub fn new(collection: ServiceCollection) -> Self {
        Registry::Open(collection)
    }

    pub fn register<T: Any + Send + Sync>(&mut self, instance: Arc<T>) -> Result<(), BotError> {
        match self {
            Registry::Open(collection) => {
                collection.add_singleton(instance);
                Ok(())
            }
            Registry::Sealed(_) => Err(BotError::config(format!(
                "cannot register {} after the service registry was finalized",
                type_name::<T>()
            ))),
        }
    }

    /// Finalize the registry, running `extend` on the collection first
    ///
    /// Sealing twice is an error.
    pub fn seal(
        &mut self,
        extend: impl FnOnce(&mut ServiceCollection),
    ) -> Result<Arc<ServiceProvider>, BotError> {
        match std::mem::replace(self, Registry::Open(ServiceCollection::new())) {
            Registry::Open(mut collection) => {
                extend(&mut collection);
                let provider = Arc::new(collection.build());
                *self = Registry::Sealed(provider.clone());
                Ok(provider)
            }
            Registry::Sealed(provider) => {
                *self = Registry::Sealed(provider);
                Err(BotError::state("service registry is already finalized"))
            }
        }
    }

    pub fn is_sealed(&self) -> bool {
        matches!(self, Registry::Sealed(_))
    }
}
