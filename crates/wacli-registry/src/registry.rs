//! Role-based plugin registry.
//!
//! Plugins are built lazily from their configuration entry the first time a
//! role is asked for, and memoized per `(role, entry index)` for the life of
//! the registry. Factories receive a [`PluginContext`] through which they can
//! resolve other roles.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

use tracing::{debug, info};

use wacli_ops::Operation;
use wacli_storage::StorageBackend;
use wacli_types::Catalog;

use crate::config::{PluginEntry, RegistryConfig};
use crate::error::{ConfigurationError, RegistryError, RegistryResult};
use crate::modules;

/// A constructed plugin instance.
#[derive(Clone)]
pub enum Plugin {
    Storage(Arc<dyn StorageBackend>),
    Catalog(Arc<dyn Catalog>),
    Operation(Arc<dyn Operation>),
}

impl Plugin {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Storage(_) => "storage",
            Self::Catalog(_) => "catalog",
            Self::Operation(_) => "operation",
        }
    }
}

/// Builds a plugin from its configuration entry.
pub type Factory = Arc<dyn Fn(&PluginContext<'_>, &PluginEntry) -> RegistryResult<Plugin> + Send + Sync>;

/// What a factory knows about the instance it is building.
pub struct PluginContext<'a> {
    registry: &'a PluginRegistry,
    role: &'a str,
    module: &'a str,
}

impl<'a> PluginContext<'a> {
    /// The registry, for resolving other roles.
    pub fn registry(&self) -> &'a PluginRegistry {
        self.registry
    }

    pub fn role(&self) -> &str {
        self.role
    }

    pub fn module(&self) -> &str {
        self.module
    }

    /// A configuration error for this instance.
    pub fn invalid(&self, reason: impl Into<String>) -> RegistryError {
        RegistryError::Configuration(ConfigurationError {
            role: self.role.to_string(),
            module: self.module.to_string(),
            reason: reason.into(),
        })
    }
}

type Slot = (String, usize);

/// Slots being built, and which thread is building them.
#[derive(Default)]
struct Construction {
    owners: HashMap<Slot, ThreadId>,
    /// Threads blocked on a slot another thread is building.
    waiting: HashMap<ThreadId, Slot>,
}

impl Construction {
    /// Whether `thread` waiting for `slot` would close a wait-for cycle.
    fn closes_cycle(&self, thread: ThreadId, slot: &Slot) -> bool {
        let mut next = self.owners.get(slot);
        while let Some(owner) = next {
            if *owner == thread {
                return true;
            }
            next = self.waiting.get(owner).and_then(|s| self.owners.get(s));
        }
        false
    }
}

/// Maps role names to lazily constructed plugin instances.
///
/// Safe to share between threads. A thread asking for a slot that another
/// thread is building waits for that construction to finish.
pub struct PluginRegistry {
    config: RegistryConfig,
    factories: BTreeMap<String, Factory>,
    instances: Mutex<HashMap<Slot, Plugin>>,
    constructing: Mutex<Construction>,
    constructed: Condvar,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Releases a slot when construction ends, including by unwinding.
struct Building<'a> {
    registry: &'a PluginRegistry,
    slot: Slot,
}

impl Drop for Building<'_> {
    fn drop(&mut self) {
        lock(&self.registry.constructing).owners.remove(&self.slot);
        self.registry.constructed.notify_all();
    }
}

impl PluginRegistry {
    /// A registry with the built-in modules.
    pub fn new(config: RegistryConfig) -> Self {
        let mut registry = Self {
            config,
            factories: BTreeMap::new(),
            instances: Mutex::new(HashMap::new()),
            constructing: Mutex::new(Construction::default()),
            constructed: Condvar::new(),
        };
        modules::register_builtins(&mut registry);
        registry
    }

    /// Make `module` available to configuration entries.
    pub fn register_module<F>(&mut self, module: impl Into<String>, factory: F)
    where
        F: Fn(&PluginContext<'_>, &PluginEntry) -> RegistryResult<Plugin> + Send + Sync + 'static,
    {
        self.factories.insert(module.into(), Arc::new(factory));
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Names of all registered modules, sorted.
    pub fn available_modules(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Log and return the configured `(role, module)` pairs.
    pub fn list_registered(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for (role, entries) in &self.config.roles {
            for entry in entries {
                info!(role = %role, module = %entry.module, params = entry.params.len(), "registered plugin");
                pairs.push((role.clone(), entry.module.clone()));
            }
        }
        pairs
    }

    /// The instance for entry `index` of `role`, constructing it on first use.
    pub fn instance(&self, role: &str, index: usize) -> RegistryResult<Plugin> {
        let entry = self
            .config
            .roles
            .get(role)
            .and_then(|entries| entries.get(index))
            .ok_or_else(|| RegistryError::UnknownRole(role.to_string()))?;
        let slot = (role.to_string(), index);

        if let Some(plugin) = lock(&self.instances).get(&slot) {
            return Ok(plugin.clone());
        }

        let config_error = |reason: String| {
            RegistryError::Configuration(ConfigurationError {
                role: role.to_string(),
                module: entry.module.clone(),
                reason,
            })
        };

        let factory = self
            .factories
            .get(&entry.module)
            .cloned()
            .ok_or_else(|| config_error(format!("unknown module '{}'", entry.module)))?;

        let current = thread::current().id();
        let mut state = lock(&self.constructing);
        loop {
            if let Some(plugin) = lock(&self.instances).get(&slot) {
                return Ok(plugin.clone());
            }
            if !state.owners.contains_key(&slot) {
                break;
            }
            if state.closes_cycle(current, &slot) {
                return Err(config_error("cyclic reference while constructing".to_string()));
            }
            state.waiting.insert(current, slot.clone());
            state = self
                .constructed
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            state.waiting.remove(&current);
        }
        state.owners.insert(slot.clone(), current);
        drop(state);

        let building = Building { registry: self, slot };
        debug!(role, module = %entry.module, index, "constructing plugin");
        let context = PluginContext {
            registry: self,
            role,
            module: &entry.module,
        };
        let plugin = factory(&context, entry)?;
        let plugin = lock(&self.instances)
            .entry(building.slot.clone())
            .or_insert(plugin)
            .clone();
        drop(building);
        Ok(plugin)
    }

    /// All instances of `role`, in configuration order.
    pub fn instances(&self, role: &str) -> RegistryResult<Vec<Plugin>> {
        let count = self
            .config
            .roles
            .get(role)
            .map(Vec::len)
            .ok_or_else(|| RegistryError::UnknownRole(role.to_string()))?;
        (0..count).map(|i| self.instance(role, i)).collect()
    }

    /// The first storage backend of `role`.
    pub fn storage(&self, role: &str) -> RegistryResult<Arc<dyn StorageBackend>> {
        as_storage(role, self.instance(role, 0)?)
    }

    pub fn storages(&self, role: &str) -> RegistryResult<Vec<Arc<dyn StorageBackend>>> {
        self.instances(role)?
            .into_iter()
            .map(|p| as_storage(role, p))
            .collect()
    }

    /// The first catalog of `role`.
    pub fn catalog(&self, role: &str) -> RegistryResult<Arc<dyn Catalog>> {
        match self.instance(role, 0)? {
            Plugin::Catalog(catalog) => Ok(catalog),
            other => Err(wrong_kind(role, "catalog", &other)),
        }
    }

    /// The first operation of `role`.
    pub fn operation(&self, role: &str) -> RegistryResult<Arc<dyn Operation>> {
        as_operation(role, self.instance(role, 0)?)
    }

    pub fn operations(&self, role: &str) -> RegistryResult<Vec<Arc<dyn Operation>>> {
        self.instances(role)?
            .into_iter()
            .map(|p| as_operation(role, p))
            .collect()
    }
}

fn wrong_kind(role: &str, expected: &'static str, found: &Plugin) -> RegistryError {
    RegistryError::WrongKind {
        role: role.to_string(),
        expected,
        found: found.kind(),
    }
}

fn as_storage(role: &str, plugin: Plugin) -> RegistryResult<Arc<dyn StorageBackend>> {
    match plugin {
        Plugin::Storage(storage) => Ok(storage),
        other => Err(wrong_kind(role, "storage", &other)),
    }
}

fn as_operation(role: &str, plugin: Plugin) -> RegistryResult<Arc<dyn Operation>> {
    match plugin {
        Plugin::Operation(op) => Ok(op),
        other => Err(wrong_kind(role, "operation", &other)),
    }
}
