//! The runtime context tying modules, plugins, events and settings together.
//!
//! There are no global registries: the caller owns a [`Runtime`] and passes
//! it around by `&mut`. Loading a module is the patch point: its source is
//! run through every enabled plugin's pending patches before it is stored
//! and announced to waiters.

use crate::events::{Dispatch, EventBus};
use crate::modules::{
    locator, Filter, LazyModule, LocatorError, ModuleCache, ModuleId, ModuleRecord, WaiterId, Waiters,
};
use crate::patch::PatchReport;
use crate::plugin::{Plugin, PluginError, PluginRegistry, PluginState};
use crate::settings::{MemoryStore, SettingsStore};
use serde_json::Value;

/// Host-side state plugins may touch through their context.
pub struct Host {
    pub modules: ModuleCache,
    pub bus: EventBus,
    pub waiters: Waiters,
    pub settings: Box<dyn SettingsStore>,
    /// Running host build, checked against plugin version ranges
    pub version: Option<String>,
}

impl Host {
    pub fn new(settings: Box<dyn SettingsStore>) -> Self {
        Self {
            modules: ModuleCache::new(),
            bus: EventBus::new(),
            waiters: Waiters::new(),
            settings,
            version: None,
        }
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("modules", &self.modules.len())
            .field("bus", &self.bus)
            .field("waiters", &self.waiters)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct Runtime {
    host: Host,
    plugins: PluginRegistry,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(Box::new(MemoryStore::new()))
    }
}

impl Runtime {
    pub fn new(settings: Box<dyn SettingsStore>) -> Self {
        Self {
            host: Host::new(settings),
            plugins: PluginRegistry::new(),
        }
    }

    pub fn with_host_version(mut self, version: impl Into<String>) -> Self {
        self.host.version = Some(version.into());
        self
    }

    /// Use `registry` instead of the default one, e.g. for a different
    /// `$self` root.
    pub fn with_registry(mut self, registry: PluginRegistry) -> Self {
        self.plugins = registry;
        self
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut Host {
        &mut self.host
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    pub fn modules(&self) -> &ModuleCache {
        &self.host.modules
    }

    pub fn bus(&self) -> &EventBus {
        &self.host.bus
    }

    pub fn settings(&self) -> &dyn SettingsStore {
        self.host.settings.as_ref()
    }

    pub fn register(&mut self, plugin: impl Plugin + 'static) -> Result<(), PluginError> {
        self.plugins.register(Box::new(plugin))
    }

    pub fn register_boxed(&mut self, plugin: Box<dyn Plugin>) -> Result<(), PluginError> {
        self.plugins.register(plugin)
    }

    pub fn enable(&mut self, name: &str) -> Result<Vec<PatchReport>, PluginError> {
        self.plugins.enable(name, &mut self.host)
    }

    pub fn disable(&mut self, name: &str) -> Result<(), PluginError> {
        self.plugins.disable(name, &mut self.host)
    }

    pub fn plugin_state(&self, name: &str) -> Option<PluginState> {
        self.plugins.state(name)
    }

    /// Enable every plugin the settings ask for. See
    /// [`PluginRegistry::start_all`].
    pub fn start_all(&mut self) -> Vec<(String, Result<Vec<PatchReport>, PluginError>)> {
        self.plugins.start_all(&mut self.host)
    }

    /// Load a module: patch it, store it, then resolve waiters.
    pub fn load_module(
        &mut self,
        id: impl Into<ModuleId>,
        source: impl Into<String>,
        exports: Value,
    ) -> Vec<PatchReport> {
        let mut record = ModuleRecord::new(id, source).with_exports(exports);
        let reports = self.plugins.patch_module(&mut record);
        tracing::trace!(module = %record.id, patches = reports.len(), "module loaded");

        let stored = self.host.modules.insert(record);
        self.host.waiters.notify(stored);
        reports
    }

    pub fn find(&self, filter: &Filter) -> Option<&ModuleRecord> {
        locator::find(&self.host.modules, filter)
    }

    pub fn find_or_err(&self, filter: &Filter) -> Result<&ModuleRecord, LocatorError> {
        locator::find_or_err(&self.host.modules, filter)
    }

    pub fn find_all(&self, filter: &Filter) -> Vec<&ModuleRecord> {
        locator::find_all(&self.host.modules, filter)
    }

    pub fn lazy(&self, filter: Filter) -> LazyModule {
        LazyModule::new(filter)
    }

    pub fn wait_for<F>(&mut self, filter: Filter, callback: F) -> Option<WaiterId>
    where
        F: FnOnce(&ModuleRecord) + 'static,
    {
        self.host
            .waiters
            .wait_for(&self.host.modules, filter, callback)
    }

    pub fn dispatch(&mut self, event: &str, payload: &Value) -> Dispatch {
        self.host.bus.dispatch(event, payload)
    }

    /// Patches of enabled plugins whose target never appeared in any module,
    /// with those already applied by an earlier run told apart.
    pub fn unmatched_patches(&self) -> Vec<PatchReport> {
        self.plugins.unmatched(&self.host.modules)
    }
}
