//! Plugins: named sets of patches plus start/stop hooks.
//!
//! A plugin talks to the host only through [`PluginContext`]. Every
//! listener, interceptor and parked `wait_for` callback it installs through
//! the context is recorded, so disabling the plugin removes them even when
//! `stop` forgets to.

pub mod declarative;
pub mod errors;
pub mod registry;

pub use declarative::DeclarativePlugin;
pub use errors::PluginError;
pub use registry::{PluginRegistry, PluginState};

use crate::events::{Dispatch, ListenerId};
use crate::modules::{locator, Filter, ModuleCache, ModuleRecord, WaiterId};
use crate::patch::Patch;
use crate::runtime::Host;
use crate::settings::SettingsError;
use serde_json::Value;

/// Result of a lifecycle hook. Any error counts as the hook throwing.
pub type HookResult = Result<(), Box<dyn std::error::Error>>;

pub trait Plugin {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Plugins enabled before this one. A soft ordering hint: honored by
    /// load order and by `enable`, never enforced transactionally.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Required plugins are always enabled and cannot be disabled.
    fn required(&self) -> bool {
        false
    }

    fn enabled_by_default(&self) -> bool {
        false
    }

    /// Semver range of host builds the patches were written against.
    fn host_version_range(&self) -> Option<&str> {
        None
    }

    fn patches(&self) -> Vec<Patch> {
        Vec::new()
    }

    fn start(&mut self, _ctx: &mut PluginContext<'_>) -> HookResult {
        Ok(())
    }

    fn stop(&mut self, _ctx: &mut PluginContext<'_>) -> HookResult {
        Ok(())
    }
}

/// Runtime hooks one plugin has installed.
#[derive(Debug, Default)]
pub(crate) struct Hooks {
    listeners: Vec<ListenerId>,
    waiters: Vec<WaiterId>,
}

impl Hooks {
    pub(crate) fn len(&self) -> usize {
        self.listeners.len() + self.waiters.len()
    }

    pub(crate) fn extend(&mut self, other: Hooks) {
        self.listeners.extend(other.listeners);
        self.waiters.extend(other.waiters);
    }

    /// Unsubscribe every listener and cancel every still-parked waiter.
    /// Returns how many were actually removed.
    pub(crate) fn remove_from(self, host: &mut Host) -> usize {
        let listeners = self
            .listeners
            .into_iter()
            .filter(|id| host.bus.unsubscribe(*id))
            .count();
        let waiters = self
            .waiters
            .into_iter()
            .filter(|id| host.waiters.cancel(*id))
            .count();
        listeners + waiters
    }
}

/// Host access handed to lifecycle hooks.
pub struct PluginContext<'a> {
    plugin: &'a str,
    host: &'a mut Host,
    hooks: &'a mut Hooks,
}

impl<'a> PluginContext<'a> {
    pub(crate) fn new(plugin: &'a str, host: &'a mut Host, hooks: &'a mut Hooks) -> Self {
        Self {
            plugin,
            host,
            hooks,
        }
    }

    pub fn plugin_name(&self) -> &str {
        self.plugin
    }

    /// Listen for an event type. Removed automatically on disable.
    pub fn subscribe<F>(&mut self, event: &str, handler: F) -> ListenerId
    where
        F: FnMut(&Value) + 'static,
    {
        let id = self.host.bus.subscribe(event, handler);
        self.hooks.listeners.push(id);
        id
    }

    /// Intercept every event; returning `true` swallows it. Removed
    /// automatically on disable.
    pub fn intercept<F>(&mut self, interceptor: F) -> ListenerId
    where
        F: FnMut(&str, &Value) -> bool + 'static,
    {
        let id = self.host.bus.intercept(interceptor);
        self.hooks.listeners.push(id);
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.hooks.listeners.retain(|h| *h != id);
        self.host.bus.unsubscribe(id)
    }

    pub fn dispatch(&mut self, event: &str, payload: &Value) -> Dispatch {
        self.host.bus.dispatch(event, payload)
    }

    pub fn modules(&self) -> &ModuleCache {
        &self.host.modules
    }

    pub fn find_module(&self, filter: &Filter) -> Option<&ModuleRecord> {
        locator::find(&self.host.modules, filter)
    }

    /// Deferred module lookup. A callback still parked when the plugin is
    /// disabled is dropped without running.
    pub fn wait_for<F>(&mut self, filter: Filter, callback: F) -> Option<WaiterId>
    where
        F: FnOnce(&ModuleRecord) + 'static,
    {
        let id = self
            .host
            .waiters
            .wait_for(&self.host.modules, filter, callback)?;
        self.hooks.waiters.push(id);
        Some(id)
    }

    pub fn setting(&self, key: &str) -> Option<Value> {
        self.host.settings.get(self.plugin, key)
    }

    pub fn set_setting(&mut self, key: &str, value: Value) -> Result<(), SettingsError> {
        self.host.settings.set(self.plugin, key, value)
    }
}
