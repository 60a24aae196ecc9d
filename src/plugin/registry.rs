//! Plugin registry - lifecycle of registered plugins
//!
//! Plugins are kept in registration order. Enabling a plugin:
//! 1. enables its dependencies first
//! 2. applies its patches to every module already loaded (once per process)
//! 3. runs its `start` hook
//!
//! Disabling runs `stop` and removes every runtime hook the plugin installed.
//! Patches already baked into module source stay in place.

use crate::guard;
use crate::patch::{find_applied, patch_module, PatchError, PatchOutcome, PatchReport, PendingPatch};
use crate::plugin::errors::PluginError;
use crate::plugin::{Hooks, Plugin, PluginContext};
use crate::runtime::Host;
use crate::config::HostVersion;
use crate::modules::{ModuleCache, ModuleRecord};
use std::collections::HashMap;
use std::fmt;

/// Root of the `$self` expression: `plugins["<name>"]`.
pub const DEFAULT_SELF_ROOT: &str = "plugins";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    Registered,
    Enabled,
    Disabled,
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginState::Registered => write!(f, "registered"),
            PluginState::Enabled => write!(f, "enabled"),
            PluginState::Disabled => write!(f, "disabled"),
        }
    }
}

struct PluginEntry {
    plugin: Box<dyn Plugin>,
    state: PluginState,
    /// Patches still waiting for a matching module
    pending: Vec<PendingPatch>,
    /// Set once the plugin's patches have been collected; never reset
    patches_loaded: bool,
    /// Runtime hooks installed through the plugin's context
    hooks: Hooks,
}

impl fmt::Debug for PluginEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginEntry")
            .field("name", &self.plugin.name())
            .field("state", &self.state)
            .field("pending", &self.pending.len())
            .field("patches_loaded", &self.patches_loaded)
            .field("hooks", &self.hooks)
            .finish()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Done,
}

#[derive(Debug)]
pub struct PluginRegistry {
    entries: Vec<PluginEntry>,
    index: HashMap<String, usize>,
    self_root: String,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::with_self_root(DEFAULT_SELF_ROOT)
    }

    /// Registry whose `$self` expressions are rooted at `root`.
    pub fn with_self_root(root: impl Into<String>) -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            self_root: root.into(),
        }
    }

    /// Expression substituted for `$self` in the named plugin's patches.
    pub fn self_ref(&self, name: &str) -> String {
        let quoted = serde_json::Value::String(name.to_string());
        format!("{}[{}]", self.self_root, quoted)
    }

    pub fn register(&mut self, plugin: Box<dyn Plugin>) -> Result<(), PluginError> {
        let name = plugin.name().to_string();
        if self.index.contains_key(&name) {
            return Err(PluginError::Duplicate { name });
        }
        tracing::debug!(plugin = %name, "plugin registered");
        self.index.insert(name, self.entries.len());
        self.entries.push(PluginEntry {
            plugin,
            state: PluginState::Registered,
            pending: Vec::new(),
            patches_loaded: false,
            hooks: Hooks::default(),
        });
        Ok(())
    }

    fn index_of(&self, name: &str) -> Result<usize, PluginError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| PluginError::NotFound {
                name: name.to_string(),
            })
    }

    pub fn state(&self, name: &str) -> Option<PluginState> {
        self.index.get(name).map(|&idx| self.entries[idx].state)
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.state(name) == Some(PluginState::Enabled)
    }

    pub fn plugin(&self, name: &str) -> Option<&dyn Plugin> {
        self.index
            .get(name)
            .map(|&idx| self.entries[idx].plugin.as_ref())
    }

    /// Plugin names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.plugin.name()).collect()
    }

    /// Runtime hooks the plugin currently has installed.
    pub fn hook_count(&self, name: &str) -> usize {
        self.index
            .get(name)
            .map_or(0, |&idx| self.entries[idx].hooks.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registration order, with each plugin's registered dependencies moved
    /// ahead of it. Cycles are broken at the back edge.
    pub fn load_order(&self) -> Vec<String> {
        let mut marks = vec![Mark::Unvisited; self.entries.len()];
        let mut order = Vec::with_capacity(self.entries.len());
        for idx in 0..self.entries.len() {
            self.visit(idx, &mut marks, &mut order);
        }
        order
    }

    fn visit(&self, idx: usize, marks: &mut [Mark], order: &mut Vec<String>) {
        match marks[idx] {
            Mark::Done => return,
            Mark::Visiting => {
                tracing::warn!(
                    plugin = %self.entries[idx].plugin.name(),
                    "dependency cycle, falling back to registration order"
                );
                return;
            }
            Mark::Unvisited => {}
        }
        marks[idx] = Mark::Visiting;
        for dep in self.entries[idx].plugin.dependencies() {
            if let Some(&dep_idx) = self.index.get(&dep) {
                self.visit(dep_idx, marks, order);
            }
        }
        marks[idx] = Mark::Done;
        order.push(self.entries[idx].plugin.name().to_string());
    }

    /// Enable a plugin and, first, its dependencies.
    ///
    /// Returns the reports of every patch applied along the way. Enabling an
    /// enabled plugin is a no-op.
    pub fn enable(&mut self, name: &str, host: &mut Host) -> Result<Vec<PatchReport>, PluginError> {
        let mut chain = Vec::new();
        self.enable_inner(name, host, &mut chain)
    }

    fn enable_inner(
        &mut self,
        name: &str,
        host: &mut Host,
        chain: &mut Vec<String>,
    ) -> Result<Vec<PatchReport>, PluginError> {
        let idx = self.index_of(name)?;
        if self.entries[idx].state == PluginState::Enabled {
            return Ok(Vec::new());
        }
        if chain.iter().any(|c| c == name) {
            tracing::warn!(plugin = %name, "dependency cycle, continuing without it");
            return Ok(Vec::new());
        }

        chain.push(name.to_string());
        let deps = self.enable_dependencies(idx, host, chain);
        chain.pop();
        let mut reports = deps?;

        reports.extend(self.load_patches(idx, host));
        self.start_entry(idx, host)?;
        Ok(reports)
    }

    fn enable_dependencies(
        &mut self,
        idx: usize,
        host: &mut Host,
        chain: &mut Vec<String>,
    ) -> Result<Vec<PatchReport>, PluginError> {
        let plugin = self.entries[idx].plugin.name().to_string();
        let mut reports = Vec::new();
        for dependency in self.entries[idx].plugin.dependencies() {
            if !self.index.contains_key(&dependency) {
                return Err(PluginError::DependencyMissing { plugin, dependency });
            }
            match self.enable_inner(&dependency, host, chain) {
                Ok(r) => reports.extend(r),
                Err(source) => {
                    return Err(PluginError::DependencyFailed {
                        plugin,
                        dependency,
                        source: Box::new(source),
                    })
                }
            }
        }
        Ok(reports)
    }

    /// Collect the plugin's patches and run them over loaded modules.
    fn load_patches(&mut self, idx: usize, host: &mut Host) -> Vec<PatchReport> {
        if self.entries[idx].patches_loaded {
            return Vec::new();
        }
        let name = self.entries[idx].plugin.name().to_string();
        let self_ref = self.self_ref(&name);
        let entry = &mut self.entries[idx];
        entry.patches_loaded = true;

        let version_skip = version_skip_reason(
            &name,
            entry.plugin.host_version_range(),
            host.version.as_deref(),
        );

        // Predicates are asked per module in `patch_module`, not here
        let mut reports = Vec::new();
        for patch in entry.plugin.patches() {
            match &version_skip {
                Some(reason) => reports.push(PatchReport {
                    plugin: name.clone(),
                    patch: patch.label(),
                    module: None,
                    result: Ok(PatchOutcome::SkippedVersion {
                        reason: reason.clone(),
                    }),
                }),
                None => entry.pending.push(PendingPatch::new(patch)),
            }
        }

        for module in host.modules.iter_mut() {
            if entry.pending.is_empty() {
                break;
            }
            reports.extend(patch_module(&name, &self_ref, &mut entry.pending, module));
        }
        reports
    }

    fn start_entry(&mut self, idx: usize, host: &mut Host) -> Result<(), PluginError> {
        let entry = &mut self.entries[idx];
        let name = entry.plugin.name().to_string();
        let mut hooks = Hooks::default();

        let outcome = {
            let mut ctx = PluginContext::new(&name, host, &mut hooks);
            let plugin = &mut entry.plugin;
            guard::catch(|| plugin.start(&mut ctx))
        };

        if let Some(message) = hook_failure(outcome) {
            // A half-started plugin keeps nothing it installed
            hooks.remove_from(host);
            tracing::error!(plugin = %name, "plugin failed to start: {message}");
            return Err(PluginError::StartFailed {
                plugin: name,
                message,
            });
        }

        entry.hooks.extend(hooks);
        entry.state = PluginState::Enabled;
        if let Err(e) = host.settings.set_enabled(&name, true) {
            tracing::warn!(plugin = %name, "could not persist enabled state: {e}");
        }
        tracing::info!(plugin = %name, hooks = entry.hooks.len(), "plugin started");
        Ok(())
    }

    /// Stop a plugin and remove its runtime hooks.
    ///
    /// Disabling a plugin that is not enabled is a no-op. The plugin ends up
    /// disabled even when `stop` fails; the failure is still returned.
    pub fn disable(&mut self, name: &str, host: &mut Host) -> Result<(), PluginError> {
        let idx = self.index_of(name)?;
        if self.entries[idx].state != PluginState::Enabled {
            return Ok(());
        }
        if self.entries[idx].plugin.required() {
            return Err(PluginError::Required {
                plugin: name.to_string(),
            });
        }

        let dependents: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.state == PluginState::Enabled)
            .filter(|e| e.plugin.dependencies().iter().any(|d| d == name))
            .map(|e| e.plugin.name().to_string())
            .collect();
        if !dependents.is_empty() {
            return Err(PluginError::DependentsEnabled {
                plugin: name.to_string(),
                dependents,
            });
        }

        let entry = &mut self.entries[idx];
        let mut hooks = std::mem::take(&mut entry.hooks);
        let outcome = {
            let mut ctx = PluginContext::new(name, host, &mut hooks);
            let plugin = &mut entry.plugin;
            guard::catch(|| plugin.stop(&mut ctx))
        };

        let removed = hooks.remove_from(host);
        entry.state = PluginState::Disabled;
        if let Err(e) = host.settings.set_enabled(name, false) {
            tracing::warn!(plugin = %name, "could not persist disabled state: {e}");
        }
        tracing::info!(plugin = %name, removed, "plugin stopped");

        match hook_failure(outcome) {
            Some(message) => {
                tracing::error!(plugin = %name, "plugin failed to stop cleanly: {message}");
                Err(PluginError::StopFailed {
                    plugin: name.to_string(),
                    message,
                })
            }
            None => Ok(()),
        }
    }

    /// Enable every plugin the settings ask for, in load order.
    ///
    /// A plugin is wanted when it is required, or when its persisted enabled
    /// flag is set, or, if never toggled, when it is enabled by default. One
    /// plugin failing never stops the others.
    pub fn start_all(
        &mut self,
        host: &mut Host,
    ) -> Vec<(String, Result<Vec<PatchReport>, PluginError>)> {
        let mut results = Vec::new();
        for name in self.load_order() {
            let Some(plugin) = self.plugin(&name) else {
                continue;
            };
            let wanted = plugin.required()
                || host
                    .settings
                    .is_enabled(&name)
                    .unwrap_or_else(|| plugin.enabled_by_default());
            if !wanted || self.is_enabled(&name) {
                continue;
            }

            let result = self.enable(&name, host);
            if let Err(e) = &result {
                tracing::error!(plugin = %name, "plugin failed to load: {e}");
            }
            results.push((name, result));
        }
        results
    }

    /// Run the pending patches of every enabled plugin over a module that
    /// is being loaded, in registration order.
    pub fn patch_module(&mut self, module: &mut ModuleRecord) -> Vec<PatchReport> {
        let mut reports = Vec::new();
        for idx in 0..self.entries.len() {
            let entry = &self.entries[idx];
            if entry.state != PluginState::Enabled || entry.pending.is_empty() {
                continue;
            }
            let name = entry.plugin.name().to_string();
            let self_ref = self.self_ref(&name);
            let entry = &mut self.entries[idx];
            reports.extend(patch_module(&name, &self_ref, &mut entry.pending, module));
        }
        reports
    }

    /// Patches of enabled plugins that never found their target in any
    /// loaded module.
    ///
    /// A patch whose fixed output text is already present in a module is
    /// reported as `AlreadyApplied` against that module (the bundle was
    /// patched by an earlier run); the rest are `TargetNotFound`. Patches
    /// whose predicate currently says no are left out.
    pub fn unmatched(&self, modules: &ModuleCache) -> Vec<PatchReport> {
        let mut reports = Vec::new();
        for entry in self.entries.iter().filter(|e| e.state == PluginState::Enabled) {
            let unseen = entry
                .pending
                .iter()
                .filter(|p| p.hits == 0 && p.patch.is_enabled());
            for pending in unseen {
                let (module, result) = match find_applied(&pending.patch, modules) {
                    Some(module) => (Some(module.id.clone()), Ok(PatchOutcome::AlreadyApplied)),
                    None => (
                        None,
                        Err(PatchError::TargetNotFound {
                            find: pending.patch.find.to_string(),
                        }),
                    ),
                };
                reports.push(PatchReport {
                    plugin: entry.plugin.name().to_string(),
                    patch: pending.patch.label(),
                    module,
                    result,
                });
            }
        }
        reports
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn hook_failure(outcome: Result<crate::plugin::HookResult, String>) -> Option<String> {
    match outcome {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(panic) => Some(format!("panicked: {panic}")),
    }
}

/// Why a plugin's patches are skipped on this host, if they are.
///
/// A host version or range that cannot be parsed skips too: the patches
/// were written against builds nobody can identify.
fn version_skip_reason(plugin: &str, range: Option<&str>, host: Option<&str>) -> Option<String> {
    let (Some(range), Some(host)) = (range, host) else {
        return None;
    };
    let checked = host
        .parse::<HostVersion>()
        .and_then(|version| version.satisfies(range));
    match checked {
        Ok(true) => None,
        Ok(false) => Some(format!("host version {host} does not satisfy {range}")),
        Err(e) => {
            tracing::warn!(plugin = %plugin, "cannot check host version: {e}");
            Some(e.to_string())
        }
    }
}
