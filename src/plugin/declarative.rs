//! Plugins defined entirely by a TOML manifest.

use crate::config::PluginManifest;
use crate::matcher::MatcherError;
use crate::patch::Patch;
use crate::plugin::Plugin;

/// A plugin with patches and metadata but no lifecycle hooks.
#[derive(Debug, Clone)]
pub struct DeclarativePlugin {
    manifest: PluginManifest,
    patches: Vec<Patch>,
}

impl DeclarativePlugin {
    /// Compile the manifest's patches. Manifests from
    /// [`load_from_path`](crate::config::load_from_path) are already
    /// validated, so this only fails for hand-built manifests.
    pub fn from_manifest(manifest: PluginManifest) -> Result<Self, MatcherError> {
        let patches = manifest.build_patches()?;
        Ok(Self { manifest, patches })
    }

    pub fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }
}

impl Plugin for DeclarativePlugin {
    fn name(&self) -> &str {
        &self.manifest.plugin.name
    }

    fn description(&self) -> &str {
        self.manifest.plugin.description.as_deref().unwrap_or("")
    }

    fn dependencies(&self) -> Vec<String> {
        self.manifest.plugin.dependencies.clone()
    }

    fn required(&self) -> bool {
        self.manifest.plugin.required
    }

    fn enabled_by_default(&self) -> bool {
        self.manifest.plugin.enabled_by_default
    }

    fn host_version_range(&self) -> Option<&str> {
        self.manifest.plugin.host_version_range.as_deref()
    }

    fn patches(&self) -> Vec<Patch> {
        self.patches.clone()
    }
}
