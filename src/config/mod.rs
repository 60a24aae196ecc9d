//! Declarative plugin manifests.
//!
//! A manifest is a TOML file describing one plugin: its metadata and its
//! find/replace patches. Manifests are validated as a whole so every
//! problem is reported at once.

pub mod loader;
pub mod schema;
pub mod version;

pub use loader::{load_dir, load_from_path, load_from_str, ConfigError};
pub use schema::{
    ManifestMeta, PatchDefinition, PluginManifest, ReplacementDefinition, ValidationError,
    ValidationIssue,
};
pub use version::{host_in_range, parse_range, HostVersion, VersionError};
