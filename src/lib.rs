//! hostpatch: pattern-based source patching for modular host applications
//!
//! A host application loads its code as a set of modules. Plugins carry
//! find/replace patches that rewrite module source as it loads, plus
//! start/stop hooks that install runtime listeners.
//!
//! # Architecture
//!
//! Every source change compiles down to a single primitive: [`Edit`], a
//! verified byte-span replacement. Patches only decide *where* edits go
//! (a find target selects the module, regex replacements select the
//! spans); applying them is always the same checked splice.
//!
//! - [`matcher`]: regex compilation with the `\i` identifier shorthand
//! - [`patch`]: patches and their application to module source
//! - [`modules`]: the module cache and lookups over it
//! - [`plugin`]: plugins, their lifecycle and the registry
//! - [`runtime`]: the context object owning all of the above
//!
//! # Failure isolation
//!
//! - A patch that misses its target or throws is reported and skipped
//! - A plugin whose `start` fails stays disabled; others still load
//! - Panics in plugin-supplied closures are caught and reported
//!
//! # Example
//!
//! ```
//! use hostpatch::{Patch, Plugin, Replacement, Runtime};
//!
//! struct Subtract;
//!
//! impl Plugin for Subtract {
//!     fn name(&self) -> &str {
//!         "Subtract"
//!     }
//!
//!     fn patches(&self) -> Vec<Patch> {
//!         vec![Patch::new("a+b").replacement(Replacement::new(r"a\+b", "a-b").unwrap())]
//!     }
//! }
//!
//! let mut runtime = Runtime::default();
//! runtime.register(Subtract).unwrap();
//! runtime.enable("Subtract").unwrap();
//! runtime.load_module(1u64, "function f(a,b){return a+b}", serde_json::Value::Null);
//!
//! let module = runtime.modules().iter().next().unwrap();
//! assert_eq!(module.source, "function f(a,b){return a-b}");
//! ```

pub mod bundle;
pub mod cache;
pub mod config;
pub mod edit;
pub mod events;
mod guard;
pub mod matcher;
pub mod modules;
pub mod patch;
pub mod plugin;
pub mod runtime;
pub mod settings;

// Re-exports
pub use config::{load_from_path, load_from_str, ConfigError, PluginManifest};
pub use edit::{Edit, EditError, EditResult, EditVerification};
pub use events::{Dispatch, EventBus, ListenerId};
pub use matcher::{MatcherError, PatternMatch, PatternMatcher};
pub use modules::{
    Filter, LazyModule, LocatorError, ModuleCache, ModuleId, ModuleRecord, WaiterId,
};
pub use patch::{
    apply_patch, apply_patches, Find, Patch, PatchError, PatchOutcome, PatchReport, Replacement,
};
pub use plugin::{DeclarativePlugin, Plugin, PluginContext, PluginError, PluginRegistry, PluginState};
pub use runtime::{Host, Runtime};
pub use settings::{JsonFileStore, MemoryStore, SettingsError, SettingsStore};
