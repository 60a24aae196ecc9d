//! Host module cache and lookup.
//!
//! The cache owns every loaded [`ModuleRecord`]; everything else refers to
//! modules by [`ModuleId`].

pub mod filters;
pub mod locator;

pub use filters::{by_code, by_export_value, by_props, Filter};
pub use locator::{LazyModule, LocatorError, WaiterId, Waiters};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Key of a module in the host's module cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModuleId {
    Numeric(u64),
    Named(String),
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleId::Numeric(n) => write!(f, "{n}"),
            ModuleId::Named(s) => write!(f, "{s}"),
        }
    }
}

impl From<u64> for ModuleId {
    fn from(n: u64) -> Self {
        ModuleId::Numeric(n)
    }
}

impl From<&str> for ModuleId {
    fn from(s: &str) -> Self {
        match numeric_id(s) {
            Some(n) => ModuleId::Numeric(n),
            None => ModuleId::Named(s.to_string()),
        }
    }
}

impl From<String> for ModuleId {
    fn from(s: String) -> Self {
        match numeric_id(&s) {
            Some(n) => ModuleId::Numeric(n),
            None => ModuleId::Named(s),
        }
    }
}

impl FromStr for ModuleId {
    type Err = std::convert::Infallible;

    /// Canonical decimal ids become numeric, anything else is kept as a name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ModuleId::from(s))
    }
}

/// `s` as a number only when it is written canonically: ASCII digits with
/// no sign and no leading zero. "007" stays a name, so it cannot collide
/// with "7".
fn numeric_id(s: &str) -> Option<u64> {
    let canonical = !s.is_empty()
        && s.bytes().all(|b| b.is_ascii_digit())
        && (s == "0" || !s.starts_with('0'));
    if canonical {
        s.parse().ok()
    } else {
        None
    }
}

/// A loaded code unit: its (possibly patched) source and exported surface.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleRecord {
    pub id: ModuleId,
    pub source: String,
    /// Exported surface, opaque to this crate
    pub exports: serde_json::Value,
    /// Plugins whose patches changed this module, in application order
    pub patched_by: Vec<String>,
}

impl ModuleRecord {
    pub fn new(id: impl Into<ModuleId>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            exports: serde_json::Value::Null,
            patched_by: Vec::new(),
        }
    }

    pub fn with_exports(mut self, exports: serde_json::Value) -> Self {
        self.exports = exports;
        self
    }
}

/// Loaded modules in load order, indexed by id.
#[derive(Debug, Default)]
pub struct ModuleCache {
    modules: Vec<ModuleRecord>,
    index: HashMap<ModuleId, usize>,
}

impl ModuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a module. A module re-registered under an existing id replaces
    /// the old record in place and keeps its load position.
    pub fn insert(&mut self, record: ModuleRecord) -> &ModuleRecord {
        let idx = match self.index.get(&record.id) {
            Some(&idx) => {
                tracing::debug!(module = %record.id, "module reloaded");
                self.modules[idx] = record;
                idx
            }
            None => {
                let idx = self.modules.len();
                self.index.insert(record.id.clone(), idx);
                self.modules.push(record);
                idx
            }
        };
        &self.modules[idx]
    }

    pub fn get(&self, id: &ModuleId) -> Option<&ModuleRecord> {
        self.index.get(id).map(|&idx| &self.modules[idx])
    }

    pub fn get_mut(&mut self, id: &ModuleId) -> Option<&mut ModuleRecord> {
        self.index.get(id).map(|&idx| &mut self.modules[idx])
    }

    pub fn contains(&self, id: &ModuleId) -> bool {
        self.index.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModuleRecord> {
        self.modules.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ModuleRecord> {
        self.modules.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
