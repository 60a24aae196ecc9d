//! Patch applicator - runs find/replace rules against module source
//!
//! This module provides patch application that:
//! - Checks the find target before touching any replacement
//! - Splices every regex match through the verified [`Edit`] primitive
//! - Rolls grouped patches back when one of their replacements fails
//! - Reports a result per patch, tagged with plugin and module identity

use crate::edit::{Edit, EditResult};
use crate::guard;
use crate::matcher::PatternMatch;
use crate::modules::{ModuleCache, ModuleId, ModuleRecord};
use crate::patch::errors::PatchError;
use crate::patch::schema::{Patch, Replace, Replacement};
use regex::Captures;
use std::borrow::Cow;
use std::fmt;

/// Successful (or deliberately skipped) outcome of a patch.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "PatchOutcome should be checked for success/failure"]
pub enum PatchOutcome {
    /// Source was changed by this many replacements
    Applied { replacements: usize },
    /// Every replacement matched but produced the text already present
    AlreadyApplied,
    /// The patch predicate returned false
    SkippedPredicate,
    /// The plugin's host version range excludes the running host
    SkippedVersion { reason: String },
}

impl fmt::Display for PatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchOutcome::Applied { replacements } => {
                write!(f, "Applied ({replacements} replacements)")
            }
            PatchOutcome::AlreadyApplied => write!(f, "Already applied"),
            PatchOutcome::SkippedPredicate => write!(f, "Skipped (predicate)"),
            PatchOutcome::SkippedVersion { reason } => write!(f, "Skipped (version): {reason}"),
        }
    }
}

/// Result of one patch, with the identity needed to diagnose it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchReport {
    pub plugin: String,
    pub patch: String,
    /// Module the patch ran against; `None` for plain haystacks and for
    /// patches skipped before any module was inspected.
    pub module: Option<ModuleId>,
    pub result: Result<PatchOutcome, PatchError>,
}

impl PatchReport {
    pub fn is_failure(&self) -> bool {
        self.result.is_err()
    }

    fn log(&self, no_warn: bool) {
        let Err(error) = &self.result else {
            tracing::debug!(
                plugin = %self.plugin,
                patch = %self.patch,
                module = ?self.module,
                "patch ok"
            );
            return;
        };
        if no_warn {
            tracing::debug!(
                plugin = %self.plugin,
                patch = %self.patch,
                module = ?self.module,
                kind = error.kind(),
                "patch failed: {error}"
            );
        } else {
            tracing::warn!(
                plugin = %self.plugin,
                patch = %self.patch,
                module = ?self.module,
                kind = error.kind(),
                "patch failed: {error}"
            );
        }
    }
}

/// Source after a patch ran, plus the patch result.
///
/// On failure `code` still carries any replacements that succeeded, unless
/// the patch is grouped, in which case it is the untouched input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchApplication {
    pub code: String,
    pub result: Result<PatchOutcome, PatchError>,
}

/// Output of running a patch list over a single haystack.
#[derive(Debug, Clone)]
pub struct PatchRun {
    pub output: String,
    pub reports: Vec<PatchReport>,
}

/// A patch waiting for modules to load.
#[derive(Debug, Clone)]
pub struct PendingPatch {
    pub patch: Patch,
    /// Number of modules the patch has run against so far
    pub hits: usize,
}

impl PendingPatch {
    pub fn new(patch: Patch) -> Self {
        Self { patch, hits: 0 }
    }
}

/// Apply one patch to `source`.
///
/// `self_ref` is the expression substituted for `$self` in templates.
/// Never panics on plugin code: a panicking replacement closure is
/// reported as [`PatchError::ReplacementThrew`].
pub fn apply_patch(patch: &Patch, source: &str, self_ref: &str) -> PatchApplication {
    if !patch.find.locate(source) {
        return PatchApplication {
            code: source.to_string(),
            result: Err(PatchError::TargetNotFound {
                find: patch.find.to_string(),
            }),
        };
    }

    let mut code = source.to_string();
    let mut applied = 0;
    let mut first_error = None;

    for (index, replacement) in patch.replacements.iter().enumerate() {
        match apply_replacement(replacement, index, &mut code, self_ref) {
            Ok(true) => applied += 1,
            Ok(false) => {}
            Err(error) if patch.group => {
                return PatchApplication {
                    code: source.to_string(),
                    result: Err(error),
                };
            }
            Err(error) => {
                first_error.get_or_insert(error);
            }
        }
    }

    let result = match first_error {
        Some(error) => Err(error),
        None if applied == 0 => Ok(PatchOutcome::AlreadyApplied),
        None => Ok(PatchOutcome::Applied {
            replacements: applied,
        }),
    };
    PatchApplication { code, result }
}

/// Apply `patches` in order to a single haystack.
///
/// Later patches observe the output of earlier ones. Failures are logged
/// and reported; they never stop the remaining patches.
pub fn apply_patches(plugin: &str, patches: &[Patch], haystack: &str, self_ref: &str) -> PatchRun {
    let mut output = haystack.to_string();
    let mut reports = Vec::with_capacity(patches.len());

    for patch in patches {
        let result = if patch.is_enabled() {
            let application = apply_patch(patch, &output, self_ref);
            output = application.code;
            application.result
        } else {
            Ok(PatchOutcome::SkippedPredicate)
        };

        let report = PatchReport {
            plugin: plugin.to_string(),
            patch: patch.label(),
            module: None,
            result,
        };
        report.log(patch.no_warn);
        reports.push(report);
    }

    PatchRun { output, reports }
}

/// Run a plugin's pending patches against a freshly loaded module.
///
/// Patches whose target is absent from this module stay pending and produce
/// no report. The predicate is asked for every module the target is found
/// in; when it says no, the module is reported as skipped and the patch
/// stays pending for later modules. A patch that ran is consumed unless it
/// is marked `all`.
pub fn patch_module(
    plugin: &str,
    self_ref: &str,
    pending: &mut Vec<PendingPatch>,
    module: &mut ModuleRecord,
) -> Vec<PatchReport> {
    let mut reports = Vec::new();
    let mut i = 0;

    while i < pending.len() {
        if !pending[i].patch.find.locate(&module.source) {
            i += 1;
            continue;
        }

        let entry = &mut pending[i];
        if !entry.patch.is_enabled() {
            let report = PatchReport {
                plugin: plugin.to_string(),
                patch: entry.patch.label(),
                module: Some(module.id.clone()),
                result: Ok(PatchOutcome::SkippedPredicate),
            };
            report.log(entry.patch.no_warn);
            reports.push(report);
            i += 1;
            continue;
        }

        entry.hits += 1;
        let application = apply_patch(&entry.patch, &module.source, self_ref);
        if application.code != module.source {
            module.source = application.code;
            if !module.patched_by.iter().any(|p| p == plugin) {
                module.patched_by.push(plugin.to_string());
            }
        }

        let report = PatchReport {
            plugin: plugin.to_string(),
            patch: entry.patch.label(),
            module: Some(module.id.clone()),
            result: application.result,
        };
        report.log(entry.patch.no_warn);
        reports.push(report);

        if entry.patch.all {
            i += 1;
        } else {
            pending.remove(i);
        }
    }

    reports
}

/// Module already carrying the output of a patch whose target is gone.
///
/// Only answerable for patches made of plain templates: every replacement
/// must produce fixed, non-empty text with no capture or `$self` tokens,
/// and one module must contain all of it.
pub fn find_applied<'a>(patch: &Patch, modules: &'a ModuleCache) -> Option<&'a ModuleRecord> {
    if patch.replacements.is_empty() {
        return None;
    }
    let texts = patch
        .replacements
        .iter()
        .map(|r| match &r.replace {
            Replace::Template(t) if !t.is_empty() && !t.contains('$') => Some(t.as_str()),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;
    modules
        .iter()
        .find(|m| texts.iter().all(|t| m.source.contains(t)))
}

/// Returns whether the replacement changed `code`.
fn apply_replacement(
    replacement: &Replacement,
    index: usize,
    code: &mut String,
    self_ref: &str,
) -> Result<bool, PatchError> {
    let pattern = replacement.matcher.as_str();
    let threw = |message: String| PatchError::ReplacementThrew {
        index,
        pattern: pattern.to_string(),
        message,
    };

    let edits = {
        let regex = replacement.matcher.regex();
        let haystack = code.as_str();
        let captures: Vec<Captures<'_>> = if replacement.global {
            regex.captures_iter(haystack).collect()
        } else {
            regex.captures(haystack).into_iter().collect()
        };

        if captures.is_empty() {
            return Err(PatchError::RegexNoMatch {
                index,
                pattern: pattern.to_string(),
            });
        }

        let mut edits = Vec::with_capacity(captures.len());
        for caps in &captures {
            let whole = caps.get(0).expect("group 0 is always present in a match");
            let new_text = match &replacement.replace {
                Replace::Template(template) => expand_template(template, caps, self_ref),
                Replace::Fn(f) => {
                    let found = PatternMatch::from_captures(regex, caps);
                    guard::catch(|| f(&found))
                        .and_then(|r| r)
                        .map_err(&threw)?
                }
            };
            edits.push(Edit::new(whole.start(), whole.end(), new_text, whole.as_str()));
        }
        edits
    };

    let results = Edit::apply_batch(&edits, code).map_err(|e| threw(e.to_string()))?;
    Ok(results
        .iter()
        .any(|r| matches!(r, EditResult::Applied { .. })))
}

/// Expand `$self` and then regex capture references (`$1`, `${name}`, `$$`).
fn expand_template(template: &str, caps: &Captures<'_>, self_ref: &str) -> String {
    let mut dst = String::new();
    caps.expand(&substitute_self(template, self_ref), &mut dst);
    dst
}

/// Swap each `$self` token for `self_ref`, escaped for capture expansion.
///
/// `$$` stays an escaped dollar, so `$$self` expands to a literal `$self`.
/// `$selfish` is not a `$self` token and is left to the capture expander.
fn substitute_self<'t>(template: &'t str, self_ref: &str) -> Cow<'t, str> {
    if !template.contains("$self") {
        return Cow::Borrowed(template);
    }
    let escaped = self_ref.replace('$', "$$");
    let mut out = String::with_capacity(template.len() + escaped.len());
    let mut rest = template;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        if let Some(after) = tail.strip_prefix("$$") {
            out.push_str("$$");
            rest = after;
        } else if let Some(after) = tail
            .strip_prefix("$self")
            .filter(|after| !after.starts_with(is_ident_char))
        {
            out.push_str(&escaped);
            rest = after;
        } else {
            out.push('$');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}
