use crate::matcher::{MatcherError, PatternMatcher};
use crate::patch::{Find, Patch, Replacement};
use crate::config::version::parse_range;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;

/// A declarative plugin: metadata plus find/replace patches.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct PluginManifest {
    #[serde(default)]
    pub plugin: ManifestMeta,
    #[serde(default)]
    pub patches: Vec<PatchDefinition>,
}

impl PluginManifest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.plugin.name.trim().is_empty() {
            issues.push(ValidationIssue::MissingField {
                patch_id: None,
                field: "plugin.name",
            });
        }

        if let Some(range) = &self.plugin.host_version_range {
            if let Err(e) = parse_range(range) {
                issues.push(ValidationIssue::InvalidCombo {
                    patch_id: None,
                    message: format!("host_version_range: {e}"),
                });
            }
        }

        let mut seen = HashSet::new();
        for patch in &self.patches {
            let id = patch.label();
            if patch.id.as_deref().is_some_and(|id| id.trim().is_empty()) {
                issues.push(ValidationIssue::MissingField {
                    patch_id: None,
                    field: "id",
                });
            }
            if let Some(explicit) = &patch.id {
                if !seen.insert(explicit.as_str()) {
                    issues.push(ValidationIssue::DuplicateId {
                        patch_id: explicit.clone(),
                    });
                }
            }

            match (&patch.find, &patch.find_regex) {
                (None, None) => issues.push(ValidationIssue::MissingField {
                    patch_id: Some(id.clone()),
                    field: "find",
                }),
                (Some(_), Some(_)) => issues.push(ValidationIssue::InvalidCombo {
                    patch_id: Some(id.clone()),
                    message: "find and find_regex cannot both be set".to_string(),
                }),
                (Some(find), None) if find.is_empty() => {
                    issues.push(ValidationIssue::MissingField {
                        patch_id: Some(id.clone()),
                        field: "find",
                    })
                }
                (None, Some(pattern)) => {
                    if let Err(e) = PatternMatcher::new(pattern) {
                        issues.push(ValidationIssue::InvalidPattern {
                            patch_id: id.clone(),
                            source: e,
                        });
                    }
                }
                (Some(_), None) => {}
            }

            if patch.replacements.is_empty() {
                issues.push(ValidationIssue::MissingField {
                    patch_id: Some(id.clone()),
                    field: "replacements",
                });
            }
            for replacement in &patch.replacements {
                if let Err(e) = PatternMatcher::new(&replacement.pattern) {
                    issues.push(ValidationIssue::InvalidPattern {
                        patch_id: id.clone(),
                        source: e,
                    });
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    /// Compile the patch definitions, in file order.
    pub fn build_patches(&self) -> Result<Vec<Patch>, MatcherError> {
        self.patches.iter().map(PatchDefinition::build).collect()
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ManifestMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub enabled_by_default: bool,
    /// Semver range of host builds the patches target, e.g. ">=1.2.0, <2.0.0"
    #[serde(default)]
    pub host_version_range: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PatchDefinition {
    #[serde(default)]
    pub id: Option<String>,
    /// Literal text the target module must contain
    #[serde(default)]
    pub find: Option<String>,
    /// Pattern the target module must match, `\i` allowed
    #[serde(default)]
    pub find_regex: Option<String>,
    #[serde(default)]
    pub all: bool,
    #[serde(default)]
    pub group: bool,
    #[serde(default)]
    pub no_warn: bool,
    #[serde(default)]
    pub replacements: Vec<ReplacementDefinition>,
}

impl PatchDefinition {
    /// Identity used in validation messages.
    pub fn label(&self) -> String {
        self.id
            .clone()
            .or_else(|| self.find.clone())
            .or_else(|| self.find_regex.clone())
            .unwrap_or_else(|| "<unnamed>".to_string())
    }

    fn build(&self) -> Result<Patch, MatcherError> {
        let find = match (&self.find_regex, &self.find) {
            (Some(pattern), _) => Find::regex(pattern)?,
            (None, Some(text)) => Find::from(text.as_str()),
            (None, None) => Find::from(""),
        };

        let mut patch = Patch::new(find)
            .all(self.all)
            .group(self.group)
            .no_warn(self.no_warn);
        if let Some(id) = &self.id {
            patch = patch.id(id);
        }
        for def in &self.replacements {
            patch = patch.replacement(Replacement::new(&def.pattern, &def.replace)?.global(def.global));
        }
        Ok(patch)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReplacementDefinition {
    #[serde(rename = "match")]
    pub pattern: String,
    pub replace: String,
    #[serde(default)]
    pub global: bool,
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    MissingField {
        patch_id: Option<String>,
        field: &'static str,
    },
    InvalidCombo {
        patch_id: Option<String>,
        message: String,
    },
    InvalidPattern {
        patch_id: String,
        source: MatcherError,
    },
    DuplicateId {
        patch_id: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::MissingField { patch_id, field } => match patch_id {
                Some(id) => write!(f, "patch '{id}' missing required field '{field}'"),
                None => write!(f, "missing required field '{field}'"),
            },
            ValidationIssue::InvalidCombo { patch_id, message } => match patch_id {
                Some(id) => write!(f, "patch '{id}' has invalid configuration: {message}"),
                None => write!(f, "invalid plugin manifest: {message}"),
            },
            ValidationIssue::InvalidPattern { patch_id, source } => {
                write!(f, "patch '{patch_id}': {source}")
            }
            ValidationIssue::DuplicateId { patch_id } => {
                write!(f, "patch id '{patch_id}' is used more than once")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(toml: &str) -> PluginManifest {
        toml_edit::de::from_str(toml).unwrap()
    }

    #[test]
    fn test_valid_manifest_builds_patches() {
        let m = manifest(
            r#"
[plugin]
name = "NoTrack"
host_version_range = ">=1.0.0"

[[patches]]
id = "analytics"
find_regex = '\i\.track\('
all = true

[[patches.replacements]]
match = '(\i)\.track\('
replace = "$1.noop("
global = true
"#,
        );
        m.validate().unwrap();
        let patches = m.build_patches().unwrap();
        assert_eq!(patches.len(), 1);
        assert!(patches[0].all);
        assert!(matches!(patches[0].find, Find::Regex(_)));
        assert!(patches[0].replacements[0].global);
    }

    #[test]
    fn test_collects_every_issue() {
        let m = manifest(
            r#"
[plugin]
host_version_range = "not a range"

[[patches]]
id = "dup"
find = "a"
find_regex = "b"

[[patches]]
id = "dup"

[[patches.replacements]]
match = "("
replace = ""
"#,
        );
        let err = m.validate().unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.contains("plugin.name"));
        assert!(rendered.contains("host_version_range"));
        assert!(rendered.contains("cannot both be set"));
        assert!(rendered.contains("used more than once"));
        assert!(err
            .issues
            .iter()
            .any(|i| matches!(i, ValidationIssue::InvalidPattern { .. })));
        // first patch has no replacements, second has no find
        assert_eq!(
            err.issues
                .iter()
                .filter(|i| matches!(i, ValidationIssue::MissingField { .. }))
                .count(),
            3
        );
    }

    #[test]
    fn test_label_falls_back_to_find() {
        let def = PatchDefinition {
            find: Some("needle".to_string()),
            ..PatchDefinition::default()
        };
        assert_eq!(def.label(), "needle");
    }
}
