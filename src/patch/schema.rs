use crate::matcher::{MatcherError, PatternMatch, PatternMatcher};
use std::fmt;
use std::rc::Rc;

/// Closure computing replacement text from a match.
///
/// Returning `Err` is the closure "throwing": the replacement is reported as
/// failed and the source is left as it was.
pub type ReplaceFn = Rc<dyn Fn(&PatternMatch) -> Result<String, String>>;

/// Predicate deciding whether a patch is used at all.
pub type PatchPredicate = Rc<dyn Fn() -> bool>;

/// How a patch selects the source it applies to.
#[derive(Debug, Clone)]
pub enum Find {
    /// Source must contain this exact text.
    Literal(String),
    /// Source must match this pattern.
    Regex(PatternMatcher),
}

impl Find {
    pub fn regex(pattern: &str) -> Result<Self, MatcherError> {
        PatternMatcher::new(pattern).map(Find::Regex)
    }

    pub fn locate(&self, haystack: &str) -> bool {
        match self {
            Find::Literal(text) => haystack.contains(text.as_str()),
            Find::Regex(matcher) => matcher.is_match(haystack),
        }
    }
}

impl fmt::Display for Find {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Find::Literal(text) => write!(f, "{text:?}"),
            Find::Regex(matcher) => write!(f, "/{}/", matcher.as_str()),
        }
    }
}

impl From<&str> for Find {
    fn from(text: &str) -> Self {
        Find::Literal(text.to_string())
    }
}

impl From<String> for Find {
    fn from(text: String) -> Self {
        Find::Literal(text)
    }
}

/// Replacement text source.
#[derive(Clone)]
pub enum Replace {
    /// Template with `$1`, `${name}`, `$$` and `$self` tokens.
    Template(String),
    Fn(ReplaceFn),
}

impl fmt::Debug for Replace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Replace::Template(t) => f.debug_tuple("Template").field(t).finish(),
            Replace::Fn(_) => f.write_str("Fn(..)"),
        }
    }
}

/// One regex/replace step of a patch.
#[derive(Debug, Clone)]
pub struct Replacement {
    pub matcher: PatternMatcher,
    pub replace: Replace,
    /// Replace every match instead of only the first.
    pub global: bool,
}

impl Replacement {
    pub fn new(pattern: &str, template: impl Into<String>) -> Result<Self, MatcherError> {
        Ok(Self {
            matcher: PatternMatcher::new(pattern)?,
            replace: Replace::Template(template.into()),
            global: false,
        })
    }

    pub fn with_fn<F>(pattern: &str, f: F) -> Result<Self, MatcherError>
    where
        F: Fn(&PatternMatch) -> Result<String, String> + 'static,
    {
        Ok(Self {
            matcher: PatternMatcher::new(pattern)?,
            replace: Replace::Fn(Rc::new(f)),
            global: false,
        })
    }

    pub fn global(mut self, global: bool) -> Self {
        self.global = global;
        self
    }
}

/// A find/replace rule a plugin applies to host module source.
///
/// Defined statically by its plugin and applied once, at module-load time.
#[derive(Clone)]
pub struct Patch {
    pub id: Option<String>,
    pub find: Find,
    pub replacements: Vec<Replacement>,
    pub predicate: Option<PatchPredicate>,
    /// Apply to every module containing the target, not just the first.
    pub all: bool,
    /// Roll the whole patch back if any replacement fails.
    pub group: bool,
    /// Log failures at debug level only.
    pub no_warn: bool,
}

impl Patch {
    pub fn new(find: impl Into<Find>) -> Self {
        Self {
            id: None,
            find: find.into(),
            replacements: Vec::new(),
            predicate: None,
            all: false,
            group: false,
            no_warn: false,
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn replacement(mut self, replacement: Replacement) -> Self {
        self.replacements.push(replacement);
        self
    }

    pub fn predicate<F>(mut self, f: F) -> Self
    where
        F: Fn() -> bool + 'static,
    {
        self.predicate = Some(Rc::new(f));
        self
    }

    pub fn all(mut self, all: bool) -> Self {
        self.all = all;
        self
    }

    pub fn group(mut self, group: bool) -> Self {
        self.group = group;
        self
    }

    pub fn no_warn(mut self, no_warn: bool) -> Self {
        self.no_warn = no_warn;
        self
    }

    /// Identity used in logs: the explicit id, else the find target.
    pub fn label(&self) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => self.find.to_string(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.predicate.as_ref().map_or(true, |p| p())
    }
}

impl fmt::Debug for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Patch")
            .field("id", &self.id)
            .field("find", &self.find)
            .field("replacements", &self.replacements)
            .field("predicate", &self.predicate.is_some())
            .field("all", &self.all)
            .field("group", &self.group)
            .field("no_warn", &self.no_warn)
            .finish()
    }
}
