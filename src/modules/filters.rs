use crate::modules::ModuleRecord;
use std::fmt;
use std::rc::Rc;

/// Predicate over loaded modules, with a description for diagnostics.
#[derive(Clone)]
pub struct Filter {
    description: String,
    predicate: Rc<dyn Fn(&ModuleRecord) -> bool>,
}

impl Filter {
    pub fn new<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&ModuleRecord) -> bool + 'static,
    {
        Self {
            description: description.into(),
            predicate: Rc::new(predicate),
        }
    }

    /// Filter looking only at a module's exports.
    pub fn exports<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&serde_json::Value) -> bool + 'static,
    {
        Self::new(description, move |m| predicate(&m.exports))
    }

    pub fn matches(&self, module: &ModuleRecord) -> bool {
        (self.predicate)(module)
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Filter").field(&self.description).finish()
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

/// Module whose exports object has every one of `props`.
pub fn by_props(props: &[&str]) -> Filter {
    let props: Vec<String> = props.iter().map(|p| p.to_string()).collect();
    Filter::exports(format!("byProps({})", props.join(", ")), move |exports| {
        exports
            .as_object()
            .is_some_and(|obj| props.iter().all(|p| obj.contains_key(p)))
    })
}

/// Module whose source contains every one of `code`.
pub fn by_code(code: &[&str]) -> Filter {
    let code: Vec<String> = code.iter().map(|c| c.to_string()).collect();
    Filter::new(format!("byCode({})", code.join(", ")), move |m| {
        code.iter().all(|c| m.source.contains(c.as_str()))
    })
}

/// Module exporting `key` with the string value `value`, e.g. a store's
/// display name.
pub fn by_export_value(key: &str, value: &str) -> Filter {
    let (key, value) = (key.to_string(), value.to_string());
    Filter::exports(format!("byExportValue({key} = {value})"), move |exports| {
        exports.get(&key).and_then(|v| v.as_str()) == Some(value.as_str())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_by_props() {
        let module =
            ModuleRecord::new(1u64, "").with_exports(json!({"getUser": 1, "getCurrentUser": 2}));
        assert!(by_props(&["getUser", "getCurrentUser"]).matches(&module));
        assert!(!by_props(&["getUser", "missing"]).matches(&module));
        assert!(!by_props(&["x"]).matches(&ModuleRecord::new(2u64, "")));
    }

    #[test]
    fn test_by_code() {
        let module = ModuleRecord::new(1u64, "function a(){return \"MESSAGE_CREATE\"}");
        assert!(by_code(&["MESSAGE_CREATE", "return"]).matches(&module));
        assert!(!by_code(&["MESSAGE_DELETE"]).matches(&module));
    }

    #[test]
    fn test_by_export_value() {
        let module = ModuleRecord::new(1u64, "").with_exports(json!({"displayName": "UserStore"}));
        assert!(by_export_value("displayName", "UserStore").matches(&module));
        assert!(!by_export_value("displayName", "GuildStore").matches(&module));
    }

    #[test]
    fn test_description() {
        assert_eq!(by_props(&["a", "b"]).to_string(), "byProps(a, b)");
    }
}
