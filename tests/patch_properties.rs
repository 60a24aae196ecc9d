//! Property tests for patch application over plain haystacks

use hostpatch::{apply_patch, apply_patches, Patch, PatchError, PatchOutcome, Replacement};
use proptest::prelude::*;

const SELF: &str = "plugins[\"Props\"]";

/// Literal replacement for an arbitrary needle.
fn literal_patch(needle: &str, replacement: &str) -> Patch {
    Patch::new(needle).replacement(Replacement::new(&regex::escape(needle), replacement).unwrap())
}

#[test]
fn test_subtraction_example() {
    let patch = Patch::new("a+b").replacement(Replacement::new(r"a\+b", "a-b").unwrap());
    let app = apply_patch(&patch, "function f(a,b){return a+b}", SELF);
    assert_eq!(app.code, "function f(a,b){return a-b}");
    assert_eq!(app.result, Ok(PatchOutcome::Applied { replacements: 1 }));
}

#[test]
fn test_missing_target_example() {
    let patch = Patch::new("bar").replacement(Replacement::new("bar", "baz").unwrap());
    let app = apply_patch(&patch, "foo", SELF);
    assert_eq!(app.code, "foo");
    assert_eq!(
        app.result,
        Err(PatchError::TargetNotFound {
            find: "\"bar\"".to_string()
        })
    );
}

#[test]
fn test_second_run_reports_already_applied() {
    // Rewrites to the same text, so running it twice changes nothing
    let patch = Patch::new("enabled:").replacement(Replacement::new(r"enabled:!\d", "enabled:!0").unwrap());
    let first = apply_patch(&patch, "{enabled:!1}", SELF);
    assert_eq!(first.code, "{enabled:!0}");
    let second = apply_patch(&patch, &first.code, SELF);
    assert_eq!(second.code, first.code);
    assert_eq!(second.result, Ok(PatchOutcome::AlreadyApplied));
}

#[test]
fn test_later_patches_see_earlier_output() {
    let patches = vec![literal_patch("one", "two"), literal_patch("two", "three")];
    let run = apply_patches("Props", &patches, "one", SELF);
    assert_eq!(run.output, "three");
    assert!(run.reports.iter().all(|r| !r.is_failure()));
}

proptest! {
    #[test]
    fn prop_bytes_outside_match_unchanged(
        prefix in "[a-z ;]{0,40}",
        suffix in "[a-z ;]{0,40}",
        replacement in "[a-zA-Z0-9_]{0,12}",
    ) {
        let needle = "NEEDLE()";
        let haystack = format!("{prefix}{needle}{suffix}");
        let app = apply_patch(&literal_patch(needle, &replacement), &haystack, SELF);

        prop_assert!(app.result.is_ok());
        prop_assert_eq!(app.code, format!("{prefix}{replacement}{suffix}"));
    }

    #[test]
    fn prop_absent_target_never_changes_haystack(haystack in "[a-z0-9 ]{0,80}") {
        let app = apply_patch(&literal_patch("TARGET", "x"), &haystack, SELF);
        prop_assert_eq!(&app.code, &haystack);
        let is_not_found = matches!(app.result, Err(PatchError::TargetNotFound { .. }));
        prop_assert!(is_not_found);
    }

    #[test]
    fn prop_arbitrary_patterns_never_panic(
        pattern in "[a-z.*+?()\\[\\]\\\\]{1,8}",
        haystack in "[a-z.()]{0,40}",
    ) {
        if let Ok(replacement) = Replacement::new(&pattern, "$0") {
            let patch = Patch::new("").replacement(replacement);
            let _ = apply_patch(&patch, &haystack, SELF);
        }
    }
}
