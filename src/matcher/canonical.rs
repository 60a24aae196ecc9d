use std::borrow::Cow;

/// Pattern substituted for the `\i` shorthand: one minified identifier.
pub const IDENTIFIER: &str = r"(?:[A-Za-z_$][\w$]*)";

/// Expand the `\i` shorthand in a pattern.
///
/// Minified bundles rename identifiers on every build, so patch authors write
/// `\i` wherever a single identifier is expected. Escaped backslashes (`\\i`)
/// are left alone.
pub fn canonicalize(pattern: &str) -> Cow<'_, str> {
    if !pattern.contains(r"\i") {
        return Cow::Borrowed(pattern);
    }

    let mut out = String::with_capacity(pattern.len() + 16);
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('i') => out.push_str(IDENTIFIER),
            Some(next) => {
                out.push('\\');
                out.push(next);
            }
            None => out.push('\\'),
        }
    }
    Cow::Owned(out)
}
