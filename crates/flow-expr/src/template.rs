//! Template interpolation (`{{ … }}` placeholders)

use crate::eval::{evaluate_fragment, Scope};
use crate::value::display_string;

/// Whether the string contains at least one placeholder.
pub(crate) fn has_placeholder(s: &str) -> bool {
    if let Some(open) = s.find("{{") {
        s[open + 2..].contains("}}")
    } else {
        false
    }
}

/// If the whole string is exactly one placeholder, return its body.
/// `"{{a}}-{{b}}"` is not a single placeholder; `"{{ a.b }}"` is.
pub(crate) fn single_placeholder(s: &str) -> Option<&str> {
    let inner = s.strip_prefix("{{")?.strip_suffix("}}")?;
    if inner.contains("{{") || inner.contains("}}") {
        return None;
    }
    Some(inner)
}

/// Substitute every `{{ … }}` placeholder with its evaluated value.
///
/// Each placeholder is resolved independently; a placeholder that fails
/// to evaluate logs and substitutes the empty string (the sentinel's
/// rendering), so one bad placeholder never poisons the whole message.
/// Unbalanced braces are copied through verbatim.
pub fn interpolate(template: &str, scope: &Scope) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let body = after[..end].trim();
                match evaluate_fragment(body, scope) {
                    Ok(v) => out.push_str(&display_string(&v)),
                    Err(e) => log::warn!("template placeholder '{}' failed: {}", body, e),
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
