//! `{placeholder}` templates used for resource ids and list scopes.

use serde_json::Value;

/// Returns the placeholder names referenced by a pattern, in order.
#[must_use]
pub fn placeholders(pattern: &str) -> Vec<&str> {
    let mut found = Vec::new();
    let mut rest = pattern;

    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            break;
        };
        found.push(&after[..end]);
        rest = &after[end + 1..];
    }

    found
}

/// Expands a pattern, looking each placeholder up with `lookup`.
///
/// # Errors
///
/// Returns the name of the first placeholder `lookup` cannot resolve.
pub fn expand(pattern: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<String, String> {
    let mut out = String::with_capacity(pattern.len());
    let mut rest = pattern;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return Ok(out);
        };
        let name = &after[..end];
        let value = lookup(name).ok_or_else(|| name.to_string())?;
        out.push_str(&value);
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Renders a scalar JSON value as a path parameter.
#[must_use]
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
