//! Named-placeholder message templates.
//!
//! `{name}` is replaced by the value of `name`; `{{` and `}}` produce literal
//! braces. A brace that does not open a valid placeholder is kept as text, so
//! templates may contain code snippets.

use crate::error::{Error, Result};
use serde_json::Value;
use std::collections::BTreeMap;

/// Values available to a template.
pub type TemplateVars = BTreeMap<String, String>;

/// Render `template` against `vars`.
///
/// # Errors
///
/// Returns `Error::Template` naming the first placeholder with no value.
pub fn render(template: &str, vars: &TemplateVars) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with('}') {
            out.push('}');
            rest = &tail[1..];
            continue;
        }

        match placeholder(tail) {
            Some(name) => {
                let value = vars.get(name).ok_or_else(|| Error::Template {
                    template: template.to_string(),
                    placeholder: name.to_string(),
                })?;
                out.push_str(value);
                rest = &tail[name.len() + 2..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    Ok(out)
}

/// Placeholder names referenced by `template`, in order of appearance.
#[must_use]
pub fn placeholders(template: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(pos) = rest.find('{') {
        let tail = &rest[pos..];
        if tail.starts_with("{{") {
            rest = &tail[2..];
            continue;
        }
        match placeholder(tail) {
            Some(name) => {
                names.push(name);
                rest = &tail[name.len() + 2..];
            }
            None => rest = &tail[1..],
        }
    }
    names
}

/// Identifier between a leading `{` and the next `}`, if it is one.
fn placeholder(tail: &str) -> Option<&str> {
    let body = tail.strip_prefix('{')?;
    let end = body.find('}')?;
    let name = &body[..end];
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then_some(name)
}

/// Text form of a metric or metadata value.
///
/// Strings are used verbatim so zero-padded or numeric-looking text survives.
/// Other values use their JSON form; `null` has none.
#[must_use]
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> TemplateVars {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn substitutes_placeholders() {
        let out = render(
            "{tool_name} blocked by {gate}",
            &vars(&[("tool_name", "Edit"), ("gate", "critic")]),
        )
        .unwrap();
        assert_eq!(out, "Edit blocked by critic");
    }

    #[test]
    fn unresolved_placeholder_is_an_error() {
        let err = render("read {temp_path}", &TemplateVars::new()).unwrap_err();
        match err {
            Error::Template { placeholder, .. } => assert_eq!(placeholder, "temp_path"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn escaped_braces() {
        let out = render("{{literal}} and {x}", &vars(&[("x", "1")])).unwrap();
        assert_eq!(out, "{literal} and 1");
    }

    #[test]
    fn non_identifier_braces_are_text() {
        let template = r#"use `{"id": 1}` or { } here"#;
        assert_eq!(render(template, &TemplateVars::new()).unwrap(), template);
    }

    #[test]
    fn stray_closing_brace_is_text() {
        assert_eq!(render("a } b", &TemplateVars::new()).unwrap(), "a } b");
    }

    #[test]
    fn repeated_placeholder() {
        let out = render("{n}/{n}", &vars(&[("n", "3")])).unwrap();
        assert_eq!(out, "3/3");
    }

    #[test]
    fn multibyte_text_is_preserved() {
        let out = render("⛔ {gate} ✓", &vars(&[("gate", "qa")])).unwrap();
        assert_eq!(out, "⛔ qa ✓");
    }

    #[test]
    fn lists_placeholders() {
        assert_eq!(
            placeholders("{a} {{b}} {c} {not valid}"),
            vec!["a", "c"]
        );
    }

    #[test]
    fn string_values_are_verbatim() {
        assert_eq!(value_text(&Value::from("0012")).as_deref(), Some("0012"));
        assert_eq!(value_text(&Value::from(12)).as_deref(), Some("12"));
        assert_eq!(value_text(&Value::from(true)).as_deref(), Some("true"));
        assert_eq!(value_text(&Value::Null), None);
    }
}
