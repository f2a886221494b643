//! Prompt template interpolation.

use crate::models::Variable;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("static regex"));

/// Sentinel left in place of a placeholder with no matching variable.
pub fn unresolved(name: &str) -> String {
    format!("Error::{{{{{name}}}}}")
}

/// Replace every `{{name}}` in `template` with the value of `name`.
///
/// Placeholders without a variable become `Error::{{name}}` so the gap is
/// visible in the generated prompt instead of aborting the run.
pub fn interpolate(template: &str, variables: &BTreeMap<String, Variable>) -> String {
    PLACEHOLDER
        .replace_all(template, |cap: &Captures<'_>| match variables.get(&cap[1]) {
            Some(value) => value.to_string(),
            None => unresolved(&cap[1]),
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, Variable)]) -> BTreeMap<String, Variable> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_all_placeholders_resolved() {
        let out = interpolate(
            "Talk about {{topic}} in {{ turns }} turns, {{topic}} again",
            &vars(&[
                ("topic", Variable::from("billing")),
                ("turns", Variable::Integer(4)),
            ]),
        );
        assert_eq!(out, "Talk about billing in 4 turns, billing again");
        assert!(!out.contains("{{"));
    }

    #[test]
    fn test_unmatched_placeholder_gets_sentinel() {
        let out = interpolate("Hello {{name}}", &BTreeMap::new());
        assert_eq!(out, "Hello Error::{{name}}");
        assert!(out.contains("name"));
    }

    #[test]
    fn test_numbers_and_plain_text() {
        let out = interpolate(
            "ratio {{r}} no placeholders {here}",
            &vars(&[("r", Variable::Float(0.25))]),
        );
        assert_eq!(out, "ratio 0.25 no placeholders {here}");
    }

    #[test]
    fn test_values_are_not_reinterpolated() {
        let out = interpolate(
            "{{a}}",
            &vars(&[("a", Variable::from("{{b}}")), ("b", Variable::from("x"))]),
        );
        assert_eq!(out, "{{b}}");
    }
}
