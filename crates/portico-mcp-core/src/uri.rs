//! URI templates for dynamic resources.
//!
//! Templates use RFC 6570 level-1 `{variable}` expressions, compiled to
//! anchored regexes. `matches`/`extract` and `expand` are inverses:
//! expanding a template with bindings and matching the result yields
//! the same bindings.

use regex::Regex;
use std::collections::HashMap;

use crate::error::{Error, ResourceError, Result};

/// A compiled URI template.
#[derive(Debug, Clone)]
pub struct UriTemplate {
    pattern: String,
    regex: Regex,
    variables: Vec<String>,
}

impl UriTemplate {
    /// Compile a template like `users://{id}` or
    /// `file:///docs/{section}/{page}.md`.
    pub fn compile(pattern: &str) -> Result<Self> {
        let var_regex = Regex::new(r"\{([A-Za-z0-9_]+)\}")
            .map_err(|e| Error::internal(format!("variable regex: {e}")))?;

        let mut variables = Vec::new();
        let mut regex_pattern = regex::escape(pattern);
        for captures in var_regex.captures_iter(pattern) {
            let name = &captures[1];
            if variables.iter().any(|v| v == name) {
                return Err(Error::Resource(ResourceError::InvalidUri(format!(
                    "duplicate template variable: {name}"
                ))));
            }
            variables.push(name.to_string());
            let escaped = regex::escape(&format!("{{{name}}}"));
            regex_pattern = regex_pattern.replacen(&escaped, "([^/]+)", 1);
        }

        // A stray brace outside a recognized expression makes the
        // template unmatchable on purpose; reject it instead.
        let stripped = var_regex.replace_all(pattern, "");
        if stripped.contains('{') || stripped.contains('}') {
            return Err(Error::Resource(ResourceError::InvalidUri(format!(
                "malformed template expression in '{pattern}'"
            ))));
        }

        let regex = Regex::new(&format!("^{regex_pattern}$"))
            .map_err(|e| Error::Resource(ResourceError::InvalidUri(e.to_string())))?;

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
            variables,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn matches(&self, uri: &str) -> bool {
        self.regex.is_match(uri)
    }

    /// Extract variable bindings from a matching URI.
    pub fn extract(&self, uri: &str) -> Option<HashMap<String, String>> {
        let captures = self.regex.captures(uri)?;
        let mut bindings = HashMap::new();
        for (index, name) in self.variables.iter().enumerate() {
            let value = captures.get(index + 1)?;
            bindings.insert(name.clone(), value.as_str().to_string());
        }
        Some(bindings)
    }

    /// Substitute bindings into the template.
    pub fn expand(&self, bindings: &HashMap<String, String>) -> Result<String> {
        let mut result = self.pattern.clone();
        for name in &self.variables {
            let value = bindings.get(name).ok_or_else(|| {
                Error::invalid_params(format!("missing template variable: {name}"))
            })?;
            result = result.replace(&format!("{{{name}}}"), value);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn single_variable() {
        let template = UriTemplate::compile("users://{id}").unwrap();
        assert_eq!(template.variables(), &["id"]);
        assert!(template.matches("users://42"));
        assert!(!template.matches("things://42"));

        let extracted = template.extract("users://42").unwrap();
        assert_eq!(extracted.get("id"), Some(&"42".to_string()));
    }

    #[test]
    fn multiple_variables() {
        let template = UriTemplate::compile("file:///docs/{section}/{page}.md").unwrap();
        let extracted = template.extract("file:///docs/intro/start.md").unwrap();
        assert_eq!(extracted.get("section"), Some(&"intro".to_string()));
        assert_eq!(extracted.get("page"), Some(&"start".to_string()));
    }

    #[test]
    fn match_expand_inverse() {
        let template = UriTemplate::compile("repo://{owner}/{name}").unwrap();
        let vars = bindings(&[("owner", "alice"), ("name", "widget")]);
        let uri = template.expand(&vars).unwrap();
        assert_eq!(uri, "repo://alice/widget");
        assert_eq!(template.extract(&uri).unwrap(), vars);
    }

    #[test]
    fn variables_do_not_cross_segments() {
        let template = UriTemplate::compile("users://{id}").unwrap();
        assert!(!template.matches("users://a/b"));
    }

    #[test]
    fn expand_requires_all_variables() {
        let template = UriTemplate::compile("users://{id}").unwrap();
        assert!(template.expand(&HashMap::new()).is_err());
    }

    #[test]
    fn rejects_duplicates_and_stray_braces() {
        assert!(UriTemplate::compile("x://{a}/{a}").is_err());
        assert!(UriTemplate::compile("x://{bad").is_err());
        assert!(UriTemplate::compile("x://}{").is_err());
    }

    #[test]
    fn literal_template_matches_exactly() {
        let template = UriTemplate::compile("static://fixed").unwrap();
        assert!(template.matches("static://fixed"));
        assert!(!template.matches("static://other"));
        assert!(template.extract("static://fixed").unwrap().is_empty());
    }
}
