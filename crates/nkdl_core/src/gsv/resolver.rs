//! Expansion of GSV requests into combinations.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::combination::GsvCombination;
use crate::project::{FormatVersion, ProjectModel};

/// Errors raised while resolving a GSV request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GsvError {
    /// Entry text could not be read as `key:value,value`.
    #[error("Malformed GSV entry '{0}' (expected key:value1,value2)")]
    Malformed(String),

    /// A key asked for every value but the project enumerates none.
    #[error("GSV '{key}' has no values to expand")]
    EmptyDomain { key: String },

    /// Explicit values outside the key's domain.
    #[error("Invalid value(s) {values} for GSV '{key}'; valid values: {valid}")]
    UnknownValues {
        key: String,
        values: String,
        valid: String,
    },

    /// The project's format predates GSV support.
    #[error("Graph scope variables need version {required} or newer (script is {found})")]
    Unsupported { required: String, found: String },
}

/// Result type for GSV resolution.
pub type GsvResult<T> = Result<T, GsvError>;

/// The two accepted request shapes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GsvRequest {
    /// One cross product over every entry.
    Flat(Vec<String>),
    /// Each inner list is its own cross product.
    Nested(Vec<Vec<String>>),
}

impl GsvRequest {
    pub fn is_empty(&self) -> bool {
        match self {
            GsvRequest::Flat(entries) => entries.iter().all(|e| e.trim().is_empty()),
            GsvRequest::Nested(groups) => groups
                .iter()
                .all(|group| group.iter().all(|e| e.trim().is_empty())),
        }
    }
}

/// One key and the values requested for it. Empty means "all".
#[derive(Debug, Clone, PartialEq, Eq)]
struct KeyValues {
    key: String,
    values: Vec<String>,
}

/// Resolves GSV requests against a project.
pub struct ScopedVariableResolver<'a, P: ProjectModel + ?Sized> {
    project: &'a P,
    min_version: FormatVersion,
}

impl<'a, P: ProjectModel + ?Sized> ScopedVariableResolver<'a, P> {
    pub fn new(project: &'a P, min_version: FormatVersion) -> Self {
        Self {
            project,
            min_version,
        }
    }

    /// Whether the project's format supports GSVs at all.
    pub fn is_supported(&self) -> bool {
        self.project
            .format_version()
            .map(|v| v >= self.min_version)
            .unwrap_or(false)
    }

    /// Expand a request into combinations.
    ///
    /// Returns no combinations when there is nothing to resolve, or when the
    /// project cannot carry GSVs and `explicit` is false. An explicit request
    /// against an unsupported project is an error.
    pub fn resolve(
        &self,
        request: Option<&GsvRequest>,
        explicit: bool,
    ) -> GsvResult<Vec<GsvCombination>> {
        let Some(request) = request.filter(|r| !r.is_empty()) else {
            return Ok(Vec::new());
        };

        if !self.is_supported() {
            let found = self
                .project
                .format_version()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            if explicit {
                return Err(GsvError::Unsupported {
                    required: self.min_version.to_string(),
                    found,
                });
            }
            tracing::warn!(
                "Skipping graph scope variables: script version {} is older than {}",
                found,
                self.min_version
            );
            return Ok(Vec::new());
        }

        let combinations = match request {
            GsvRequest::Flat(entries) => self.expand_group(entries)?,
            GsvRequest::Nested(groups) => {
                let mut all = Vec::new();
                for group in groups {
                    all.extend(self.expand_group(group)?);
                }
                all
            }
        };

        tracing::info!("Resolved {} GSV combination(s)", combinations.len());
        Ok(combinations)
    }

    /// Cross product of one list of entries.
    fn expand_group(&self, entries: &[String]) -> GsvResult<Vec<GsvCombination>> {
        let mut parsed = Vec::new();
        for entry in entries {
            merge_entries(&mut parsed, parse_entry(entry)?);
        }
        if parsed.is_empty() {
            return Ok(Vec::new());
        }

        let mut axes: Vec<(String, Vec<String>)> = Vec::with_capacity(parsed.len());
        for KeyValues { key, values } in parsed {
            let values = self.validate(&key, values)?;
            axes.push((key, values));
        }

        Ok(cross_product(&axes))
    }

    /// Fill "all values" requests and check explicit values against the domain.
    fn validate(&self, key: &str, values: Vec<String>) -> GsvResult<Vec<String>> {
        let domain = self.project.gsv_options(key);

        if values.is_empty() {
            if domain.is_empty() {
                return Err(GsvError::EmptyDomain {
                    key: key.to_string(),
                });
            }
            return Ok(domain);
        }

        if !domain.is_empty() {
            let invalid: Vec<&str> = values
                .iter()
                .filter(|v| !domain.contains(*v))
                .map(String::as_str)
                .collect();
            if !invalid.is_empty() {
                return Err(GsvError::UnknownValues {
                    key: key.to_string(),
                    values: invalid.join(", "),
                    valid: domain.join(", "),
                });
            }
        }

        Ok(values)
    }
}

/// Read one entry string.
///
/// `shot:A,B` is one key; `shot:A,B,res:hi` is two; an entry without any
/// colon is a comma-separated list of keys that take every value.
fn parse_entry(entry: &str) -> GsvResult<Vec<KeyValues>> {
    let entry = entry.trim();
    if entry.is_empty() {
        return Ok(Vec::new());
    }

    if !entry.contains(':') {
        return Ok(entry
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(|key| KeyValues {
                key: key.to_string(),
                values: Vec::new(),
            })
            .collect());
    }

    let mut parsed: Vec<KeyValues> = Vec::new();
    for token in entry.split(',').map(str::trim) {
        if let Some((key, value)) = token.split_once(':') {
            let key = key.trim();
            if key.is_empty() {
                return Err(GsvError::Malformed(entry.to_string()));
            }
            let mut values = Vec::new();
            if !value.trim().is_empty() {
                values.push(value.trim().to_string());
            }
            parsed.push(KeyValues {
                key: key.to_string(),
                values,
            });
        } else if token.is_empty() {
            continue;
        } else {
            match parsed.last_mut() {
                Some(current) => current.values.push(token.to_string()),
                None => return Err(GsvError::Malformed(entry.to_string())),
            }
        }
    }
    Ok(parsed)
}

/// Fold entries for repeated keys into one, keeping first-seen order.
fn merge_entries(into: &mut Vec<KeyValues>, entries: Vec<KeyValues>) {
    for entry in entries {
        match into.iter_mut().find(|existing| existing.key == entry.key) {
            Some(existing) => {
                for value in entry.values {
                    if !existing.values.contains(&value) {
                        existing.values.push(value);
                    }
                }
            }
            None => into.push(entry),
        }
    }
}

fn cross_product(axes: &[(String, Vec<String>)]) -> Vec<GsvCombination> {
    let mut partial: Vec<Vec<(String, String)>> = vec![Vec::new()];
    for (key, values) in axes {
        let mut next = Vec::with_capacity(partial.len() * values.len());
        for prefix in &partial {
            for value in values {
                let mut pairs = prefix.clone();
                pairs.push((key.clone(), value.clone()));
                next.push(pairs);
            }
        }
        partial = next;
    }
    partial.into_iter().map(GsvCombination::new).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::ScriptProject;

    fn gsv_project() -> ScriptProject {
        ScriptProject::new("/tmp/comp.nk")
            .with_version(16, 0)
            .with_gsv("shot", ["A", "B", "C"])
            .with_gsv("res", ["lo", "hi"])
    }

    fn flat(entries: &[&str]) -> GsvRequest {
        GsvRequest::Flat(entries.iter().map(|s| s.to_string()).collect())
    }

    fn labels(combos: &[GsvCombination]) -> Vec<String> {
        combos.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn flat_request_is_cross_product() {
        let project = gsv_project();
        let resolver = ScopedVariableResolver::new(&project, FormatVersion::new(16, 0));
        let combos = resolver
            .resolve(Some(&flat(&["shot:A,B", "res:lo,hi"])), true)
            .unwrap();
        assert_eq!(
            labels(&combos),
            vec![
                "shot=A,res=lo",
                "shot=A,res=hi",
                "shot=B,res=lo",
                "shot=B,res=hi"
            ]
        );
    }

    #[test]
    fn nested_groups_are_not_multiplied() {
        let project = gsv_project();
        let resolver = ScopedVariableResolver::new(&project, FormatVersion::new(16, 0));
        let request = GsvRequest::Nested(vec![
            vec!["shot:A".to_string()],
            vec!["shot:B".to_string(), "res:hi".to_string()],
        ]);
        let combos = resolver.resolve(Some(&request), true).unwrap();
        assert_eq!(labels(&combos), vec!["shot=A", "shot=B,res=hi"]);
    }

    #[test]
    fn bare_key_takes_every_value() {
        let project = gsv_project();
        let resolver = ScopedVariableResolver::new(&project, FormatVersion::new(16, 0));

        let combos = resolver.resolve(Some(&flat(&["shot:"])), true).unwrap();
        assert_eq!(labels(&combos), vec!["shot=A", "shot=B", "shot=C"]);

        let combos = resolver.resolve(Some(&flat(&["res"])), true).unwrap();
        assert_eq!(combos.len(), 2);
    }

    #[test]
    fn several_keys_in_one_entry() {
        let project = gsv_project();
        let resolver = ScopedVariableResolver::new(&project, FormatVersion::new(16, 0));
        let combos = resolver
            .resolve(Some(&flat(&["shot:A,B,res:hi"])), true)
            .unwrap();
        assert_eq!(labels(&combos), vec!["shot=A,res=hi", "shot=B,res=hi"]);
    }

    #[test]
    fn invalid_values_name_the_domain() {
        let project = gsv_project();
        let resolver = ScopedVariableResolver::new(&project, FormatVersion::new(16, 0));
        let err = resolver
            .resolve(Some(&flat(&["shot:A,Z"])), true)
            .unwrap_err();
        match err {
            GsvError::UnknownValues { key, values, valid } => {
                assert_eq!(key, "shot");
                assert_eq!(values, "Z");
                assert_eq!(valid, "A, B, C");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_domain_is_an_error() {
        let project = gsv_project();
        let resolver = ScopedVariableResolver::new(&project, FormatVersion::new(16, 0));
        assert_eq!(
            resolver.resolve(Some(&flat(&["lens:"])), true),
            Err(GsvError::EmptyDomain {
                key: "lens".to_string()
            })
        );
    }

    #[test]
    fn unconstrained_keys_accept_explicit_values() {
        let project = gsv_project();
        let resolver = ScopedVariableResolver::new(&project, FormatVersion::new(16, 0));
        let combos = resolver.resolve(Some(&flat(&["lens:35mm"])), true).unwrap();
        assert_eq!(labels(&combos), vec!["lens=35mm"]);
    }

    #[test]
    fn malformed_entry() {
        let project = gsv_project();
        let resolver = ScopedVariableResolver::new(&project, FormatVersion::new(16, 0));
        assert!(matches!(
            resolver.resolve(Some(&flat(&[":A"])), true),
            Err(GsvError::Malformed(_))
        ));
    }

    #[test]
    fn old_projects_skip_unless_explicit() {
        let project = ScriptProject::new("/tmp/comp.nk")
            .with_version(15, 1)
            .with_gsv("shot", ["A"]);
        let resolver = ScopedVariableResolver::new(&project, FormatVersion::new(16, 0));
        let request = flat(&["shot:A"]);

        assert!(resolver.resolve(Some(&request), false).unwrap().is_empty());
        assert!(matches!(
            resolver.resolve(Some(&request), true),
            Err(GsvError::Unsupported { .. })
        ));
    }

    #[test]
    fn no_request_means_no_combinations() {
        let project = gsv_project();
        let resolver = ScopedVariableResolver::new(&project, FormatVersion::new(16, 0));
        assert!(resolver.resolve(None, true).unwrap().is_empty());
        assert!(resolver.resolve(Some(&flat(&[" "])), true).unwrap().is_empty());
    }

    #[test]
    fn request_deserializes_both_shapes() {
        let flat: GsvRequest = serde_json::from_str(r#"["shot:A"]"#).unwrap();
        assert!(matches!(flat, GsvRequest::Flat(_)));
        let nested: GsvRequest = serde_json::from_str(r#"[["shot:A"]]"#).unwrap();
        assert!(matches!(nested, GsvRequest::Nested(_)));
    }
}
