//! Coercion of human-authored query and search fragments.
//!
//! Fragments become normalized [`QuerySpec`] parts. Selector text has
//! the form `name{p1=v1,p2=v2}`; grouping text appends a predicate, as in
//! `Operating System, that contains:Windows`. Parsing is syntactic; the
//! `resolve_*` functions then validate names and parameters against the
//! sensor catalog and fill omitted parameters from definition defaults.
//!
//! Nothing here performs I/O.

use std::collections::HashMap;

use fleetq_core::{
    FilterOperator, GroupingFragment, Parameter, QuerySpec, SearchGroup, SearchSpec,
    SelectorFragment, Sensor,
};
use serde::{Deserialize, Serialize};

use crate::error::{ControlError, Result};

/// A selector as supplied by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectorInput {
    /// Human text, `name{p=v,...}`.
    Text(String),
    /// Already structured.
    Structured(SelectorFragment),
}

impl From<&str> for SelectorInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// A grouping as supplied by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupingInput {
    /// Human text, `name{p=v,...}, that <operator>:<value>`.
    Text(String),
    /// Already structured.
    Structured(GroupingFragment),
}

impl From<&str> for GroupingInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// Human operator spellings, matched after lowercasing and dropping a
/// leading `is `.
const OPERATOR_WORDS: &[(&str, FilterOperator)] = &[
    ("<", FilterOperator::Less),
    ("less", FilterOperator::Less),
    ("less than", FilterOperator::Less),
    ("<=", FilterOperator::LessEqual),
    ("less equal", FilterOperator::LessEqual),
    ("less than or equal to", FilterOperator::LessEqual),
    (">", FilterOperator::Greater),
    ("greater", FilterOperator::Greater),
    ("greater than", FilterOperator::Greater),
    (">=", FilterOperator::GreaterEqual),
    ("greater equal", FilterOperator::GreaterEqual),
    ("greater than or equal to", FilterOperator::GreaterEqual),
    ("=", FilterOperator::Equal),
    ("==", FilterOperator::Equal),
    ("equal", FilterOperator::Equal),
    ("equals", FilterOperator::Equal),
    ("equal to", FilterOperator::Equal),
    ("!=", FilterOperator::NotEqual),
    ("not equal", FilterOperator::NotEqual),
    ("not equal to", FilterOperator::NotEqual),
    ("contains", FilterOperator::Contains),
    ("not contains", FilterOperator::NotContains),
    ("does not contain", FilterOperator::NotContains),
    ("starts with", FilterOperator::StartsWith),
    ("ends with", FilterOperator::EndsWith),
    ("regex", FilterOperator::RegexMatch),
    ("matches", FilterOperator::RegexMatch),
    ("not regex", FilterOperator::NotRegexMatch),
    ("does not match", FilterOperator::NotRegexMatch),
    ("hash", FilterOperator::HashMatch),
    ("hash match", FilterOperator::HashMatch),
];

/// Parse `name{p1=v1,p2=v2}` into a selector fragment.
///
/// # Errors
///
/// Returns `ControlError::Validation` on malformed text or duplicate keys.
pub fn parse_selector(text: &str) -> Result<SelectorFragment> {
    let (name, params) = split_name_and_params(text)?;
    Ok(SelectorFragment {
        name,
        params,
        fill_defaults: true,
    })
}

/// Parse `name{params}, that <operator>:<value>` into a grouping fragment.
///
/// # Errors
///
/// Returns `ControlError::Validation` on malformed text or unknown operators.
pub fn parse_grouping(text: &str) -> Result<GroupingFragment> {
    const SEPARATOR: &str = ", that ";

    let lowered = text.to_ascii_lowercase();
    let Some(idx) = lowered.find(SEPARATOR) else {
        return Err(ControlError::Validation(format!(
            "grouping {text:?} must have the form 'name{{params}}, that <operator>:<value>'"
        )));
    };

    let (name, params) = split_name_and_params(&text[..idx])?;
    let predicate = &text[idx + SEPARATOR.len()..];
    let Some((word, value)) = predicate.split_once(':') else {
        return Err(ControlError::Validation(format!(
            "grouping predicate {predicate:?} must have the form '<operator>:<value>'"
        )));
    };

    Ok(GroupingFragment {
        name,
        params,
        operator: parse_operator(word)?,
        value: value.trim().to_string(),
    })
}

/// Parse a human operator word.
///
/// # Errors
///
/// Returns `ControlError::Validation` if the word is not recognised.
pub fn parse_operator(word: &str) -> Result<FilterOperator> {
    let normalized = word
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase();
    let normalized = normalized.strip_prefix("is ").unwrap_or(&normalized);

    OPERATOR_WORDS
        .iter()
        .find(|(spelling, _)| *spelling == normalized)
        .map(|(_, op)| *op)
        .ok_or_else(|| ControlError::Validation(format!("unknown filter operator {word:?}")))
}

/// Parse every selector input.
///
/// # Errors
///
/// Returns the first parse failure.
pub fn parse_selectors(inputs: &[SelectorInput]) -> Result<Vec<SelectorFragment>> {
    inputs
        .iter()
        .map(|input| match input {
            SelectorInput::Text(text) => parse_selector(text),
            SelectorInput::Structured(fragment) => Ok(fragment.clone()),
        })
        .collect()
}

/// Parse every grouping input.
///
/// # Errors
///
/// Returns the first parse failure.
pub fn parse_groupings(inputs: &[GroupingInput]) -> Result<Vec<GroupingFragment>> {
    inputs
        .iter()
        .map(|input| match input {
            GroupingInput::Text(text) => parse_grouping(text),
            GroupingInput::Structured(fragment) => Ok(fragment.clone()),
        })
        .collect()
}

fn split_name_and_params(text: &str) -> Result<(String, Vec<Parameter>)> {
    let text = text.trim();
    let (name, params) = match text.find('{') {
        None if text.contains('}') => {
            return Err(ControlError::Validation(format!(
                "unbalanced parameter block in {text:?}"
            )))
        }
        None => (text, Vec::new()),
        Some(open) => {
            let Some(body) = text[open + 1..].strip_suffix('}') else {
                return Err(ControlError::Validation(format!(
                    "unterminated parameter block in {text:?}"
                )));
            };
            if body.contains(['{', '}']) {
                return Err(ControlError::Validation(format!(
                    "nested parameter block in {text:?}"
                )));
            }
            (text[..open].trim(), parse_params(body, text)?)
        }
    };

    if name.is_empty() {
        return Err(ControlError::Validation(format!("missing name in {text:?}")));
    }
    Ok((name.to_string(), params))
}

fn parse_params(body: &str, context: &str) -> Result<Vec<Parameter>> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut params: Vec<Parameter> = Vec::new();
    for pair in body.split(',') {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(ControlError::Validation(format!(
                "parameter {pair:?} in {context:?} must have the form key=value"
            )));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(ControlError::Validation(format!(
                "empty parameter name in {context:?}"
            )));
        }
        if params.iter().any(|p| p.key == key) {
            return Err(ControlError::Validation(format!(
                "parameter {key:?} supplied twice in {context:?}"
            )));
        }
        params.push(Parameter::new(key, value.trim()));
    }
    Ok(params)
}

/// Sensor definitions by name.
#[derive(Debug, Clone, Default)]
pub struct SensorCatalog {
    sensors: HashMap<String, Sensor>,
}

impl SensorCatalog {
    /// Build a catalog; unnamed sensors are skipped.
    pub fn new(sensors: impl IntoIterator<Item = Sensor>) -> Self {
        let sensors = sensors
            .into_iter()
            .filter_map(|s| s.name.clone().map(|name| (name, s)))
            .collect();
        Self { sensors }
    }

    /// Look up a definition by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Sensor> {
        self.sensors.get(name)
    }

    /// Look up a definition by name, failing if it is unknown.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Validation` if no definition has this name.
    pub fn resolve(&self, name: &str) -> Result<&Sensor> {
        self.get(name)
            .ok_or_else(|| ControlError::Validation(format!("unknown sensor {name:?}")))
    }

    /// Number of definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    /// True when the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }
}

/// Names referenced by a query, deduplicated in first-seen order.
#[must_use]
pub fn referenced_names(spec: &QuerySpec) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let all = spec
        .selectors
        .iter()
        .map(|s| &s.name)
        .chain(spec.groupings.iter().map(|g| &g.name));
    for name in all {
        if !names.contains(name) {
            names.push(name.clone());
        }
    }
    names
}

/// Validate and complete a parameter list against a sensor definition.
///
/// The result follows definition order. Omitted parameters get the
/// definition default when `fill_defaults` is set.
///
/// # Errors
///
/// Returns `ControlError::Validation` if a supplied key is not declared.
pub fn resolve_params(
    sensor: &Sensor,
    supplied: &[Parameter],
    fill_defaults: bool,
) -> Result<Vec<Parameter>> {
    let name = sensor.name.as_deref().unwrap_or_default();

    if let Some(undeclared) = supplied
        .iter()
        .find(|p| !sensor.parameter_definition.iter().any(|d| d.key == p.key))
    {
        let declared = sensor
            .parameter_definition
            .iter()
            .map(|d| d.key.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(ControlError::Validation(format!(
            "parameter {:?} is not declared by sensor {name:?} (declared: [{declared}])",
            undeclared.key
        )));
    }

    let mut resolved = Vec::with_capacity(sensor.parameter_definition.len());
    for definition in &sensor.parameter_definition {
        match supplied.iter().find(|p| p.key == definition.key) {
            Some(param) => resolved.push(param.clone()),
            None if fill_defaults => {
                let value = definition.fill_value();
                tracing::info!(
                    sensor = %name,
                    parameter = %definition.key,
                    value = %value,
                    "Parameter not supplied, using definition default"
                );
                resolved.push(Parameter::new(definition.key.clone(), value));
            }
            None => {}
        }
    }
    Ok(resolved)
}

/// Validate a whole query against the catalog and fill defaults.
///
/// # Errors
///
/// Returns `ControlError::Validation` for unknown names or undeclared
/// parameters.
pub fn resolve_query(spec: QuerySpec, catalog: &SensorCatalog) -> Result<QuerySpec> {
    let selectors = spec
        .selectors
        .into_iter()
        .map(|fragment| {
            let sensor = catalog.resolve(&fragment.name)?;
            let params = resolve_params(sensor, &fragment.params, fragment.fill_defaults)?;
            Ok(SelectorFragment { params, ..fragment })
        })
        .collect::<Result<Vec<_>>>()?;

    let groupings = spec
        .groupings
        .into_iter()
        .map(|fragment| {
            let sensor = catalog.resolve(&fragment.name)?;
            let params = resolve_params(sensor, &fragment.params, true)?;
            Ok(GroupingFragment { params, ..fragment })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(QuerySpec {
        selectors,
        groupings,
        combine: spec.combine,
    })
}

/// Parse a search term: `field:value`, bare digits (id), or bare text (name).
///
/// Only a lowercase snake_case prefix is taken as a field, so
/// `Name: with colon` searches by name for the whole term.
///
/// # Errors
///
/// Returns `ControlError::Validation` for empty terms or empty values.
pub fn parse_search_term(text: &str) -> Result<SearchGroup> {
    let term = text.trim();
    if term.is_empty() {
        return Err(ControlError::Validation("empty search term".to_string()));
    }

    if let Some((field, value)) = term.split_once(':') {
        let field = field.trim();
        if is_field_name(field) {
            let value = value.trim();
            if value.is_empty() {
                return Err(ControlError::Validation(format!(
                    "search term {term:?} has no value"
                )));
            }
            return Ok(SearchGroup::single(field, value));
        }
    }

    if term.chars().all(|c| c.is_ascii_digit()) {
        Ok(SearchGroup::single("id", term))
    } else {
        Ok(SearchGroup::single("name", term))
    }
}

/// Parse search terms, one group per term.
///
/// # Errors
///
/// Returns the first parse failure.
pub fn parse_search<S: AsRef<str>>(terms: &[S]) -> Result<SearchSpec> {
    let groups = terms
        .iter()
        .map(|t| parse_search_term(t.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    Ok(SearchSpec { groups })
}

/// Record fields are lowercase snake_case; anything else is part of a name.
fn is_field_name(field: &str) -> bool {
    field.starts_with(|c: char| c.is_ascii_lowercase())
        && field
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetq_core::ParameterDefinition;

    fn folder_search_sensor() -> Sensor {
        Sensor {
            id: Some(1.into()),
            name: Some("Folder Name Search with RegEx Match".to_string()),
            parameter_definition: vec![
                ParameterDefinition {
                    key: "dirname".to_string(),
                    ..Default::default()
                },
                ParameterDefinition {
                    key: "regex".to_string(),
                    ..Default::default()
                },
                ParameterDefinition {
                    key: "casesensitive".to_string(),
                    values: vec!["No".to_string(), "Yes".to_string()],
                    ..Default::default()
                },
                ParameterDefinition {
                    key: "global".to_string(),
                    default_value: "1".to_string(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    fn os_sensor() -> Sensor {
        Sensor {
            id: Some(2.into()),
            name: Some("Operating System".to_string()),
            ..Default::default()
        }
    }

    fn catalog() -> SensorCatalog {
        SensorCatalog::new([folder_search_sensor(), os_sensor()])
    }

    #[test]
    fn parses_selector_with_params() {
        let fragment =
            parse_selector("Folder Name Search with RegEx Match{dirname=Program Files,regex=Microsoft.*}")
                .unwrap();
        assert_eq!(fragment.name, "Folder Name Search with RegEx Match");
        assert_eq!(
            fragment.params,
            vec![
                Parameter::new("dirname", "Program Files"),
                Parameter::new("regex", "Microsoft.*"),
            ]
        );
    }

    #[test]
    fn parses_bare_selector() {
        let fragment = parse_selector("  Computer Name ").unwrap();
        assert_eq!(fragment.name, "Computer Name");
        assert!(fragment.params.is_empty());
        assert!(parse_selector("Computer Name{}").unwrap().params.is_empty());
    }

    #[test]
    fn rejects_malformed_selectors() {
        for bad in ["", "{a=b}", "Name{a=b", "Name}", "Name{a}", "Name{=b}", "Name{a=1,a=2}", "N{a={b}}"] {
            assert!(
                matches!(parse_selector(bad), Err(ControlError::Validation(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn parses_grouping() {
        let fragment = parse_grouping("Operating System, that contains:Windows").unwrap();
        assert_eq!(fragment.name, "Operating System");
        assert_eq!(fragment.operator, FilterOperator::Contains);
        assert_eq!(fragment.value, "Windows");

        let fragment = parse_grouping("Folder Name Search with RegEx Match{dirname=C:}, THAT is not equal to:x:y")
            .unwrap();
        assert_eq!(fragment.params, vec![Parameter::new("dirname", "C:")]);
        assert_eq!(fragment.operator, FilterOperator::NotEqual);
        assert_eq!(fragment.value, "x:y");
    }

    #[test]
    fn rejects_malformed_groupings() {
        assert!(parse_grouping("Operating System").is_err());
        assert!(parse_grouping("Operating System, that Windows").is_err());
        assert!(parse_grouping("Operating System, that sort of like:Windows").is_err());
    }

    #[test]
    fn operator_spellings() {
        assert_eq!(parse_operator(">=").unwrap(), FilterOperator::GreaterEqual);
        assert_eq!(parse_operator("Is  Less Than").unwrap(), FilterOperator::Less);
        assert_eq!(parse_operator("does not contain").unwrap(), FilterOperator::NotContains);
        assert!(parse_operator("approximately").is_err());
    }

    #[test]
    fn declared_params_complete_with_defaults() {
        let spec = QuerySpec {
            selectors: vec![parse_selector(
                "Folder Name Search with RegEx Match{dirname=Program Files,regex=Microsoft.*}",
            )
            .unwrap()],
            ..Default::default()
        };
        let resolved = resolve_query(spec, &catalog()).unwrap();
        let params = &resolved.selectors[0].params;
        let keys: Vec<&str> = params.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["dirname", "regex", "casesensitive", "global"]);
        assert_eq!(params[2].value, "No");
        assert_eq!(params[3].value, "1");
    }

    #[test]
    fn fill_defaults_can_be_disabled() {
        let fragment = SelectorFragment {
            name: "Folder Name Search with RegEx Match".to_string(),
            params: vec![Parameter::new("regex", ".*")],
            fill_defaults: false,
        };
        let spec = QuerySpec {
            selectors: vec![fragment],
            ..Default::default()
        };
        let resolved = resolve_query(spec, &catalog()).unwrap();
        assert_eq!(resolved.selectors[0].params, vec![Parameter::new("regex", ".*")]);
    }

    #[test]
    fn undeclared_param_is_rejected() {
        let spec = QuerySpec {
            selectors: vec![parse_selector("Operating System{verbose=1}").unwrap()],
            ..Default::default()
        };
        let err = resolve_query(spec, &catalog()).unwrap_err();
        assert!(matches!(err, ControlError::Validation(ref m) if m.contains("verbose")));
    }

    #[test]
    fn unknown_name_is_rejected() {
        let spec = QuerySpec {
            groupings: vec![parse_grouping("Installed Gadgets, that contains:x").unwrap()],
            ..Default::default()
        };
        assert!(matches!(
            resolve_query(spec, &catalog()),
            Err(ControlError::Validation(_))
        ));
    }

    #[test]
    fn referenced_names_dedupe() {
        let spec = QuerySpec {
            selectors: vec![
                SelectorFragment::named("Operating System"),
                SelectorFragment::named("Computer Name"),
            ],
            groupings: vec![parse_grouping("Operating System, that contains:Windows").unwrap()],
            ..Default::default()
        };
        assert_eq!(
            referenced_names(&spec),
            vec!["Operating System".to_string(), "Computer Name".to_string()]
        );
    }

    #[test]
    fn search_terms() {
        let spec = parse_search(&["id:4", "17", "Administrator", "url_regex:http://x", "Name: with colon"])
            .unwrap();
        let pairs: Vec<(&str, &str)> = spec
            .groups
            .iter()
            .map(|g| (g.constraints[0].field.as_str(), g.constraints[0].value.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("id", "4"),
                ("id", "17"),
                ("name", "Administrator"),
                ("url_regex", "http://x"),
                ("name", "Name: with colon"),
            ]
        );
        assert!(parse_search_term("  ").is_err());
        assert!(parse_search_term("name:").is_err());
    }

    #[test]
    fn capitalized_prefix_is_not_a_field() {
        for (term, field, value) in [
            ("Id:5", "name", "Id:5"),
            ("Name: with colon", "name", "Name: with colon"),
            ("source_id:0", "source_id", "0"),
            ("_hidden:1", "name", "_hidden:1"),
        ] {
            let group = parse_search_term(term).unwrap();
            assert_eq!(group.constraints[0].field, field, "{term}");
            assert_eq!(group.constraints[0].value, value, "{term}");
        }
    }

    #[test]
    fn structured_inputs_pass_through() {
        let inputs: Vec<SelectorInput> = serde_json::from_str(
            r#"["Computer Name", {"name": "Operating System", "params": []}]"#,
        )
        .unwrap();
        let fragments = parse_selectors(&inputs).unwrap();
        assert_eq!(fragments[0].name, "Computer Name");
        assert_eq!(fragments[1].name, "Operating System");
        assert!(fragments[1].fill_defaults);
    }
}
