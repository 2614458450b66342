//! Turning raw modal submissions into template variables.
//!
//! A submission is keyed by each field's lookup key (see
//! [`FieldSpec::lookup_key`]). Preset fields expand into several template
//! variables and disappear from the output; select fields are canonicalised
//! from their short menu value to the full stored value.

use crate::catalog::{FieldSpec, TemplateDefinition};
use crate::error::{Result, TemplatebotError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Values as received from a user interaction. `None` marks an optional
/// field the user left empty.
pub type RawSubmission = BTreeMap<String, Option<String>>;

/// The final variable set handed to the renderer. Never contains nulls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolvedVariables(BTreeMap<String, String>);

impl ResolvedVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Like [`get`](Self::get) but treats absent and blank values as missing.
    pub fn require(&self, key: &str) -> Result<&str> {
        match self.get(key) {
            Some(v) if !v.trim().is_empty() => Ok(v),
            _ => Err(TemplatebotError::MissingVariable(key.to_string())),
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }
}

impl From<BTreeMap<String, String>> for ResolvedVariables {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, String)> for ResolvedVariables {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Resolve `submission` against the fields declared by `template`.
///
/// A preset or select value that matches none of the declared options is
/// rejected with [`TemplatebotError::UnknownOption`]; a preset or select
/// field that is absent from the submission is left for the template's own
/// defaults.
pub fn resolve(template: &TemplateDefinition, submission: &RawSubmission) -> Result<ResolvedVariables> {
    let mut data: BTreeMap<String, String> = submission
        .iter()
        .filter_map(|(k, v)| v.as_ref().map(|v| (k.clone(), v.clone())))
        .collect();

    for field in &template.fields {
        match field {
            FieldSpec::PresetGroups { label, groups } => {
                let Some(selected) = data.remove(label) else {
                    continue;
                };
                let option = groups
                    .iter()
                    .flat_map(|g| g.options.iter())
                    .find(|o| o.label == selected)
                    .ok_or_else(|| unknown_option(label, &selected))?;
                data.extend(option.preset_vars.clone());
            }
            FieldSpec::PresetOptions { label, options } => {
                let Some(selected) = data.remove(label) else {
                    continue;
                };
                let option = options
                    .iter()
                    .find(|o| o.value == selected)
                    .ok_or_else(|| unknown_option(label, &selected))?;
                data.extend(option.preset_vars.clone());
            }
            FieldSpec::Select { key, options, .. } => {
                let Some(selected) = data.get_mut(key) else {
                    continue;
                };
                let option = options
                    .iter()
                    .find(|o| o.value == *selected)
                    .ok_or_else(|| unknown_option(key, selected))?;
                *selected = option.stored_value.clone();
            }
            FieldSpec::Text { .. } => {}
        }
    }

    Ok(ResolvedVariables(data))
}

fn unknown_option(field: &str, value: &str) -> TemplatebotError {
    TemplatebotError::UnknownOption {
        field: field.to_string(),
        value: value.to_string(),
    }
}

/// Render `key = value` lines for echoing a submission back to the user.
pub fn describe(vars: &ResolvedVariables) -> String {
    vars.iter()
        .map(|(k, v)| format!("- `{k}` = `{v}`"))
        .collect::<Vec<_>>()
        .join("\n")
}
