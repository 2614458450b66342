//! Template definitions parsed from a repository checkout.
//!
//! A checkout follows the templatekit layout: every directory under
//! `project_templates/` or `file_templates/` holding a `templatekit.yaml`
//! manifest is one template. Manifests are parsed once, into closed
//! [`FieldSpec`] variants, so downstream code never inspects loose maps.

use crate::error::{Result, TemplatebotError};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// TemplateKind / TemplateClass
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    File,
    Project,
}

impl TemplateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateKind::File => "file",
            TemplateKind::Project => "project",
        }
    }
}

impl std::fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provisioning class of a template. Selects how the destination repository
/// identity is derived and whether the docs host is involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateClass {
    /// Auto-numbered technical notes (`technote_*`).
    Technote,
    /// Change-controlled documents with a user-assigned handle (`latex_lsstdoc`).
    ChangeControlDoc,
    /// Test reports with a user-assigned handle (`test_report`).
    TestReport,
    /// Science pipelines stack packages (`stack_package`).
    StackPackage,
    Generic,
}

impl TemplateClass {
    pub fn for_template(name: &str, kind: TemplateKind) -> Self {
        if kind == TemplateKind::File {
            return TemplateClass::Generic;
        }
        match name {
            n if n.starts_with("technote_") => TemplateClass::Technote,
            "latex_lsstdoc" => TemplateClass::ChangeControlDoc,
            "test_report" => TemplateClass::TestReport,
            "stack_package" => TemplateClass::StackPackage,
            _ => TemplateClass::Generic,
        }
    }

    /// Document classes get a docs site registered alongside the repository.
    pub fn is_document(&self) -> bool {
        matches!(
            self,
            TemplateClass::Technote | TemplateClass::ChangeControlDoc | TemplateClass::TestReport
        )
    }
}

// ---------------------------------------------------------------------------
// FieldSpec
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    pub label: String,
    /// Short value carried by the menu (Slack caps option values at 75 chars).
    pub value: String,
    /// Full value handed to the template.
    pub stored_value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetOption {
    pub label: String,
    pub value: String,
    pub preset_vars: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetGroupOption {
    pub label: String,
    pub preset_vars: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetGroup {
    pub group_label: String,
    pub options: Vec<PresetGroupOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldSpec {
    Text {
        key: String,
        label: String,
        placeholder: Option<String>,
        hint: Option<String>,
        multiline: bool,
        optional: bool,
    },
    Select {
        key: String,
        label: String,
        options: Vec<SelectOption>,
        optional: bool,
    },
    PresetOptions {
        label: String,
        options: Vec<PresetOption>,
    },
    PresetGroups {
        label: String,
        groups: Vec<PresetGroup>,
    },
}

impl FieldSpec {
    /// The key under which this field's value appears in a submission.
    pub fn lookup_key(&self) -> &str {
        match self {
            FieldSpec::Text { key, .. } | FieldSpec::Select { key, .. } => key,
            FieldSpec::PresetOptions { label, .. } | FieldSpec::PresetGroups { label, .. } => {
                label
            }
        }
    }

    pub fn label(&self) -> &str {
        match self {
            FieldSpec::Text { label, .. }
            | FieldSpec::Select { label, .. }
            | FieldSpec::PresetOptions { label, .. }
            | FieldSpec::PresetGroups { label, .. } => label,
        }
    }
}

// ---------------------------------------------------------------------------
// TemplateDefinition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateDefinition {
    /// Directory name, e.g. `technote_rst`.
    pub name: String,
    pub kind: TemplateKind,
    pub class: TemplateClass,
    pub group: String,
    pub display_name: String,
    pub dialog_title: String,
    pub fields: Vec<FieldSpec>,
    /// Template source directory inside the checkout.
    pub dir: PathBuf,
}

impl TemplateDefinition {
    /// Templates without dialog fields render without asking the user anything.
    pub fn is_configurable(&self) -> bool {
        !self.fields.is_empty()
    }

    pub fn field(&self, lookup_key: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.lookup_key() == lookup_key)
    }
}

// ---------------------------------------------------------------------------
// Manifest schema (templatekit.yaml)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawManifest {
    name: String,
    #[serde(default = "default_group")]
    group: String,
    #[serde(default)]
    dialog_title: Option<String>,
    #[serde(default)]
    dialog_fields: Vec<RawField>,
}

fn default_group() -> String {
    "General".to_string()
}

#[derive(Debug, Deserialize)]
struct RawField {
    #[serde(default = "default_component")]
    component: String,
    #[serde(default)]
    key: Option<String>,
    label: String,
    #[serde(default)]
    placeholder: Option<String>,
    #[serde(default)]
    hint: Option<String>,
    #[serde(default)]
    optional: bool,
    #[serde(default)]
    options: Option<Vec<RawSelectOption>>,
    #[serde(default)]
    preset_options: Option<Vec<RawPresetOption>>,
    #[serde(default)]
    preset_groups: Option<Vec<RawPresetGroup>>,
}

fn default_component() -> String {
    "text".to_string()
}

#[derive(Debug, Deserialize)]
struct RawSelectOption {
    label: String,
    value: String,
    #[serde(default)]
    template_value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPresetOption {
    label: String,
    value: String,
    #[serde(default)]
    presets: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RawPresetGroupOption {
    label: String,
    #[serde(default)]
    presets: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RawPresetGroup {
    group_label: String,
    options: Vec<RawPresetGroupOption>,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.is_empty())
}

impl RawField {
    fn into_spec(self, template: &str) -> Result<FieldSpec> {
        // Preset menus are recognised by their keys, whatever the component.
        if let Some(options) = self.preset_options {
            return Ok(FieldSpec::PresetOptions {
                label: self.label,
                options: options
                    .into_iter()
                    .map(|o| PresetOption {
                        label: o.label,
                        value: o.value,
                        preset_vars: o.presets,
                    })
                    .collect(),
            });
        }
        if let Some(groups) = self.preset_groups {
            return Ok(FieldSpec::PresetGroups {
                label: self.label,
                groups: groups
                    .into_iter()
                    .map(|g| PresetGroup {
                        group_label: g.group_label,
                        options: g
                            .options
                            .into_iter()
                            .map(|o| PresetGroupOption {
                                label: o.label,
                                preset_vars: o.presets,
                            })
                            .collect(),
                    })
                    .collect(),
            });
        }

        let malformed = |msg: &str| {
            TemplatebotError::MalformedRepository(format!(
                "template '{template}', field '{}': {msg}",
                self.label
            ))
        };
        match self.component.as_str() {
            "select" => {
                let key = self.key.clone().ok_or_else(|| malformed("select without key"))?;
                let options = self
                    .options
                    .ok_or_else(|| malformed("select without options"))?
                    .into_iter()
                    .map(|o| SelectOption {
                        stored_value: o.template_value.unwrap_or_else(|| o.value.clone()),
                        label: o.label,
                        value: o.value,
                    })
                    .collect();
                Ok(FieldSpec::Select {
                    key,
                    label: self.label,
                    options,
                    optional: self.optional,
                })
            }
            "text" | "textarea" => {
                let key = self.key.clone().ok_or_else(|| malformed("text field without key"))?;
                Ok(FieldSpec::Text {
                    key,
                    multiline: self.component == "textarea",
                    label: self.label,
                    placeholder: non_empty(self.placeholder),
                    hint: self.hint,
                    optional: self.optional,
                })
            }
            other => Err(malformed(&format!("unknown component '{other}'"))),
        }
    }
}

fn load_template(dir: &Path, kind: TemplateKind) -> Result<TemplateDefinition> {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let manifest_path = paths::template_manifest(dir);
    let text = std::fs::read_to_string(&manifest_path)?;
    let raw: RawManifest = serde_yaml::from_str(&text).map_err(|e| {
        TemplatebotError::MalformedRepository(format!("{}: {e}", manifest_path.display()))
    })?;

    let mut fields = Vec::with_capacity(raw.dialog_fields.len());
    let mut seen = HashSet::new();
    for raw_field in raw.dialog_fields {
        let spec = raw_field.into_spec(&name)?;
        if !seen.insert(spec.lookup_key().to_string()) {
            return Err(TemplatebotError::MalformedRepository(format!(
                "template '{name}' declares '{}' more than once",
                spec.lookup_key()
            )));
        }
        fields.push(spec);
    }

    Ok(TemplateDefinition {
        class: TemplateClass::for_template(&name, kind),
        dialog_title: raw.dialog_title.unwrap_or_else(|| raw.name.clone()),
        display_name: raw.name,
        group: raw.group,
        name,
        kind,
        fields,
        dir: dir.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// TemplateCatalog
// ---------------------------------------------------------------------------

/// A group of templates as presented in a selection menu.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MenuGroup {
    pub label: String,
    pub entries: Vec<MenuEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MenuEntry {
    pub name: String,
    pub display_name: String,
}

/// Read-only view of the templates in one checkout.
#[derive(Debug, Clone)]
pub struct TemplateCatalog {
    root: PathBuf,
    templates: BTreeMap<String, TemplateDefinition>,
}

impl TemplateCatalog {
    /// Parse every template under `checkout`.
    pub fn open(checkout: &Path) -> Result<Self> {
        let mut templates = BTreeMap::new();
        let mut found_layout = false;
        for (dir, kind) in [
            (paths::project_templates_dir(checkout), TemplateKind::Project),
            (paths::file_templates_dir(checkout), TemplateKind::File),
        ] {
            if !dir.is_dir() {
                continue;
            }
            found_layout = true;
            for entry in std::fs::read_dir(&dir)? {
                let entry = entry?;
                if !entry.file_type()?.is_dir() {
                    continue;
                }
                let path = entry.path();
                if !paths::template_manifest(&path).is_file() {
                    continue;
                }
                let template = load_template(&path, kind)?;
                if templates.contains_key(&template.name) {
                    return Err(TemplatebotError::MalformedRepository(format!(
                        "template name '{}' is used by both a file and a project template",
                        template.name
                    )));
                }
                templates.insert(template.name.clone(), template);
            }
        }
        if !found_layout {
            return Err(TemplatebotError::MalformedRepository(format!(
                "{} has neither {}/ nor {}/",
                checkout.display(),
                paths::PROJECT_TEMPLATES_DIR,
                paths::FILE_TEMPLATES_DIR
            )));
        }
        Ok(Self {
            root: checkout.to_path_buf(),
            templates,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn get(&self, name: &str) -> Result<&TemplateDefinition> {
        self.templates
            .get(name)
            .ok_or_else(|| TemplatebotError::TemplateNotFound(name.to_string()))
    }

    pub fn iter(&self, kind: TemplateKind) -> impl Iterator<Item = &TemplateDefinition> {
        self.templates.values().filter(move |t| t.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Templates of `kind` grouped for a selection menu: groups sorted by
    /// label with `General` first, entries sorted by display name.
    pub fn menu(&self, kind: TemplateKind) -> Vec<MenuGroup> {
        let mut grouped: BTreeMap<&str, Vec<MenuEntry>> = BTreeMap::new();
        for t in self.iter(kind) {
            grouped.entry(t.group.as_str()).or_default().push(MenuEntry {
                name: t.name.clone(),
                display_name: t.display_name.clone(),
            });
        }

        let mut groups: Vec<MenuGroup> = grouped
            .into_iter()
            .map(|(label, mut entries)| {
                entries.sort_by(|a, b| a.display_name.cmp(&b.display_name));
                MenuGroup {
                    label: label.to_string(),
                    entries,
                }
            })
            .collect();
        if let Some(pos) = groups.iter().position(|g| g.label == "General") {
            let general = groups.remove(pos);
            groups.insert(0, general);
        }
        groups
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    pub(crate) const STACK_PACKAGE: &str = r#"
name: "Stack package (EUPS)"
group: "Science Pipelines"
dialog_title: "Create a package"
dialog_fields:
  - component: text
    key: package_name
    label: "Package name"
    placeholder: "afw"
  - component: select
    key: github_org
    label: "GitHub organization"
    options:
      - label: "lsst"
        value: "lsst"
      - label: "lsst-dm"
        value: "lsst-dm"
  - component: select
    label: "License"
    preset_groups:
      - group_label: "Recommended"
        options:
          - label: "GPLv3"
            presets:
              license: "gpl-3.0"
              license_file: "COPYING"
      - group_label: "Other"
        options:
          - label: "MIT"
            presets:
              license: "mit"
              license_file: "LICENSE"
  - component: textarea
    key: summary
    label: "Summary"
    optional: true
"#;

    pub(crate) const TECHNOTE: &str = r#"
name: "Technote (reStructuredText)"
group: "Documentation"
dialog_fields:
  - component: text
    key: title
    label: "Title"
  - component: select
    label: "Series"
    preset_options:
      - label: "SQR"
        value: "sqr"
        presets:
          series: "SQR"
          github_org: "lsst-sqre"
      - label: "DMTN"
        value: "dmtn"
        presets:
          series: "DMTN"
          github_org: "lsst-dm"
  - component: text
    key: author_id
    label: "Author ID"
    optional: true
"#;

    pub(crate) fn write_template(root: &Path, kind_dir: &str, name: &str, manifest: &str) {
        let dir = root.join(kind_dir).join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(paths::TEMPLATE_MANIFEST), manifest).unwrap();
    }

    pub(crate) fn fixture_checkout() -> TempDir {
        let dir = TempDir::new().unwrap();
        write_template(dir.path(), "project_templates", "stack_package", STACK_PACKAGE);
        write_template(dir.path(), "project_templates", "technote_rst", TECHNOTE);
        write_template(
            dir.path(),
            "file_templates",
            "copyright",
            "name: \"COPYRIGHT\"\ngroup: \"General\"\n",
        );
        dir
    }

    #[test]
    fn parses_field_variants() {
        let dir = fixture_checkout();
        let catalog = TemplateCatalog::open(dir.path()).unwrap();
        let t = catalog.get("stack_package").unwrap();
        assert_eq!(t.kind, TemplateKind::Project);
        assert_eq!(t.class, TemplateClass::StackPackage);
        assert_eq!(t.dialog_title, "Create a package");
        assert_eq!(t.fields.len(), 4);
        assert!(matches!(t.fields[0], FieldSpec::Text { multiline: false, .. }));
        match &t.fields[1] {
            FieldSpec::Select { options, .. } => assert_eq!(options[1].stored_value, "lsst-dm"),
            other => panic!("expected select, got {other:?}"),
        }
        match &t.fields[2] {
            FieldSpec::PresetGroups { label, groups } => {
                assert_eq!(label, "License");
                assert_eq!(groups.len(), 2);
                assert_eq!(groups[0].options[0].preset_vars["license"], "gpl-3.0");
            }
            other => panic!("expected preset groups, got {other:?}"),
        }
        assert!(matches!(
            t.fields[3],
            FieldSpec::Text { multiline: true, optional: true, .. }
        ));
        assert_eq!(t.field("License").unwrap().label(), "License");
    }

    #[test]
    fn classes_follow_template_names() {
        let dir = fixture_checkout();
        let catalog = TemplateCatalog::open(dir.path()).unwrap();
        assert_eq!(catalog.get("technote_rst").unwrap().class, TemplateClass::Technote);
        assert_eq!(catalog.get("copyright").unwrap().class, TemplateClass::Generic);
        assert!(!catalog.get("copyright").unwrap().is_configurable());
        assert_eq!(
            TemplateClass::for_template("latex_lsstdoc", TemplateKind::Project),
            TemplateClass::ChangeControlDoc
        );
        assert!(TemplateClass::TestReport.is_document());
        assert!(!TemplateClass::StackPackage.is_document());
    }

    #[test]
    fn missing_template_is_lookup_error() {
        let dir = fixture_checkout();
        let catalog = TemplateCatalog::open(dir.path()).unwrap();
        assert!(matches!(
            catalog.get("nope"),
            Err(TemplatebotError::TemplateNotFound(_))
        ));
    }

    #[test]
    fn menu_puts_general_first() {
        let dir = fixture_checkout();
        write_template(
            dir.path(),
            "project_templates",
            "fastapi",
            "name: \"FastAPI app\"\ngroup: \"General\"\n",
        );
        write_template(
            dir.path(),
            "project_templates",
            "technote_md",
            "name: \"Technote (Markdown)\"\ngroup: \"Documentation\"\n",
        );
        let catalog = TemplateCatalog::open(dir.path()).unwrap();
        let menu = catalog.menu(TemplateKind::Project);
        let labels: Vec<_> = menu.iter().map(|g| g.label.as_str()).collect();
        assert_eq!(labels, vec!["General", "Documentation", "Science Pipelines"]);
        let docs: Vec<_> = menu[1].entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(docs, vec!["technote_md", "technote_rst"]);
        assert_eq!(catalog.menu(TemplateKind::File).len(), 1);
    }

    #[test]
    fn preset_menus_are_recognised_without_select_component() {
        let dir = TempDir::new().unwrap();
        write_template(
            dir.path(),
            "project_templates",
            "presets",
            r#"name: presets
dialog_fields:
  - label: "Series"
    preset_options:
      - label: "SQR"
        value: "sqr"
        presets:
          series: "SQR"
  - component: text
    label: "License"
    preset_groups:
      - group_label: "Open source"
        options:
          - label: "MIT"
            presets:
              license: "mit"
"#,
        );
        let catalog = TemplateCatalog::open(dir.path()).unwrap();
        let t = catalog.get("presets").unwrap();
        assert!(matches!(&t.fields[0], FieldSpec::PresetOptions { options, .. } if options[0].value == "sqr"));
        assert!(matches!(&t.fields[1], FieldSpec::PresetGroups { groups, .. } if groups[0].options[0].label == "MIT"));
    }

    #[test]
    fn unknown_component_is_malformed() {
        let dir = TempDir::new().unwrap();
        write_template(
            dir.path(),
            "project_templates",
            "bad",
            "name: bad\ndialog_fields:\n  - component: checkbox\n    key: x\n    label: X\n",
        );
        assert!(matches!(
            TemplateCatalog::open(dir.path()),
            Err(TemplatebotError::MalformedRepository(_))
        ));
    }

    #[test]
    fn duplicate_lookup_keys_are_malformed() {
        let dir = TempDir::new().unwrap();
        write_template(
            dir.path(),
            "project_templates",
            "dup",
            "name: dup\ndialog_fields:\n  - key: a\n    label: A\n  - key: a\n    label: Again\n",
        );
        let err = TemplateCatalog::open(dir.path()).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn checkout_without_layout_is_malformed() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            TemplateCatalog::open(dir.path()),
            Err(TemplatebotError::MalformedRepository(_))
        ));
    }
}
