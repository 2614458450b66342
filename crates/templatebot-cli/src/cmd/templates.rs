use crate::output::{print_json, print_table};
use clap::{Args, ValueEnum};
use std::path::Path;
use templatebot_core::catalog::TemplateKind;

use super::source::SourceArgs;

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum KindArg {
    Project,
    File,
}

impl From<KindArg> for TemplateKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Project => TemplateKind::Project,
            KindArg::File => TemplateKind::File,
        }
    }
}

#[derive(Args, Debug)]
pub struct TemplatesArgs {
    /// Template kind to list
    #[arg(long, value_enum, default_value = "project")]
    pub kind: KindArg,

    #[command(flatten)]
    pub source: SourceArgs,
}

pub fn run(config_path: Option<&Path>, args: TemplatesArgs, json: bool) -> anyhow::Result<()> {
    let catalog = args.source.catalog(config_path)?;
    let kind = TemplateKind::from(args.kind);
    let menu = catalog.menu(kind);

    if json {
        return print_json(&menu);
    }
    if menu.is_empty() {
        println!("No {kind} templates.");
        return Ok(());
    }

    let mut rows = Vec::new();
    for group in &menu {
        for entry in &group.entries {
            let fields = catalog
                .get(&entry.name)
                .map(|t| t.fields.len().to_string())
                .unwrap_or_default();
            rows.push(vec![
                group.label.clone(),
                entry.name.clone(),
                entry.display_name.clone(),
                fields,
            ]);
        }
    }
    print_table(&["GROUP", "NAME", "DISPLAY NAME", "FIELDS"], rows);
    Ok(())
}
