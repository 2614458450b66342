use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Args;
use std::path::Path;
use templatebot_core::variables::{self, RawSubmission};

use super::source::SourceArgs;

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Template name (its directory name, e.g. stack_package)
    pub template: String,

    /// A dialog value as KEY=VALUE; KEY is the field key, or the label of a
    /// preset menu
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_pair)]
    pub values: Vec<(String, String)>,

    #[command(flatten)]
    pub source: SourceArgs,
}

fn parse_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

pub fn run(config_path: Option<&Path>, args: ResolveArgs, json: bool) -> anyhow::Result<()> {
    let catalog = args.source.catalog(config_path)?;
    let template = catalog.get(&args.template)?;

    let submission: RawSubmission = args
        .values
        .into_iter()
        .map(|(k, v)| (k, Some(v)))
        .collect();
    let vars = variables::resolve(template, &submission)
        .with_context(|| format!("resolving variables for '{}'", template.name))?;

    if json {
        return print_json(&vars);
    }
    let rows = vars
        .iter()
        .map(|(k, v)| vec![k.to_string(), v.to_string()])
        .collect();
    print_table(&["VARIABLE", "VALUE"], rows);
    Ok(())
}
