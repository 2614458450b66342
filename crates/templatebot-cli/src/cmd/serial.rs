use crate::output::print_json;
use clap::Args;
use templatebot_core::serial;

#[derive(Args, Debug)]
pub struct SerialArgs {
    /// Series prefix, e.g. SQR. TAKEN are then repository names such as sqr-001
    #[arg(long)]
    pub series: Option<String>,

    /// Serial numbers already in use (repository names with --series)
    pub taken: Vec<String>,
}

pub fn run(args: SerialArgs, json: bool) -> anyhow::Result<()> {
    let existing: Vec<u32> = match &args.series {
        Some(series) => serial::numbers_in_series(args.taken.iter().map(String::as_str), series),
        None => args
            .taken
            .iter()
            .map(|s| {
                s.parse::<u32>()
                    .map_err(|_| anyhow::anyhow!("'{s}' is not a serial number"))
            })
            .collect::<anyhow::Result<_>>()?,
    };
    let next = serial::propose(&existing);
    let name = args
        .series
        .as_deref()
        .map(|series| format!("{}-{}", series.to_lowercase(), serial::format_serial(next)));

    if json {
        return print_json(&serde_json::json!({
            "serial": next,
            "repo_name": name,
        }));
    }
    match name {
        Some(name) => println!("{name}"),
        None => println!("{next}"),
    }
    Ok(())
}
