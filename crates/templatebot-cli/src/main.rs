mod cmd;
mod output;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "templatebot",
    about = "Create GitHub projects and files from the LSST templates repository",
    version,
    propagate_version = true
)]
struct Cli {
    /// YAML config file; TEMPLATEBOT_* environment variables override it
    #[arg(long, short = 'c', global = true, env = "TEMPLATEBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8080", env = "TEMPLATEBOT_PORT")]
        port: u16,
    },

    /// List the templates in the template repository
    Templates(cmd::templates::TemplatesArgs),

    /// Resolve dialog values into the variables a template is rendered with
    Resolve(cmd::resolve::ResolveArgs),

    /// Propose the next serial number in a document series
    Serial(cmd::serial::SerialArgs),

    /// Inspect and validate the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let config = cli.config.as_deref();

    let result = match cli.command {
        Commands::Serve { port } => cmd::serve::run(config, port),
        Commands::Templates(args) => cmd::templates::run(config, args, cli.json),
        Commands::Resolve(args) => cmd::resolve::run(config, args, cli.json),
        Commands::Serial(args) => cmd::serial::run(args, cli.json),
        Commands::Config { subcommand } => cmd::config::run(config, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
