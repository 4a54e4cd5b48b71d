//! Tollgate CLI entrypoint.

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod handlers;

use commands::{Commands, ConfigCommands, PackCommands, ProfileCommands};
use config::CliConfig;

#[derive(Parser)]
#[command(name = "tollgate")]
#[command(author, version, about = "Tollgate license validation", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = CliConfig::load().unwrap_or_default();
    init_tracing(cli.json_logs || config.json_logs);

    match cli.command {
        Commands::Validate {
            license,
            profiles,
            profile,
            watch,
        } => handlers::validate(&config, &license, profiles, profile, watch).await?,
        Commands::Profiles { command } => match command {
            ProfileCommands::List { profiles } => handlers::list_profiles(&config, profiles)?,
        },
        Commands::Packs { command } => match command {
            PackCommands::Show { pack, regions } => handlers::show_pack(&config, &pack, regions)?,
        },
        Commands::Config { command } => match command {
            ConfigCommands::Show => handlers::show_config(&config)?,
            ConfigCommands::Set { key, value } => handlers::set_config(&key, &value)?,
        },
    }

    Ok(())
}
