//! CLI command definitions.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a license file
    Validate {
        /// Path to the license file (JSON or YAML)
        #[arg(short, long)]
        license: PathBuf,

        /// Profiles file; falls back to the configured one
        #[arg(long)]
        profiles: Option<PathBuf>,

        /// Profile id; falls back to the registry default
        #[arg(long)]
        profile: Option<String>,

        /// Keep running and print every status change
        #[arg(short, long)]
        watch: bool,
    },

    /// Inspect attestation profiles
    Profiles {
        #[command(subcommand)]
        command: ProfileCommands,
    },

    /// Inspect built-in profile packs
    Packs {
        #[command(subcommand)]
        command: PackCommands,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ProfileCommands {
    /// List profiles
    List {
        /// Profiles file; falls back to the configured one
        #[arg(long)]
        profiles: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum PackCommands {
    /// Show the profiles a pack expands to
    Show {
        /// Pack name (enterprise-saas, growth, edge-offline)
        pack: String,

        /// Regions to instantiate
        #[arg(short, long, value_delimiter = ',', default_value = "global")]
        regions: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Set configuration value
    Set {
        /// Key
        key: String,

        /// Value
        value: String,
    },
}
