//! CLI configuration and profiles files.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tollgate_licensing::{
    LicenseAttestationProfileRegistry, PackOptions, ProfilePack, ProfileSpec,
};

/// CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CliConfig {
    /// Profiles file used when `--profiles` is not given.
    pub profiles_file: Option<PathBuf>,
    /// Profile used when `--profile` is not given.
    pub default_profile: Option<String>,
    /// Output format.
    #[serde(default)]
    pub output_format: OutputFormat,
    /// Emit logs as JSON lines.
    #[serde(default)]
    pub json_logs: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Yaml,
}

impl CliConfig {
    /// Load configuration from file.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let path = Self::config_path()?;
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            Ok(serde_yaml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file.
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the configuration file path.
    pub fn config_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        let dirs = directories::ProjectDirs::from("dev", "tollgate", "tollgate")
            .ok_or("Could not determine config directory")?;
        Ok(dirs.config_dir().join("config.yaml"))
    }

    /// Set a configuration value.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "profiles_file" => self.profiles_file = Some(PathBuf::from(value)),
            "default_profile" => self.default_profile = Some(value.to_string()),
            "output_format" => {
                self.output_format = match value {
                    "table" => OutputFormat::Table,
                    "json" => OutputFormat::Json,
                    "yaml" => OutputFormat::Yaml,
                    _ => return Err(format!("Invalid output format: {}", value)),
                };
            }
            "json_logs" => {
                self.json_logs = value
                    .parse()
                    .map_err(|_| format!("Invalid boolean: {}", value))?;
            }
            _ => return Err(format!("Unknown config key: {}", key)),
        }
        Ok(())
    }
}

/// A pack entry in a profiles file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackEntry {
    pub pack: ProfilePack,
    #[serde(flatten)]
    pub options: PackOptions,
}

/// YAML file listing profiles and packs to install.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfilesFile {
    /// Default profile id; otherwise the first registered profile.
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub profiles: Vec<ProfileSpec>,
    #[serde(default)]
    pub packs: Vec<PackEntry>,
}

impl ProfilesFile {
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Register everything in this file.
    pub fn install(
        self,
        registry: &mut LicenseAttestationProfileRegistry,
    ) -> tollgate_core::Result<()> {
        for spec in self.profiles {
            registry.register_spec(spec)?;
        }
        for entry in &self.packs {
            registry.install_pack(entry.pack, &entry.options)?;
        }
        if let Some(default) = &self.default {
            registry.set_default_profile(default)?;
        }
        Ok(())
    }
}
