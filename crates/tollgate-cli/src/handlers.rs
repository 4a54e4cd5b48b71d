//! Command handlers.

use crate::config::{CliConfig, OutputFormat, ProfilesFile};
use console::style;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tollgate_licensing::{
    AttestationProfile, AttestorOverrides, License, LicenseAttestationProfileRegistry,
    LicenseManager, LicenseState, LicenseStatus, PackOptions, ProfilePack, ProfileSource,
    ValidationContext,
};
use tracing::info;

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Validate a license file, optionally through a remote attestation profile.
pub async fn validate(
    config: &CliConfig,
    license_path: &Path,
    profiles: Option<PathBuf>,
    profile: Option<String>,
    watch: bool,
) -> CliResult {
    let license = load_license(license_path)?;
    let manager = Arc::new(LicenseManager::new());
    manager.set_license(license)?;

    let profiles_path = profiles.or_else(|| config.profiles_file.clone());
    match profiles_path {
        Some(path) => {
            let registry = load_registry(&path)?;
            let profile_id = profile.or_else(|| config.default_profile.clone());
            let created =
                registry.create_attestor(profile_id.as_deref(), AttestorOverrides::default())?;
            println!(
                "{} Attesting with profile {}",
                style("▶").cyan(),
                style(&created.profile.id).bold()
            );
            info!(profile_id = %created.profile.id, "Binding remote attestor");
            let context = created.binding.context();
            manager
                .attach_attestor(created.attestor, created.binding)
                .await?;
            // Deferred bindings only validate on schedule.
            if !watch && manager.status().state == LicenseState::Pending {
                manager.validate(&context).await;
            }
        }
        None => {
            manager.validate(&ValidationContext::new()).await;
        }
    }

    let status = manager.status();
    print_status(config.output_format, &status)?;

    if watch {
        let format = config.output_format;
        manager.on_status_change(move |status| {
            if let Err(e) = print_status(format, status) {
                eprintln!("{} {}", style("✗").red(), e);
            }
        });
        println!("  Watching for status changes (Ctrl+C to stop)...");
        tokio::signal::ctrl_c().await?;
        manager.detach_attestor();
        return Ok(());
    }

    manager.detach_attestor();
    if status.is_valid() {
        Ok(())
    } else {
        Err(format!(
            "License is {} ({})",
            status.state,
            status.reason.as_deref().unwrap_or("unknown")
        )
        .into())
    }
}

/// List the profiles in a profiles file.
pub fn list_profiles(config: &CliConfig, profiles: Option<PathBuf>) -> CliResult {
    let path = profiles
        .or_else(|| config.profiles_file.clone())
        .ok_or("No profiles file given; pass --profiles or set profiles_file")?;
    let registry = load_registry(&path)?;
    print_profiles(config.output_format, &registry.profiles(), registry.default_profile_id())
}

/// Show what a pack expands to.
pub fn show_pack(config: &CliConfig, pack: &str, regions: Vec<String>) -> CliResult {
    let pack: ProfilePack = pack.parse()?;
    let options = PackOptions::default().with_regions(regions);
    let profiles = pack.profiles(&options);
    let refs: Vec<&AttestationProfile> = profiles.iter().collect();
    print_profiles(config.output_format, &refs, None)
}

/// Show current configuration.
pub fn show_config(config: &CliConfig) -> CliResult {
    println!("Current configuration:");
    println!(
        "  profiles_file: {}",
        config
            .profiles_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(not set)".to_string())
    );
    println!(
        "  default_profile: {}",
        config.default_profile.as_deref().unwrap_or("(not set)")
    );
    println!("  output_format: {:?}", config.output_format);
    println!("  json_logs: {}", config.json_logs);

    if let Ok(path) = CliConfig::config_path() {
        println!("\nConfig file: {}", path.display());
    }

    Ok(())
}

/// Set configuration.
pub fn set_config(key: &str, value: &str) -> CliResult {
    let mut config = CliConfig::load().unwrap_or_default();
    config.set(key, value)?;
    config.save()?;

    println!("{} Set {} = {}", style("✓").green(), key, value);
    Ok(())
}

fn load_license(path: &Path) -> Result<License, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)?;
    // YAML is a superset of the JSON license files we issue.
    Ok(serde_yaml::from_str(&content)?)
}

fn load_registry(
    path: &Path,
) -> Result<LicenseAttestationProfileRegistry, Box<dyn std::error::Error>> {
    let mut registry = LicenseAttestationProfileRegistry::new();
    ProfilesFile::load(path)?.install(&mut registry)?;
    Ok(registry)
}

fn print_status(format: OutputFormat, status: &LicenseStatus) -> CliResult {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(status)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(status)?),
        OutputFormat::Table => {
            let marker = if status.is_valid() {
                style("✓").green()
            } else {
                style("✗").red()
            };
            println!(
                "{} License {} ({})",
                marker,
                style(status.state.to_string()).bold(),
                status.reason.as_deref().unwrap_or("-")
            );
            if let Some(at) = status.validated_at {
                println!("  Validated at: {}", at);
            }
            if let Some(error) = &status.error {
                println!("  Error: {}", style(error).dim());
            }
            if let Some(entitlements) = status
                .metadata
                .as_ref()
                .and_then(|m| m.get("entitlements"))
                .and_then(|e| e.as_array())
            {
                let names: Vec<_> = entitlements.iter().filter_map(|e| e.as_str()).collect();
                println!("  Entitlements: {}", names.join(", "));
            }
        }
    }
    Ok(())
}

fn print_profiles(
    format: OutputFormat,
    profiles: &[&AttestationProfile],
    default_id: Option<&str>,
) -> CliResult {
    match format {
        OutputFormat::Json | OutputFormat::Yaml => {
            let rows: Vec<_> = profiles.iter().map(|p| profile_row(p)).collect();
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                print!("{}", serde_yaml::to_string(&rows)?);
            }
        }
        OutputFormat::Table => {
            if profiles.is_empty() {
                println!("{} No profiles registered", style("i").blue());
            }
            for profile in profiles {
                let marker = if Some(profile.id.as_str()) == default_id {
                    style("*").green()
                } else {
                    style(" ")
                };
                println!(
                    "{} {} {}",
                    marker,
                    style(&profile.id).bold(),
                    style(&profile.name).dim()
                );
                if let Some(config) = profile.config() {
                    if let Some(url) = &config.attestation_url {
                        println!("    attest:      {}", url);
                    }
                    println!(
                        "    fail_open:   {}  poll: {}s (min {}s)",
                        config.fail_open,
                        config.poll_interval_ms / 1000,
                        config.minimum_poll_interval_ms / 1000
                    );
                }
                if let Some(target) = profile.sla.response_target_ms {
                    println!(
                        "    sla:         {}ms, {}%",
                        target,
                        profile.sla.availability.unwrap_or_default()
                    );
                }
            }
        }
    }
    Ok(())
}

fn profile_row(profile: &AttestationProfile) -> serde_json::Value {
    let source = match &profile.source {
        ProfileSource::Literal(config) => serde_json::to_value(config).unwrap_or_default(),
        ProfileSource::Instance(_) => serde_json::Value::from("instance"),
        ProfileSource::Factory(_) => serde_json::Value::from("factory"),
    };
    serde_json::json!({
        "id": profile.id,
        "name": profile.name,
        "description": profile.description,
        "attestor": source,
        "sla": profile.sla,
        "metadata": profile.metadata,
    })
}
