//! Config validation CLI tool
//!
//! Validates an adwardend configuration file and reports any errors.

use adwarden_util::{default_config_path, format_hour};
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates an adwardend configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-config {}", default_path.display());
            eprintln!("  validate-config config.example.toml");
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match adwarden_config::load_config(&config_path) {
        Ok(policy) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", adwarden_config::CURRENT_CONFIG_VERSION);
            println!(
                "  Account: {} ({} level)",
                policy.platform.account_id, policy.platform.level
            );
            println!("  Time zone: UTC{}", policy.service.timezone);
            println!(
                "  Tick interval: {}s",
                policy.service.tick_interval.as_secs()
            );
            println!(
                "  Defaults: shift '{}', spend limit {}%",
                policy.defaults.shift, policy.defaults.spend_limit_percent
            );
            if policy.allow_list.is_empty() {
                println!("  Allow-list: all entities");
            } else {
                println!("  Allow-list: {} entities", policy.allow_list.len());
            }

            if !policy.shifts.is_empty() {
                println!();
                println!("Shifts:");
                for (name, window) in &policy.shifts {
                    println!(
                        "  - {}: {}-{} days {:?}",
                        name,
                        format_hour(window.start_hour),
                        format_hour(window.end_hour),
                        window.days.indices()
                    );
                }
            }

            if policy.platform.access_token().is_none() {
                println!();
                println!(
                    "Note: access token variable {} is not set in this environment",
                    policy.platform.access_token_env
                );
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                adwarden_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                adwarden_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                adwarden_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                adwarden_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        adwarden_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
