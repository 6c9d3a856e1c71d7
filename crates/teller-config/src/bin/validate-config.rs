//! Config validation CLI tool
//!
//! Validates a teller rule file and reports any errors.

use std::path::PathBuf;
use std::process::ExitCode;
use teller_util::default_config_path;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a teller rule file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-config {}", default_path.display());
            eprintln!("  validate-config config/teller.toml");
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match teller_config::load_config(&config_path) {
        Ok(config) => {
            let rules = &config.rules;
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", teller_config::CURRENT_CONFIG_VERSION);
            println!("  States: {}", rules.state_count());
            println!("  Transitions: {}", rules.transition_count());
            println!("  Initial state: {}", rules.initial_state());
            println!("  Failure state: {}", rules.failure_state());
            if let Some(idle) = rules.idle() {
                println!("  Idle timer: {} in {} ({}s)", idle.timer, idle.state, idle.secs);
            }
            match &config.decider.url {
                Some(url) => println!("  Decider: {}", url),
                None => println!("  Decider: not configured"),
            }

            println!();
            println!("States:");
            for name in rules.state_names() {
                let Some(state) = rules.state(name) else {
                    continue;
                };
                let mut tags = Vec::new();
                if state.device_driven {
                    tags.push("device");
                }
                if state.terminal {
                    tags.push("terminal");
                }
                let keys: Vec<&str> = state.transitions.keys().map(String::as_str).collect();
                if tags.is_empty() {
                    println!("  - {}: {}", name, keys.join(", "));
                } else {
                    println!("  - {} [{}]: {}", name, tags.join(", "), keys.join(", "));
                }
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                teller_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                teller_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                teller_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                teller_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        teller_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
