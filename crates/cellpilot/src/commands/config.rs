//! Config command

use anyhow::{anyhow, Result};
use camino::Utf8Path;
use cellpilot_core::config::{generate_default_config, ConfigLoader};

use crate::cli::{ConfigCommands, ConfigInitArgs, ConfigShowArgs, ConfigValidateArgs};
use crate::output;

pub fn run(cmd: ConfigCommands, config_path: Option<&Utf8Path>) -> Result<()> {
    match cmd {
        ConfigCommands::Init(args) => init(args),
        ConfigCommands::Validate(args) => validate(args, config_path),
        ConfigCommands::Show(args) => show(args, config_path),
    }
}

fn init(args: ConfigInitArgs) -> Result<()> {
    let output_path = match args.output {
        Some(path) => path,
        None => ConfigLoader::new()?.global_config_path(),
    };

    // Check if file exists
    if output_path.exists() && !args.force {
        return Err(anyhow!(
            "File {} already exists. Use --force to overwrite.",
            output_path
        ));
    }

    if let Some(parent) = output_path.parent() {
        if !parent.as_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let content = generate_default_config()?;
    std::fs::write(&output_path, content)?;

    output::success(&format!("Created {}", output_path));
    output::info("Edit the retry, coordinator and tasks sections to taste");

    Ok(())
}

fn validate(args: ConfigValidateArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let spinner = output::spinner("Validating configuration...");

    let explicit = args.file.as_deref().or(config_path);
    let loaded = super::load_config(explicit).and_then(|config| {
        config.validate()?;
        Ok(config)
    });

    spinner.finish_and_clear();
    let config = loaded?;

    match explicit {
        Some(path) => output::success(&format!("Configuration is valid: {}", path)),
        None => output::success("Configuration is valid"),
    }
    output::kv("Max attempts", &config.retry.max_attempts.to_string());
    output::kv(
        "Initial delay",
        &format!("{}ms", config.retry.initial_delay_ms),
    );
    output::kv(
        "Backoff multiplier",
        &config.retry.backoff_multiplier.to_string(),
    );
    output::kv("Tasks", &config.tasks.len().to_string());

    Ok(())
}

fn show(args: ConfigShowArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let config = super::load_config(config_path)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        print!("{}", serde_yaml_ng::to_string(&config)?);
    }

    Ok(())
}
