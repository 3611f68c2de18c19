//! Command-line interface for the `parlor` binary.

use clap::{Parser, Subcommand};

use parlor_domain::config::Config;

/// Parlor — a multi-tenant conversational session engine.
#[derive(Debug, Parser)]
#[command(name = "parlor", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the gateway server (default when no subcommand is given).
    Serve,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

/// Load the configuration from the path named by `PARLOR_CONFIG`
/// (default `parlor.toml`). A missing file means all defaults. Returns
/// the parsed [`Config`] and the path that was used.
pub fn load_config() -> anyhow::Result<(Config, String)> {
    let config_path = std::env::var("PARLOR_CONFIG").unwrap_or_else(|_| "parlor.toml".into());

    let config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        Config::default()
    };

    Ok((config, config_path))
}

/// `config validate`: report what was loaded and any suspicious values.
pub fn validate(config: &Config, config_path: &str) -> bool {
    println!("config: {config_path}");
    println!("  server: {}:{}", config.server.host, config.server.port);
    println!("  providers: {}", config.llm.providers.len());
    println!("  agents: {}", config.agents.len());

    let mut ok = true;
    for (id, provider) in &config.llm.providers {
        if provider.api_key_env.is_empty() {
            println!("  ERROR: provider '{id}' has an empty api_key_env");
            ok = false;
        }
    }
    for (id, agent) in &config.agents {
        if !config.llm.providers.contains_key(&agent.settings.provider) {
            println!(
                "  WARNING: agent '{id}' names provider '{}' which is not configured",
                agent.settings.provider
            );
        }
    }

    println!("{}", if ok { "OK" } else { "FAILED" });
    ok
}

/// `config show`: dump the resolved config as TOML.
pub fn show(config: &Config) {
    match toml::to_string_pretty(config) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("failed to serialize config: {e}"),
    }
}
