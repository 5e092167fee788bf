use std::path::{Path, PathBuf};

use {
    clap::{Parser, Subcommand},
    lobby_config::LobbyConfig,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "lobby", about = "Lobby, a rendezvous server pairing hosts with users")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server.
    Serve {
        /// Overrides `server.bind` from the config file.
        #[arg(long, env = "LOBBY_BIND")]
        bind: Option<String>,
        /// Overrides `server.port` from the config file.
        #[arg(long, env = "LOBBY_PORT")]
        port: Option<u16>,
        #[arg(long, env = "LOBBY_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective config with secrets redacted.
    Show {
        #[arg(long, env = "LOBBY_CONFIG")]
        config: Option<PathBuf>,
        /// Print JSON instead of TOML.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Load and validate the config, then exit.
    Check {
        #[arg(long, env = "LOBBY_CONFIG")]
        config: Option<PathBuf>,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Effective config: file (or defaults), then command-line overrides.
fn load(
    config: Option<&Path>,
    bind: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<LobbyConfig> {
    let mut config = lobby_config::discover_and_load(config)?;
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    Ok(config)
}

fn render_config(config: &LobbyConfig, json: bool) -> anyhow::Result<String> {
    let redacted = config.redacted();
    Ok(if json {
        serde_json::to_string_pretty(&redacted)?
    } else {
        toml::to_string_pretty(&redacted)?
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "lobby starting");

    match cli.command {
        Commands::Serve { bind, port, config } => {
            let config = load(config.as_deref(), bind, port)?;
            lobby_gateway::start_gateway(config).await
        },
        Commands::Config { action } => match action {
            ConfigAction::Show { config, json } => {
                let config = load(config.as_deref(), None, None)?;
                println!("{}", render_config(&config, json)?);
                Ok(())
            },
            ConfigAction::Check { config } => {
                load(config.as_deref(), None, None)?;
                println!("config ok");
                Ok(())
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use {super::*, clap::CommandFactory, std::io::Write};

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_override_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[server]\nbind = \"0.0.0.0\"\nport = 9000").unwrap();

        let config = load(Some(file.path()), None, Some(9100)).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.server.port, 9100);
    }

    #[test]
    fn invalid_file_fails_check() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[registry]\nttl_multiple = 0").unwrap();
        assert!(load(Some(file.path()), None, None).is_err());
    }

    #[test]
    fn show_redacts_secrets() {
        let mut config = LobbyConfig::default();
        config.ice.api_token = Some("sekrit".into());
        for json in [false, true] {
            let out = render_config(&config, json).unwrap();
            assert!(!out.contains("sekrit"));
            assert!(out.contains("[REDACTED]"));
        }
    }
}
