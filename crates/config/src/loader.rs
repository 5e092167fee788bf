use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::{env_subst::substitute_env, schema::LobbyConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["lobby.toml", "lobby.yaml", "lobby.yml", "lobby.json"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<LobbyConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Resolve, load and validate the effective config.
///
/// An explicit path must exist. Without one, standard locations are searched:
/// 1. `./lobby.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/lobby/lobby.{toml,yaml,yml,json}` (user-global)
///
/// Falls back to `LobbyConfig::default()` when nothing is found.
pub fn discover_and_load(explicit: Option<&Path>) -> anyhow::Result<LobbyConfig> {
    let path = match explicit {
        Some(p) => Some(p.to_path_buf()),
        None => find_config_file(),
    };

    let config = match path {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            let cfg = load_config(&path)?;
            info!(path = %path.display(), "loaded config");
            cfg
        },
        None => {
            debug!("no config file found, using defaults");
            LobbyConfig::default()
        },
    };

    config.validate()?;
    Ok(config)
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    let local = CONFIG_FILENAMES.iter().map(PathBuf::from);
    let global = config_dir()
        .into_iter()
        .flat_map(|dir| CONFIG_FILENAMES.iter().map(move |name| dir.join(name)));

    local.chain(global).find(|p| p.exists())
}

/// Returns `~/.config/lobby/` on all platforms.
pub fn config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().join(".config").join("lobby"))
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<LobbyConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
