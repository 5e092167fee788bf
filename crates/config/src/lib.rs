//! Configuration loading for the lobby server.
//!
//! Files are TOML, YAML or JSON with `${ENV_VAR}` substitution applied to the
//! raw text before parsing.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{config_dir, discover_and_load, load_config},
    schema::{
        ClaimPolicy, IceConfig, IceProviderKind, LobbyConfig, RegistryConfig, RelayConfig,
        ServerConfig,
    },
};
