//! Configuration file management for plangate.
//!
//! Provides a TOML-based config file at `~/.config/plangate/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use plangate_core::identity::{TOKEN_SECRET_ENV, TokenConfig};
use plangate_store::DbTarget;
use plangate_store::models::StoreBackend;

/// Environment variable holding the PostgreSQL connection URL.
pub const DATABASE_URL_ENV: &str = "PLANGATE_DATABASE_URL";

/// Connection URL used when no flag, env var or config file names one.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost:5432/plangate";

/// Environment variable selecting the store backend.
pub const STORE_ENV: &str = "PLANGATE_STORE";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    pub auth: AuthSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub store: StoreSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthSection {
    /// Hex-encoded token secret (64 hex chars = 32 bytes).
    pub token_secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSection {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_owned(),
            port: 8080,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StoreSection {
    pub backend: StoreBackend,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the plangate config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/plangate` or `~/.config/plangate`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("plangate");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("plangate")
}

/// Return the path to the plangate config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Token secret generation
// -----------------------------------------------------------------------

/// Generate a random token secret: 32 random bytes, hex-encoded (64 chars).
pub fn generate_token_secret() -> String {
    use rand::Rng;
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct PlangateConfig {
    pub database_url: String,
    pub token_config: TokenConfig,
    pub store_backend: StoreBackend,
    pub server: ServerSection,
}

impl PlangateConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - DB URL: `cli_db_url` > `PLANGATE_DATABASE_URL` > `database.url` > [`DEFAULT_DATABASE_URL`]
    /// - Token secret: `PLANGATE_TOKEN_SECRET` > `auth.token_secret` > error
    /// - Store: `cli_store` > `PLANGATE_STORE` > `store.backend` > postgres
    pub fn resolve(cli_db_url: Option<&str>, cli_store: Option<StoreBackend>) -> Result<Self> {
        let file_config = load_config().ok();

        let database_url = if let Some(url) = cli_db_url {
            url.to_string()
        } else if let Ok(url) = std::env::var(DATABASE_URL_ENV) {
            url
        } else if let Some(ref cfg) = file_config {
            cfg.database.url.clone()
        } else {
            DEFAULT_DATABASE_URL.to_string()
        };

        let token_config = if let Ok(secret_hex) = std::env::var(TOKEN_SECRET_ENV) {
            TokenConfig::from_hex(&secret_hex)
                .with_context(|| format!("{TOKEN_SECRET_ENV} env var is not a valid secret"))?
        } else if let Some(ref cfg) = file_config {
            TokenConfig::from_hex(&cfg.auth.token_secret)
                .context("invalid token_secret in config file")?
        } else {
            bail!(
                "token secret not found; set {TOKEN_SECRET_ENV} or run \
                 `plangate init` to create a config file"
            );
        };

        let store_backend = if let Some(backend) = cli_store {
            backend
        } else if let Ok(name) = std::env::var(STORE_ENV) {
            name.parse::<StoreBackend>()
                .with_context(|| format!("{STORE_ENV} env var is not a valid store backend"))?
        } else if let Some(ref cfg) = file_config {
            cfg.store.backend
        } else {
            StoreBackend::default()
        };

        let server = file_config
            .map(|cfg| cfg.server)
            .unwrap_or_default();

        Ok(Self {
            database_url,
            token_config,
            store_backend,
            server,
        })
    }

    /// The PostgreSQL database named by the resolved URL.
    pub fn db_target(&self) -> Result<DbTarget> {
        DbTarget::parse(&self.database_url).context("invalid database URL")
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
