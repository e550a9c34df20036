//! Configuration module for the maitred server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

/// Command-line arguments for the command server
#[derive(Parser, Debug)]
#[command(name = "maitred")]
#[command(author = "maitred authors")]
#[command(version = "0.1.0")]
#[command(about = "A menu-driven TCP command server", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 127.0.0.1:7878)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Maximum number of concurrently served connections
    #[arg(short = 'm', long)]
    pub max_connections: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Maximum number of concurrently served connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_connections: default_max_connections(),
        }
    }
}

/// Identity fields reported by the command table
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    /// Server name (command `1`)
    #[serde(default = "default_name")]
    pub name: String,
    /// Server owner (command `3`)
    #[serde(default = "default_owner")]
    pub owner: String,
    /// Favorite programming languages (command `4`)
    #[serde(default = "default_languages")]
    pub languages: String,
    /// Owner location (command `5`)
    #[serde(default = "default_location")]
    pub location: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            owner: default_owner(),
            languages: default_languages(),
            location: default_location(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:7878".to_string()
}

fn default_max_connections() -> usize {
    1024
}

fn default_name() -> String {
    "maitred server".to_string()
}

fn default_owner() -> String {
    "maitred authors".to_string()
}

fn default_languages() -> String {
    "Java and Python".to_string()
}

fn default_location() -> String {
    "Bellbrook, Ohio, USA".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub max_connections: usize,
    pub identity: IdentityConfig,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_cli(CliArgs::parse())
    }

    /// Resolve a configuration from already-parsed CLI arguments.
    pub fn from_cli(cli: CliArgs) -> Result<Self, ConfigError> {
        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        // Merge CLI args with TOML config (CLI takes precedence)
        let config = Config {
            listen: cli.listen.unwrap_or(toml_config.server.listen),
            max_connections: cli
                .max_connections
                .unwrap_or(toml_config.server.max_connections),
            identity: toml_config.identity,
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values the line protocol cannot carry.
    ///
    /// Identity fields are sent as single response lines; an embedded line
    /// break would split one response into two.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::ZeroConnections);
        }

        let fields = [
            ("identity.name", &self.identity.name),
            ("identity.owner", &self.identity.owner),
            ("identity.languages", &self.identity.languages),
            ("identity.location", &self.identity.location),
        ];
        for (field, value) in fields {
            if value.contains(['\r', '\n']) {
                return Err(ConfigError::IdentityNewline(field));
            }
        }
        Ok(())
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    IdentityNewline(&'static str),
    ZeroConnections,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::IdentityNewline(field) => {
                write!(f, "'{}' must not contain line breaks", field)
            }
            ConfigError::ZeroConnections => {
                write!(f, "max_connections must be at least 1")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli_defaults() -> CliArgs {
        CliArgs {
            config: None,
            listen: None,
            max_connections: None,
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.listen, "127.0.0.1:7878");
        assert_eq!(config.server.max_connections, 1024);
        assert_eq!(config.identity.name, "maitred server");
        assert_eq!(config.identity.languages, "Java and Python");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            listen = "0.0.0.0:7878"
            max_connections = 16

            [identity]
            name = "demo box"
            owner = "ops"

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen, "0.0.0.0:7878");
        assert_eq!(config.server.max_connections, 16);
        assert_eq!(config.identity.name, "demo box");
        assert_eq!(config.identity.owner, "ops");
        // Unset identity fields fall back to defaults
        assert_eq!(config.identity.languages, "Java and Python");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_cli_takes_precedence() {
        let cli = CliArgs {
            listen: Some("127.0.0.1:9000".to_string()),
            max_connections: Some(2),
            ..cli_defaults()
        };

        let config = Config::from_cli(cli).unwrap();
        assert_eq!(config.listen, "127.0.0.1:9000");
        assert_eq!(config.max_connections, 2);
    }

    #[test]
    fn test_identity_newline_rejected() {
        let mut config = Config {
            listen: default_listen(),
            max_connections: 4,
            identity: IdentityConfig::default(),
            log_level: "info".to_string(),
        };
        config.identity.owner = "two\nlines".to_string();

        match config.validate() {
            Err(ConfigError::IdentityNewline("identity.owner")) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_zero_connections_rejected() {
        let cli = CliArgs {
            max_connections: Some(0),
            ..cli_defaults()
        };

        match Config::from_cli(cli) {
            Err(ConfigError::ZeroConnections) => {}
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }
}
