use clap::Parser;

use crate::config::loader::{DEFAULT_CONFIG_FILE, load_config};
use crate::config::{AppConfig, ConfigError};

#[derive(Debug, Parser)]
#[command(name = "result2-server")]
#[command(about = "HTTP server with a tenant-scoped response cache")]
#[command(version)]
pub struct Args {
    /// TOML configuration file; missing files fall back to defaults
    #[arg(short, long, env = "RESULT2_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: String,

    /// Override `logging.level` from the config file
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Args {
    /// Load and validate the config, applying command-line overrides.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut cfg = load_config(Some(&self.config))?;
        if let Some(level) = &self.log_level {
            cfg.logging.level = level.clone();
            cfg.validate().map_err(ConfigError::Invalid)?;
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_parse() {
        let args = Args::try_parse_from([
            "result2-server",
            "--config",
            "/etc/result2.toml",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(args.config, "/etc/result2.toml");
        assert_eq!(args.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn log_level_override_is_validated() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        let mut args = Args {
            config: missing.to_string_lossy().into_owned(),
            log_level: Some("warn".into()),
        };
        assert_eq!(args.load().unwrap().logging.level, "warn");

        args.log_level = Some("loud".into());
        assert!(matches!(args.load(), Err(ConfigError::Invalid(_))));
    }
}
