use anyhow::{Context, Result};
use chessflip::ChessFlipConfig;
use serde::{Deserialize, Serialize};

/// Settings for one CLI session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Core game, ledger and logging configuration
    pub chessflip: ChessFlipConfig,
    /// Settle automatically as soon as a game ends
    pub auto_settle: bool,
}

impl AppConfig {
    /// Start from a config file or a preset, then validate
    pub fn load(path: Option<&str>, dev: bool) -> Result<Self> {
        let chessflip = match path {
            Some(path) => ChessFlipConfig::from_file(path)
                .with_context(|| format!("loading config from {}", path))?,
            None if dev => ChessFlipConfig::development(),
            None => ChessFlipConfig::default(),
        };

        Ok(Self {
            chessflip,
            auto_settle: false,
        })
    }

    /// Apply command-line overrides and re-validate
    pub fn with_overrides(mut self, lives: Option<u8>, log_level: Option<String>, auto_settle: bool) -> Result<Self> {
        if let Some(lives) = lives {
            self.chessflip.game.max_lives = lives;
        }
        if let Some(level) = log_level {
            self.chessflip.logging.level = level;
        }
        self.auto_settle = auto_settle;

        self.chessflip.validate().context("invalid configuration")?;
        Ok(self)
    }
}

#[derive(Debug, Clone)]
pub struct ReplConfig {
    pub prompt: String,
    pub history_file: Option<String>,
    pub max_history: usize,
}

impl Default for ReplConfig {
    fn default() -> Self {
        Self {
            prompt: "chessflip> ".to_string(),
            history_file: Some(".chessflip_history".to_string()),
            max_history: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dev_preset_and_overrides() {
        let config = AppConfig::load(None, true)
            .unwrap()
            .with_overrides(Some(3), Some("trace".to_string()), true)
            .unwrap();

        assert_eq!(config.chessflip.game.max_lives, 3);
        assert_eq!(config.chessflip.game.match_delay_ms, 100);
        assert_eq!(config.chessflip.logging.level, "trace");
        assert!(config.auto_settle);
    }

    #[test]
    fn test_zero_lives_rejected() {
        let result = AppConfig::load(None, false)
            .unwrap()
            .with_overrides(Some(0), None, false);
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        ChessFlipConfig::production().to_file(file.path()).unwrap();

        let path = file.path().to_str().unwrap();
        let config = AppConfig::load(Some(path), true).unwrap();
        assert_eq!(config.chessflip.logging.format, "json");
    }
}
