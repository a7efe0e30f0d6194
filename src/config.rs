use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,

    // Paths
    pub audio_dir: PathBuf,
    pub catalog_file: PathBuf,

    // Audio
    pub ffmpeg_path: String,
    pub default_volume: f32,

    // Conexión de voz
    pub voice_connect_attempts: u32,
    pub voice_retry_delay_ms: u64,
    pub voice_settle_delay_ms: u64,

    // Interacción
    pub confirm_timeout_secs: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let audio_dir: PathBuf = std::env::var("AUDIO_DIR")
            .unwrap_or_else(|_| "audios".to_string())
            .into();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            command_prefix: std::env::var("COMMAND_PREFIX").unwrap_or_else(|_| "!".to_string()),

            // Paths
            catalog_file: match std::env::var("CATALOG_FILE") {
                Ok(val) if !val.trim().is_empty() => val.into(),
                _ => audio_dir.join("audios_db.json"),
            },
            audio_dir,

            // Audio
            ffmpeg_path: std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "0.5".to_string())
                .parse()?,

            // Conexión de voz
            voice_connect_attempts: std::env::var("VOICE_CONNECT_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,
            voice_retry_delay_ms: std::env::var("VOICE_RETRY_DELAY_MS")
                .unwrap_or_else(|_| "2000".to_string())
                .parse()?,
            voice_settle_delay_ms: std::env::var("VOICE_SETTLE_DELAY_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,

            // Interacción
            confirm_timeout_secs: std::env::var("CONFIRM_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
        };

        // Validate configuration before touching the filesystem
        config.validate()?;

        // Create directories if they don't exist
        std::fs::create_dir_all(config.originals_dir())?;
        std::fs::create_dir_all(config.edited_dir())?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - The command prefix must not be empty or contain whitespace
    /// - Volume must be between 0.0 and 2.0
    /// - At least one voice connection attempt
    /// - Confirmation timeout must be greater than zero
    pub fn validate(&self) -> Result<()> {
        if self.command_prefix.is_empty() || self.command_prefix.chars().any(char::is_whitespace) {
            anyhow::bail!("Command prefix must be non-empty and without spaces, got: {:?}", self.command_prefix);
        }

        if self.default_volume < 0.0 || self.default_volume > 2.0 {
            anyhow::bail!("Default volume must be between 0.0 and 2.0, got: {}", self.default_volume);
        }

        if self.voice_connect_attempts == 0 {
            anyhow::bail!("Voice connect attempts must be greater than 0");
        }

        if self.confirm_timeout_secs == 0 {
            anyhow::bail!("Confirmation timeout must be greater than 0");
        }

        if self.ffmpeg_path.trim().is_empty() {
            anyhow::bail!("FFMPEG_PATH cannot be empty");
        }

        Ok(())
    }

    /// Directorio de clips subidos por los usuarios
    pub fn originals_dir(&self) -> PathBuf {
        self.audio_dir.join("originals")
    }

    /// Directorio de clips generados por ediciones
    pub fn edited_dir(&self) -> PathBuf {
        self.audio_dir.join("edited")
    }

    pub fn voice_retry_delay(&self) -> Duration {
        Duration::from_millis(self.voice_retry_delay_ms)
    }

    pub fn voice_settle_delay(&self) -> Duration {
        Duration::from_millis(self.voice_settle_delay_ms)
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The Discord token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Commands: prefix '{}'\n  \
            Storage: {} (catalog {})\n  \
            Audio: {}% vol, ffmpeg '{}'\n  \
            Voice: {} attempts, {}ms retry delay, {}ms settle delay",
            self.command_prefix,
            self.audio_dir.display(),
            self.catalog_file.display(),
            (self.default_volume * 100.0) as u32,
            self.ffmpeg_path,
            self.voice_connect_attempts,
            self.voice_retry_delay_ms,
            self.voice_settle_delay_ms,
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            command_prefix: "!".to_string(),

            // Path defaults
            audio_dir: "audios".into(),
            catalog_file: "audios/audios_db.json".into(),

            // Audio defaults
            ffmpeg_path: "ffmpeg".to_string(),
            default_volume: 0.5,

            // Voice defaults
            voice_connect_attempts: 3,
            voice_retry_delay_ms: 2000,
            voice_settle_delay_ms: 1000,

            confirm_timeout_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_prefix_with_spaces() {
        let config = Config {
            command_prefix: "! ".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_connect_attempts() {
        let config = Config {
            voice_connect_attempts: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_summary_hides_token() {
        let config = Config {
            discord_token: "super-secret".to_string(),
            ..Config::default()
        };
        let summary = config.summary();
        assert!(!summary.contains("super-secret"));
        assert!(summary.contains("prefix '!'"));
    }

    #[test]
    fn test_audio_subdirectories() {
        let config = Config::default();
        assert_eq!(config.originals_dir(), PathBuf::from("audios/originals"));
        assert_eq!(config.edited_dir(), PathBuf::from("audios/edited"));
    }
}
