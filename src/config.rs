//! Configuration types for the turn-detection engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration for the turn-detection engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Timer cascade (generate / synthesize / play) settings.
    pub cascade: CascadeConfig,
    /// Outbound collaborator call settings.
    pub collaborator: CollaboratorConfig,
    /// Recognizer helper process settings.
    pub recognizer: RecognizerConfig,
}

/// Timer cascade configuration.
///
/// Each delay gates one stage of the response cascade and is measured from
/// the completion of the previous stage (the cascade is chained, never
/// parallel). The generate delay is the post-utterance pause the engine
/// waits before committing any work at all; it should be short enough to
/// hide generation latency behind the user's natural pause and long enough
/// that most false turn-ends never reach the generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeConfig {
    /// Delay in ms between a final transcription and the generate stage.
    pub generate_delay_ms: u64,
    /// Delay in ms between generation completing and the synthesize stage.
    pub synthesize_delay_ms: u64,
    /// Delay in ms between synthesis completing and the play stage.
    pub play_delay_ms: u64,
    /// Extra generate-stage headroom for short utterances.
    pub adaptive: AdaptiveDelayConfig,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            generate_delay_ms: 1200,
            synthesize_delay_ms: 1000,
            play_delay_ms: 1000,
            adaptive: AdaptiveDelayConfig::default(),
        }
    }
}

/// Adaptive generate-stage delay.
///
/// Short utterances ("Yes", "OK sure") are the ones most often followed by
/// more speech, so the generate timer gets extra headroom before the
/// cascade commits:
///   - utterances of at most `short_word_limit` words: `+short_bonus_ms`
///   - utterances of at most `medium_word_limit` words: `+medium_bonus_ms`
///   - longer utterances: no bonus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveDelayConfig {
    /// Whether adaptive delay is applied at all.
    pub enabled: bool,
    /// Word count at or below which the short bonus applies.
    pub short_word_limit: usize,
    /// Bonus in ms for short utterances.
    pub short_bonus_ms: u64,
    /// Word count at or below which the medium bonus applies.
    pub medium_word_limit: usize,
    /// Bonus in ms for medium utterances.
    pub medium_bonus_ms: u64,
}

impl Default for AdaptiveDelayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            short_word_limit: 3,
            short_bonus_ms: 600,
            medium_word_limit: 6,
            medium_bonus_ms: 300,
        }
    }
}

impl CascadeConfig {
    /// Effective generate-stage delay for an utterance, including any
    /// adaptive bonus.
    pub fn generate_delay_for(&self, utterance: &str) -> Duration {
        let base = self.generate_delay_ms;
        if !self.adaptive.enabled {
            return Duration::from_millis(base);
        }
        let words = utterance.split_whitespace().count();
        let bonus = if words <= self.adaptive.short_word_limit {
            self.adaptive.short_bonus_ms
        } else if words <= self.adaptive.medium_word_limit {
            self.adaptive.medium_bonus_ms
        } else {
            0
        };
        Duration::from_millis(base + bonus)
    }

    /// Synthesize-stage delay.
    pub fn synthesize_delay(&self) -> Duration {
        Duration::from_millis(self.synthesize_delay_ms)
    }

    /// Play-stage delay.
    pub fn play_delay(&self) -> Duration {
        Duration::from_millis(self.play_delay_ms)
    }
}

/// Outbound collaborator call configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollaboratorConfig {
    /// Upper bound in ms for a single generator or synthesizer call.
    ///
    /// A call that exceeds this is aborted and treated as a collaborator
    /// failure; a hung call would otherwise block the session's next
    /// legitimate cascade.
    pub call_timeout_ms: u64,
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: 10_000,
        }
    }
}

impl CollaboratorConfig {
    /// Call timeout as a [`Duration`].
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

/// Recognizer helper process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    /// Path to the helper executable speaking the line-delimited JSON
    /// protocol on stdin/stdout.
    pub command: String,
    /// Arguments passed to the helper.
    pub args: Vec<String>,
    /// Initial respawn delay in ms after the helper exits.
    pub restart_delay_ms: u64,
    /// Respawn delay cap in ms (the delay doubles per consecutive exit).
    pub max_restart_delay_ms: u64,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            args: Vec::new(),
            restart_delay_ms: 250,
            max_restart_delay_ms: 5_000,
        }
    }
}

impl RecognizerConfig {
    /// Initial respawn delay as a [`Duration`].
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    /// Respawn delay cap as a [`Duration`].
    pub fn max_restart_delay(&self) -> Duration {
        Duration::from_millis(self.max_restart_delay_ms)
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::TurnError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::TurnError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/sylph/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("sylph").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("sylph")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/sylph-config/config.toml")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_path_ends_with_config_toml() {
        let path = EngineConfig::default_config_path();
        let path_str = path.to_string_lossy();
        assert!(path_str.ends_with("config.toml"));
        assert!(path_str.contains("sylph"));
    }

    #[test]
    fn config_serializes_to_toml() {
        let config = EngineConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialization should succeed");
        assert!(toml_str.contains("generate_delay_ms"));
        assert!(toml_str.contains("call_timeout_ms"));
        assert!(toml_str.contains("restart_delay_ms"));
    }

    #[test]
    fn config_roundtrips_through_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        let mut config = EngineConfig::default();
        config.cascade.generate_delay_ms = 900;
        config.recognizer.command = "helper".to_owned();
        config.save_to_file(&path).expect("save");
        let loaded = EngineConfig::from_file(&path).expect("load");
        assert_eq!(loaded.cascade.generate_delay_ms, 900);
        assert_eq!(loaded.recognizer.command, "helper");
    }

    #[test]
    fn missing_sections_use_defaults() {
        let config: EngineConfig = toml::from_str("[cascade]").expect("parse");
        assert_eq!(config.cascade.synthesize_delay_ms, 1000);
        assert_eq!(config.collaborator.call_timeout_ms, 10_000);
        assert_eq!(config.recognizer.restart_delay_ms, 250);
    }

    #[test]
    fn adaptive_delay_scales_with_word_count() {
        let cascade = CascadeConfig::default();
        assert_eq!(
            cascade.generate_delay_for("yes"),
            Duration::from_millis(1800)
        );
        assert_eq!(
            cascade.generate_delay_for("can you help me please"),
            Duration::from_millis(1500)
        );
        assert_eq!(
            cascade.generate_delay_for("I need to schedule a meeting for tomorrow afternoon"),
            Duration::from_millis(1200)
        );
    }

    #[test]
    fn adaptive_delay_disabled_uses_base() {
        let mut cascade = CascadeConfig::default();
        cascade.adaptive.enabled = false;
        assert_eq!(
            cascade.generate_delay_for("no"),
            Duration::from_millis(1200)
        );
    }
}
