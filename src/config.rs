use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;

use crate::{
    clip::{ClipRef, WeightedClip},
    env,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading clip config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing clip config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("trigger `{0}` has an empty clip set")]
    EmptyClipSet(String),
    #[error("trigger `{key}` lists `{clip}` with weight 0")]
    ZeroWeight { key: String, clip: String },
}

/// Static trigger tables loaded once at startup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClipConfig {
    #[serde(default)]
    pub sound_root: Option<PathBuf>,
    #[serde(default, rename = "emoji_list")]
    pub unicode: HashMap<String, Vec<WeightedClip>>,
    #[serde(default, rename = "server_emoji_list")]
    pub custom: HashMap<String, Vec<WeightedClip>>,
    #[serde(default)]
    pub celebration: CelebrationConfig,
}

/// Reserved keys and clips for the celebratory sequence.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CelebrationConfig {
    pub triggers: Vec<String>,
    /// Guild emoji added as the ambient celebratory reaction, when the guild has one.
    pub custom_emoji: String,
    pub unicode_emoji: String,
    pub standard: ClipRef,
    pub long: ClipRef,
    pub special: ClipRef,
    pub intro: ClipRef,
    pub outro: ClipRef,
    pub alt_intro: ClipRef,
    pub alt_outro: ClipRef,
    pub trailing: ClipRef,
    pub alt_trailing: ClipRef,
}

impl Default for CelebrationConfig {
    fn default() -> Self {
        Self {
            triggers: vec!["hot_springs".into(), "atsumori".into()],
            custom_emoji: "atsumori".into(),
            unicode_emoji: "\u{2668}\u{fe0f}".into(),
            standard: ClipRef::new("atsumori_std.wav"),
            long: ClipRef::new("atsumori_long.wav"),
            special: ClipRef::new("ussr.wav"),
            intro: ClipRef::new("situreisimasita_1.wav"),
            outro: ClipRef::new("situreisimasita_3.wav"),
            alt_intro: ClipRef::new("apologize_1.wav"),
            alt_outro: ClipRef::new("apologize_3.wav"),
            trailing: ClipRef::new("situreisimasita.wav"),
            alt_trailing: ClipRef::new("apologize.wav"),
        }
    }
}

impl ClipConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let cfg: ClipConfig = serde_json::from_str(raw).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (key, set) in self.unicode.iter().chain(self.custom.iter()) {
            if set.is_empty() {
                return Err(ConfigError::EmptyClipSet(key.clone()));
            }
            if let Some(zero) = set.iter().find(|c| c.weight == 0) {
                return Err(ConfigError::ZeroWeight {
                    key: key.clone(),
                    clip: zero.source.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn resolved_sound_root(&self, overridden: Option<PathBuf>) -> PathBuf {
        overridden
            .or_else(|| self.sound_root.clone())
            .unwrap_or_else(|| PathBuf::from("sounds"))
    }
}

/// Runtime tunables. Every value has a default; bad input falls back to it.
#[derive(Debug, Clone)]
pub struct Settings {
    pub config_path: PathBuf,
    pub sound_root: Option<PathBuf>,
    pub store_dir: PathBuf,
    pub settle_delay: Duration,
    pub start_delay: Duration,
    pub connect_attempts: u32,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    pub bitrate: i32,
    pub volume: f32,
    pub mono: bool,
    pub http_bind: String,
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            config_path: env::path_var("HOTSPRING_CONFIG")
                .unwrap_or_else(|| PathBuf::from("config.json")),
            sound_root: env::path_var("SOUND_ROOT"),
            store_dir: env::path_var("UPLOAD_STORE_DIR").unwrap_or_else(|| PathBuf::from(".")),
            settle_delay: env::tunable_millis("HOTSPRING_SETTLE_MS", 10_000, 800),
            start_delay: env::tunable_millis("HOTSPRING_START_DELAY_MS", 10_000, 300),
            connect_attempts: env::tunable("HOTSPRING_CONNECT_ATTEMPTS", 1..=10, 3),
            cache_ttl: Duration::from_secs(env::tunable("MESSAGE_CACHE_TTL_SECS", 1..=3600, 30)),
            cache_capacity: env::tunable("MESSAGE_CACHE_CAPACITY", 1..=10_000, 100),
            bitrate: env::tunable("HOTSPRING_BITRATE", 16_000..=192_000, 96_000),
            volume: env::tunable("HOTSPRING_VOLUME", 0.0..=2.0, 0.5),
            mono: std::env::var("HOTSPRING_MIX_MODE").as_deref() == Ok("mono"),
            http_bind: std::env::var("HTTP_BIND").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
        }
    }
}
