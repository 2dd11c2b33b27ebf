//! Configuration file handling

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::Display;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use deck_sync_core::Colour;
use directories::ProjectDirs;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub refresh: RefreshConfig,
    pub media: MediaConfig,
    /// Content applied to each key on connect, by 0-indexed key
    pub keys: BTreeMap<String, KeyContent>,
}

impl Config {
    /// Get the config file path for this platform
    pub fn path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "deck-sync").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load config from file, or create default if it doesn't exist
    pub fn load_or_create() -> Result<Self, Box<dyn Error>> {
        let path = Self::path().ok_or("could not determine config directory")?;

        if path.exists() {
            let contents = fs::read_to_string(&path)?;
            Ok(toml::from_str(&contents)?)
        } else {
            let config = Config::default();
            config.save_with_header()?;
            println!("created default config at {}", path.display());
            Ok(config)
        }
    }

    /// Parse the key table into key indices
    pub fn key_contents(&self) -> Result<Vec<(u8, KeyContent)>, String> {
        self.keys
            .iter()
            .map(|(key, content)| {
                key.parse::<u8>()
                    .map(|key| (key, content.clone()))
                    .map_err(|_| format!("invalid key index in config: {key}"))
            })
            .collect()
    }

    /// Save config with header comments for new files
    pub fn save_with_header(&self) -> Result<(), Box<dyn Error>> {
        let path = Self::path().ok_or("could not determine config directory")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let header = r##"# deck-sync configuration file
#
# Keys are 0-indexed, left to right and top to bottom. Each entry is either a
# hex colour or a path to an image:
#
# [keys]
# 0 = "#ff0000"
# 1 = "/home/me/icons/mute.png"

"##;
        let contents = toml::to_string_pretty(self)?;
        fs::write(&path, format!("{header}{contents}"))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Backlight brightness applied on connect, in percent
    pub brightness: u8,
    /// Default log filter, overridden by RUST_LOG
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            brightness: 70,
            log_level: "info".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Device reconnection retry interval
    #[serde(with = "humantime_serde")]
    pub retry: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            retry: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Background color for transparent images (hex)
    pub background_color: String,
    /// Use nearest neighbor interpolation
    pub use_nearest_neighbor: bool,
}

impl MediaConfig {
    pub fn background(&self) -> Result<Colour, String> {
        self.background_color.parse()
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            background_color: "#000000".into(),
            use_nearest_neighbor: false,
        }
    }
}

/// Key content from the config, stored as a plain string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyContent {
    Colour(Colour),
    Image(PathBuf),
}

impl FromStr for KeyContent {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with('#') {
            s.parse().map(Self::Colour)
        } else {
            Ok(Self::Image(s.into()))
        }
    }
}

impl Display for KeyContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Colour(c) => write!(f, "{c}"),
            Self::Image(p) => write!(f, "{}", p.display()),
        }
    }
}

impl Serialize for KeyContent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for KeyContent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
