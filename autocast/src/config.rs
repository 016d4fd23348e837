//! Persistent application configuration.
//!
//! Stored as JSON in a platform-appropriate config directory. Missing fields
//! fall back to their defaults so older files keep loading.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::capture::Region;
use crate::keybind::KeyBinding;

/// On-disk configuration for the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Icon folder under `img/`, e.g. `Shaman_Elemental`.
    pub class_spec: String,

    /// Screen rectangle holding the addon's suggested-spell icon.
    pub region: Region,

    /// Spell name → key token (`1`, `f`, `ctrl+f`). Empty tokens are skipped.
    pub keybindings: BTreeMap<String, String>,

    /// Maximum hash distance (exclusive) for a match.
    pub hash_threshold: u32,

    /// Key that pauses and resumes the automation.
    pub toggle_key: String,

    /// Strategy overrides by spell name substring.
    pub icon_rules: Vec<ie::IconRule>,

    /// Directory containing (or being) the `img/` icon root.
    pub assets_dir: Option<PathBuf>,

    /// Where debug captures go. `None` disables them.
    pub debug_dir: Option<PathBuf>,

    /// Delay between two recognition rounds.
    pub poll_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            class_spec: String::new(),
            region: Region::default(),
            keybindings: BTreeMap::new(),
            hash_threshold: ie::DEFAULT_HASH_THRESHOLD,
            toggle_key: "f3".to_string(),
            icon_rules: ie::IconRule::defaults(),
            assets_dir: None,
            debug_dir: Some(PathBuf::from("debug_captures")),
            poll_delay_ms: 50,
        }
    }
}

impl Config {
    /// Default path to the config file.
    pub fn path() -> Result<PathBuf> {
        let base = dirs::config_dir().context("config_dir() unavailable")?;
        Ok(base.join("autocast.json"))
    }

    /// Load configuration from `path`, falling back to defaults on any failure.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "failed to load config; using defaults");
                Self::default()
            }
        }
    }

    /// Try to load configuration from `path`. A missing file yields the defaults.
    pub fn try_load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let json = fs::read_to_string(path).with_context(|| format!("read {:?}", path))?;
        let cfg = serde_json::from_str(&json).with_context(|| format!("parse {:?}", path))?;
        Ok(cfg)
    }

    /// Save configuration to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {:?}", parent))?;
        }
        let json = serde_json::to_string_pretty(self).context("serialize config")?;
        fs::write(path, json).with_context(|| format!("write {:?}", path))?;
        Ok(())
    }

    pub fn match_config(&self) -> ie::MatchConfig {
        ie::MatchConfig::with_hash_threshold(self.hash_threshold)
    }

    pub fn poll_delay(&self) -> Duration {
        Duration::from_millis(self.poll_delay_ms)
    }

    /// Bind `spell` to `token`. `skip` (or an empty token) stores an empty
    /// binding so the spell is recognized but never pressed.
    pub fn bind(&mut self, spell: &str, token: &str) -> Result<()> {
        let token = token.trim();
        let stored = if token.is_empty() || token.eq_ignore_ascii_case("skip") {
            String::new()
        } else {
            let binding: KeyBinding = token
                .parse()
                .with_context(|| format!("invalid key binding {token:?} for {spell}"))?;
            binding.to_string()
        };
        self.keybindings.insert(spell.to_string(), stored);
        Ok(())
    }

    /// Remove the binding for `spell`. Returns whether one existed.
    pub fn unbind(&mut self, spell: &str) -> bool {
        self.keybindings.remove(spell).is_some()
    }
}
