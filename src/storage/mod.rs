//! Persistence layer.
//!
//! Saves and loads the live per-market settings to/from a JSON file.
//! Writes go to a temp file in the same directory first and are renamed
//! into place, so a crash never leaves a half-written file behind.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

use crate::config::MarketSettings;
use crate::types::MarketId;

/// Default settings file path.
pub const DEFAULT_SETTINGS_FILE: &str = "ahbot_settings.json";

/// Save every market's settings.
pub fn save_settings(settings: &BTreeMap<MarketId, MarketSettings>, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_SETTINGS_FILE);
    let json = serde_json::to_string_pretty(settings).context("Failed to serialise settings")?;

    let target = Path::new(path);
    let tmp = target.with_file_name(format!(
        ".{}.{}.tmp",
        target
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(DEFAULT_SETTINGS_FILE),
        uuid::Uuid::new_v4()
    ));

    std::fs::write(&tmp, &json)
        .with_context(|| format!("Failed to write settings to {}", tmp.display()))?;
    if let Err(e) = std::fs::rename(&tmp, target) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("Failed to move settings into {path}"));
    }

    debug!(path, markets = settings.len(), "Settings saved");
    Ok(())
}

/// Load saved settings.
/// Returns None if the file doesn't exist (first start).
pub fn load_settings(path: Option<&str>) -> Result<Option<BTreeMap<MarketId, MarketSettings>>> {
    let path = path.unwrap_or(DEFAULT_SETTINGS_FILE);

    if !Path::new(path).exists() {
        info!(path, "No saved settings found, using config.toml");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path).with_context(|| format!("Failed to read settings from {path}"))?;
    let settings: BTreeMap<MarketId, MarketSettings> =
        serde_json::from_str(&json).with_context(|| format!("Failed to parse settings from {path}"))?;

    info!(path, markets = settings.len(), "Settings loaded from disk");
    Ok(Some(settings))
}

/// Delete the settings file (for testing or reset).
pub fn delete_settings(path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_SETTINGS_FILE);
    if Path::new(path).exists() {
        std::fs::remove_file(path).with_context(|| format!("Failed to delete settings file {path}"))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
