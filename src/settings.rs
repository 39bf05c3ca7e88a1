//! Typed key/value settings persisted as JSON
//!
//! The file holds three maps:
//!
//! ```json
//! { "bool": { "SHOW_LIGHTS": true }, "float": {}, "int": { "SCREEN_WIDTH": 1280 } }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EngineResult;

/// Bool, float and int settings by name; absent keys read as zero values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(rename = "bool", default)]
    bools: BTreeMap<String, bool>,
    #[serde(rename = "float", default)]
    floats: BTreeMap<String, f32>,
    #[serde(rename = "int", default)]
    ints: BTreeMap<String, i32>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_bool(&mut self, key: &str, value: bool) {
        self.bools.insert(key.to_string(), value);
    }

    pub fn set_float(&mut self, key: &str, value: f32) {
        self.floats.insert(key.to_string(), value);
    }

    pub fn set_int(&mut self, key: &str, value: i32) {
        self.ints.insert(key.to_string(), value);
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.bools.get(key).copied().unwrap_or(false)
    }

    pub fn get_float(&self, key: &str) -> f32 {
        self.floats.get(key).copied().unwrap_or(0.0)
    }

    pub fn get_int(&self, key: &str) -> i32 {
        self.ints.get(key).copied().unwrap_or(0)
    }

    /// Merge a settings file into these maps; keys in the file win
    pub fn load_from_file(&mut self, path: impl AsRef<Path>) -> EngineResult<()> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let loaded: Settings = serde_json::from_str(&text)?;
        self.bools.extend(loaded.bools);
        self.floats.extend(loaded.floats);
        self.ints.extend(loaded.ints);
        log::info!("settings loaded from {}", path.display());
        Ok(())
    }

    /// Write every map as pretty-printed JSON
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> EngineResult<()> {
        let path = path.as_ref();
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        log::info!("settings saved to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_keys_default_to_zero() {
        let settings = Settings::new();
        assert!(!settings.get_bool("SHOW_LIGHTS"));
        assert_eq!(settings.get_float("SSAO_STRENGTH"), 0.0);
        assert_eq!(settings.get_int("SCREEN_WIDTH"), 0);
    }

    #[test]
    fn test_save_load_round_trip() {
        let path = std::env::temp_dir().join("gl_render_engine_settings.json");
        let mut settings = Settings::new();
        settings.set_bool("SHOW_LIGHTS", true);
        settings.set_float("SSAO_STRENGTH", 1.5);
        settings.set_int("SCREEN_WIDTH", 1920);
        settings.save_to_file(&path).unwrap();

        let mut loaded = Settings::new();
        loaded.load_from_file(&path).unwrap();
        assert_eq!(loaded, settings);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_load_merges_partial_file() {
        let path = std::env::temp_dir().join("gl_render_engine_partial_settings.json");
        std::fs::write(&path, r#"{ "int": { "SCREEN_HEIGHT": 600 } }"#).unwrap();

        let mut settings = Settings::new();
        settings.set_int("SCREEN_WIDTH", 800);
        settings.set_int("SCREEN_HEIGHT", 480);
        settings.load_from_file(&path).unwrap();

        assert_eq!(settings.get_int("SCREEN_WIDTH"), 800);
        assert_eq!(settings.get_int("SCREEN_HEIGHT"), 600);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_load_errors() {
        let mut settings = Settings::new();
        assert!(settings.load_from_file("/nonexistent/settings.json").is_err());

        let path = std::env::temp_dir().join("gl_render_engine_bad_settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            settings.load_from_file(&path),
            Err(crate::error::EngineError::Settings(_))
        ));
        let _ = std::fs::remove_file(path);
    }
}
