// SettingsManager Service
// Persists config.json and hands out cached copies

use std::path::PathBuf;
use std::sync::RwLock;

use log::warn;
use serde_json::Value;

use crate::models::Settings;

/// Manages configuration storage and retrieval. Reads go through an
/// in-memory cache; the file is only touched again after a save.
pub struct SettingsManager {
    config_path: PathBuf,
    cache: RwLock<Option<Settings>>,
}

impl SettingsManager {
    /// Create a manager storing `config.json` under the given directory.
    pub fn new(config_dir: PathBuf) -> Self {
        Self {
            config_path: config_dir.join("config.json"),
            cache: RwLock::new(None),
        }
    }

    /// Manager rooted at the per-user configuration directory.
    pub fn at_default_location() -> Self {
        let config_dir = dirs_next::config_dir()
            .map(|dir| dir.join("scenerec"))
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(config_dir)
    }

    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Load settings from disk, or defaults when the file is missing or
    /// unreadable. An unreadable file is left in place; it gets replaced
    /// on the next explicit save.
    pub fn load(&self) -> Settings {
        if let Ok(cache) = self.cache.read() {
            if let Some(ref settings) = *cache {
                return settings.clone();
            }
        }

        let settings = match self.load_from_disk() {
            Ok(settings) => settings,
            Err(err) => {
                warn!("[Settings] {err}; falling back to defaults");
                Settings::default()
            }
        };

        if let Ok(mut cache) = self.cache.write() {
            *cache = Some(settings.clone());
        }

        settings
    }

    fn load_from_disk(&self) -> Result<Settings, String> {
        if !self.config_path.exists() {
            // First run: materialize the defaults so users have a file
            // to edit.
            let defaults = Settings::default();
            self.save_internal(&defaults)?;
            return Ok(defaults);
        }

        let content = std::fs::read_to_string(&self.config_path)
            .map_err(|e| format!("Failed to read settings: {e}"))?;
        let mut user_value: Value = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse settings: {e}"))?;

        let defaults_value = serde_json::to_value(Settings::default())
            .map_err(|e| format!("Failed to build default settings: {e}"))?;
        let changed = merge_missing_settings(&mut user_value, &defaults_value);

        let settings: Settings = serde_json::from_value(user_value)
            .map_err(|e| format!("Failed to parse settings: {e}"))?;

        if changed {
            self.save_internal(&settings)?;
        }

        Ok(settings)
    }

    /// Save settings to disk and refresh the cache.
    pub fn save(&self, settings: &Settings) -> Result<(), String> {
        self.save_internal(settings)?;

        if let Ok(mut cache) = self.cache.write() {
            *cache = Some(settings.clone());
        }

        Ok(())
    }

    fn save_internal(&self, settings: &Settings) -> Result<(), String> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create settings directory: {e}"))?;
        }

        let content = serde_json::to_string_pretty(settings)
            .map_err(|e| format!("Failed to serialize settings: {e}"))?;

        std::fs::write(&self.config_path, content)
            .map_err(|e| format!("Failed to write settings: {e}"))
    }
}

/// Fill keys missing from `target` with their defaults. Returns whether
/// anything was added, so callers know to write the file back.
fn merge_missing_settings(target: &mut Value, defaults: &Value) -> bool {
    match (target, defaults) {
        (Value::Object(target_map), Value::Object(defaults_map)) => {
            let mut changed = false;
            for (key, default_value) in defaults_map {
                match target_map.get_mut(key) {
                    Some(target_value) => {
                        if merge_missing_settings(target_value, default_value) {
                            changed = true;
                        }
                    }
                    None => {
                        target_map.insert(key.clone(), default_value.clone());
                        changed = true;
                    }
                }
            }
            changed
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_first_load_writes_defaults() {
        let tmp = TempDir::new().unwrap();
        let manager = SettingsManager::new(tmp.path().to_path_buf());

        let settings = manager.load();
        assert_eq!(settings, Settings::default());

        let raw = std::fs::read_to_string(manager.config_path()).unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert!(value.get("OutputFolder").is_some());
        assert_eq!(value["Theme"], "Crimson");
    }

    #[test]
    fn test_partial_file_gains_missing_keys() {
        let tmp = TempDir::new().unwrap();
        let manager = SettingsManager::new(tmp.path().to_path_buf());
        std::fs::write(manager.config_path(), r#"{"Theme": "Terminal"}"#).unwrap();

        let settings = manager.load();
        assert_eq!(settings.theme, "Terminal");
        assert_eq!(settings.output_folder, Settings::default().output_folder);

        // The completed file was written back.
        let raw = std::fs::read_to_string(manager.config_path()).unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["Theme"], "Terminal");
        assert!(value.get("OutputFolder").is_some());
    }

    #[test]
    fn test_corrupt_file_yields_defaults_and_stays_on_disk() {
        let tmp = TempDir::new().unwrap();
        let manager = SettingsManager::new(tmp.path().to_path_buf());
        std::fs::write(manager.config_path(), "{not valid json").unwrap();

        let settings = manager.load();
        assert_eq!(settings, Settings::default());

        let raw = std::fs::read_to_string(manager.config_path()).unwrap();
        assert_eq!(raw, "{not valid json");
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let tmp = TempDir::new().unwrap();
        let manager = SettingsManager::new(tmp.path().to_path_buf());

        let settings = Settings {
            output_folder: "/srv/captures".to_string(),
            theme: "Dark".to_string(),
        };
        manager.save(&settings).unwrap();
        assert_eq!(manager.load(), settings);
    }

    #[test]
    fn test_load_serves_from_cache() {
        let tmp = TempDir::new().unwrap();
        let manager = SettingsManager::new(tmp.path().to_path_buf());

        let first = manager.load();
        std::fs::write(manager.config_path(), r#"{"Theme": "Edited"}"#).unwrap();
        assert_eq!(manager.load(), first);
    }

    #[test]
    fn test_save_creates_nested_directories() {
        let tmp = TempDir::new().unwrap();
        let manager = SettingsManager::new(tmp.path().join("deep").join("nested"));

        manager.save(&Settings::default()).unwrap();
        assert!(manager.config_path().exists());
    }
}
