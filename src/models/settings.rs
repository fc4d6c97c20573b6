// Settings Model
// Persisted front-end configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_output_folder() -> String {
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Videos")
        .join("ScreenCaptures")
        .to_string_lossy()
        .into_owned()
}

fn default_theme() -> String {
    "Crimson".to_string()
}

/// Application settings persisted as `config.json`.
///
/// Key names stay PascalCase so existing config files keep working. The
/// theme is stored opaquely for the front-end; the core only reads the
/// output folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(rename = "OutputFolder", default = "default_output_folder")]
    pub output_folder: String,
    #[serde(rename = "Theme", default = "default_theme")]
    pub theme: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_folder: default_output_folder(),
            theme: default_theme(),
        }
    }
}
