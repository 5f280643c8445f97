use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};

const APP_DIR: &str = "Chat-Canvas";

/// Parameters sent with every chat request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    // A request still unanswered after this long is closed out as a timeout
    pub request_timeout_secs: u64,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            model: "deepseek-chat".to_string(),
            max_tokens: 1000,
            temperature: 0.7,
            top_p: 0.9,
            request_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    // If None, use OS default autosave directory
    pub autosave_override: Option<PathBuf>,
    // If None, use OS temporary directory for exports
    pub export_override: Option<PathBuf>,
    pub autosave_interval_secs: u64,
    pub minimap_visible: bool,
    pub chat: ChatSettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            autosave_override: None,
            export_override: None,
            autosave_interval_secs: 30,
            minimap_visible: true,
            chat: ChatSettings::default(),
        }
    }
}

impl AppSettings {
    fn config_dir() -> PathBuf {
        // Cross-platform user config dir
        #[cfg(target_os = "macos")]
        {
            // ~/Library/Application Support/Chat-Canvas
            let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("~"));
            return home.join("Library").join("Application Support").join(APP_DIR);
        }
        #[cfg(target_os = "windows")]
        {
            // %APPDATA%\Chat-Canvas
            if let Ok(appdata) = std::env::var("APPDATA") {
                return PathBuf::from(appdata).join(APP_DIR);
            }
            return PathBuf::from(APP_DIR);
        }
        #[cfg(all(unix, not(target_os = "macos")))]
        {
            // $XDG_CONFIG_HOME/Chat-Canvas or ~/.config/Chat-Canvas
            if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
                return PathBuf::from(xdg).join(APP_DIR);
            }
            let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("~"));
            return home.join(".config").join(APP_DIR);
        }
    }

    fn autosave_default_dir() -> PathBuf {
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("/tmp"));
            return home.join("Library").join("Application Support").join(APP_DIR).join("Autosave");
        }
        #[cfg(target_os = "windows")]
        {
            // %LOCALAPPDATA%\Chat-Canvas\Autosave else TEMP
            if let Ok(local) = std::env::var("LOCALAPPDATA") {
                return PathBuf::from(local).join(APP_DIR).join("Autosave");
            }
            if let Ok(temp) = std::env::var("TEMP") {
                return PathBuf::from(temp).join(APP_DIR);
            }
            return PathBuf::from(APP_DIR);
        }
        #[cfg(all(unix, not(target_os = "macos")))]
        {
            // $XDG_STATE_HOME/chat-canvas or ~/.local/state/chat-canvas, else /tmp/Chat-Canvas
            if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
                return PathBuf::from(xdg).join("chat-canvas");
            }
            if let Ok(home) = std::env::var("HOME") {
                return PathBuf::from(home).join(".local").join("state").join("chat-canvas");
            }
            return PathBuf::from("/tmp").join(APP_DIR);
        }
    }

    pub fn settings_path() -> PathBuf {
        Self::config_dir().join("settings.ron")
    }

    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::settings_path())
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let mut f = fs::File::open(path)?;
        let mut s = String::new();
        f.read_to_string(&mut s)?;
        Self::from_ron(&s)
    }

    pub fn from_ron(s: &str) -> anyhow::Result<Self> {
        Ok(ron::from_str(s)?)
    }

    pub fn to_ron(&self) -> anyhow::Result<String> {
        Ok(ron::ser::to_string_pretty(self, PrettyConfig::new())?)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::settings_path())
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let s = self.to_ron()?;
        let mut f = fs::File::create(path)?;
        f.write_all(s.as_bytes())?;
        Ok(())
    }

    /// Copy for the current run with a command-line autosave directory
    /// applied. The copy is handed to the persistence layer only; the settings
    /// that get saved keep their own value.
    pub fn for_run(&self, autosave_dir: Option<PathBuf>) -> Self {
        let mut run = self.clone();
        if let Some(dir) = autosave_dir {
            run.autosave_override = Some(dir);
        }
        run
    }

    pub fn autosave_dir(&self) -> PathBuf {
        if let Some(p) = &self.autosave_override { return p.clone(); }
        Self::autosave_default_dir()
    }

    /// Default export directory when no override is set: OS temporary directory.
    /// Example: {temp_dir}/Chat-Canvas/exports
    pub fn export_default_dir() -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(APP_DIR);
        p.push("exports");
        p
    }

    /// Effective export directory honoring user override or falling back to OS temp.
    pub fn export_dir(&self) -> PathBuf {
        if let Some(p) = &self.export_override { return p.clone(); }
        Self::export_default_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_settings_fill_in_defaults() {
        let s = AppSettings::from_ron("(autosave_interval_secs: 10, chat: (model: \"other\"))").unwrap();
        assert_eq!(s.autosave_interval_secs, 10);
        assert!(s.minimap_visible);
        assert_eq!(s.chat.model, "other");
        assert_eq!(s.chat.max_tokens, 1000);
    }

    #[test]
    fn settings_survive_ron() {
        let mut s = AppSettings::default();
        s.export_override = Some(PathBuf::from("/data/exports"));
        let back = AppSettings::from_ron(&s.to_ron().unwrap()).unwrap();
        assert_eq!(back, s);
        assert_eq!(back.export_dir(), PathBuf::from("/data/exports"));
    }

    #[test]
    fn run_only_autosave_dir_is_not_saved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.ron");
        let mut persisted = AppSettings::default();
        let run = persisted.for_run(Some(PathBuf::from("/tmp/scratch-autosave")));
        assert_eq!(run.autosave_dir(), PathBuf::from("/tmp/scratch-autosave"));

        // a later settings change saves the persisted copy
        persisted.minimap_visible = false;
        persisted.save_to(&path).unwrap();
        let reloaded = AppSettings::load_from(&path).unwrap();
        assert_eq!(reloaded.autosave_override, None);
        assert!(!reloaded.minimap_visible);
        assert!(!std::fs::read_to_string(&path).unwrap().contains("scratch-autosave"));
    }
}
