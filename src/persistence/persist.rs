use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use time::OffsetDateTime;
use time::macros::format_description;

use super::settings::AppSettings;
use crate::canvas::session::{NodeRecord, SessionCodec, SessionSnapshot};

const AUTOSAVE_FILE: &str = "autosave.json";

static SETTINGS_OVERRIDE: OnceLock<AppSettings> = OnceLock::new();

pub fn set_settings_override(settings: AppSettings) {
    let _ = SETTINGS_OVERRIDE.set(settings);
}

fn settings() -> AppSettings {
    // If an override is set (e.g. from main.rs), use it.
    if let Some(settings) = SETTINGS_OVERRIDE.get() {
        return settings.clone();
    }
    AppSettings::load().unwrap_or_default()
}

fn autosave_dir() -> PathBuf {
    settings().autosave_dir()
}

/// llm-canvas-session-YYYY-MM-DDTHH-MM-SS.json
pub fn export_file_name(now: OffsetDateTime) -> String {
    let fmt = format_description!("[year]-[month]-[day]T[hour]-[minute]-[second]");
    let stamp = now.format(fmt).unwrap_or_else(|_| "unknown".to_string());
    format!("llm-canvas-session-{}.json", stamp)
}

pub fn export_path_now() -> PathBuf {
    settings().export_dir().join(export_file_name(OffsetDateTime::now_utc()))
}

fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    {
        let mut f = File::create(&tmp_path)?;
        f.write_all(data)?;
        f.flush()?;
    }
    fs::rename(tmp_path, path)?;
    Ok(())
}

/// Overwrite the autosave slot in `dir`. Empty sessions are not written.
pub fn save_active_in(dir: &Path, snapshot: &SessionSnapshot) -> anyhow::Result<Option<PathBuf>> {
    if snapshot.nodes.is_empty() {
        return Ok(None);
    }
    fs::create_dir_all(dir)?;
    let s = SessionCodec::to_json(snapshot)?;
    let path = dir.join(AUTOSAVE_FILE);
    atomic_write(&path, s.as_bytes())?;
    Ok(Some(path))
}

pub fn save_active(snapshot: &SessionSnapshot) -> anyhow::Result<Option<PathBuf>> {
    save_active_in(&autosave_dir(), snapshot)
}

/// Records from the autosave slot in `dir`; `None` when there is nothing usable.
pub fn load_active_in(dir: &Path) -> anyhow::Result<Option<Vec<NodeRecord>>> {
    let path = dir.join(AUTOSAVE_FILE);
    if !path.exists() {
        return Ok(None);
    }
    read_session_file(&path)
}

pub fn load_active() -> anyhow::Result<Option<Vec<NodeRecord>>> {
    load_active_in(&autosave_dir())
}

/// Empty the autosave slot, as an explicit clear does.
pub fn clear_active_in(dir: &Path) -> anyhow::Result<()> {
    let path = dir.join(AUTOSAVE_FILE);
    if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}

pub fn clear_active() -> anyhow::Result<()> {
    clear_active_in(&autosave_dir())
}

/// Write a full snapshot to `path` as pretty JSON.
pub fn save_export(path: &Path, snapshot: &SessionSnapshot) -> anyhow::Result<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let s = SessionCodec::to_json(snapshot)?;
    atomic_write(path, s.as_bytes())?;
    Ok(path.to_path_buf())
}

pub fn read_session_file(path: &Path) -> anyhow::Result<Option<Vec<NodeRecord>>> {
    let mut f = File::open(path)?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    Ok(SessionCodec::parse(&buf)?)
}

/// Decides when the next autosave cycle is due.
#[derive(Debug, Clone)]
pub struct AutosaveTimer {
    interval: Duration,
    last: Instant,
    enabled: bool,
}

impl AutosaveTimer {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self { interval, last: now, enabled: true }
    }

    pub fn disabled() -> Self {
        Self { interval: Duration::MAX, last: Instant::now(), enabled: false }
    }

    pub fn is_enabled(&self) -> bool { self.enabled }

    /// True once per elapsed interval; the cycle restarts at `now`.
    pub fn due(&mut self, now: Instant) -> bool {
        if !self.enabled || now.saturating_duration_since(self.last) < self.interval {
            return false;
        }
        self.last = now;
        true
    }

    /// Time left before the next cycle, for repaint scheduling.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.interval.saturating_sub(now.saturating_duration_since(self.last))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn export_names_carry_the_timestamp() {
        let name = export_file_name(datetime!(2024-03-05 14:07:09 UTC));
        assert_eq!(name, "llm-canvas-session-2024-03-05T14-07-09.json");
    }

    #[test]
    fn timer_fires_once_per_interval() {
        let t0 = Instant::now();
        let mut timer = AutosaveTimer::new(Duration::from_secs(30), t0);
        assert!(!timer.due(t0 + Duration::from_secs(29)));
        assert!(timer.due(t0 + Duration::from_secs(30)));
        assert!(!timer.due(t0 + Duration::from_secs(31)));
        assert!(timer.due(t0 + Duration::from_secs(61)));
        assert!(!AutosaveTimer::disabled().due(t0 + Duration::from_secs(3600)));
    }
}
