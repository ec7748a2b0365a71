use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    editor: EditorConfig,
    #[serde(default)]
    timeline: TimelineConfig,
    #[serde(default)]
    music: MusicConfig,
}

#[derive(Deserialize, Default)]
struct EditorConfig {
    save_debounce_ms: Option<u64>,
    change_log_capacity: Option<usize>,
    retry_base_ms: Option<u64>,
    retry_max_ms: Option<u64>,
}

#[derive(Deserialize, Default)]
struct TimelineConfig {
    zoom_min: Option<f64>,
    zoom_max: Option<f64>,
    zoom_default: Option<f64>,
}

#[derive(Deserialize, Default)]
struct MusicConfig {
    default_velocity: Option<f64>,
    steps_per_beat: Option<u32>,
}

pub struct Config {
    editor: EditorConfig,
    timeline: TimelineConfig,
    music: MusicConfig,
}

impl Config {
    /// Embedded defaults overlaid with the user's config file, if any.
    pub fn load() -> Self {
        let mut config = Self::embedded();

        if let Some(path) = user_config_path() {
            if path.exists() {
                match std::fs::read_to_string(&path) {
                    Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                        Ok(user) => config.overlay(user),
                        Err(e) => {
                            log::warn!(target: "core::config", "ignoring malformed config {}: {}", path.display(), e)
                        }
                    },
                    Err(e) => {
                        log::warn!(target: "core::config", "could not read config {}: {}", path.display(), e)
                    }
                }
            }
        }

        config
    }

    /// Embedded defaults only.
    pub fn embedded() -> Self {
        let base: ConfigFile = toml::from_str(DEFAULT_CONFIG).unwrap_or_else(|e| {
            log::error!(target: "core::config", "embedded config.toml is invalid: {}", e);
            ConfigFile::default()
        });
        Config {
            editor: base.editor,
            timeline: base.timeline,
            music: base.music,
        }
    }

    /// Embedded defaults overlaid with `contents`.
    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        let user: ConfigFile = toml::from_str(contents)?;
        let mut config = Self::embedded();
        config.overlay(user);
        Ok(config)
    }

    fn overlay(&mut self, user: ConfigFile) {
        merge_editor(&mut self.editor, user.editor);
        merge_timeline(&mut self.timeline, user.timeline);
        merge_music(&mut self.music, user.music);
    }

    /// Quiet period before pending changes are flushed (clamped to 50ms..10min).
    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.editor.save_debounce_ms.unwrap_or(2000).clamp(50, 600_000))
    }

    /// Maximum change log length (at least 1).
    pub fn change_log_capacity(&self) -> usize {
        self.editor.change_log_capacity.unwrap_or(100).max(1)
    }

    pub fn retry_base(&self) -> Duration {
        Duration::from_millis(self.editor.retry_base_ms.unwrap_or(1000).clamp(10, 600_000))
    }

    /// Upper bound on the retry delay, never below `retry_base`.
    pub fn retry_max(&self) -> Duration {
        let max = Duration::from_millis(self.editor.retry_max_ms.unwrap_or(60_000).min(3_600_000));
        max.max(self.retry_base())
    }

    /// Allowed zoom range as `(min, max)`.
    pub fn zoom_range(&self) -> (f64, f64) {
        let min = positive(self.timeline.zoom_min).unwrap_or(0.25);
        let max = positive(self.timeline.zoom_max).unwrap_or(8.0);
        if min <= max {
            (min, max)
        } else {
            (max, min)
        }
    }

    pub fn zoom_default(&self) -> f64 {
        let (min, max) = self.zoom_range();
        positive(self.timeline.zoom_default).unwrap_or(1.0).clamp(min, max)
    }

    pub fn default_velocity(&self) -> f64 {
        self.music
            .default_velocity
            .filter(|v| v.is_finite())
            .unwrap_or(0.8)
            .clamp(0.0, 1.0)
    }

    /// Timeline steps per beat (clamped to 1..64).
    pub fn steps_per_beat(&self) -> u32 {
        self.music.steps_per_beat.unwrap_or(4).clamp(1, 64)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::embedded()
    }
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("cadenza").join("config.toml"))
}

fn merge_editor(base: &mut EditorConfig, user: EditorConfig) {
    if user.save_debounce_ms.is_some() {
        base.save_debounce_ms = user.save_debounce_ms;
    }
    if user.change_log_capacity.is_some() {
        base.change_log_capacity = user.change_log_capacity;
    }
    if user.retry_base_ms.is_some() {
        base.retry_base_ms = user.retry_base_ms;
    }
    if user.retry_max_ms.is_some() {
        base.retry_max_ms = user.retry_max_ms;
    }
}

fn merge_timeline(base: &mut TimelineConfig, user: TimelineConfig) {
    if user.zoom_min.is_some() {
        base.zoom_min = user.zoom_min;
    }
    if user.zoom_max.is_some() {
        base.zoom_max = user.zoom_max;
    }
    if user.zoom_default.is_some() {
        base.zoom_default = user.zoom_default;
    }
}

fn merge_music(base: &mut MusicConfig, user: MusicConfig) {
    if user.default_velocity.is_some() {
        base.default_velocity = user.default_velocity;
    }
    if user.steps_per_beat.is_some() {
        base.steps_per_beat = user.steps_per_beat;
    }
}
