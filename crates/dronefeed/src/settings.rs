use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Thresholds for the face-tracking movement heuristic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingSettings {
    /// Horizontal movement (px) beyond which the drone rolls toward the face.
    pub deadband_x: i32,
    /// Downward movement (px) beyond which the drone descends.
    pub deadband_down: i32,
    /// Upward movement (px) beyond which the drone climbs.
    pub deadband_up: i32,
    pub roll_magnitude: f32,
    pub descend_magnitude: f32,
    pub climb_magnitude: f32,
    /// Detections after which the drone lands and the pipeline stops.
    pub detection_limit: u32,
    /// Mosaic block edge in pixels.
    pub mosaic_block: u32,
    /// Paint the pixelated tracking view instead of the raw feed.
    pub show_annotated: bool,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            deadband_x: 3,
            deadband_down: 3,
            deadband_up: 5,
            roll_magnitude: 1.0,
            descend_magnitude: 1.0,
            climb_magnitude: 0.3,
            detection_limit: 50,
            mosaic_block: 10,
            show_annotated: true,
        }
    }
}

/// Persisted stage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSettings {
    pub version: u32,
    #[serde(default = "default_bytes_per_pixel")]
    pub bytes_per_pixel: u32,
    #[serde(default = "default_window_title")]
    pub window_title: String,
    /// Upper bound on how long transform waits for a pending redraw.
    #[serde(default = "default_redraw_wait_ms")]
    pub redraw_wait_ms: u64,
    /// How long the host gets to exit after the window closes.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
    /// Render loop wake-up interval for window-system events.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub tracking: TrackingSettings,
}

fn default_bytes_per_pixel() -> u32 {
    2
}

fn default_window_title() -> String {
    "Drone Feed".to_string()
}

fn default_redraw_wait_ms() -> u64 {
    1
}

fn default_grace_period_ms() -> u64 {
    5000
}

fn default_poll_interval_ms() -> u64 {
    16
}

impl Default for StageSettings {
    fn default() -> Self {
        Self {
            version: 1,
            bytes_per_pixel: default_bytes_per_pixel(),
            window_title: default_window_title(),
            redraw_wait_ms: default_redraw_wait_ms(),
            grace_period_ms: default_grace_period_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            tracking: TrackingSettings::default(),
        }
    }
}

impl StageSettings {
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        config_dir.join("dronefeed").join("settings.json")
    }

    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(settings) => {
                    log::info!("Loaded settings from {}", path.display());
                    settings
                }
                Err(e) => {
                    log::warn!("Failed to parse settings: {e}");
                    Self::default()
                }
            },
            Err(_) => {
                log::info!("No settings found, using defaults");
                Self::default()
            }
        }
    }

    pub fn save(&self) {
        self.save_to(&Self::config_path());
    }

    pub fn save_to(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::error!("Failed to create config dir: {e}");
                return;
            }
        }
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    log::error!("Failed to write settings: {e}");
                } else {
                    log::debug!("Saved settings to {}", path.display());
                }
            }
            Err(e) => log::error!("Failed to serialize settings: {e}"),
        }
    }

    pub fn redraw_wait(&self) -> Duration {
        Duration::from_millis(self.redraw_wait_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = StageSettings::default();
        assert_eq!(s.bytes_per_pixel, 2);
        assert_eq!(s.grace_period(), Duration::from_secs(5));
        assert_eq!(s.redraw_wait(), Duration::from_millis(1));
        assert_eq!(s.tracking.detection_limit, 50);
        assert_eq!(s.tracking.deadband_up, 5);
    }

    #[test]
    fn missing_fields_fall_back() {
        let s: StageSettings = serde_json::from_str(r#"{"version": 1, "bytes_per_pixel": 3}"#).unwrap();
        assert_eq!(s.bytes_per_pixel, 3);
        assert_eq!(s.window_title, "Drone Feed");
        assert_eq!(s.tracking, TrackingSettings::default());

        let s: StageSettings =
            serde_json::from_str(r#"{"version": 1, "tracking": {"detection_limit": 7}}"#).unwrap();
        assert_eq!(s.tracking.detection_limit, 7);
        assert_eq!(s.tracking.deadband_x, 3);
    }

    #[test]
    fn poll_interval_never_zero() {
        let s = StageSettings {
            poll_interval_ms: 0,
            ..StageSettings::default()
        };
        assert_eq!(s.poll_interval(), Duration::from_millis(1));
    }

    #[test]
    fn save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let mut s = StageSettings::default();
        s.window_title = "Bench".into();
        s.grace_period_ms = 250;
        s.save_to(&path);
        assert_eq!(StageSettings::load_from(&path), s);
    }

    #[test]
    fn corrupt_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(StageSettings::load_from(&path), StageSettings::default());
    }
}
