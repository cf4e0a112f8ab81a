use serde::{Deserialize, Serialize};

use crate::video::frame::PixelFormat;

/// Environment variable forcing shared memory on or off (`0|false|1|true`).
pub const SHM_ENV: &str = "VIDEO_SINK_SHM";
/// Environment variable enabling the debug FPS log (`1|true`).
pub const DEBUG_FPS_ENV: &str = "VIDEO_SINK_DEBUG_FPS";

/// Fixed output resolution for the callback path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Configuration for one sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkSettings {
    /// Publish frames through a shared-memory segment.
    pub shm_enabled: bool,
    /// Prefix for generated segment names: `/<prefix>_shm_<pid>_<index>`.
    pub segment_prefix: String,
    /// Open-or-create exactly this segment instead of generating a name.
    pub segment_name: Option<String>,
    pub shm_format: PixelFormat,
    pub callback_format: PixelFormat,
    /// When unset the callback receives frames at their own resolution.
    pub callback_resolution: Option<Resolution>,
    pub debug_fps: bool,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            shm_enabled: true,
            segment_prefix: "video-sink".to_string(),
            segment_name: None,
            shm_format: PixelFormat::Bgra,
            callback_format: PixelFormat::Rgba,
            callback_resolution: None,
            debug_fps: false,
        }
    }
}

impl SinkSettings {
    /// Apply `VIDEO_SINK_SHM` and `VIDEO_SINK_DEBUG_FPS` from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup. Unrecognised values are ignored.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(enabled) = lookup(SHM_ENV).as_deref().and_then(parse_flag) {
            self.shm_enabled = enabled;
        }
        if lookup(DEBUG_FPS_ENV).is_some_and(|v| v == "1" || v == "true") {
            self.debug_fps = true;
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}
