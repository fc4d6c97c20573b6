// Capture Parameters
// Immutable description of one recording attempt, plus quality presets

use std::path::PathBuf;

use serde::Serialize;

use crate::models::Monitor;

pub const FPS_MIN: u32 = 1;
pub const FPS_MAX: u32 = 240;
pub const DEFAULT_FPS: u32 = 30;

/// Largest CRF value x264 accepts.
pub const CRF_MAX: u32 = 51;
pub const DEFAULT_CRF: u32 = 23;

/// Output sizing for a session: record at the display's own size or
/// scale to an explicit one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ResolutionMode {
    Native,
    Custom { width: u32, height: u32 },
}

/// Everything one recording attempt needs. Built once per start and not
/// mutated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureRequest {
    pub monitor: Monitor,
    pub resolution: ResolutionMode,
    pub fps: u32,
    /// x264 constant-rate-factor quality value
    pub crf: u32,
    pub capture_audio: bool,
    pub output_root: PathBuf,
}

impl CaptureRequest {
    /// Checks the invariants that make a request launchable. Violations
    /// are configuration errors reported before any process exists.
    pub fn validate(&self) -> Result<(), String> {
        if !(FPS_MIN..=FPS_MAX).contains(&self.fps) {
            return Err(format!(
                "frame rate {} outside the supported range {FPS_MIN}..={FPS_MAX}",
                self.fps
            ));
        }
        if self.crf > CRF_MAX {
            return Err(format!("CRF {} exceeds the x264 maximum {CRF_MAX}", self.crf));
        }
        if let ResolutionMode::Custom { width, height } = self.resolution {
            if width == 0 || height == 0 {
                return Err(format!(
                    "custom resolution {width}x{height} must have positive dimensions"
                ));
            }
        }
        if self.monitor.width() <= 0 || self.monitor.height() <= 0 {
            return Err(format!(
                "monitor {} reports an empty capture rectangle",
                self.monitor.index
            ));
        }
        Ok(())
    }
}

/// A named quality/rate combination selectable in one step.
#[derive(Debug, Clone)]
pub struct Preset {
    pub name: &'static str,
    pub fps: u32,
    pub crf: u32,
    pub resolution: ResolutionMode,
}

pub const PRESETS: &[Preset] = &[
    Preset {
        name: "Scene: Native / Balanced (30fps, CRF23)",
        fps: 30,
        crf: 23,
        resolution: ResolutionMode::Native,
    },
    Preset {
        name: "YouTube 1080p30 (CRF21)",
        fps: 30,
        crf: 21,
        resolution: ResolutionMode::Custom {
            width: 1920,
            height: 1080,
        },
    },
    Preset {
        name: "Tutorial 1440p60 (CRF20)",
        fps: 60,
        crf: 20,
        resolution: ResolutionMode::Custom {
            width: 2560,
            height: 1440,
        },
    },
    Preset {
        name: "Full Dump Native / HQ (60fps, CRF18)",
        fps: 60,
        crf: 18,
        resolution: ResolutionMode::Native,
    },
];

/// Index into [`PRESETS`] that suits a display of the given size.
pub fn suggest_preset_for_monitor(width: i32, height: i32) -> usize {
    if width <= 1920 && height <= 1080 {
        return 1;
    }
    if width <= 2560 && height <= 1440 {
        return 2;
    }
    3
}
