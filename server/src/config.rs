// Copyright (C) 2026 Marcus L. Hanestad <marlhan@proton.me>
//
// This file is part of MacMirror.
//
// MacMirror is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// MacMirror is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with MacMirror.  If not, see <https://www.gnu.org/licenses/>.

use std::time::Duration;

use common::mode::UserMode;
use log::{debug, warn};
use mirror_lib::models::{SettingsMessage, CAPTURE_SOURCE_DISPLAY, CAPTURE_SOURCE_WINDOW};

use crate::capture::{DisplayMeta, WindowMeta};

pub const MIN_FPS: u32 = 10;
pub const MAX_FPS: u32 = 60;
pub const MIN_QUALITY: f32 = 0.20;
pub const MAX_QUALITY: f32 = 0.80;
pub const MIN_SCALE: f32 = 0.30;
pub const MAX_SCALE: f32 = 1.00;
pub const MIN_AUDIO_QUALITY: f32 = 0.10;
pub const MAX_AUDIO_QUALITY: f32 = 1.00;

/// Default ceiling the controller will not push image quality past.
/// Fidelity mode raises it to its own setpoint.
pub const DEFAULT_QUALITY_CEILING: f32 = 0.60;

/// Clients may request frame rates in a narrower band than the config
/// range allows.
pub const PREFERRED_FPS_MIN: i64 = 10;
pub const PREFERRED_FPS_MAX: i64 = 45;
pub const PREFERRED_QUALITY_MIN: i64 = 20;
pub const PREFERRED_QUALITY_MAX: i64 = 80;

/// What the pipeline points the capture primitive at. Resolution against
/// the live content list happens afresh every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureTarget {
    FullDisplay { display_id: u32 },
    SingleWindow { window_id: u32 },
}

/// Mutable stream state, written by the controller and by inbound
/// settings, read by the capture and audio tasks.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    pub fps_target: u32,
    pub image_quality: f32,
    pub output_scale: f32,
    pub audio_quality: f32,
    pub audio_enabled: bool,
    pub mode: UserMode,
    /// The fps the controller rebounds toward; the mode preset unless a
    /// `preferredFPS` override arrived.
    pub user_fps: u32,
    /// Likewise for image quality.
    pub user_quality: f32,
    pub max_frame_time: Duration,
    pub quality_ceiling: f32,
    source: SourceKind,
    display_id: u32,
    window_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKind {
    Display,
    Window,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::from_mode(UserMode::default())
    }
}

impl StreamConfig {
    pub fn from_mode(mode: UserMode) -> Self {
        let sp = mode.setpoint();
        Self {
            fps_target: sp.fps,
            image_quality: sp.image_quality,
            output_scale: 0.50,
            audio_quality: sp.audio_quality,
            audio_enabled: true,
            mode,
            user_fps: sp.fps,
            user_quality: sp.image_quality,
            max_frame_time: sp.max_frame_time,
            quality_ceiling: DEFAULT_QUALITY_CEILING.max(sp.image_quality),
            source: SourceKind::Display,
            display_id: 0,
            window_id: 0,
        }
    }

    pub fn capture_target(&self) -> CaptureTarget {
        match self.source {
            SourceKind::Display => CaptureTarget::FullDisplay {
                display_id: self.display_id,
            },
            SourceKind::Window => CaptureTarget::SingleWindow {
                window_id: self.window_id,
            },
        }
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps_target.max(1) as f64)
    }

    pub fn quality_percent(&self) -> u32 {
        (self.image_quality * 100.0).round() as u32
    }

    pub fn clamp(&mut self) {
        self.fps_target = self.fps_target.clamp(MIN_FPS, MAX_FPS);
        self.image_quality = self.image_quality.clamp(MIN_QUALITY, MAX_QUALITY);
        self.output_scale = self.output_scale.clamp(MIN_SCALE, MAX_SCALE);
        self.audio_quality = self
            .audio_quality
            .clamp(MIN_AUDIO_QUALITY, MAX_AUDIO_QUALITY);
    }

    /// Apply a client settings packet. Unknown values are logged and
    /// skipped; applying the same packet twice is a no-op.
    pub fn apply_settings(
        &mut self,
        settings: &SettingsMessage,
        windows: &[WindowMeta],
        displays: &[DisplayMeta],
    ) {
        if let Some(name) = settings.streaming_mode.as_deref() {
            match UserMode::from_name(name) {
                Some(mode) => {
                    let sp = mode.setpoint();
                    self.mode = mode;
                    self.fps_target = sp.fps;
                    self.user_fps = sp.fps;
                    self.image_quality = sp.image_quality;
                    self.user_quality = sp.image_quality;
                    self.audio_quality = sp.audio_quality;
                    self.max_frame_time = sp.max_frame_time;
                    self.quality_ceiling = DEFAULT_QUALITY_CEILING.max(sp.image_quality);
                }
                None => warn!("Ignoring unknown streaming mode `{name}`"),
            }
        }

        if let Some(fps) = settings.preferred_fps {
            let fps = fps.clamp(PREFERRED_FPS_MIN, PREFERRED_FPS_MAX) as u32;
            self.fps_target = fps;
            self.user_fps = fps;
        }

        if let Some(quality) = settings.preferred_quality {
            let quality =
                quality.clamp(PREFERRED_QUALITY_MIN, PREFERRED_QUALITY_MAX) as f32 / 100.0;
            self.image_quality = quality;
            self.user_quality = quality;
        }

        if let Some(source) = settings.capture_source.as_deref() {
            match source {
                CAPTURE_SOURCE_DISPLAY => self.source = SourceKind::Display,
                CAPTURE_SOURCE_WINDOW => self.source = SourceKind::Window,
                other => warn!("Ignoring unknown capture source `{other}`"),
            }
        }

        if let Some(id) = settings.selected_window_id {
            if id != 0 {
                if windows.iter().any(|w| w.id == id) {
                    self.window_id = id;
                    self.source = SourceKind::Window;
                } else {
                    debug!("Selected window {id} is not in the current window list");
                }
            }
        }

        if let Some(id) = settings.selected_display_id {
            if id != 0 {
                if displays.iter().any(|d| d.id == id) {
                    self.display_id = id;
                    self.source = SourceKind::Display;
                } else {
                    debug!("Selected display {id} is not in the current display list");
                }
            }
        }

        if let Some(enabled) = settings.audio_enabled {
            self.audio_enabled = enabled;
        }

        if let Some(quality) = settings.audio_quality {
            self.audio_quality = quality.clamp(MIN_AUDIO_QUALITY, MAX_AUDIO_QUALITY);
        }

        self.clamp();
    }
}
