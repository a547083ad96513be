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

//! Synthetic capture sources. The real platform primitives are injected
//! by the embedding application; these stand-ins keep the whole pipeline
//! runnable (and testable) anywhere.

use async_trait::async_trait;
use tokio::time::Instant;

use crate::capture::{ContentEnumerator, DisplayMeta, RawImage, ScreenCapture, WindowMeta};
use crate::config::CaptureTarget;
use crate::error::CaptureError;

/// Animated gradient; cheap to produce and visibly "in motion" on the
/// receiving side.
pub struct TestPatternCapture {
    started: Instant,
}

impl TestPatternCapture {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for TestPatternCapture {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScreenCapture for TestPatternCapture {
    async fn capture(
        &self,
        target: &CaptureTarget,
        scaled_size: (u32, u32),
        _show_cursor: bool,
    ) -> Result<RawImage, CaptureError> {
        let (width, height) = scaled_size;
        if width == 0 || height == 0 {
            return Err(CaptureError::Backend("zero-sized capture region".into()));
        }

        let t = self.started.elapsed().as_secs_f32();
        let phase = (t * 40.0) as u32;
        let seed = match target {
            CaptureTarget::FullDisplay { display_id } => *display_id,
            CaptureTarget::SingleWindow { window_id } => window_id.wrapping_mul(7),
        };

        let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
        for y in 0..height {
            for x in 0..width {
                let b = ((x + phase + seed) % 256) as u8;
                let g = ((y + phase / 2) % 256) as u8;
                let r = ((x + y) % 256) as u8;
                pixels.extend_from_slice(&[b, g, r, 0xFF]);
            }
        }
        Ok(RawImage::packed(width, height, pixels))
    }
}

/// Fixed content list. `display_id` 0 is the conventional main display,
/// so the default configuration resolves against entry id 0.
pub struct StaticContent {
    pub windows: Vec<WindowMeta>,
    pub displays: Vec<DisplayMeta>,
}

impl StaticContent {
    pub fn new() -> Self {
        Self {
            windows: vec![WindowMeta {
                id: 1,
                title: "Demo Window".into(),
                owner_name: "macmirror".into(),
                width: 1280,
                height: 720,
            }],
            displays: vec![DisplayMeta {
                id: 0,
                name: "Synthetic Display".into(),
                width: 1920,
                height: 1080,
            }],
        }
    }
}

impl Default for StaticContent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentEnumerator for StaticContent {
    async fn list_windows(&self) -> Vec<WindowMeta> {
        self.windows.clone()
    }

    async fn list_displays(&self) -> Vec<DisplayMeta> {
        self.displays.clone()
    }
}
