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

use async_trait::async_trait;

use crate::config::CaptureTarget;
use crate::error::CaptureError;

/// One captured frame in BGRA order, tightly packed unless `stride`
/// says otherwise. Producers must not retain the pixel memory.
#[derive(Debug, Clone)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    /// Bytes per row; at least `width * 4`.
    pub stride: usize,
    pub pixels: Vec<u8>,
}

impl RawImage {
    pub fn packed(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            stride: width as usize * 4,
            pixels,
        }
    }
}

/// The platform capture primitive. The caller imposes the deadline.
#[async_trait]
pub trait ScreenCapture: Send + Sync {
    async fn capture(
        &self,
        target: &CaptureTarget,
        scaled_size: (u32, u32),
        show_cursor: bool,
    ) -> Result<RawImage, CaptureError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowMeta {
    pub id: u32,
    pub title: String,
    pub owner_name: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayMeta {
    pub id: u32,
    pub name: String,
    pub width: u32,
    pub height: u32,
}

/// Enumeration of capturable content, re-queried every tick so the
/// stream follows displays being unplugged and windows closing.
#[async_trait]
pub trait ContentEnumerator: Send + Sync {
    async fn list_windows(&self) -> Vec<WindowMeta>;
    async fn list_displays(&self) -> Vec<DisplayMeta>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ThermalState {
    #[default]
    Nominal,
    Fair,
    Serious,
    Critical,
}

impl ThermalState {
    /// Serious and above means the pipeline should shed work.
    pub fn is_throttling(self) -> bool {
        matches!(self, ThermalState::Serious | ThermalState::Critical)
    }
}

/// Host pressure readings the controller and the per-tick guard consume.
pub trait HostMonitor: Send + Sync {
    fn thermal_state(&self) -> ThermalState;
    /// Resident memory of this process, in bytes.
    fn memory_footprint(&self) -> u64;
}

/// Reports no pressure; the default on hosts without a pressure API.
pub struct NullHostMonitor;

impl HostMonitor for NullHostMonitor {
    fn thermal_state(&self) -> ThermalState {
        ThermalState::Nominal
    }

    fn memory_footprint(&self) -> u64 {
        0
    }
}
