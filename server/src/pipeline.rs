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

//! Capture-encode-send pipeline: one well-formed video frame per tick,
//! fanned out to every connected peer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use mirror_lib::packet::Packet;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::capture::{ContentEnumerator, HostMonitor, RawImage, ScreenCapture};
use crate::config::CaptureTarget;
use crate::controller::{self, ControllerParams};
use crate::encoder::ImageEncoder;
use crate::error::ErrorKind;
use crate::fallback;
use crate::Shared;

/// Hard deadline on the injected capture primitive.
pub const CAPTURE_DEADLINE: Duration = Duration::from_millis(500);

#[derive(Clone)]
pub struct PipelineDeps {
    pub capture: Arc<dyn ScreenCapture>,
    pub encoder: Arc<dyn ImageEncoder>,
    pub content: Arc<dyn ContentEnumerator>,
    pub monitor: Arc<dyn HostMonitor>,
}

/// Tick driver. The period is re-read every cycle so an fps change takes
/// effect by the next tick. Each tick runs as its own task; the busy
/// guard keeps the capture critical section single-threaded.
pub async fn run(
    shared: Arc<Shared>,
    deps: PipelineDeps,
    params: ControllerParams,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        let period = shared.config.lock().unwrap().tick_period();
        tokio::select! {
            _ = stop.changed() => break,
            _ = tokio::time::sleep(period) => {}
        }

        let shared = shared.clone();
        let deps = deps.clone();
        let params = params.clone();
        tokio::spawn(async move {
            tick(&shared, &deps, &params).await;
        });
    }

    // Let an in-flight tick clear the critical section before the caller
    // drains rings and counters.
    for _ in 0..60 {
        if !shared.capture_busy.load(Ordering::SeqCst) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    debug!("Capture pipeline stopped");
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// One pipeline tick.
pub async fn tick(shared: &Arc<Shared>, deps: &PipelineDeps, params: &ControllerParams) {
    if shared.capture_busy.swap(true, Ordering::SeqCst) {
        shared.dropped_frames.fetch_add(1, Ordering::Relaxed);
        return;
    }
    let _busy = BusyGuard(&shared.capture_busy);
    let t_start = Instant::now();

    if deps.monitor.thermal_state().is_throttling()
        || shared.memory_warnings.load(Ordering::Relaxed) > params.memory_warning_limit
    {
        shared.dropped_frames.fetch_add(1, Ordering::Relaxed);
        shared.perf.lock().unwrap().push(t_start.elapsed());
        return;
    }

    // Output scale is recomputed and clamped every tick, then the tick
    // works from one consistent config snapshot.
    let (target, quality, scale, fps, quality_percent, audio_enabled) = {
        let avg = shared.perf.lock().unwrap().mean();
        let rtt = shared.rtt.lock().unwrap().mean();
        let mut config = shared.config.lock().unwrap();
        config.output_scale =
            controller::output_scale(config.tick_period(), avg, rtt, params.latency_threshold);
        config.clamp();
        (
            config.capture_target(),
            config.image_quality,
            config.output_scale,
            config.fps_target,
            config.quality_percent(),
            config.audio_enabled,
        )
    };

    let image = match resolve(deps, &target).await {
        None => {
            shared.note_error(ErrorKind::CaptureUnavailable);
            fallback::fallback_image(fps, quality_percent, audio_enabled)
        }
        Some((width, height)) => {
            let scaled = scaled_size(width, height, scale);
            capture_with_deadline(shared, deps, &target, scaled, fps, quality_percent, audio_enabled)
                .await
        }
    };

    let encoder = deps.encoder.clone();
    let jpeg = tokio::task::spawn_blocking(move || encoder.encode_jpeg(&image, quality))
        .await
        .unwrap_or_default();
    if jpeg.is_empty() {
        // Drop this frame for all peers; the timer keeps running.
        shared.note_error(ErrorKind::EncodeError);
        shared.perf.lock().unwrap().push(t_start.elapsed());
        return;
    }

    let packet = Packet::Frame {
        status: shared.status_message(),
        image: jpeg,
    };
    let outcome = shared.connections.broadcast(Arc::new(packet.encode()), true);
    if outcome.overflow > 0 {
        shared.note_error(ErrorKind::PeerBacklogOverflow);
    }

    shared.perf.lock().unwrap().push(t_start.elapsed());
}

async fn capture_with_deadline(
    shared: &Arc<Shared>,
    deps: &PipelineDeps,
    target: &CaptureTarget,
    scaled: (u32, u32),
    fps: u32,
    quality_percent: u32,
    audio_enabled: bool,
) -> RawImage {
    match tokio::time::timeout(CAPTURE_DEADLINE, deps.capture.capture(target, scaled, true)).await {
        Ok(Ok(image)) => image,
        Ok(Err(err)) => {
            warn!("Capture failed: {err}");
            shared.note_error(ErrorKind::CaptureError);
            fallback::fallback_image(fps, quality_percent, audio_enabled)
        }
        Err(_) => {
            shared.note_error(ErrorKind::CaptureTimeout);
            shared.dropped_frames.fetch_add(1, Ordering::Relaxed);
            fallback::fallback_image(fps, quality_percent, audio_enabled)
        }
    }
}

async fn resolve(deps: &PipelineDeps, target: &CaptureTarget) -> Option<(u32, u32)> {
    match target {
        CaptureTarget::FullDisplay { display_id } => deps
            .content
            .list_displays()
            .await
            .into_iter()
            .find(|d| d.id == *display_id)
            .map(|d| (d.width, d.height)),
        CaptureTarget::SingleWindow { window_id } => deps
            .content
            .list_windows()
            .await
            .into_iter()
            .find(|w| w.id == *window_id)
            .map(|w| (w.width, w.height)),
    }
}

fn scaled_size(width: u32, height: u32, scale: f32) -> (u32, u32) {
    let w = ((width as f32) * scale) as u32;
    let h = ((height as f32) * scale) as u32;
    (w.max(16), h.max(16))
}
