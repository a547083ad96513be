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

//! Closed-loop regulator over frame rate, image quality, output scale
//! and audio quality. Degrades under pressure, rebounds toward the
//! user-mode setpoints when there is slack.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::capture::HostMonitor;
use crate::config::{StreamConfig, MIN_FPS};
use crate::Shared;

#[derive(Debug, Clone)]
pub struct ControllerParams {
    pub latency_threshold: Duration,
    /// RTT above this gates the degrade rule.
    pub degrade_rtt_gate: Duration,
    pub min_quality: f32,
    /// Host-tuned, not an invariant.
    pub memory_warning_bytes: u64,
    pub memory_warning_bytes_background: u64,
    /// Warnings beyond this count trigger degradation and per-tick drops.
    pub memory_warning_limit: u32,
    pub evaluate_interval: Duration,
    pub background_interval: Duration,
}

impl Default for ControllerParams {
    fn default() -> Self {
        Self {
            latency_threshold: Duration::from_millis(40),
            degrade_rtt_gate: Duration::from_millis(60),
            min_quality: 0.20,
            memory_warning_bytes: 400 * 1024 * 1024,
            memory_warning_bytes_background: 200 * 1024 * 1024,
            memory_warning_limit: 2,
            evaluate_interval: Duration::from_secs(3),
            background_interval: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ControllerInput {
    pub avg_frame_time: Option<Duration>,
    /// Dropped frames since the previous evaluation.
    pub dropped_frames: u64,
    pub estimated_rtt: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Degraded,
    Rebounded,
    Hold,
}

/// One controller evaluation. At most one degrade step fires; a rebound
/// may adjust fps, image quality and audio quality together.
pub fn evaluate(
    config: &mut StreamConfig,
    input: &ControllerInput,
    params: &ControllerParams,
) -> Verdict {
    let Some(avg) = input.avg_frame_time else {
        return Verdict::Hold;
    };
    let rtt = input.estimated_rtt.unwrap_or(Duration::ZERO);

    let overloaded = avg > config.max_frame_time.mul_f32(1.5) || input.dropped_frames > 5;
    let verdict = if overloaded && rtt > params.degrade_rtt_gate {
        let fps_floor = config.user_fps.saturating_sub(8).max(MIN_FPS);
        if config.image_quality > params.min_quality + 0.10 {
            config.image_quality -= 0.05;
            Verdict::Degraded
        } else if config.fps_target > fps_floor {
            config.fps_target -= 1;
            Verdict::Degraded
        } else if config.audio_quality > 0.40 {
            config.audio_quality -= 0.10;
            Verdict::Degraded
        } else {
            Verdict::Hold
        }
    } else if avg < config.tick_period().mul_f32(0.5)
        && input.dropped_frames == 0
        && rtt < params.latency_threshold.mul_f32(0.6)
    {
        let mut changed = false;
        if config.fps_target < config.user_fps {
            config.fps_target += 1;
            changed = true;
        }
        if config.image_quality < config.user_quality.min(config.quality_ceiling) {
            config.image_quality =
                (config.image_quality + 0.03).min(config.user_quality.min(config.quality_ceiling));
            changed = true;
        }
        if config.audio_quality < 0.80 {
            config.audio_quality += 0.05;
            changed = true;
        }
        if changed {
            Verdict::Rebounded
        } else {
            Verdict::Hold
        }
    } else {
        Verdict::Hold
    };

    config.clamp();
    verdict
}

/// Memory-guard track: independent cadence, independent thresholds.
/// Returns whether a degradation step fired.
pub fn memory_guard(
    config: &mut StreamConfig,
    footprint: u64,
    warnings: &mut u32,
    background: bool,
    params: &ControllerParams,
) -> bool {
    let threshold = if background {
        params.memory_warning_bytes_background
    } else {
        params.memory_warning_bytes
    };

    if footprint <= threshold {
        // Recovery decrements the counter; the main controller is the
        // one that rebounds quality.
        *warnings = warnings.saturating_sub(1);
        return false;
    }

    *warnings += 1;
    if *warnings <= params.memory_warning_limit {
        return false;
    }

    let fired = if config.image_quality > 0.20 {
        config.image_quality = (config.image_quality - 0.05).max(0.20);
        true
    } else if config.fps_target > 15 {
        config.fps_target = config.fps_target.saturating_sub(2).max(15);
        true
    } else if config.audio_quality > 0.40 {
        config.audio_quality = (config.audio_quality - 0.10).max(0.40);
        true
    } else {
        false
    };
    config.clamp();
    fired
}

/// Output-scale sub-rule, computed per capture tick rather than on the
/// controller cadence.
pub fn output_scale(
    target_frame_time: Duration,
    avg_frame_time: Option<Duration>,
    estimated_rtt: Option<Duration>,
    latency_threshold: Duration,
) -> f32 {
    let performance_ratio = match avg_frame_time {
        Some(avg) if !avg.is_zero() => target_frame_time.as_secs_f64() / avg.as_secs_f64(),
        _ => 1.0,
    };
    let latency_factor = match estimated_rtt {
        Some(rtt) if !rtt.is_zero() => {
            (latency_threshold.as_secs_f64() / rtt.as_secs_f64()).min(1.0)
        }
        _ => 1.0,
    };
    let combined = (performance_ratio + latency_factor) / 2.0;

    if combined < 0.6 {
        0.30
    } else if combined < 0.8 {
        0.40
    } else if combined > 1.3 {
        0.70
    } else {
        0.50
    }
}

/// Controller task: main evaluation every 3 s (10 s in background mode),
/// memory guard on its own fixed 3 s cadence.
pub async fn run(
    shared: Arc<Shared>,
    monitor: Arc<dyn HostMonitor>,
    params: ControllerParams,
    mut stop: watch::Receiver<bool>,
) {
    let mut last_dropped = shared.dropped_frames.load(Ordering::Relaxed);
    let mut next_eval = Instant::now() + eval_interval(&shared, &params);
    let mut next_mem = Instant::now() + params.evaluate_interval;

    loop {
        let wake_at = next_eval.min(next_mem);
        tokio::select! {
            _ = stop.changed() => break,
            _ = tokio::time::sleep_until(wake_at) => {}
        }
        let now = Instant::now();

        if now >= next_mem {
            let footprint = monitor.memory_footprint();
            let background = shared.background.load(Ordering::Relaxed);
            let mut warnings = shared.memory_warnings.load(Ordering::Relaxed);
            let fired = {
                let mut config = shared.config.lock().unwrap();
                memory_guard(&mut config, footprint, &mut warnings, background, &params)
            };
            shared.memory_warnings.store(warnings, Ordering::Relaxed);
            if fired {
                debug!("Memory guard degraded the stream (footprint={footprint})");
            }
            next_mem = now + params.evaluate_interval;
        }

        if now >= next_eval {
            let dropped_total = shared.dropped_frames.load(Ordering::Relaxed);
            let input = ControllerInput {
                avg_frame_time: shared.perf.lock().unwrap().mean(),
                dropped_frames: dropped_total.saturating_sub(last_dropped),
                estimated_rtt: shared.rtt.lock().unwrap().mean(),
            };
            last_dropped = dropped_total;

            let verdict = {
                let mut config = shared.config.lock().unwrap();
                evaluate(&mut config, &input, &params)
            };
            if verdict != Verdict::Hold {
                let config = shared.config.lock().unwrap();
                debug!(
                    "Controller {verdict:?}: fps={} quality={:.2} audio={:.2}",
                    config.fps_target, config.image_quality, config.audio_quality
                );
            }
            next_eval = now + eval_interval(&shared, &params);
        }
    }
}

fn eval_interval(shared: &Shared, params: &ControllerParams) -> Duration {
    if shared.background.load(Ordering::Relaxed) {
        params.background_interval
    } else {
        params.evaluate_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::mode::UserMode;

    fn stress(config: &StreamConfig) -> ControllerInput {
        ControllerInput {
            avg_frame_time: Some(config.max_frame_time * 2),
            dropped_frames: 0,
            estimated_rtt: Some(Duration::from_millis(80)),
        }
    }

    fn slack() -> ControllerInput {
        ControllerInput {
            avg_frame_time: Some(Duration::from_millis(1)),
            dropped_frames: 0,
            estimated_rtt: Some(Duration::from_millis(5)),
        }
    }

    #[test]
    fn test_degrades_within_ten_evaluations() {
        let params = ControllerParams::default();
        let mut config = StreamConfig::from_mode(UserMode::Balanced);

        let mut converged_at = None;
        for i in 1..=10 {
            let input = stress(&config);
            evaluate(&mut config, &input, &params);
            let fps_floor = config.user_fps.saturating_sub(8).max(MIN_FPS);
            if config.image_quality <= params.min_quality + 0.10 + 1e-6
                || config.fps_target <= fps_floor
            {
                converged_at = Some(i);
                break;
            }
        }
        assert!(converged_at.is_some(), "no convergence: {config:?}");
    }

    #[test]
    fn test_rebounds_to_setpoint_after_stress() {
        let params = ControllerParams::default();
        let mut config = StreamConfig::from_mode(UserMode::Balanced);

        for _ in 0..10 {
            let input = stress(&config);
            evaluate(&mut config, &input, &params);
        }
        assert!(config.image_quality < config.user_quality);

        for _ in 0..30 {
            evaluate(&mut config, &slack(), &params);
        }
        assert!((config.fps_target as i64 - config.user_fps as i64).abs() <= 1);
        assert!((config.image_quality - config.user_quality).abs() <= 0.03 + 1e-6);
    }

    #[test]
    fn test_no_degrade_on_low_latency() {
        let params = ControllerParams::default();
        let mut config = StreamConfig::from_mode(UserMode::Balanced);
        let before = config.clone();

        // Overloaded but the link is fast: hold.
        let input = ControllerInput {
            avg_frame_time: Some(config.max_frame_time * 2),
            dropped_frames: 20,
            estimated_rtt: Some(Duration::from_millis(10)),
        };
        assert_eq!(evaluate(&mut config, &input, &params), Verdict::Hold);
        assert_eq!(config, before);
    }

    #[test]
    fn test_at_most_one_degrade_step_per_evaluation() {
        let params = ControllerParams::default();
        let mut config = StreamConfig::from_mode(UserMode::Balanced);
        let input = stress(&config);
        evaluate(&mut config, &input, &params);
        // Quality stepped down; fps and audio untouched.
        assert!((config.image_quality - 0.45).abs() < 1e-6);
        assert_eq!(config.fps_target, 30);
        assert!((config.audio_quality - 0.70).abs() < 1e-6);
    }

    #[test]
    fn test_rebound_adjusts_all_three() {
        let params = ControllerParams::default();
        let mut config = StreamConfig::from_mode(UserMode::Balanced);
        config.fps_target = 25;
        config.image_quality = 0.40;
        config.audio_quality = 0.50;

        assert_eq!(evaluate(&mut config, &slack(), &params), Verdict::Rebounded);
        assert_eq!(config.fps_target, 26);
        assert!((config.image_quality - 0.43).abs() < 1e-6);
        assert!((config.audio_quality - 0.55).abs() < 1e-6);
    }

    #[test]
    fn test_memory_guard_steps_after_limit() {
        let params = ControllerParams::default();
        let mut config = StreamConfig::from_mode(UserMode::Balanced);
        let mut warnings = 0;
        let over = params.memory_warning_bytes + 1;

        assert!(!memory_guard(&mut config, over, &mut warnings, false, &params));
        assert!(!memory_guard(&mut config, over, &mut warnings, false, &params));
        assert!(memory_guard(&mut config, over, &mut warnings, false, &params));
        assert!((config.image_quality - 0.45).abs() < 1e-6);
        assert_eq!(warnings, 3);

        // Recovery drains the counter without rebounding quality.
        assert!(!memory_guard(&mut config, 0, &mut warnings, false, &params));
        assert_eq!(warnings, 2);
        assert!((config.image_quality - 0.45).abs() < 1e-6);
    }

    #[test]
    fn test_memory_guard_background_threshold() {
        let params = ControllerParams::default();
        let mut config = StreamConfig::from_mode(UserMode::Balanced);
        let mut warnings = 0;
        let footprint = 300 * 1024 * 1024;

        // Under the main threshold, over the background one.
        assert!(!memory_guard(&mut config, footprint, &mut warnings, false, &params));
        assert_eq!(warnings, 0);
        memory_guard(&mut config, footprint, &mut warnings, true, &params);
        assert_eq!(warnings, 1);
    }

    #[test]
    fn test_output_scale_mapping() {
        let threshold = Duration::from_millis(40);
        let target = Duration::from_millis(33);

        // Fast frames, fast link.
        assert_eq!(
            output_scale(target, Some(Duration::from_millis(10)), Some(Duration::from_millis(10)), threshold),
            0.70
        );
        // Slow frames and a slow link.
        assert_eq!(
            output_scale(target, Some(Duration::from_millis(100)), Some(Duration::from_millis(200)), threshold),
            0.30
        );
        // No samples at all: neutral.
        assert_eq!(output_scale(target, None, None, threshold), 0.50);
    }
}
