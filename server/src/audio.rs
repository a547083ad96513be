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

//! Audio path: a producer callback fills a lossy SPSC ring at hardware
//! cadence, a periodic flush drains it into `0xFA` packets.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_queue::ArrayQueue;
use log::{debug, warn};
use mirror_lib::models::AudioInfoMessage;
use mirror_lib::packet::Packet;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::AudioInitError;
use crate::Shared;

/// Ring capacity in interleaved samples. Power of two, sized for a few
/// flush intervals of stereo 48 kHz.
pub const AUDIO_RING_SAMPLES: usize = 8192;
/// Most samples drained per flush.
pub const FLUSH_BUFFER_SAMPLES: usize = 1024;
pub const FLUSH_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Single-producer single-consumer ring of interleaved f32 samples.
/// Overwrite-on-full: audio is a loss-tolerant live stream, so the
/// oldest samples go first.
pub struct SampleRing {
    queue: ArrayQueue<f32>,
    overruns: AtomicU64,
}

impl SampleRing {
    pub fn new() -> Self {
        Self {
            queue: ArrayQueue::new(AUDIO_RING_SAMPLES),
            overruns: AtomicU64::new(0),
        }
    }

    /// Producer side; called from the capture callback, never blocks.
    pub fn push_interleaved(&self, samples: &[f32]) {
        for &sample in samples {
            if self.queue.force_push(sample).is_some() {
                self.overruns.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Consumer side; drains up to `max` samples.
    pub fn pop_chunk(&self, max: usize) -> Vec<f32> {
        let mut out = Vec::with_capacity(max.min(self.queue.len()));
        while out.len() < max {
            match self.queue.pop() {
                Some(sample) => out.push(sample),
                None => break,
            }
        }
        out
    }

    pub fn drain(&self) {
        while self.queue.pop().is_some() {}
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }
}

impl Default for SampleRing {
    fn default() -> Self {
        Self::new()
    }
}

/// A source of interleaved float samples. `start` registers the ring as
/// the producer sink and reports the source format.
pub trait AudioTap: Send + Sync {
    fn name(&self) -> &'static str;
    fn start(&mut self, ring: Arc<SampleRing>) -> Result<AudioFormat, AudioInitError>;
    fn stop(&mut self);
}

/// Primary tap plus the optional secondary path. The secondary is
/// attempted exactly once; after both fail, audio stays disabled for
/// the rest of the session.
pub struct AudioChain {
    primary: Box<dyn AudioTap>,
    secondary: Option<Box<dyn AudioTap>>,
    use_secondary: bool,
    secondary_tried: bool,
    failed: bool,
    active: bool,
}

impl AudioChain {
    pub fn new(primary: Box<dyn AudioTap>, secondary: Option<Box<dyn AudioTap>>) -> Self {
        Self {
            primary,
            secondary,
            use_secondary: false,
            secondary_tried: false,
            failed: false,
            active: false,
        }
    }

    pub fn start(&mut self, ring: Arc<SampleRing>) -> Option<AudioFormat> {
        if self.failed {
            return None;
        }

        if !self.use_secondary {
            match self.primary.start(ring.clone()) {
                Ok(format) => {
                    debug!("Audio tap `{}` running: {format:?}", self.primary.name());
                    self.active = true;
                    return Some(format);
                }
                Err(err) => warn!("Audio tap `{}` failed: {err}", self.primary.name()),
            }
        }

        match self.secondary.as_mut() {
            Some(secondary) if self.use_secondary || !self.secondary_tried => {
                self.secondary_tried = true;
                match secondary.start(ring) {
                    Ok(format) => {
                        debug!("Audio tap `{}` running: {format:?}", secondary.name());
                        self.use_secondary = true;
                        self.active = true;
                        Some(format)
                    }
                    Err(err) => {
                        warn!(
                            "Secondary audio tap `{}` failed, disabling audio: {err}",
                            secondary.name()
                        );
                        self.failed = true;
                        None
                    }
                }
            }
            _ => {
                self.failed = true;
                None
            }
        }
    }

    pub fn stop(&mut self) {
        if !self.active {
            return;
        }
        if self.use_secondary {
            if let Some(secondary) = self.secondary.as_mut() {
                secondary.stop();
            }
        } else {
            self.primary.stop();
        }
        self.active = false;
    }

    pub fn failed(&self) -> bool {
        self.failed
    }
}

/// Flush task: every 20 ms, drain up to 1024 samples, scale by the
/// current audio quality, clip to int16 and fan out.
pub async fn run_flush(
    shared: Arc<Shared>,
    ring: Arc<SampleRing>,
    format: AudioFormat,
    mut stop: watch::Receiver<bool>,
) {
    let epoch = Instant::now();
    let mut ticker = tokio::time::interval(FLUSH_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = ticker.tick() => {}
        }

        let (enabled, quality) = {
            let config = shared.config.lock().unwrap();
            (config.audio_enabled, config.audio_quality)
        };
        if !enabled {
            continue;
        }

        let chunk = ring.pop_chunk(FLUSH_BUFFER_SAMPLES);
        if chunk.is_empty() {
            continue;
        }

        let bytes = encode_chunk(&chunk, quality, format, epoch.elapsed().as_secs_f64());
        shared.connections.broadcast(Arc::new(bytes), false);
    }
    debug!("Audio flush task stopped");
}

fn encode_chunk(chunk: &[f32], quality: f32, format: AudioFormat, timestamp: f64) -> Vec<u8> {
    let mut samples = Vec::with_capacity(chunk.len() * 2);
    for &sample in chunk {
        let scaled = sample * quality * i16::MAX as f32;
        let clipped = scaled.clamp(-32767.0, 32767.0) as i16;
        samples.extend_from_slice(&clipped.to_le_bytes());
    }
    let frames = chunk.len() as u32 / u32::from(format.channels.max(1));
    let info = AudioInfoMessage::new(
        f64::from(format.sample_rate),
        u32::from(format.channels),
        frames,
        timestamp,
        quality,
    );
    Packet::Audio { info, samples }.encode()
}

/// Built-in tone source, used where no platform tap is wired in. Keeps
/// the audio path exercised end to end.
pub struct ToneTap {
    frequency: f32,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ToneTap {
    pub fn new(frequency: f32) -> Self {
        Self {
            frequency,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }
}

impl Default for ToneTap {
    fn default() -> Self {
        Self::new(440.0)
    }
}

const TONE_RATE: u32 = 48_000;
const TONE_CHANNELS: u16 = 2;

impl AudioTap for ToneTap {
    fn name(&self) -> &'static str {
        "tone"
    }

    fn start(&mut self, ring: Arc<SampleRing>) -> Result<AudioFormat, AudioInitError> {
        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();
        let frequency = self.frequency;
        let handle = std::thread::Builder::new()
            .name("audio-tone".into())
            .spawn(move || {
                let chunk_frames = TONE_RATE as usize / 100;
                let mut phase = 0.0f32;
                let step = frequency * std::f32::consts::TAU / TONE_RATE as f32;
                let mut buf = Vec::with_capacity(chunk_frames * TONE_CHANNELS as usize);
                while running.load(Ordering::Relaxed) {
                    buf.clear();
                    for _ in 0..chunk_frames {
                        let sample = phase.sin() * 0.2;
                        phase = (phase + step) % std::f32::consts::TAU;
                        for _ in 0..TONE_CHANNELS {
                            buf.push(sample);
                        }
                    }
                    ring.push_interleaved(&buf);
                    std::thread::sleep(Duration::from_millis(10));
                }
            })
            .map_err(|e| AudioInitError(e.to_string()))?;
        self.handle = Some(handle);
        Ok(AudioFormat {
            sample_rate: TONE_RATE,
            channels: TONE_CHANNELS,
        })
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(feature = "cpal-audio")]
pub mod cpal_tap;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_overwrites_oldest_when_full() {
        let ring = SampleRing::new();
        let first: Vec<f32> = (0..AUDIO_RING_SAMPLES).map(|i| i as f32).collect();
        ring.push_interleaved(&first);
        assert_eq!(ring.len(), AUDIO_RING_SAMPLES);
        assert_eq!(ring.overruns(), 0);

        ring.push_interleaved(&[-1.0, -2.0]);
        assert_eq!(ring.len(), AUDIO_RING_SAMPLES);
        assert_eq!(ring.overruns(), 2);

        // The two oldest samples are gone.
        let chunk = ring.pop_chunk(2);
        assert_eq!(chunk, vec![2.0, 3.0]);
    }

    #[test]
    fn test_pop_chunk_respects_max() {
        let ring = SampleRing::new();
        ring.push_interleaved(&[1.0, 2.0, 3.0]);
        assert_eq!(ring.pop_chunk(2), vec![1.0, 2.0]);
        assert_eq!(ring.pop_chunk(8), vec![3.0]);
        assert!(ring.pop_chunk(8).is_empty());
    }

    #[test]
    fn test_quality_scaling_and_clipping() {
        let format = AudioFormat {
            sample_rate: 48_000,
            channels: 2,
        };
        let bytes = encode_chunk(&[1.0, -4.0], 1.0, format, 0.0);
        // Skip tag + u16 info_len + u32 audio_len + info JSON.
        let info_len = u16::from_be_bytes([bytes[1], bytes[2]]) as usize;
        let body = &bytes[7 + info_len..];
        assert_eq!(i16::from_le_bytes([body[0], body[1]]), 32767);
        assert_eq!(i16::from_le_bytes([body[2], body[3]]), -32767);

        // Half quality halves the amplitude.
        let bytes = encode_chunk(&[1.0], 0.5, format, 0.0);
        let info_len = u16::from_be_bytes([bytes[1], bytes[2]]) as usize;
        let body = &bytes[7 + info_len..];
        let value = i16::from_le_bytes([body[0], body[1]]);
        assert!((value - 16383).abs() <= 1);
    }

    struct FailingTap;

    impl AudioTap for FailingTap {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn start(&mut self, _ring: Arc<SampleRing>) -> Result<AudioFormat, AudioInitError> {
            Err(AudioInitError("no device".into()))
        }
        fn stop(&mut self) {}
    }

    struct CountingTap {
        starts: Arc<AtomicU64>,
    }

    impl AudioTap for CountingTap {
        fn name(&self) -> &'static str {
            "counting"
        }
        fn start(&mut self, _ring: Arc<SampleRing>) -> Result<AudioFormat, AudioInitError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(AudioFormat {
                sample_rate: 44_100,
                channels: 2,
            })
        }
        fn stop(&mut self) {}
    }

    #[test]
    fn test_chain_falls_back_to_secondary_once() {
        let starts = Arc::new(AtomicU64::new(0));
        let mut chain = AudioChain::new(
            Box::new(FailingTap),
            Some(Box::new(CountingTap {
                starts: starts.clone(),
            })),
        );

        let ring = Arc::new(SampleRing::new());
        let format = chain.start(ring.clone()).expect("secondary should carry");
        assert_eq!(format.sample_rate, 44_100);
        chain.stop();

        // Restart goes straight to the secondary.
        assert!(chain.start(ring).is_some());
        assert_eq!(starts.load(Ordering::SeqCst), 2);
        assert!(!chain.failed());
    }

    #[test]
    fn test_chain_disables_audio_after_double_failure() {
        let mut chain = AudioChain::new(Box::new(FailingTap), Some(Box::new(FailingTap)));
        let ring = Arc::new(SampleRing::new());
        assert!(chain.start(ring.clone()).is_none());
        assert!(chain.failed());
        // Permanently off for the session.
        assert!(chain.start(ring).is_none());
    }

    #[test]
    fn test_chain_without_secondary_fails_closed() {
        let mut chain = AudioChain::new(Box::new(FailingTap), None);
        assert!(chain.start(Arc::new(SampleRing::new())).is_none());
        assert!(chain.failed());
    }
}
