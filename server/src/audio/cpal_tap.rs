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

//! Default-input audio tap backed by cpal. The stream callback writes
//! straight into the sample ring and never blocks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::error;

use super::{AudioFormat, AudioTap, SampleRing};
use crate::error::AudioInitError;

pub struct CpalTap {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl CpalTap {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }
}

impl Default for CpalTap {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioTap for CpalTap {
    fn name(&self) -> &'static str {
        "cpal-input"
    }

    fn start(&mut self, ring: Arc<SampleRing>) -> Result<AudioFormat, AudioInitError> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| AudioInitError("no default input device".into()))?;
        let config = device
            .default_input_config()
            .map_err(|e| AudioInitError(e.to_string()))?;
        let format = AudioFormat {
            sample_rate: config.sample_rate().0,
            channels: config.channels(),
        };
        let stream_config: cpal::StreamConfig = config.into();

        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();
        let running_for_loop = self.running.clone();

        // The cpal stream is not Send on every backend, so it lives on
        // its own thread for its whole lifetime.
        let handle = std::thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || {
                let stream = device.build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        if running.load(Ordering::Relaxed) {
                            ring.push_interleaved(data);
                        }
                    },
                    move |err| {
                        error!("Audio stream error: {err}");
                    },
                    None,
                );
                match stream {
                    Ok(stream) => {
                        if let Err(err) = stream.play() {
                            error!("Failed to start audio stream: {err}");
                            return;
                        }
                        while running_for_loop.load(Ordering::Relaxed) {
                            std::thread::sleep(Duration::from_millis(10));
                        }
                    }
                    Err(err) => error!("Failed to build audio stream: {err}"),
                }
            })
            .map_err(|e| AudioInitError(e.to_string()))?;

        self.handle = Some(handle);
        Ok(format)
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
