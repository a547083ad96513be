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

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use common::mode::UserMode;
use log::{debug, error, info, warn};
use mirror_lib::models::{
    ContentListMessage, DisplayInfo, SettingsMessage, StatusMessage, WindowInfo,
};
use mirror_lib::packet::Packet;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub mod audio;
pub mod capture;
pub mod config;
pub mod connections;
pub mod controller;
pub mod discovery;
pub mod dispatcher;
pub mod encoder;
pub mod error;
pub mod fallback;
pub mod metrics;
pub mod pipeline;
pub mod session;
pub mod status;
pub mod synthetic;

use audio::{AudioChain, SampleRing, ToneTap};
use capture::{ContentEnumerator, DisplayMeta, HostMonitor, NullHostMonitor, ScreenCapture, WindowMeta};
use config::StreamConfig;
use connections::{ConnectionSet, PeerId};
use controller::ControllerParams;
use discovery::Advertiser;
use dispatcher::Dispatcher;
use encoder::{ImageEncoder, JpegCompressor};
use error::ErrorKind;
use metrics::DurationWindow;
use pipeline::PipelineDeps;
use status::{LifecycleState, StatusBoard, StatusSnapshot};
use synthetic::{StaticContent, TestPatternCapture};

const RECENT_ERRORS_CAP: usize = 16;

/// State shared between the acceptor, per-peer I/O, pipeline, audio and
/// controller tasks. Every mutex here guards a short, I/O-free critical
/// section.
pub struct Shared {
    pub config: Mutex<StreamConfig>,
    pub perf: Mutex<DurationWindow>,
    pub rtt: Mutex<DurationWindow>,
    pub connections: ConnectionSet,
    pub dropped_frames: AtomicU64,
    pub capture_busy: AtomicBool,
    pub memory_warnings: AtomicU32,
    pub background: AtomicBool,
    pub started_at: Instant,
    pub recent_errors: Mutex<VecDeque<ErrorKind>>,
}

impl Shared {
    pub fn new(config: StreamConfig) -> Self {
        Self {
            config: Mutex::new(config),
            perf: Mutex::new(metrics::perf_window()),
            rtt: Mutex::new(metrics::rtt_window()),
            connections: ConnectionSet::new(),
            dropped_frames: AtomicU64::new(0),
            capture_busy: AtomicBool::new(false),
            memory_warnings: AtomicU32::new(0),
            background: AtomicBool::new(false),
            started_at: Instant::now(),
            recent_errors: Mutex::new(VecDeque::with_capacity(RECENT_ERRORS_CAP)),
        }
    }

    pub fn note_error(&self, kind: ErrorKind) {
        let mut recent = self.recent_errors.lock().unwrap();
        if recent.len() >= RECENT_ERRORS_CAP {
            recent.pop_front();
        }
        recent.push_back(kind);
    }

    /// An ack consumes the peer's pending frame timestamp into one RTT
    /// sample; acks with no pending frame are silently dropped.
    pub fn record_ack(&self, id: PeerId) -> Option<Duration> {
        let peer = self.connections.get(id)?;
        let sent_at = peer.take_last_sent()?;
        let rtt = sent_at.elapsed();
        self.rtt.lock().unwrap().push(rtt);
        Some(rtt)
    }

    pub fn estimated_rtt(&self) -> Option<Duration> {
        self.rtt.lock().unwrap().mean()
    }

    /// The status envelope attached to every outgoing frame.
    pub fn status_message(&self) -> StatusMessage {
        let latency = self
            .estimated_rtt()
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let config = self.config.lock().unwrap();
        StatusMessage {
            fps: config.fps_target,
            quality: config.quality_percent(),
            latency,
            audio_enabled: config.audio_enabled,
            audio_latency: latency,
        }
    }
}

/// Messages into the server's event loop. I/O tasks post, the owning
/// loop consumes.
#[derive(Debug)]
pub enum Event {
    PeerConnected { id: PeerId, addr: SocketAddr },
    PeerDisconnected { id: PeerId },
    SettingsReceived { id: PeerId, settings: SettingsMessage },
    ContentRequested { id: PeerId },
    ListenerFailed,
    ListenerRebound(TcpListener),
    ListenerLost(String),
    SetBackground(bool),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub mode: UserMode,
    pub audio_enabled: bool,
    pub background: bool,
    /// mDNS advertisement; off in tests.
    pub advertise: bool,
    /// Delay before re-binding after a runtime listener failure.
    pub restart_delay: Duration,
    /// Delay between bind attempts when the listener fails to start.
    pub startup_restart_delay: Duration,
    pub max_bind_attempts: u32,
    pub controller: ControllerParams,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: common::DEFAULT_PORT,
            mode: UserMode::default(),
            audio_enabled: true,
            background: false,
            advertise: true,
            restart_delay: Duration::from_secs(5),
            startup_restart_delay: Duration::from_secs(10),
            max_bind_attempts: 3,
            controller: ControllerParams::default(),
        }
    }
}

/// The injected platform collaborators plus the audio tap chain.
pub struct ServerDeps {
    pub capture: Arc<dyn ScreenCapture>,
    pub encoder: Arc<dyn ImageEncoder>,
    pub content: Arc<dyn ContentEnumerator>,
    pub monitor: Arc<dyn HostMonitor>,
    pub audio: AudioChain,
}

impl ServerDeps {
    /// Synthetic sources for hosts without wired-in platform primitives.
    pub fn synthetic() -> Self {
        Self {
            capture: Arc::new(TestPatternCapture::new()),
            encoder: Arc::new(JpegCompressor),
            content: Arc::new(StaticContent::new()),
            monitor: Arc::new(NullHostMonitor),
            audio: AudioChain::new(Box::new(ToneTap::default()), None),
        }
    }
}

struct StreamingTasks {
    stop_tx: watch::Sender<bool>,
    pipeline_jh: JoinHandle<()>,
    audio_jh: Option<JoinHandle<()>>,
}

/// Cloneable control surface for an embedding application.
#[derive(Clone)]
pub struct ServerHandle {
    event_tx: mpsc::Sender<Event>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    status_board: Arc<StatusBoard>,
}

impl ServerHandle {
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn status(&self) -> StatusSnapshot {
        self.status_board.latest()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<StatusSnapshot> {
        self.status_board.subscribe()
    }

    pub async fn set_background(&self, background: bool) {
        let _ = self.event_tx.send(Event::SetBackground(background)).await;
    }
}

pub struct Server {
    config: ServerConfig,
    deps: PipelineDeps,
    audio: AudioChain,
    audio_ring: Arc<SampleRing>,
    shared: Arc<Shared>,
    event_tx: mpsc::Sender<Event>,
    event_rx: Option<mpsc::Receiver<Event>>,
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
    advertiser: Advertiser,
    status_board: Arc<StatusBoard>,
}

impl Server {
    /// Bind the listener (retrying per the lifecycle rules) and prepare
    /// all shared state. Nothing streams until [`Server::run`].
    pub async fn bind(config: ServerConfig, deps: ServerDeps) -> Result<Self> {
        let mut attempt = 0;
        let listener = loop {
            match dispatcher::bind(config.port) {
                Ok(listener) => break listener,
                Err(err) => {
                    attempt += 1;
                    if attempt >= config.max_bind_attempts {
                        return Err(anyhow!(
                            "listener failed to start after {attempt} attempts: {err}"
                        ));
                    }
                    warn!(
                        "Listener failed to start ({err}), retrying in {:?}",
                        config.startup_restart_delay
                    );
                    tokio::time::sleep(config.startup_restart_delay).await;
                }
            }
        };
        let local_addr = listener.local_addr()?;

        let mut stream_config = StreamConfig::from_mode(config.mode);
        stream_config.audio_enabled = config.audio_enabled;
        let shared = Arc::new(Shared::new(stream_config));
        shared
            .background
            .store(config.background, Ordering::Relaxed);

        let (event_tx, event_rx) = mpsc::channel(64);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let advertiser = Advertiser::new(config.advertise, local_addr.port());

        Ok(Self {
            deps: PipelineDeps {
                capture: deps.capture,
                encoder: deps.encoder,
                content: deps.content,
                monitor: deps.monitor,
            },
            audio: deps.audio,
            audio_ring: Arc::new(SampleRing::new()),
            shared,
            event_tx,
            event_rx: Some(event_rx),
            listener: Some(listener),
            local_addr,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
            advertiser,
            status_board: Arc::new(StatusBoard::new()),
            config,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            event_tx: self.event_tx.clone(),
            shutdown_tx: self.shutdown_tx.clone(),
            status_board: self.status_board.clone(),
        }
    }

    pub fn shared(&self) -> Arc<Shared> {
        self.shared.clone()
    }

    /// Drive the server until shutdown or a terminal listener failure.
    pub async fn run(mut self) -> Result<()> {
        let mut event_rx = self.event_rx.take().expect("run called twice");
        let mut shutdown_rx = self.shutdown_rx.clone();
        let mut lifecycle = LifecycleState::Listening;

        self.advertiser.publish(self.config.background);

        let controller_jh = tokio::spawn(controller::run(
            self.shared.clone(),
            self.deps.monitor.clone(),
            self.config.controller.clone(),
            self.shutdown_rx.clone(),
        ));

        let listener = self.listener.take().expect("listener consumed");
        let mut dispatcher_jh = self.spawn_dispatcher(listener);

        let mut streaming: Option<StreamingTasks> = None;
        let mut status_tick = tokio::time::interval(Duration::from_secs(1));

        let result = loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break Ok(()),
                _ = status_tick.tick() => self.publish_status(lifecycle),
                event = event_rx.recv() => {
                    let Some(event) = event else { break Ok(()) };
                    match event {
                        Event::PeerConnected { id, addr } => {
                            info!("Peer {id} connected from {addr}");
                            if streaming.is_none() {
                                streaming = Some(self.start_streaming());
                                lifecycle = LifecycleState::Streaming;
                            }
                            self.publish_status(lifecycle);
                        }
                        Event::PeerDisconnected { id } => {
                            if self.shared.connections.remove(id).is_some() {
                                info!("Peer {id} disconnected");
                            }
                            if self.shared.connections.is_empty() {
                                if let Some(tasks) = streaming.take() {
                                    self.stop_streaming(tasks).await;
                                }
                                if lifecycle == LifecycleState::Streaming {
                                    lifecycle = LifecycleState::Listening;
                                }
                            }
                            self.publish_status(lifecycle);
                        }
                        Event::SettingsReceived { id, settings } => {
                            debug!("id={id} Settings update: {settings:?}");
                            self.apply_settings(&settings).await;
                        }
                        Event::ContentRequested { id } => {
                            let message = self.content_list().await;
                            if let Some(peer) = self.shared.connections.get(id) {
                                peer.submit(
                                    Arc::new(Packet::ContentList(message).encode()),
                                    false,
                                );
                            }
                        }
                        Event::ListenerFailed => {
                            error!("Listener failed, restarting");
                            // Make sure the old acceptor releases the port
                            // before the rebind timer fires.
                            dispatcher_jh.abort();
                            lifecycle = LifecycleState::Restarting;
                            self.advertiser.withdraw();
                            self.publish_status(lifecycle);
                            self.spawn_rebind();
                        }
                        Event::ListenerRebound(listener) => {
                            info!("Listener restarted");
                            dispatcher_jh = self.spawn_dispatcher(listener);
                            let background = self.shared.background.load(Ordering::Relaxed);
                            self.advertiser.publish(background);
                            lifecycle = if self.shared.connections.is_empty() {
                                LifecycleState::Listening
                            } else {
                                LifecycleState::Streaming
                            };
                            self.publish_status(lifecycle);
                        }
                        Event::ListenerLost(err) => {
                            break Err(anyhow!("listener failed permanently: {err}"));
                        }
                        Event::SetBackground(background) => {
                            self.shared.background.store(background, Ordering::Relaxed);
                            self.advertiser.publish(background);
                        }
                    }
                }
            }
        };

        let _ = self.shutdown_tx.send(true);
        if let Some(tasks) = streaming.take() {
            self.stop_streaming(tasks).await;
        }
        let _ = tokio::time::timeout(Duration::from_secs(5), &mut dispatcher_jh).await;
        let _ = tokio::time::timeout(Duration::from_secs(5), controller_jh).await;
        std::mem::replace(&mut self.advertiser, Advertiser::new(false, 0)).shutdown();
        result
    }

    fn spawn_dispatcher(&self, listener: TcpListener) -> JoinHandle<()> {
        tokio::spawn(
            Dispatcher::new(
                listener,
                self.shared.clone(),
                self.event_tx.clone(),
                self.shutdown_rx.clone(),
            )
            .run(),
        )
    }

    fn spawn_rebind(&self) {
        let event_tx = self.event_tx.clone();
        let port = self.local_addr.port();
        let restart_delay = self.config.restart_delay;
        let startup_delay = self.config.startup_restart_delay;
        let max_attempts = self.config.max_bind_attempts;
        tokio::spawn(async move {
            tokio::time::sleep(restart_delay).await;
            let mut attempt = 0;
            loop {
                match dispatcher::bind(port) {
                    Ok(listener) => {
                        let _ = event_tx.send(Event::ListenerRebound(listener)).await;
                        return;
                    }
                    Err(err) => {
                        attempt += 1;
                        if attempt >= max_attempts {
                            let _ = event_tx.send(Event::ListenerLost(err.to_string())).await;
                            return;
                        }
                        tokio::time::sleep(startup_delay).await;
                    }
                }
            }
        });
    }

    fn start_streaming(&mut self) -> StreamingTasks {
        let (stop_tx, stop_rx) = watch::channel(false);
        let pipeline_jh = tokio::spawn(pipeline::run(
            self.shared.clone(),
            self.deps.clone(),
            self.config.controller.clone(),
            stop_rx.clone(),
        ));

        let audio_wanted = self.shared.config.lock().unwrap().audio_enabled;
        let audio_jh = if audio_wanted && !self.audio.failed() {
            match self.audio.start(self.audio_ring.clone()) {
                Some(format) => Some(tokio::spawn(audio::run_flush(
                    self.shared.clone(),
                    self.audio_ring.clone(),
                    format,
                    stop_rx,
                ))),
                None => {
                    self.shared.note_error(ErrorKind::AudioInitFailure);
                    self.shared.config.lock().unwrap().audio_enabled = false;
                    None
                }
            }
        } else {
            None
        };

        StreamingTasks {
            stop_tx,
            pipeline_jh,
            audio_jh,
        }
    }

    async fn stop_streaming(&mut self, tasks: StreamingTasks) {
        let _ = tasks.stop_tx.send(true);
        let _ = tasks.pipeline_jh.await;
        if let Some(audio_jh) = tasks.audio_jh {
            let _ = audio_jh.await;
        }
        self.audio.stop();
        self.audio_ring.drain();
        debug!("Streaming tasks stopped, rings drained");
    }

    async fn apply_settings(&mut self, settings: &SettingsMessage) {
        let windows = self.deps.content.list_windows().await;
        let displays = self.deps.content.list_displays().await;
        let mut config = self.shared.config.lock().unwrap();
        config.apply_settings(settings, &windows, &displays);
        if self.audio.failed() {
            // Audio stays off for the session once both taps failed.
            config.audio_enabled = false;
        }
    }

    async fn content_list(&self) -> ContentListMessage {
        let windows = self.deps.content.list_windows().await;
        let displays = self.deps.content.list_displays().await;
        ContentListMessage {
            windows: windows.into_iter().map(window_info).collect(),
            displays: displays.into_iter().map(display_info).collect(),
        }
    }

    fn publish_status(&self, lifecycle: LifecycleState) {
        let (fps_target, quality_percent, audio_enabled) = {
            let config = self.shared.config.lock().unwrap();
            (
                config.fps_target,
                config.quality_percent(),
                config.audio_enabled,
            )
        };
        let snapshot = StatusSnapshot {
            lifecycle,
            advertising: self.advertiser.is_active(),
            fps_target,
            quality_percent,
            latency_ms: self
                .shared
                .estimated_rtt()
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
            peer_count: self.shared.connections.len(),
            memory_bytes: self.deps.monitor.memory_footprint(),
            uptime: self.shared.started_at.elapsed(),
            audio_enabled,
            dropped_frames: self.shared.dropped_frames.load(Ordering::Relaxed),
            recent_errors: self
                .shared
                .recent_errors
                .lock()
                .unwrap()
                .iter()
                .copied()
                .collect(),
        };
        self.status_board.publish(snapshot);
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        // Dropping the server cancels every task it spawned.
        let _ = self.shutdown_tx.send(true);
    }
}

fn window_info(meta: WindowMeta) -> WindowInfo {
    WindowInfo {
        id: meta.id,
        title: meta.title,
        owner_name: meta.owner_name,
    }
}

fn display_info(meta: DisplayMeta) -> DisplayInfo {
    DisplayInfo {
        id: meta.id,
        name: meta.name,
        width: meta.width,
        height: meta.height,
    }
}
