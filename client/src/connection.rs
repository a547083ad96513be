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

//! Dial, parse loop and exponential-backoff reconnection.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use mirror_lib::models::{ContentRequestMessage, SettingsMessage};
use mirror_lib::packet::Packet;
use mirror_lib::{read_server_packet, write_packet};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};

use crate::error::ConnectionError;
use crate::{ClientEvent, ConnectionState};

pub const DIAL_TIMEOUT: Duration = Duration::from_secs(8);
pub const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Backoff before reconnect attempt `n`: min(2^n, 30) seconds.
pub fn reconnect_delay(attempt: u32) -> Duration {
    let secs = 2u64.saturating_pow(attempt).min(30);
    Duration::from_secs(secs)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

/// Owner-side handle. Cancelling (or dropping) it stops the connection
/// task; a cancelled parser emits no further events.
pub struct Connection {
    control_tx: mpsc::UnboundedSender<Packet>,
    cancel_tx: Arc<watch::Sender<bool>>,
}

impl Connection {
    pub fn send_settings(&self, settings: SettingsMessage) {
        let _ = self.control_tx.send(Packet::Settings(settings));
    }

    pub fn request_windows_displays(&self) {
        let _ = self
            .control_tx
            .send(Packet::ContentRequest(ContentRequestMessage::windows_displays()));
    }

    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.cancel_tx.send(true);
    }
}

/// Open a connection (with reconnection) to an explicit endpoint.
pub fn connect(endpoint: Endpoint) -> (Connection, mpsc::Receiver<ClientEvent>) {
    let (event_tx, event_rx) = mpsc::channel(64);
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = watch::channel(false);

    tokio::spawn(maintain(endpoint, event_tx, control_rx, cancel_rx));

    (
        Connection {
            control_tx,
            cancel_tx: Arc::new(cancel_tx),
        },
        event_rx,
    )
}

enum SessionEnd {
    Cancelled,
    Lost(String),
}

async fn maintain(
    endpoint: Endpoint,
    event_tx: mpsc::Sender<ClientEvent>,
    mut control_rx: mpsc::UnboundedReceiver<Packet>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    let mut attempt = 0u32;

    loop {
        let _ = event_tx
            .send(ClientEvent::StateChanged(ConnectionState::Connecting))
            .await;

        let dial = tokio::time::timeout(
            DIAL_TIMEOUT,
            TcpStream::connect((endpoint.host.as_str(), endpoint.port)),
        );
        let cause = tokio::select! {
            _ = cancel_rx.changed() => return,
            result = dial => match result {
                Ok(Ok(stream)) => {
                    attempt = 0;
                    let _ = event_tx
                        .send(ClientEvent::StateChanged(ConnectionState::Streaming))
                        .await;
                    match session(stream, &event_tx, &mut control_rx, &mut cancel_rx).await {
                        SessionEnd::Cancelled => return,
                        SessionEnd::Lost(cause) => cause,
                    }
                }
                Ok(Err(err)) => err.to_string(),
                Err(_) => format!("dial timed out after {DIAL_TIMEOUT:?}"),
            },
        };

        attempt += 1;
        if attempt > MAX_RECONNECT_ATTEMPTS {
            let _ = event_tx
                .send(ClientEvent::Error(ConnectionError::ConnectionFailed(cause)))
                .await;
            let _ = event_tx
                .send(ClientEvent::StateChanged(ConnectionState::Failed))
                .await;
            return;
        }

        debug!("Connection lost ({cause}), reconnect attempt {attempt}");
        let _ = event_tx
            .send(ClientEvent::Error(ConnectionError::ConnectionWaiting(
                cause,
            )))
            .await;
        let _ = event_tx
            .send(ClientEvent::StateChanged(ConnectionState::Reconnecting {
                attempt,
            }))
            .await;

        tokio::select! {
            _ = cancel_rx.changed() => return,
            _ = tokio::time::sleep(reconnect_delay(attempt)) => {}
        }
    }
}

/// One live connection: parse inbound packets, ack every video frame,
/// relay outbound control packets.
async fn session(
    mut stream: TcpStream,
    event_tx: &mpsc::Sender<ClientEvent>,
    control_rx: &mut mpsc::UnboundedReceiver<Packet>,
    cancel_rx: &mut watch::Receiver<bool>,
) -> SessionEnd {
    if let Err(err) = stream.set_nodelay(true) {
        debug!("set_nodelay failed: {err}");
    }
    let (mut read_half, mut write_half) = stream.split();
    let mut consecutive_bad = 0u32;

    loop {
        tokio::select! {
            _ = cancel_rx.changed() => return SessionEnd::Cancelled,
            outbound = control_rx.recv() => {
                let Some(packet) = outbound else { return SessionEnd::Cancelled };
                if let Err(err) = write_packet(&mut write_half, &packet).await {
                    return SessionEnd::Lost(err.to_string());
                }
            }
            result = read_server_packet(&mut read_half) => match result {
                Ok(packet) => {
                    consecutive_bad = 0;
                    match packet {
                        Packet::Frame { status, image } => {
                            // Each observed frame is acknowledged; the
                            // server turns it into one RTT sample.
                            if let Err(err) = write_packet(&mut write_half, &Packet::Ack).await {
                                return SessionEnd::Lost(err.to_string());
                            }
                            let _ = event_tx.send(ClientEvent::Frame { status, image }).await;
                        }
                        Packet::Audio { info, samples } => {
                            let _ = event_tx.send(ClientEvent::Audio { info, samples }).await;
                        }
                        Packet::ContentList(list) => {
                            let _ = event_tx.send(ClientEvent::ContentList(list)).await;
                        }
                        other => warn!("Unexpected client-bound packet: {other:?}"),
                    }
                }
                Err(err) if err.is_recoverable() => {
                    warn!("Discarding malformed packet: {err}");
                    consecutive_bad += 1;
                    if consecutive_bad >= 2 {
                        return SessionEnd::Lost("stream structurally unrecoverable".into());
                    }
                }
                Err(err) => return SessionEnd::Lost(err.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_schedule() {
        assert_eq!(reconnect_delay(1), Duration::from_secs(2));
        assert_eq!(reconnect_delay(2), Duration::from_secs(4));
        assert_eq!(reconnect_delay(3), Duration::from_secs(8));
        // Capped, would attempts ever go further.
        assert_eq!(reconnect_delay(10), Duration::from_secs(30));
    }
}
