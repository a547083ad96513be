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

//! Per-peer I/O: a writer task draining the outbound queue and a reader
//! task parsing client packets.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, warn};
use mirror_lib::models::ACTION_GET_WINDOWS_DISPLAYS;
use mirror_lib::packet::Packet;
use mirror_lib::DecodeError;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};

use crate::connections::PeerId;
use crate::error::ErrorKind;
use crate::{Event, Shared};

/// Server-requested bound on how long a peer connection may sit
/// unacknowledged before the stack abandons it.
pub const PEER_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Register a freshly accepted connection and start its I/O tasks.
pub async fn spawn(
    stream: TcpStream,
    shared: Arc<Shared>,
    event_tx: mpsc::Sender<Event>,
    shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<PeerId> {
    stream.set_nodelay(true)?;
    // TCP_USER_TIMEOUT is the Linux spelling of the 2 s connect
    // timeout; elsewhere the stack default applies.
    #[cfg(target_os = "linux")]
    if let Err(err) =
        socket2::SockRef::from(&stream).set_tcp_user_timeout(Some(PEER_CONNECT_TIMEOUT))
    {
        debug!("set_tcp_user_timeout failed: {err}");
    }
    let addr = stream.peer_addr()?;
    let (read_half, write_half) = stream.into_split();

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let queued_bytes = Arc::new(AtomicUsize::new(0));
    let (id, _peer) = shared.connections.add(addr, outbound_tx, queued_bytes.clone());

    event_tx
        .send(Event::PeerConnected { id, addr })
        .await
        .map_err(|_| anyhow::anyhow!("server event loop closed"))?;

    tokio::spawn(write_loop(
        id,
        write_half,
        outbound_rx,
        queued_bytes,
        shared.clone(),
        event_tx.clone(),
        shutdown_rx.clone(),
    ));
    tokio::spawn(read_loop(id, read_half, shared, event_tx, shutdown_rx));

    Ok(id)
}

async fn write_loop(
    id: PeerId,
    mut write_half: OwnedWriteHalf,
    mut outbound_rx: mpsc::UnboundedReceiver<Arc<Vec<u8>>>,
    queued_bytes: Arc<AtomicUsize>,
    shared: Arc<Shared>,
    event_tx: mpsc::Sender<Event>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            item = outbound_rx.recv() => {
                let Some(bytes) = item else { break };
                queued_bytes.fetch_sub(bytes.len(), Ordering::AcqRel);
                if let Err(err) = write_half.write_all(&bytes).await {
                    debug!("id={id} Send failed: {err}");
                    if let Some(peer) = shared.connections.get(id) {
                        peer.send_errors.fetch_add(1, Ordering::Relaxed);
                    }
                    shared.note_error(ErrorKind::PeerSendError);
                    break;
                }
            }
        }
    }
    let _ = event_tx.send(Event::PeerDisconnected { id }).await;
}

async fn read_loop(
    id: PeerId,
    mut read_half: OwnedReadHalf,
    shared: Arc<Shared>,
    event_tx: mpsc::Sender<Event>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut consecutive_bad = 0u32;
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            result = mirror_lib::read_client_packet(&mut read_half) => match result {
                Ok(packet) => {
                    consecutive_bad = 0;
                    match packet {
                        Packet::Ack => {
                            if let Some(rtt) = shared.record_ack(id) {
                                debug!("id={id} RTT sample: {rtt:?}");
                            }
                        }
                        Packet::Settings(settings) => {
                            let _ = event_tx
                                .send(Event::SettingsReceived { id, settings })
                                .await;
                        }
                        Packet::ContentRequest(request) => {
                            if request.action == ACTION_GET_WINDOWS_DISPLAYS {
                                let _ = event_tx.send(Event::ContentRequested { id }).await;
                            } else {
                                warn!("id={id} Unknown request action `{}`", request.action);
                            }
                        }
                        other => warn!("id={id} Unexpected server-bound packet: {other:?}"),
                    }
                }
                Err(err) if err.is_recoverable() => {
                    warn!("id={id} {err}");
                    shared.note_error(match err {
                        DecodeError::Budget { .. } => ErrorKind::ProtocolViolation,
                        _ => ErrorKind::MalformedPacket,
                    });
                    consecutive_bad += 1;
                    if consecutive_bad >= 2 {
                        error!("id={id} Closing connection after consecutive protocol errors");
                        break;
                    }
                }
                Err(err) => {
                    debug!("id={id} Disconnected: {err}");
                    break;
                }
            }
        }
    }
    let _ = event_tx.send(Event::PeerDisconnected { id }).await;
}
