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

use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, error, info};
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::{mpsc, watch};

use crate::error::ErrorKind;
use crate::{session, Event, Shared};

/// Bind the stream listener. Per-connection socket options are applied
/// at accept time.
pub fn bind(port: u16) -> std::io::Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let socket = TcpSocket::new_v4()?;
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(128)
}

/// Accept loop. Exits (and reports `ListenerFailed`) on the first accept
/// error; the lifecycle machine owns the restart.
pub struct Dispatcher {
    listener: TcpListener,
    shared: Arc<Shared>,
    event_tx: mpsc::Sender<Event>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Dispatcher {
    pub fn new(
        listener: TcpListener,
        shared: Arc<Shared>,
        event_tx: mpsc::Sender<Event>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            listener,
            shared,
            event_tx,
            shutdown_rx,
        }
    }

    pub async fn run(mut self) {
        info!("Listening on {:?}", self.listener.local_addr());

        loop {
            tokio::select! {
                _ = self.shutdown_rx.changed() => break,
                result = self.listener.accept() => match result {
                    Ok((stream, addr)) => {
                        debug!("Accepted connection from {addr}");
                        if let Err(err) = session::spawn(
                            stream,
                            self.shared.clone(),
                            self.event_tx.clone(),
                            self.shutdown_rx.clone(),
                        )
                        .await
                        {
                            error!("Failed to start session for {addr}: {err}");
                        }
                    }
                    Err(err) => {
                        error!("Accept failed: {err}");
                        self.shared.note_error(ErrorKind::ListenerFailure);
                        let _ = self.event_tx.send(Event::ListenerFailed).await;
                        return;
                    }
                }
            }
        }

        debug!("Dispatcher stopped");
    }
}
