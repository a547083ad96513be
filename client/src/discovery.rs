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
use std::time::Duration;

use anyhow::Result;
use log::debug;
use mdns_sd::{ServiceDaemon, ServiceEvent};
use tokio::sync::mpsc;

use crate::error::ConnectionError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub name: String,
    pub addresses: Vec<SocketAddr>,
}

/// Browse for servers. Candidates arrive on the channel as they resolve;
/// drop the daemon to stop browsing.
pub fn browse() -> Result<(ServiceDaemon, mpsc::Receiver<Candidate>)> {
    let mdns = ServiceDaemon::new()?;
    let receiver = mdns.browse(common::SERVICE_TYPE)?;
    let (tx, rx) = mpsc::channel(16);

    tokio::spawn(async move {
        while let Ok(event) = receiver.recv_async().await {
            if let ServiceEvent::ServiceResolved(info) = event {
                let port = info.get_port();
                let addresses: Vec<SocketAddr> = info
                    .get_addresses()
                    .iter()
                    .map(|addr| SocketAddr::new(*addr, port))
                    .collect();
                let mut name = info.get_fullname().to_owned();
                if let Some(stripped) = name.strip_suffix(&format!(".{}", common::SERVICE_TYPE)) {
                    name = stripped.to_owned();
                }
                debug!("Server available: {name} at {addresses:?}");
                if tx.send(Candidate { name, addresses }).await.is_err() {
                    break;
                }
            }
        }
    });

    Ok((mdns, rx))
}

/// Block (bounded) until the first server shows up on the segment.
pub async fn discover_first(timeout: Duration) -> Result<Candidate, ConnectionError> {
    let (mdns, mut rx) = browse().map_err(|err| {
        debug!("mDNS browse failed: {err}");
        ConnectionError::NetworkUnavailable
    })?;
    let found = tokio::time::timeout(timeout, rx.recv()).await;
    let _ = mdns.shutdown();
    match found {
        Ok(Some(candidate)) => Ok(candidate),
        _ => Err(ConnectionError::ServerNotFound),
    }
}
