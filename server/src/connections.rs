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

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::time::Instant;

/// Opaque process-local peer handle, minted on accept and never
/// serialized.
pub type PeerId = u64;

/// Per-peer outbound backlog bound. Exceeding it drops the current
/// packet for that peer only.
pub const SEND_HIGH_WATER: usize = 4 * 1024 * 1024;

pub struct Peer {
    pub addr: SocketAddr,
    pub created_at: Instant,
    /// When the most recent frame was queued for this peer; consumed by
    /// the next ack so every frame yields at most one RTT sample.
    last_frame_sent_at: Mutex<Option<Instant>>,
    pub send_errors: AtomicU32,
    pub frames_dropped: AtomicU64,
    queued_bytes: Arc<AtomicUsize>,
    outbound: mpsc::UnboundedSender<Arc<Vec<u8>>>,
}

/// Outcome of submitting one packet to a peer's outbound queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submit {
    Queued,
    /// Backlog above the high-water mark; packet dropped for this peer.
    Overflow,
    /// The writer task is gone; the disconnect event is on its way.
    Gone,
}

impl Peer {
    /// Queue bytes without blocking. `is_frame` marks video frames,
    /// whose send time seeds the RTT estimator.
    pub fn submit(&self, bytes: Arc<Vec<u8>>, is_frame: bool) -> Submit {
        let len = bytes.len();
        if self.queued_bytes.load(Ordering::Acquire) + len > SEND_HIGH_WATER {
            self.frames_dropped.fetch_add(1, Ordering::Relaxed);
            return Submit::Overflow;
        }
        self.queued_bytes.fetch_add(len, Ordering::AcqRel);
        if self.outbound.send(bytes).is_err() {
            self.queued_bytes.fetch_sub(len, Ordering::AcqRel);
            return Submit::Gone;
        }
        if is_frame {
            *self.last_frame_sent_at.lock().unwrap() = Some(Instant::now());
        }
        Submit::Queued
    }

    /// Consume the pending frame timestamp, if any.
    pub fn take_last_sent(&self) -> Option<Instant> {
        self.last_frame_sent_at.lock().unwrap().take()
    }

    pub fn queued_bytes(&self) -> usize {
        self.queued_bytes.load(Ordering::Acquire)
    }
}

/// The sole owner of peer handles. A handle's lifetime is bounded by its
/// entry here.
pub struct ConnectionSet {
    peers: Mutex<HashMap<PeerId, Arc<Peer>>>,
    next_id: AtomicU64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastOutcome {
    pub queued: usize,
    /// Peers whose backlog was above the high-water mark.
    pub overflow: usize,
    /// Peers whose writer task already exited.
    pub gone: usize,
}

impl ConnectionSet {
    pub fn new() -> Self {
        Self {
            peers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn add(
        &self,
        addr: SocketAddr,
        outbound: mpsc::UnboundedSender<Arc<Vec<u8>>>,
        queued_bytes: Arc<AtomicUsize>,
    ) -> (PeerId, Arc<Peer>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let peer = Arc::new(Peer {
            addr,
            created_at: Instant::now(),
            last_frame_sent_at: Mutex::new(None),
            send_errors: AtomicU32::new(0),
            frames_dropped: AtomicU64::new(0),
            queued_bytes,
            outbound,
        });
        self.peers.lock().unwrap().insert(id, peer.clone());
        (id, peer)
    }

    pub fn remove(&self, id: PeerId) -> Option<Arc<Peer>> {
        self.peers.lock().unwrap().remove(&id)
    }

    pub fn get(&self, id: PeerId) -> Option<Arc<Peer>> {
        self.peers.lock().unwrap().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.peers.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.lock().unwrap().is_empty()
    }

    /// Fan one packet out to every peer. The lock is held only to
    /// snapshot the set; submission happens outside it.
    pub fn broadcast(&self, bytes: Arc<Vec<u8>>, is_frame: bool) -> BroadcastOutcome {
        let peers: Vec<Arc<Peer>> = self.peers.lock().unwrap().values().cloned().collect();
        let mut outcome = BroadcastOutcome::default();
        for peer in peers {
            match peer.submit(bytes.clone(), is_frame) {
                Submit::Queued => outcome.queued += 1,
                Submit::Overflow => outcome.overflow += 1,
                Submit::Gone => outcome.gone += 1,
            }
        }
        outcome
    }
}

impl Default for ConnectionSet {
    fn default() -> Self {
        Self::new()
    }
}
