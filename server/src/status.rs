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

//! Read-only state surface for an embedding UI: a synchronous snapshot
//! plus a debounced change channel.

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::ErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Listening,
    Streaming,
    Restarting,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub lifecycle: LifecycleState,
    pub advertising: bool,
    pub fps_target: u32,
    pub quality_percent: u32,
    pub latency_ms: u64,
    pub peer_count: usize,
    pub memory_bytes: u64,
    pub uptime: Duration,
    pub audio_enabled: bool,
    pub dropped_frames: u64,
    pub recent_errors: Vec<ErrorKind>,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleState::Listening,
            advertising: false,
            fps_target: 0,
            quality_percent: 0,
            latency_ms: 0,
            peer_count: 0,
            memory_bytes: 0,
            uptime: Duration::ZERO,
            audio_enabled: false,
            dropped_frames: 0,
            recent_errors: Vec::new(),
        }
    }
}

const DEBOUNCE: Duration = Duration::from_millis(100);

pub struct StatusBoard {
    tx: watch::Sender<StatusSnapshot>,
    last_publish: Mutex<Option<Instant>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(StatusSnapshot::default());
        Self {
            tx,
            last_publish: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.tx.subscribe()
    }

    /// Post a snapshot unless one went out within the debounce window.
    pub fn publish(&self, snapshot: StatusSnapshot) {
        let mut last = self.last_publish.lock().unwrap();
        if let Some(at) = *last {
            if at.elapsed() < DEBOUNCE {
                return;
            }
        }
        *last = Some(Instant::now());
        self.tx.send_replace(snapshot);
    }

    pub fn latest(&self) -> StatusSnapshot {
        self.tx.borrow().clone()
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_debounce_suppresses_bursts() {
        let board = StatusBoard::new();
        let mut rx = board.subscribe();

        let mut snapshot = StatusSnapshot::default();
        snapshot.peer_count = 1;
        board.publish(snapshot.clone());
        assert_eq!(rx.borrow_and_update().peer_count, 1);

        // Within the debounce window: dropped.
        snapshot.peer_count = 2;
        board.publish(snapshot.clone());
        assert_eq!(board.latest().peer_count, 1);

        tokio::time::advance(DEBOUNCE * 2).await;
        snapshot.peer_count = 3;
        board.publish(snapshot);
        assert_eq!(rx.borrow_and_update().peer_count, 3);
    }
}
