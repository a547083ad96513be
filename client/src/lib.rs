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

use mirror_lib::models::{AudioInfoMessage, ContentListMessage, StatusMessage};

pub mod connection;
pub mod discovery;
pub mod error;

pub use connection::{connect, Connection, Endpoint};
pub use discovery::{browse, discover_first, Candidate};
pub use error::ConnectionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Discovering,
    Connecting,
    Streaming,
    Reconnecting { attempt: u32 },
    Failed,
}

/// Everything the parse loop and reconnector surface to the embedding
/// application.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    StateChanged(ConnectionState),
    Frame {
        status: StatusMessage,
        image: Vec<u8>,
    },
    Audio {
        info: AudioInfoMessage,
        samples: Vec<u8>,
    },
    ContentList(ContentListMessage),
    Error(ConnectionError),
}
