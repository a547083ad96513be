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

use thiserror::Error;

/// What the embedding UI gets to show the user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("connection cancelled")]
    ConnectionCancelled,
    #[error("waiting to reconnect: {0}")]
    ConnectionWaiting(String),
    #[error("network unavailable")]
    NetworkUnavailable,
    #[error("no server found on the local network")]
    ServerNotFound,
    #[error("authentication failed")]
    AuthenticationFailed,
}
