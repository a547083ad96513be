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

/// Classified stream faults. Transient kinds are recorded for the status
/// surface and never propagate out of the pipeline; only lifecycle-terminal
/// failures bubble up to the server loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    CaptureUnavailable,
    CaptureTimeout,
    CaptureError,
    EncodeError,
    PeerSendError,
    PeerBacklogOverflow,
    ListenerFailure,
    MalformedPacket,
    ProtocolViolation,
    AudioInitFailure,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::CaptureUnavailable => "capture-unavailable",
            ErrorKind::CaptureTimeout => "capture-timeout",
            ErrorKind::CaptureError => "capture-error",
            ErrorKind::EncodeError => "encode-error",
            ErrorKind::PeerSendError => "peer-send-error",
            ErrorKind::PeerBacklogOverflow => "peer-backlog-overflow",
            ErrorKind::ListenerFailure => "listener-failure",
            ErrorKind::MalformedPacket => "malformed-packet",
            ErrorKind::ProtocolViolation => "protocol-violation",
            ErrorKind::AudioInitFailure => "audio-init-failure",
        };
        f.write_str(name)
    }
}

/// Failure from the injected capture primitive.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// The selected display or window no longer exists.
    #[error("capture target is gone")]
    TargetGone,
    #[error("capture backend: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
#[error("audio init failed: {0}")]
pub struct AudioInitError(pub String);
