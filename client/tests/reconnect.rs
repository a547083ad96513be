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

//! Client behavior against a scripted server on loopback.

use std::time::Duration;

use client::{connect, ClientEvent, ConnectionError, ConnectionState, Endpoint};
use mirror_lib::models::{AudioInfoMessage, ContentListMessage, StatusMessage};
use mirror_lib::packet::Packet;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

const DEADLINE: Duration = Duration::from_secs(10);

fn status(fps: u32) -> StatusMessage {
    StatusMessage {
        fps,
        quality: 50,
        latency: 0,
        audio_enabled: true,
        audio_latency: 0,
    }
}

async fn next_event(rx: &mut mpsc::Receiver<ClientEvent>) -> Option<ClientEvent> {
    tokio::time::timeout(DEADLINE, rx.recv())
        .await
        .expect("no event before deadline")
}

#[tokio::test]
async fn test_parse_loop_emits_frames_and_acks() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();

        let mut wire = Vec::new();
        wire.extend_from_slice(
            &Packet::Frame {
                status: status(30),
                image: vec![0xAB; 700],
            }
            .encode(),
        );
        wire.extend_from_slice(
            &Packet::Audio {
                info: AudioInfoMessage::new(48000.0, 2, 128, 0.5, 0.7),
                samples: vec![0x01; 512],
            }
            .encode(),
        );
        wire.extend_from_slice(&Packet::ContentList(ContentListMessage::default()).encode());

        // Trickle the stream so every parse crosses a read boundary.
        for chunk in wire.chunks(11) {
            stream.write_all(chunk).await.unwrap();
            stream.flush().await.unwrap();
            tokio::task::yield_now().await;
        }

        // The frame must be acknowledged with a single 0x01.
        let mut ack = [0u8; 1];
        stream.read_exact(&mut ack).await.unwrap();
        assert_eq!(ack[0], 0x01);
        stream
    });

    let (conn, mut events) = connect(Endpoint::new("127.0.0.1", addr.port()));

    assert!(matches!(
        next_event(&mut events).await,
        Some(ClientEvent::StateChanged(ConnectionState::Connecting))
    ));
    assert!(matches!(
        next_event(&mut events).await,
        Some(ClientEvent::StateChanged(ConnectionState::Streaming))
    ));
    match next_event(&mut events).await {
        Some(ClientEvent::Frame { status, image }) => {
            assert_eq!(status.fps, 30);
            assert_eq!(image.len(), 700);
        }
        other => panic!("expected frame, got {other:?}"),
    }
    match next_event(&mut events).await {
        Some(ClientEvent::Audio { info, samples }) => {
            assert_eq!(info.channels, 2);
            assert_eq!(samples.len(), 512);
        }
        other => panic!("expected audio, got {other:?}"),
    }
    assert!(matches!(
        next_event(&mut events).await,
        Some(ClientEvent::ContentList(_))
    ));

    let _stream = server.await.unwrap();
    conn.cancel();
}

#[tokio::test]
async fn test_cancel_stops_event_flow() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream
            .write_all(
                &Packet::Frame {
                    status: status(30),
                    image: vec![0x11; 300],
                }
                .encode(),
            )
            .await
            .unwrap();
        stream
    });

    let (conn, mut events) = connect(Endpoint::new("127.0.0.1", addr.port()));

    loop {
        match next_event(&mut events).await {
            Some(ClientEvent::Frame { .. }) => break,
            Some(_) => continue,
            None => panic!("stream ended before first frame"),
        }
    }

    conn.cancel();
    let mut stream = server.await.unwrap();
    // The server keeps talking into the void.
    let _ = stream
        .write_all(
            &Packet::Frame {
                status: status(31),
                image: vec![0x22; 300],
            }
            .encode(),
        )
        .await;

    // The cancelled parser winds down without reconnect/failure noise.
    let remainder = tokio::time::timeout(DEADLINE, async {
        let mut drained = Vec::new();
        while let Some(event) = events.recv().await {
            drained.push(event);
        }
        drained
    })
    .await
    .expect("event channel did not close after cancel");

    for event in remainder {
        assert!(
            !matches!(event, ClientEvent::StateChanged(_) | ClientEvent::Error(_)),
            "post-cancel lifecycle event: {event:?}"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_exhaustion_fails() {
    // Nothing listens here; every dial is refused.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (_conn, mut events) = connect(Endpoint::new("127.0.0.1", addr.port()));

    let mut reconnects = 0;
    let mut saw_failure_error = false;
    loop {
        match next_event(&mut events).await {
            Some(ClientEvent::StateChanged(ConnectionState::Reconnecting { attempt })) => {
                reconnects += 1;
                assert_eq!(attempt, reconnects);
            }
            Some(ClientEvent::Error(ConnectionError::ConnectionFailed(_))) => {
                saw_failure_error = true;
            }
            Some(ClientEvent::StateChanged(ConnectionState::Failed)) => break,
            Some(_) => continue,
            None => panic!("stream ended without Failed state"),
        }
    }
    assert_eq!(reconnects, 3);
    assert!(saw_failure_error);
}
