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

//! End-to-end scenarios against a real listener on loopback.

use std::net::SocketAddr;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;

use mirror_lib::models::{ContentRequestMessage, SettingsMessage, StatusMessage};
use mirror_lib::packet::Packet;
use mirror_lib::{read_server_packet, write_packet};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use server::status::LifecycleState;
use server::{Server, ServerConfig, ServerDeps, ServerHandle, Shared};

const DEADLINE: Duration = Duration::from_secs(10);

async fn start_server() -> (ServerHandle, SocketAddr, JoinHandle<anyhow::Result<()>>) {
    let config = ServerConfig {
        port: 0,
        advertise: false,
        ..Default::default()
    };
    let server = Server::bind(config, ServerDeps::synthetic()).await.unwrap();
    let handle = server.handle();
    let addr = SocketAddr::from(([127, 0, 0, 1], server.local_addr().port()));
    let run_jh = tokio::spawn(server.run());
    (handle, addr, run_jh)
}

async fn next_video_frame(stream: &mut TcpStream) -> (StatusMessage, Vec<u8>) {
    let fut = async {
        loop {
            match read_server_packet(stream).await.unwrap() {
                Packet::Frame { status, image } => return (status, image),
                _ => continue,
            }
        }
    };
    tokio::time::timeout(DEADLINE, fut)
        .await
        .expect("no video frame before deadline")
}

async fn wait_for_status(
    handle: &ServerHandle,
    mut predicate: impl FnMut(&server::status::StatusSnapshot) -> bool,
) {
    let fut = async {
        loop {
            if predicate(&handle.status()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    };
    tokio::time::timeout(DEADLINE, fut)
        .await
        .expect("status condition not reached before deadline");
}

#[tokio::test]
async fn test_first_peer_starts_stream_and_frames_decode() {
    let (handle, addr, run_jh) = start_server().await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let (status, image) = next_video_frame(&mut stream).await;
    assert_eq!(status.fps, 30);
    assert_eq!(status.quality, 50);
    assert_eq!(&image[..2], &[0xFF, 0xD8]);

    wait_for_status(&handle, |s| s.lifecycle == LifecycleState::Streaming).await;

    handle.shutdown();
    let _ = run_jh.await;
}

#[tokio::test]
async fn test_settings_update_changes_fps() {
    let (handle, addr, run_jh) = start_server().await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let (status, _) = next_video_frame(&mut stream).await;
    assert_eq!(status.fps, 30);

    write_packet(
        &mut stream,
        &Packet::Settings(SettingsMessage {
            streaming_mode: Some("Performance".into()),
            ..Default::default()
        }),
    )
    .await
    .unwrap();

    let fut = async {
        loop {
            let (status, _) = next_video_frame(&mut stream).await;
            if status.fps == 45 {
                return;
            }
        }
    };
    tokio::time::timeout(DEADLINE, fut)
        .await
        .expect("fps target never reached 45");

    handle.shutdown();
    let _ = run_jh.await;
}

#[tokio::test]
async fn test_malformed_settings_are_ignored() {
    let (handle, addr, run_jh) = start_server().await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    next_video_frame(&mut stream).await;

    // Unknown mode: logged and skipped, nothing changes.
    write_packet(
        &mut stream,
        &Packet::Settings(SettingsMessage {
            streaming_mode: Some("Unknown".into()),
            ..Default::default()
        }),
    )
    .await
    .unwrap();
    for _ in 0..3 {
        let (status, _) = next_video_frame(&mut stream).await;
        assert_eq!(status.fps, 30);
    }

    // The next well-formed packet is processed normally.
    write_packet(
        &mut stream,
        &Packet::Settings(SettingsMessage {
            streaming_mode: Some("Fidelity".into()),
            ..Default::default()
        }),
    )
    .await
    .unwrap();
    let fut = async {
        loop {
            let (status, _) = next_video_frame(&mut stream).await;
            if status.fps == 20 {
                return;
            }
        }
    };
    tokio::time::timeout(DEADLINE, fut)
        .await
        .expect("fps target never reached 20");

    handle.shutdown();
    let _ = run_jh.await;
}

#[tokio::test]
async fn test_windows_displays_request() {
    let (handle, addr, run_jh) = start_server().await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    write_packet(
        &mut stream,
        &Packet::ContentRequest(ContentRequestMessage::windows_displays()),
    )
    .await
    .unwrap();

    let fut = async {
        loop {
            if let Packet::ContentList(list) = read_server_packet(&mut stream).await.unwrap() {
                return list;
            }
        }
    };
    let list = tokio::time::timeout(DEADLINE, fut)
        .await
        .expect("no content list before deadline");
    assert_eq!(list.displays.len(), 1);
    assert_eq!(list.windows.len(), 1);
    assert_eq!(list.displays[0].name, "Synthetic Display");

    handle.shutdown();
    let _ = run_jh.await;
}

#[tokio::test]
async fn test_peer_drop_leaves_others_streaming() {
    let (handle, addr, run_jh) = start_server().await;

    let mut stream_a = TcpStream::connect(addr).await.unwrap();
    let stream_b = TcpStream::connect(addr).await.unwrap();
    next_video_frame(&mut stream_a).await;
    wait_for_status(&handle, |s| s.peer_count == 2).await;

    drop(stream_b);
    wait_for_status(&handle, |s| s.peer_count == 1).await;

    // Peer A keeps receiving; capture never stopped.
    for _ in 0..3 {
        next_video_frame(&mut stream_a).await;
    }
    assert_eq!(handle.status().lifecycle, LifecycleState::Streaming);

    handle.shutdown();
    let _ = run_jh.await;
}

#[tokio::test]
async fn test_last_peer_stops_capture_but_not_advertising() {
    let (handle, addr, run_jh) = start_server().await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    next_video_frame(&mut stream).await;
    drop(stream);

    wait_for_status(&handle, |s| {
        s.lifecycle == LifecycleState::Listening && s.peer_count == 0 && s.advertising
    })
    .await;

    // A returning peer brings the stream straight back.
    let mut stream = TcpStream::connect(addr).await.unwrap();
    next_video_frame(&mut stream).await;

    handle.shutdown();
    let _ = run_jh.await;
}

#[tokio::test]
async fn test_consecutive_garbage_closes_connection() {
    use tokio::io::AsyncWriteExt;

    let (handle, addr, run_jh) = start_server().await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    next_video_frame(&mut stream).await;

    // Two bytes that are neither acks nor known tags.
    stream.write_all(&[0x42, 0x43]).await.unwrap();

    wait_for_status(&handle, |s| s.peer_count == 0).await;

    handle.shutdown();
    let _ = run_jh.await;
}

#[tokio::test(start_paused = true)]
async fn test_ack_yields_exactly_one_rtt_sample() {
    let shared = Shared::new(Default::default());
    let (tx, _rx) = mpsc::unbounded_channel();
    let (id, peer) = shared.connections.add(
        "127.0.0.1:7000".parse().unwrap(),
        tx,
        Arc::new(AtomicUsize::new(0)),
    );

    peer.submit(Arc::new(vec![0u8; 512]), true);
    tokio::time::advance(Duration::from_millis(30)).await;

    let rtt = shared.record_ack(id).expect("first ack samples");
    assert_eq!(rtt, Duration::from_millis(30));
    assert_eq!(shared.estimated_rtt(), Some(Duration::from_millis(30)));

    // Second ack with no intervening frame: silently dropped.
    assert!(shared.record_ack(id).is_none());
    assert_eq!(shared.estimated_rtt(), Some(Duration::from_millis(30)));
}
