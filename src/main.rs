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

use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use common::mode::UserMode;
use log::{debug, error, info, warn};
use mirror_lib::models::SettingsMessage;

use client::{ClientEvent, ConnectionState, Endpoint};
use server::{Server, ServerConfig, ServerDeps};

const EXIT_OK: i32 = 0;
const EXIT_FATAL: i32 = 1;
const EXIT_BAD_CONFIG: i32 = 2;
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Parser)]
#[command(name = "macmirror", about = "One-to-many desktop screen mirroring")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the mirroring server (the default).
    Serve(ServeArgs),
    /// Connect to a server and consume its stream.
    Client(ClientArgs),
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long, default_value_t = common::DEFAULT_PORT)]
    port: u16,
    /// performance | balanced | fidelity
    #[arg(long, default_value = "balanced")]
    mode: UserMode,
    #[arg(long)]
    no_audio: bool,
    /// Start in background mode (slower controller cadence).
    #[arg(long)]
    background: bool,
}

#[derive(Args)]
struct ClientArgs {
    /// Explicit server address; skips discovery.
    #[arg(long)]
    host: Option<String>,
    #[arg(long, default_value_t = common::DEFAULT_PORT)]
    port: u16,
    /// Request this streaming mode after connecting.
    #[arg(long)]
    mode: Option<UserMode>,
    #[arg(long)]
    no_audio: bool,
}

fn main() {
    env_logger::Builder::from_default_env()
        .filter_module("macmirror", common::default_log_level())
        .filter_module("server", common::default_log_level())
        .filter_module("client", common::default_log_level())
        .filter_module("mirror_lib", common::default_log_level())
        .init();

    let cli = Cli::parse();
    let code = common::runtime().block_on(async move {
        match cli.command.unwrap_or(Command::Serve(ServeArgs {
            port: common::DEFAULT_PORT,
            mode: UserMode::default(),
            no_audio: false,
            background: false,
        })) {
            Command::Serve(args) => serve(args).await,
            Command::Client(args) => run_client(args).await,
        }
    });
    std::process::exit(code);
}

fn audio_disabled_by_env() -> bool {
    std::env::var("DISABLE_AUDIO").map(|v| v == "1").unwrap_or(false)
}

async fn serve(args: ServeArgs) -> i32 {
    if args.port == 0 {
        error!("Port 0 is not a valid listener port");
        return EXIT_BAD_CONFIG;
    }

    let audio_enabled = !args.no_audio && !audio_disabled_by_env();
    if !audio_enabled {
        info!("Audio pipeline disabled");
    }

    let config = ServerConfig {
        port: args.port,
        mode: args.mode,
        audio_enabled,
        background: args.background,
        ..Default::default()
    };

    let server = match Server::bind(config, ServerDeps::synthetic()).await {
        Ok(server) => server,
        Err(err) => {
            error!("{err}");
            return EXIT_FATAL;
        }
    };
    info!("Serving on {}", server.local_addr());

    let handle = server.handle();
    let mut run_jh = tokio::spawn(server.run());

    tokio::select! {
        result = &mut run_jh => match result {
            Ok(Ok(())) => EXIT_OK,
            Ok(Err(err)) => {
                error!("{err}");
                EXIT_FATAL
            }
            Err(err) => {
                error!("Server task panicked: {err}");
                EXIT_FATAL
            }
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            handle.shutdown();
            let _ = run_jh.await;
            EXIT_INTERRUPTED
        }
    }
}

async fn run_client(args: ClientArgs) -> i32 {
    let endpoint = match args.host {
        Some(host) => Endpoint::new(host, args.port),
        None => {
            info!("Browsing for servers on the local network");
            match client::discover_first(Duration::from_secs(10)).await {
                Ok(candidate) => {
                    let Some(addr) = candidate.addresses.first() else {
                        error!("`{}` advertised no addresses", candidate.name);
                        return EXIT_FATAL;
                    };
                    info!("Found `{}` at {addr}", candidate.name);
                    Endpoint::new(addr.ip().to_string(), addr.port())
                }
                Err(err) => {
                    error!("{err}");
                    return EXIT_FATAL;
                }
            }
        }
    };

    let (conn, mut events) = client::connect(endpoint);

    // Push the requested settings once the stream is up.
    let initial_settings = SettingsMessage {
        streaming_mode: args.mode.map(|m| m.name().to_owned()),
        audio_enabled: if args.no_audio { Some(false) } else { None },
        ..Default::default()
    };

    let mut frames: u64 = 0;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                conn.cancel();
                return EXIT_INTERRUPTED;
            }
            event = events.recv() => {
                let Some(event) = event else { return EXIT_OK };
                match event {
                    ClientEvent::StateChanged(ConnectionState::Streaming) => {
                        info!("Streaming");
                        if initial_settings != SettingsMessage::default() {
                            conn.send_settings(initial_settings.clone());
                        }
                    }
                    ClientEvent::StateChanged(ConnectionState::Failed) => {
                        error!("Connection failed permanently");
                        return EXIT_FATAL;
                    }
                    ClientEvent::StateChanged(state) => info!("Connection state: {state:?}"),
                    ClientEvent::Frame { status, image } => {
                        frames += 1;
                        if frames % 30 == 1 {
                            info!(
                                "Frame {frames}: {} bytes, fps={} quality={}% latency={}ms",
                                image.len(),
                                status.fps,
                                status.quality,
                                status.latency
                            );
                        }
                    }
                    ClientEvent::Audio { info, samples } => {
                        debug!(
                            "Audio: {} samples at {} Hz",
                            samples.len() / 2,
                            info.sample_rate
                        );
                    }
                    ClientEvent::ContentList(list) => {
                        info!(
                            "Server offers {} windows, {} displays",
                            list.windows.len(),
                            list.displays.len()
                        );
                    }
                    ClientEvent::Error(err) => warn!("{err}"),
                }
            }
        }
    }
}
