//! Server Application
//!
//! Serves one capture and one playback device to a single TCP client at a
//! time.

#[cfg(target_os = "linux")]
fn main() -> anyhow::Result<()> {
    use clap::Parser;
    use std::net::SocketAddr;
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    use pcm_duplex::{
        config::ServerArgs,
        error::{AudioError, Error},
        server::{AlsaPcm, PcmDevice, ServerAudioLoop},
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // exits with usage before any socket exists when --port is missing
    let args = ServerArgs::parse();
    let format = args.format()?;
    tracing::info!("Starting server: {}, period {} frames", format, args.period_frames);

    let capture = match &args.capture_device {
        Some(name) => Some(Box::new(AlsaPcm::capture(name, &format, args.period_frames)?) as Box<dyn PcmDevice>),
        None => {
            tracing::info!("No capture device, not sending audio");
            None
        }
    };
    let playback = match &args.playback_device {
        Some(name) => Some(Box::new(AlsaPcm::playback(name, &format, args.period_frames)?) as Box<dyn PcmDevice>),
        None => {
            tracing::info!("No playback device, received audio is discarded");
            None
        }
    };

    let mut server = ServerAudioLoop::bind(SocketAddr::new(args.bind, args.port), capture, playback)?;
    match server.run() {
        Err(Error::Audio(AudioError::FatalDeviceState(state))) => {
            tracing::error!("Audio device in unrecoverable state ({}), exiting", state);
            std::process::exit(1);
        }
        other => Ok(other?),
    }
}

#[cfg(not(target_os = "linux"))]
fn main() {
    eprintln!("The server needs ALSA and only runs on Linux");
    std::process::exit(1);
}
