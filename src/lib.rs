//! # PCM Duplex
//!
//! Full-duplex raw PCM audio between two endpoints over one TCP connection.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────── CLIENT ─────────────────────────────┐
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────┐   ┌────────────────────────┐   │
//! │  │ CaptureSource│──▶│ MuteGate │──▶│                        │   │
//! │  │ (cpal / file)│   │  (input) │   │   TransportSession     │   │
//! │  └──────────────┘   └──────────┘   │  outbound pump ──────┐ │   │
//! │                                    │                      │ │   │
//! │  ┌──────────────┐   ┌──────────┐   │  inbound pump ◀────┐ │ │   │
//! │  │ PlaybackSink │◀──│ MuteGate │◀──│  (whole periods)   │ │ │   │
//! │  │   (cpal)     │   │ (output) │   └────────────────────┼─┼─┘   │
//! │  └──────────────┘   └──────────┘                        │ │     │
//! │        ▲ DeviceSwitcher swaps either handle mid-session │ │     │
//! │        │ ClientEngine: one thread, readiness dispatch   │ │     │
//! └─────────────────────────────────────────────────────────┼─┼─────┘
//!                        raw headerless PCM, both ways      │ │ TCP
//! ┌─────────────────────────────────────────────────────────┼─┼─────┐
//! │                     ServerAudioLoop                     │ ▼     │
//! │   capture PCM ── read one period ──▶ poll(1s) ──▶ send one period│
//! │   playback PCM ◀── write on full period ◀── accumulate ◀── recv │
//! │   XRUN / DRAINING ─▶ re-prepare, keep streaming                 │
//! └──────────────────────────── SERVER ─────────────────────────────┘
//! ```
//!
//! Nothing on the wire describes the audio. Both ends of each direction must
//! be configured with the same [`audio::AudioFormat`].

pub mod audio;
pub mod config;
pub mod error;
pub mod log;
#[cfg(unix)]
pub mod server;
pub mod session;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    use std::time::Duration;

    /// Default sample rate for both endpoints
    pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

    /// Default channel count (stereo)
    pub const DEFAULT_CHANNELS: u16 = 2;

    /// Default sample size in bits
    pub const DEFAULT_SAMPLE_SIZE: u16 = 16;

    /// Period the client asks its devices for
    pub const DEFAULT_CLIENT_PERIOD_FRAMES: u32 = 512;

    /// Capture period of the hardware peer
    pub const DEFAULT_SERVER_PERIOD_FRAMES: usize = 128;

    /// Default TCP port
    pub const DEFAULT_PORT: u16 = 5000;

    /// Default server address in the client configuration
    pub const DEFAULT_SERVER_HOST: &str = "192.168.10.10";

    /// Client configuration file name
    pub const CLIENT_CONFIG_FILE: &str = "client.toml";

    /// Longest the engine sleeps without a readiness event
    pub const ENGINE_TICK: Duration = Duration::from_millis(5);

    /// Give up on a connect attempt after this long
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Outbound bytes kept after short socket writes before chunks are dropped
    pub const MAX_OUTBOUND_BACKLOG: usize = 256 * 1024;

    /// Bound on the server's socket multiplex wait
    pub const SERVER_POLL_TIMEOUT: Duration = Duration::from_secs(1);

    /// Pending connections the server's listen queue holds
    pub const SERVER_LISTEN_BACKLOG: i32 = 2;

    /// Interval between throughput status lines
    pub const RATE_REPORT_INTERVAL: Duration = Duration::from_secs(1);
}
