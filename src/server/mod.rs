//! Server side: blocking hardware loop serving one client at a time

#[cfg(target_os = "linux")]
pub mod alsa;
pub mod engine;
pub mod pcm;

#[cfg(target_os = "linux")]
pub use self::alsa::AlsaPcm;
pub use engine::{ServerAudioLoop, ServerState, ServerStats};
pub use pcm::{recover, PcmDevice, PcmState};
