//! Audio subsystem module

pub mod buffer;
pub mod capture;
pub mod device;
pub mod format;
pub mod level;
pub mod playback;
pub mod recorder;

#[cfg(test)]
pub(crate) mod mock;

pub use buffer::{byte_ring, RingReader, RingWriter};
pub use capture::{CaptureSource, CpalCapture, FileCapture};
pub use device::{AudioBackend, CpalBackend, DeviceDirectory, DeviceInfo};
pub use format::{AudioFormat, ByteOrder, SampleType};
pub use playback::{CpalPlayback, PlaybackSink};
pub use recorder::PcmRecorder;

use crossbeam_channel::Sender;

/// One leg of the duplex stream, named from the local operator's side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Local capture device towards the remote end
    Input,
    /// Remote end towards the local playback device
    Output,
}

impl Direction {
    pub fn label(&self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
        }
    }
}

/// Readiness event raised from a device callback thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Captured bytes are waiting to be read
    CaptureReady,
    /// Playback buffer space was freed
    PlaybackReady,
}

/// Wakes the engine thread from a device callback. Notifications coalesce:
/// if the channel is full the engine is already due to run.
#[derive(Clone, Default)]
pub struct Notifier {
    tx: Option<Sender<Readiness>>,
}

impl Notifier {
    pub fn new(tx: Sender<Readiness>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A notifier nobody listens to
    pub fn detached() -> Self {
        Self { tx: None }
    }

    pub fn notify(&self, event: Readiness) {
        if let Some(tx) = &self.tx {
            let _ = tx.try_send(event);
        }
    }
}
