//! Blocking PCM devices for the server loop

use crate::error::AudioError;

/// Hardware stream state, as reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcmState {
    Open,
    Setup,
    Prepared,
    Running,
    /// Buffer overrun (capture) or underrun (playback)
    XRun,
    Draining,
    Paused,
    Suspended,
    Disconnected,
    Other,
}

/// A hardware device read or written one period at a time. Reads and
/// writes block for at most about one period.
pub trait PcmDevice: Send {
    fn name(&self) -> &str;

    /// Frames per period after the hardware settled on a size
    fn period_frames(&self) -> usize;

    fn frame_bytes(&self) -> usize;

    fn period_bytes(&self) -> usize {
        self.period_frames() * self.frame_bytes()
    }

    /// Fill `out` with one period; returns bytes read
    fn read_period(&mut self, out: &mut [u8]) -> Result<usize, AudioError>;

    /// Write one period
    fn write_period(&mut self, data: &[u8]) -> Result<(), AudioError>;

    fn state(&self) -> PcmState;

    fn prepare(&mut self) -> Result<(), AudioError>;

    fn resume(&mut self) -> Result<(), AudioError>;
}

/// Bring a device back after a failed read or write.
///
/// XRUN and DRAINING are re-prepared. SUSPENDED is resumed, falling back to
/// a prepare when the hardware cannot resume. Any other state is fatal.
/// Returns the state that was recovered from.
pub fn recover(device: &mut dyn PcmDevice) -> Result<PcmState, AudioError> {
    let state = device.state();
    match state {
        PcmState::XRun | PcmState::Draining => {
            tracing::warn!("{}: {:?}, re-preparing", device.name(), state);
            device.prepare()?;
        }
        PcmState::Suspended => {
            tracing::warn!("{}: suspended, resuming", device.name());
            if let Err(e) = device.resume() {
                tracing::debug!("{}: resume failed ({}), preparing", device.name(), e);
                device.prepare()?;
            }
        }
        other => {
            tracing::error!("{}: unrecoverable state {:?}", device.name(), other);
            return Err(AudioError::FatalDeviceState(format!("{} is {:?}", device.name(), other)));
        }
    }
    Ok(state)
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;

    /// What the next read does
    pub enum Step {
        Data(Vec<u8>),
        /// Fail the read and report this state until prepared or resumed
        Fail(PcmState),
    }

    #[derive(Clone, Default)]
    pub struct FakeProbe {
        pub script: Arc<Mutex<VecDeque<Step>>>,
        pub writes: Arc<Mutex<Vec<Vec<u8>>>>,
        pub prepares: Arc<Mutex<usize>>,
        pub resumes: Arc<Mutex<usize>>,
    }

    pub struct FakePcm {
        probe: FakeProbe,
        period_frames: usize,
        frame_bytes: usize,
        state: PcmState,
        resumable: bool,
    }

    impl FakePcm {
        pub fn new(period_frames: usize, frame_bytes: usize) -> (Self, FakeProbe) {
            let probe = FakeProbe::default();
            (
                Self {
                    probe: probe.clone(),
                    period_frames,
                    frame_bytes,
                    state: PcmState::Running,
                    resumable: true,
                },
                probe,
            )
        }

        pub fn in_state(mut self, state: PcmState) -> Self {
            self.state = state;
            self
        }

        pub fn not_resumable(mut self) -> Self {
            self.resumable = false;
            self
        }
    }

    impl PcmDevice for FakePcm {
        fn name(&self) -> &str {
            "fake"
        }

        fn period_frames(&self) -> usize {
            self.period_frames
        }

        fn frame_bytes(&self) -> usize {
            self.frame_bytes
        }

        fn read_period(&mut self, out: &mut [u8]) -> Result<usize, AudioError> {
            match self.probe.script.lock().pop_front() {
                Some(Step::Data(data)) => {
                    out.copy_from_slice(&data);
                    Ok(out.len())
                }
                Some(Step::Fail(state)) => {
                    self.state = state;
                    Err(AudioError::Overrun)
                }
                None => {
                    // stand in for the time a real period takes
                    std::thread::sleep(Duration::from_millis(1));
                    out.fill(0);
                    Ok(out.len())
                }
            }
        }

        fn write_period(&mut self, data: &[u8]) -> Result<(), AudioError> {
            self.probe.writes.lock().push(data.to_vec());
            Ok(())
        }

        fn state(&self) -> PcmState {
            self.state
        }

        fn prepare(&mut self) -> Result<(), AudioError> {
            *self.probe.prepares.lock() += 1;
            self.state = PcmState::Prepared;
            Ok(())
        }

        fn resume(&mut self) -> Result<(), AudioError> {
            if !self.resumable {
                return Err(AudioError::Suspended);
            }
            *self.probe.resumes.lock() += 1;
            self.state = PcmState::Running;
            Ok(())
        }
    }
}
