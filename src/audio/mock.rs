//! Scripted devices for exercising the pumps without audio hardware

use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use super::capture::CaptureSource;
use super::device::{AudioBackend, DeviceDirectory, DeviceInfo};
use super::format::AudioFormat;
use super::playback::PlaybackSink;
use crate::error::AudioError;

/// Test-side view of a [`MockCapture`]
#[derive(Clone, Default)]
pub struct CaptureProbe {
    pub pending: Arc<Mutex<VecDeque<u8>>>,
    pub drained: Arc<Mutex<usize>>,
    pub stopped: Arc<Mutex<bool>>,
}

impl CaptureProbe {
    pub fn feed(&self, data: &[u8]) {
        self.pending.lock().extend(data);
    }

    pub fn drained(&self) -> usize {
        *self.drained.lock()
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.lock()
    }
}

pub struct MockCapture {
    probe: CaptureProbe,
    format: AudioFormat,
}

impl MockCapture {
    pub fn new(format: AudioFormat) -> (Self, CaptureProbe) {
        let probe = CaptureProbe::default();
        (
            Self {
                probe: probe.clone(),
                format,
            },
            probe,
        )
    }
}

impl CaptureSource for MockCapture {
    fn bytes_ready(&self) -> usize {
        if self.probe.is_stopped() {
            return 0;
        }
        self.probe.pending.lock().len()
    }

    fn read(&mut self, out: &mut [u8]) -> usize {
        let mut pending = self.probe.pending.lock();
        let n = pending.len().min(out.len());
        for (dst, src) in out.iter_mut().zip(pending.drain(..n)) {
            *dst = src;
        }
        *self.probe.drained.lock() += n;
        n
    }

    fn format(&self) -> &AudioFormat {
        &self.format
    }

    fn stop(&mut self) {
        *self.probe.stopped.lock() = true;
    }
}

/// Test-side view of a [`MockPlayback`]
#[derive(Clone, Default)]
pub struct PlaybackProbe {
    pub writes: Arc<Mutex<Vec<Vec<u8>>>>,
    pub queued: Arc<Mutex<usize>>,
    pub stopped: Arc<Mutex<bool>>,
}

impl PlaybackProbe {
    pub fn write_lengths(&self) -> Vec<usize> {
        self.writes.lock().iter().map(|w| w.len()).collect()
    }

    pub fn played(&self) -> Vec<u8> {
        self.writes.lock().concat()
    }

    /// Simulate the device consuming `n` queued bytes
    pub fn consume(&self, n: usize) {
        let mut queued = self.queued.lock();
        *queued = queued.saturating_sub(n);
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.lock()
    }
}

pub struct MockPlayback {
    probe: PlaybackProbe,
    format: AudioFormat,
    period_bytes: usize,
    capacity: usize,
}

impl MockPlayback {
    pub fn new(format: AudioFormat, period_frames: usize, periods: usize) -> (Self, PlaybackProbe) {
        let probe = PlaybackProbe::default();
        let period_bytes = format.period_size_bytes(period_frames);
        (
            Self {
                probe: probe.clone(),
                format,
                period_bytes,
                capacity: period_bytes * periods,
            },
            probe,
        )
    }
}

impl PlaybackSink for MockPlayback {
    fn bytes_free(&self) -> usize {
        if self.probe.is_stopped() {
            return 0;
        }
        self.capacity - *self.probe.queued.lock()
    }

    fn period_size_bytes(&self) -> usize {
        self.period_bytes
    }

    fn write(&mut self, data: &[u8]) -> Result<(), AudioError> {
        let free = self.bytes_free();
        if data.len() > free {
            return Err(AudioError::Overflow {
                requested: data.len(),
                free,
            });
        }
        *self.probe.queued.lock() += data.len();
        self.probe.writes.lock().push(data.to_vec());
        Ok(())
    }

    fn format(&self) -> &AudioFormat {
        &self.format
    }

    fn stop(&mut self) {
        *self.probe.stopped.lock() = true;
    }
}

/// Backend handing out mock devices and recording what it opened
#[derive(Clone)]
pub struct MockBackend {
    pub playback_periods: usize,
    pub unavailable: Arc<Mutex<HashSet<String>>>,
    pub captures: Arc<Mutex<Vec<(Option<String>, CaptureProbe)>>>,
    pub playbacks: Arc<Mutex<Vec<(Option<String>, PlaybackProbe)>>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            playback_periods: 4,
            unavailable: Arc::default(),
            captures: Arc::default(),
            playbacks: Arc::default(),
        }
    }

    pub fn make_unavailable(&self, id: &str) {
        self.unavailable.lock().insert(id.to_string());
    }

    pub fn last_capture(&self) -> Option<CaptureProbe> {
        self.captures.lock().last().map(|(_, p)| p.clone())
    }

    pub fn last_playback(&self) -> Option<PlaybackProbe> {
        self.playbacks.lock().last().map(|(_, p)| p.clone())
    }

    fn check(&self, device: Option<&str>) -> Result<(), AudioError> {
        match device {
            Some(id) if self.unavailable.lock().contains(id) => {
                Err(AudioError::DeviceUnavailable(id.to_string()))
            }
            _ => Ok(()),
        }
    }
}

impl DeviceDirectory for MockBackend {
    fn list_capture_devices(&self) -> Vec<DeviceInfo> {
        vec![
            DeviceInfo { id: "mic".into(), name: "Built-in Mic".into(), is_default: true },
            DeviceInfo { id: "usb".into(), name: "USB Mic".into(), is_default: false },
        ]
    }

    fn list_playback_devices(&self) -> Vec<DeviceInfo> {
        vec![
            DeviceInfo { id: "speakers".into(), name: "Speakers".into(), is_default: true },
            DeviceInfo { id: "headset".into(), name: "Headset".into(), is_default: false },
        ]
    }
}

impl AudioBackend for MockBackend {
    fn open_capture(
        &self,
        device: Option<&str>,
        format: &AudioFormat,
        _period_frames: usize,
    ) -> Result<Box<dyn CaptureSource>, AudioError> {
        self.check(device)?;
        let (capture, probe) = MockCapture::new(*format);
        self.captures.lock().push((device.map(str::to_string), probe));
        Ok(Box::new(capture))
    }

    fn open_playback(
        &self,
        device: Option<&str>,
        format: &AudioFormat,
        period_frames: usize,
    ) -> Result<Box<dyn PlaybackSink>, AudioError> {
        self.check(device)?;
        let (playback, probe) = MockPlayback::new(*format, period_frames, self.playback_periods);
        self.playbacks.lock().push((device.map(str::to_string), probe));
        Ok(Box::new(playback))
    }
}
