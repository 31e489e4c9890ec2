//! Client transport session
//!
//! A session owns one connection and the two device handles that feed it.
//! Two independent pumps move bytes:
//!
//! - outbound: capture device -> input gate -> socket
//! - inbound: socket -> output gate -> playback device, whole periods only
//!
//! Devices are opened before the socket and released after it, so a session
//! never streams into a half-built pipeline.

use bytes::{Buf, BytesMut};
use std::io;
use std::sync::Arc;
use std::time::Instant;

use super::mute::MuteGate;
use super::stats::{RateReporter, TransportStats};
use super::wire::{ConnectProgress, PendingConnect, Wire};
use crate::audio::level::{apply_gain, meter, Gain};
use crate::audio::{AudioBackend, CaptureSource, Direction, PcmRecorder, PlaybackSink};
use crate::config::ClientConfig;
use crate::constants::*;
use crate::error::{Error, NetworkError, Result};
use crate::log::{status, LogSink};

/// Connection lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// One client connection and the devices streaming over it
pub struct TransportSession {
    backend: Box<dyn AudioBackend>,
    settings: ClientConfig,
    log: Arc<dyn LogSink>,

    state: ConnectionState,
    wire: Option<Box<dyn Wire>>,
    pending: Option<PendingConnect>,
    capture: Option<Box<dyn CaptureSource>>,
    playback: Option<Box<dyn PlaybackSink>>,
    recorder: Option<PcmRecorder>,

    input_mute: MuteGate,
    output_mute: MuteGate,
    gain: Gain,

    capture_buf: Vec<u8>,
    chunk_buf: Vec<u8>,
    backlog: BytesMut,
    degraded: bool,

    stats: TransportStats,
    rate: RateReporter,
}

impl TransportSession {
    pub fn new(backend: Box<dyn AudioBackend>, settings: ClientConfig, log: Arc<dyn LogSink>) -> Self {
        let gain = Gain::from_percent(settings.input_gain_percent);
        Self {
            backend,
            settings,
            log,
            state: ConnectionState::Disconnected,
            wire: None,
            pending: None,
            capture: None,
            playback: None,
            recorder: None,
            input_mute: MuteGate::default(),
            output_mute: MuteGate::default(),
            gain,
            capture_buf: Vec::new(),
            chunk_buf: Vec::new(),
            backlog: BytesMut::new(),
            degraded: false,
            stats: TransportStats::default(),
            rate: RateReporter::new(RATE_REPORT_INTERVAL),
        }
    }

    /// Open both devices, then start a non-blocking connect to `host:port`.
    /// An existing connection is closed first.
    pub fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        self.disconnect();
        let result = self.open_devices().and_then(|_| {
            status(&*self.log, format!("connecting to {}:{}", host, port));
            Ok(PendingConnect::start(host, port, CONNECT_TIMEOUT)?)
        });

        match result {
            Ok(ConnectProgress::Connected(wire)) => {
                self.install_wire(Box::new(wire), format!("{}:{}", host, port));
                Ok(())
            }
            Ok(ConnectProgress::Pending(pending)) => {
                self.pending = Some(pending);
                self.state = ConnectionState::Connecting;
                Ok(())
            }
            Err(e) => {
                status(&*self.log, format!("connect failed: {}", e));
                self.release();
                Err(e)
            }
        }
    }

    /// Open both devices and stream over an already connected `wire`
    pub fn connect_with(&mut self, wire: Box<dyn Wire>) -> Result<()> {
        self.disconnect();
        if let Err(e) = self.open_devices() {
            status(&*self.log, format!("connect failed: {}", e));
            self.release();
            return Err(e);
        }
        self.install_wire(wire, "peer".to_string());
        Ok(())
    }

    /// Close the socket, then release the devices. Does nothing when already
    /// disconnected.
    pub fn disconnect(&mut self) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        self.release();
        status(&*self.log, "disconnected");
    }

    /// Run whatever is due: finish a pending connect, or run both pumps.
    /// While connecting, capture is drained and discarded.
    /// Errors that end the session have already torn it down when returned.
    pub fn service(&mut self) -> Result<()> {
        let result = match self.state {
            ConnectionState::Disconnected => Ok(()),
            ConnectionState::Connecting => self.pump_outbound().and_then(|_| self.advance_connect()),
            ConnectionState::Connected => {
                let result = self.pump_outbound().and_then(|_| self.pump_inbound()).map(|_| ());
                if let Some(line) = self.rate.poll(Instant::now()) {
                    status(&*self.log, line);
                }
                result
            }
        };

        if let Err(e) = &result {
            if e.ends_session() {
                status(&*self.log, format!("session ended: {}", e));
                self.release();
            } else {
                tracing::warn!("Session fault: {}", e);
                status(&*self.log, e.to_string());
            }
        }
        result
    }

    /// Drain the capture device and forward the bytes unless the input is
    /// muted. Returns the number of bytes drained.
    pub fn pump_outbound(&mut self) -> Result<usize> {
        self.flush_backlog()?;

        let Some(capture) = self.capture.as_mut() else {
            return Ok(0);
        };
        let format = *capture.format();
        let ready = format.whole_frames(capture.bytes_ready());
        if ready == 0 {
            return Ok(0);
        }

        let mut buf = std::mem::take(&mut self.capture_buf);
        buf.resize(ready, 0);
        let n = capture.read(&mut buf[..ready]);
        let chunk = &mut buf[..n];
        apply_gain(&format, chunk, self.gain);
        self.stats.input_level = meter(&format, chunk);

        let connected = self.state == ConnectionState::Connected && self.wire.is_some();
        let result = match self.input_mute.pass(chunk) {
            Some(data) if connected => self.send(data),
            Some(_) => Ok(()),
            None => {
                self.stats.muted_discards += n as u64;
                Ok(())
            }
        };
        self.capture_buf = buf;
        result.map(|_| n)
    }

    /// Move whole periods from the socket to the playback device, as many as
    /// the device can take without blocking. A partial period stays on the
    /// socket until the rest of it arrives, unless the peer has hung up and
    /// it never can. Returns the periods consumed.
    pub fn pump_inbound(&mut self) -> Result<usize> {
        if self.state != ConnectionState::Connected {
            return Ok(0);
        }
        let (Some(wire), Some(playback)) = (self.wire.as_mut(), self.playback.as_mut()) else {
            return Ok(0);
        };
        let period = playback.period_size_bytes();
        if period == 0 {
            return Ok(0);
        }
        let format = *playback.format();

        let mut chunks = playback.bytes_free() / period;
        self.chunk_buf.resize(period, 0);
        let mut consumed = 0;

        while chunks > 0 {
            match wire.peek(&mut self.chunk_buf) {
                Ok(0) => return Err(NetworkError::Closed.into()),
                Ok(n) if n < period => {
                    if wire.peer_closed() {
                        tracing::debug!("Dropping {} byte tail after peer closed", n);
                        return Err(NetworkError::Closed.into());
                    }
                    break;
                }
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(NetworkError::ReceiveFailed(e.to_string()).into()),
            }
            wire.consume(&mut self.chunk_buf)
                .map_err(|e| NetworkError::ReceiveFailed(e.to_string()))?;
            self.stats.bytes_received += period as u64;
            self.rate.record(period);

            match self.output_mute.pass(&self.chunk_buf) {
                Some(data) => {
                    playback.write(data)?;
                    self.stats.chunks_played += 1;
                    self.stats.output_level = meter(&format, data);

                    let failed = match self.recorder.as_mut() {
                        Some(recorder) => recorder.write(data).err(),
                        None => None,
                    };
                    if let Some(e) = failed {
                        tracing::warn!("Recording failed: {}", e);
                        status(&*self.log, format!("recording stopped: {}", e));
                        self.recorder = None;
                    }
                }
                None => self.stats.muted_discards += period as u64,
            }

            consumed += 1;
            chunks -= 1;
        }

        Ok(consumed)
    }

    /// Flip the mute gate of `direction`; returns the label now offered to
    /// the operator
    pub fn toggle_mute(&mut self, direction: Direction) -> &'static str {
        let gate = self.gate_mut(direction);
        let label = gate.toggle();
        let muted = gate.is_muted();
        status(
            &*self.log,
            format!("{} {}", direction.label(), if muted { "muted" } else { "un-muted" }),
        );
        label
    }

    pub fn set_muted(&mut self, direction: Direction, muted: bool) {
        self.gate_mut(direction).set(muted);
    }

    pub fn is_muted(&self, direction: Direction) -> bool {
        match direction {
            Direction::Input => self.input_mute.is_muted(),
            Direction::Output => self.output_mute.is_muted(),
        }
    }

    /// Outbound gain in percent, 0..=200
    pub fn set_input_gain(&mut self, percent: u32) {
        self.settings.input_gain_percent = percent.min(200);
        self.gain = Gain::from_percent(percent);
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// A socket write came up short during this connection
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }

    pub fn settings(&self) -> &ClientConfig {
        &self.settings
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    pub fn log(&self) -> &Arc<dyn LogSink> {
        &self.log
    }

    pub(crate) fn backend(&self) -> &dyn AudioBackend {
        &*self.backend
    }

    pub(crate) fn settings_mut(&mut self) -> &mut ClientConfig {
        &mut self.settings
    }

    pub(crate) fn capture_slot(&mut self) -> &mut Option<Box<dyn CaptureSource>> {
        &mut self.capture
    }

    pub(crate) fn playback_slot(&mut self) -> &mut Option<Box<dyn PlaybackSink>> {
        &mut self.playback
    }

    fn gate_mut(&mut self, direction: Direction) -> &mut MuteGate {
        match direction {
            Direction::Input => &mut self.input_mute,
            Direction::Output => &mut self.output_mute,
        }
    }

    fn open_devices(&mut self) -> Result<()> {
        let output = self.settings.output.clone();
        let input = self.settings.input.clone();
        let output_format = output.format.resolve()?;
        let input_format = input.format.resolve()?;

        let mut playback = self.backend.open_playback(
            output.device.as_deref(),
            &output_format,
            output.format.period_frames(),
        )?;
        let capture = match self.backend.open_capture(
            input.device.as_deref(),
            &input_format,
            input.format.period_frames(),
        ) {
            Ok(capture) => capture,
            Err(e) => {
                playback.stop();
                return Err(e.into());
            }
        };

        tracing::info!("Output {} ({})", output.device.as_deref().unwrap_or("default"), output_format);
        tracing::info!("Input {} ({})", input.device.as_deref().unwrap_or("default"), input_format);
        self.playback = Some(playback);
        self.capture = Some(capture);

        if let Some(path) = self.settings.recording.clone() {
            match PcmRecorder::create(&path) {
                Ok(recorder) => self.recorder = Some(recorder),
                Err(e) => {
                    tracing::warn!("Cannot record to {}: {}", path.display(), e);
                    status(&*self.log, format!("recording disabled: {}", e));
                }
            }
        }
        Ok(())
    }

    fn install_wire(&mut self, wire: Box<dyn Wire>, peer: String) {
        self.wire = Some(wire);
        self.pending = None;
        self.state = ConnectionState::Connected;
        self.degraded = false;
        self.stats = TransportStats::default();
        self.rate.reset(Instant::now());
        tracing::info!("Connected to {}", peer);
        status(&*self.log, format!("connected to {}", peer));
    }

    fn advance_connect(&mut self) -> Result<()> {
        let Some(pending) = self.pending.take() else {
            self.state = ConnectionState::Disconnected;
            return Ok(());
        };
        let addr = pending.addr();
        match pending.poll()? {
            ConnectProgress::Connected(wire) => self.install_wire(Box::new(wire), addr.to_string()),
            ConnectProgress::Pending(pending) => self.pending = Some(pending),
        }
        Ok(())
    }

    /// Socket first, then the devices, then the recording
    fn release(&mut self) {
        if let Some(mut wire) = self.wire.take() {
            wire.close();
        }
        self.pending = None;
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }
        if let Some(mut playback) = self.playback.take() {
            playback.stop();
        }
        if let Some(recorder) = self.recorder.take() {
            if let Err(e) = recorder.finish() {
                tracing::warn!("Failed to close recording: {}", e);
            }
        }
        self.backlog.clear();
        self.degraded = false;
        self.state = ConnectionState::Disconnected;
    }

    fn flush_backlog(&mut self) -> Result<()> {
        if self.backlog.is_empty() {
            return Ok(());
        }
        let Some(wire) = self.wire.as_mut() else {
            self.backlog.clear();
            return Ok(());
        };
        let n = wire.write_some(&self.backlog).map_err(send_failed)?;
        self.backlog.advance(n);
        self.stats.bytes_sent += n as u64;
        Ok(())
    }

    /// Write `data` behind any backlog. An unsent tail is kept; whole chunks
    /// that would overflow the backlog are dropped.
    fn send(&mut self, data: &[u8]) -> Result<()> {
        let Some(wire) = self.wire.as_mut() else {
            return Ok(());
        };

        if !self.backlog.is_empty() {
            if self.backlog.len() + data.len() > MAX_OUTBOUND_BACKLOG {
                self.stats.dropped_chunks += 1;
                tracing::warn!(
                    "Outbound backlog full ({} bytes), dropping {} byte chunk",
                    self.backlog.len(),
                    data.len()
                );
            } else {
                self.backlog.extend_from_slice(data);
            }
            return Ok(());
        }

        let n = wire.write_some(data).map_err(send_failed)?;
        self.stats.bytes_sent += n as u64;
        if n < data.len() {
            self.stats.short_writes += 1;
            self.backlog.extend_from_slice(&data[n..]);
            tracing::warn!("Short write: {} of {} bytes accepted", n, data.len());
            if !self.degraded {
                self.degraded = true;
                status(&*self.log, "connection degraded: socket is not keeping up");
            }
        }
        Ok(())
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        self.release();
    }
}

fn send_failed(e: io::Error) -> Error {
    NetworkError::SendFailed(e.to_string()).into()
}
