//! Transport counters and throughput reporting

use std::time::{Duration, Instant};

use crate::audio::level::METER_MAX;

/// Counters kept by a session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Bytes accepted by the socket
    pub bytes_sent: u64,
    /// Bytes consumed from the socket
    pub bytes_received: u64,
    /// Whole periods handed to the playback device
    pub chunks_played: u64,
    /// Bytes drained but discarded by a mute gate, both directions
    pub muted_discards: u64,
    /// Socket writes that did not take everything offered
    pub short_writes: u64,
    /// Outbound chunks dropped because the backlog was full
    pub dropped_chunks: u64,
    /// Meter (0..=10) of the last chunk sent
    pub input_level: u8,
    /// Meter (0..=10) of the last chunk played
    pub output_level: u8,
}

impl TransportStats {
    pub fn summary(&self) -> String {
        format!(
            "sent {} B, received {} B, played {} periods, muted {} B, short writes {}, dropped {} chunks, levels in {}/{} out {}/{}",
            self.bytes_sent,
            self.bytes_received,
            self.chunks_played,
            self.muted_discards,
            self.short_writes,
            self.dropped_chunks,
            self.input_level,
            METER_MAX,
            self.output_level,
            METER_MAX,
        )
    }
}

/// Turns a running byte count into one "receiving N bytes/s" line per interval
#[derive(Debug)]
pub struct RateReporter {
    interval: Duration,
    window_start: Instant,
    window_bytes: u64,
}

impl RateReporter {
    pub fn new(interval: Duration) -> Self {
        Self::starting_at(interval, Instant::now())
    }

    pub fn starting_at(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            window_start: now,
            window_bytes: 0,
        }
    }

    pub fn record(&mut self, bytes: usize) {
        self.window_bytes += bytes as u64;
    }

    /// Status line for the window that just closed, if one closed and
    /// anything arrived during it
    pub fn poll(&mut self, now: Instant) -> Option<String> {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.interval {
            return None;
        }

        let bytes = self.window_bytes;
        self.window_bytes = 0;
        self.window_start = now;
        if bytes == 0 {
            return None;
        }

        let per_second = (bytes as f64 / elapsed.as_secs_f64()).round() as u64;
        Some(format!("receiving {} bytes/s", per_second))
    }

    pub fn reset(&mut self, now: Instant) {
        self.window_start = now;
        self.window_bytes = 0;
    }
}
