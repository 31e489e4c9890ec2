//! Hardware-attached end of the stream
//!
//! One client at a time. While a client is connected each iteration reads a
//! capture period (when capture is enabled), waits on the socket for up to
//! [`SERVER_POLL_TIMEOUT`], sends the period if the socket is writable, and
//! collects received bytes until a full playback period can be written.

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use socket2::{Domain, Protocol, Socket, Type};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::fd::AsFd;

use super::pcm::{recover, PcmDevice};
use crate::constants::*;
use crate::error::{NetworkError, Result};

/// Receive size used when there is no playback device to size it
const DRAIN_CHUNK: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Listening,
    ClientConnected,
    Streaming,
    ClientDisconnected,
}

/// Counters for the current client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub periods_sent: u64,
    pub periods_played: u64,
    pub bytes_received: u64,
    pub recoveries: u64,
}

/// Why a client's stream ended
enum StreamEnd {
    PeerClosed,
    ShortSend(usize),
    SocketError(String),
}

pub struct ServerAudioLoop {
    listener: TcpListener,
    capture: Option<Box<dyn PcmDevice>>,
    playback: Option<Box<dyn PcmDevice>>,
    state: ServerState,
    stats: ServerStats,
}

impl ServerAudioLoop {
    /// Listen on `addr`. Either device may be absent, which disables that
    /// direction.
    pub fn bind(
        addr: SocketAddr,
        capture: Option<Box<dyn PcmDevice>>,
        playback: Option<Box<dyn PcmDevice>>,
    ) -> Result<Self> {
        let bind_failed = |e: io::Error| NetworkError::BindFailed(format!("{}: {}", addr, e));

        let socket =
            Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP)).map_err(bind_failed)?;
        socket.set_reuse_address(true).map_err(bind_failed)?;
        socket.bind(&addr.into()).map_err(bind_failed)?;
        socket.listen(SERVER_LISTEN_BACKLOG).map_err(bind_failed)?;
        let listener: TcpListener = socket.into();

        tracing::info!(
            "Listening on {} (capture {}, playback {})",
            listener.local_addr().unwrap_or(addr),
            capture.as_ref().map(|d| d.name()).unwrap_or("off"),
            playback.as_ref().map(|d| d.name()).unwrap_or("off"),
        );

        Ok(Self {
            listener,
            capture,
            playback,
            state: ServerState::Listening,
            stats: ServerStats::default(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    /// Serve clients one after another. Returns only on an unrecoverable
    /// device state.
    pub fn run(&mut self) -> Result<()> {
        loop {
            match self.serve_next() {
                Ok(()) => {}
                Err(crate::Error::Network(e)) => tracing::warn!("Accept failed: {}", e),
                Err(e) => return Err(e),
            }
        }
    }

    /// Accept one client and stream until it goes away
    pub fn serve_next(&mut self) -> Result<()> {
        self.state = ServerState::Listening;
        let (stream, peer) = self
            .listener
            .accept()
            .map_err(|e| NetworkError::ConnectionFailed(e.to_string()))?;

        self.state = ServerState::ClientConnected;
        self.stats = ServerStats::default();
        tracing::info!("Client connected from {}", peer);
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("TCP_NODELAY: {}", e);
        }

        let result = self.stream_client(stream);

        self.state = ServerState::ClientDisconnected;
        match &result {
            Ok(StreamEnd::PeerClosed) => tracing::info!("Client {} disconnected", peer),
            Ok(StreamEnd::ShortSend(n)) => {
                tracing::warn!("Short send to {} ({} bytes), closing connection", peer, n)
            }
            Ok(StreamEnd::SocketError(e)) => tracing::warn!("Connection to {} failed: {}", peer, e),
            Err(e) => tracing::error!("Streaming to {} stopped: {}", peer, e),
        }
        tracing::info!(
            "Sent {} periods, played {} periods, received {} bytes, {} device recoveries",
            self.stats.periods_sent,
            self.stats.periods_played,
            self.stats.bytes_received,
            self.stats.recoveries
        );
        self.state = ServerState::Listening;
        result.map(|_| ())
    }

    fn stream_client(&mut self, mut stream: TcpStream) -> Result<StreamEnd> {
        let capture_bytes = self.capture.as_ref().map(|d| d.period_bytes()).unwrap_or(0);
        let playback_bytes = self
            .playback
            .as_ref()
            .map(|d| d.period_bytes())
            .unwrap_or(DRAIN_CHUNK);
        let mut period = vec![0u8; capture_bytes];
        let mut accumulated = vec![0u8; playback_bytes];
        let mut filled = 0;
        let timeout_ms = SERVER_POLL_TIMEOUT.as_millis().min(u16::MAX as u128) as u16;

        self.state = ServerState::Streaming;
        loop {
            let mut have_period = false;
            if let Some(capture) = self.capture.as_mut() {
                match capture.read_period(&mut period) {
                    Ok(n) => have_period = n == period.len(),
                    Err(e) => {
                        tracing::warn!("Capture read failed: {}", e);
                        recover(capture.as_mut())?;
                        self.stats.recoveries += 1;
                    }
                }
            }

            let mut events = PollFlags::POLLIN;
            if have_period {
                events |= PollFlags::POLLOUT;
            }
            let revents = {
                let mut fds = [PollFd::new(stream.as_fd(), events)];
                match poll(&mut fds, PollTimeout::from(timeout_ms)) {
                    Ok(0) => continue,
                    Ok(_) => fds[0].revents().unwrap_or(PollFlags::empty()),
                    Err(Errno::EINTR) => continue,
                    Err(e) => return Ok(StreamEnd::SocketError(e.to_string())),
                }
            };

            if have_period && revents.contains(PollFlags::POLLOUT) {
                match stream.write(&period) {
                    Ok(n) if n == period.len() => self.stats.periods_sent += 1,
                    Ok(n) => return Ok(StreamEnd::ShortSend(n)),
                    Err(e) => return Ok(StreamEnd::SocketError(e.to_string())),
                }
            }

            if revents.contains(PollFlags::POLLIN) {
                match stream.read(&mut accumulated[filled..]) {
                    Ok(0) => return Ok(StreamEnd::PeerClosed),
                    Ok(n) => {
                        filled += n;
                        self.stats.bytes_received += n as u64;
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => return Ok(StreamEnd::SocketError(e.to_string())),
                }

                if filled == accumulated.len() {
                    filled = 0;
                    if let Some(playback) = self.playback.as_mut() {
                        match playback.write_period(&accumulated) {
                            Ok(()) => self.stats.periods_played += 1,
                            Err(e) => {
                                tracing::warn!("Playback write failed: {}", e);
                                recover(playback.as_mut())?;
                                self.stats.recoveries += 1;
                            }
                        }
                    }
                }
            } else if revents.intersects(PollFlags::POLLERR | PollFlags::POLLHUP | PollFlags::POLLNVAL) {
                return Ok(StreamEnd::SocketError(format!("poll reported {:?}", revents)));
            }
        }
    }
}
