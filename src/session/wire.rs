//! Byte transport under a session
//!
//! The pumps only need a few things from a connection: look at pending bytes
//! without taking them, take bytes already seen, write without blocking, tell
//! whether the peer has hung up, and close. [`TcpWire`] provides them over a
//! non-blocking TCP stream.

use bytes::{Buf, BytesMut};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use crate::error::NetworkError;

/// Largest single read off the socket
const READ_CHUNK: usize = 4096;

/// Non-blocking byte stream to the remote end
pub trait Wire {
    /// Copy up to `buf.len()` received bytes without consuming them.
    /// `Ok(0)` means the peer closed; `WouldBlock` means nothing is pending.
    fn peek(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Consume exactly `buf.len()` bytes previously reported by `peek`
    fn consume(&mut self, buf: &mut [u8]) -> io::Result<()>;

    /// Write as much of `data` as the connection accepts right now
    fn write_some(&mut self, data: &[u8]) -> io::Result<usize>;

    /// The peer has finished sending; whatever `peek` reports is all that
    /// will ever arrive
    fn peer_closed(&self) -> bool;

    /// Close the connection. Closing twice is harmless.
    fn close(&mut self);
}

/// [`Wire`] over a connected, non-blocking TCP stream
pub struct TcpWire {
    stream: TcpStream,
    peer: Option<SocketAddr>,
    /// Read off the socket, not yet consumed
    received: BytesMut,
    eof: bool,
    closed: bool,
}

impl TcpWire {
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        let peer = stream.peer_addr().ok();
        Ok(Self {
            stream,
            peer,
            received: BytesMut::new(),
            eof: false,
            closed: false,
        })
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Read until `want` bytes are held, the socket runs dry, or the peer
    /// hangs up
    fn fill(&mut self, want: usize) -> io::Result<()> {
        let mut scratch = [0u8; READ_CHUNK];
        while self.received.len() < want && !self.eof {
            let room = (want - self.received.len()).min(READ_CHUNK);
            match self.stream.read(&mut scratch[..room]) {
                Ok(0) => {
                    self.eof = true;
                    tracing::debug!("Peer {:?} finished sending", self.peer);
                }
                Ok(n) => self.received.extend_from_slice(&scratch[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl Wire for TcpWire {
    fn peek(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.fill(buf.len())?;
        if self.received.is_empty() {
            return if self.eof {
                Ok(0)
            } else {
                Err(io::ErrorKind::WouldBlock.into())
            };
        }
        let n = self.received.len().min(buf.len());
        buf[..n].copy_from_slice(&self.received[..n]);
        Ok(n)
    }

    fn consume(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.fill(buf.len())?;
        if self.received.len() < buf.len() {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        buf.copy_from_slice(&self.received[..buf.len()]);
        self.received.advance(buf.len());
        Ok(())
    }

    fn write_some(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut written = 0;
        while written < data.len() {
            match self.stream.write(&data[written..]) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(written)
    }

    fn peer_closed(&self) -> bool {
        self.eof
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.received.clear();
            let _ = self.stream.shutdown(Shutdown::Both);
        }
    }
}

impl Drop for TcpWire {
    fn drop(&mut self) {
        self.close();
    }
}

/// Outcome of advancing a connect attempt
pub enum ConnectProgress {
    Connected(TcpWire),
    Pending(PendingConnect),
}

/// A TCP connect that has been issued but not yet completed
pub struct PendingConnect {
    socket: Socket,
    addr: SocketAddr,
    started: Instant,
    timeout: Duration,
}

fn in_progress(e: &io::Error) -> bool {
    if e.kind() == io::ErrorKind::WouldBlock {
        return true;
    }
    #[cfg(unix)]
    {
        if e.raw_os_error() == Some(nix::errno::Errno::EINPROGRESS as i32) {
            return true;
        }
    }
    false
}

impl PendingConnect {
    /// Resolve `host` and issue a non-blocking connect
    pub fn start(host: &str, port: u16, timeout: Duration) -> Result<ConnectProgress, NetworkError> {
        let addr = (host, port)
            .to_socket_addrs()
            .map_err(|e| NetworkError::Resolve(format!("{}:{}: {}", host, port, e)))?
            .next()
            .ok_or_else(|| NetworkError::Resolve(format!("{}:{}", host, port)))?;

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| NetworkError::ConnectionFailed(e.to_string()))?;
        socket
            .set_nonblocking(true)
            .and_then(|_| socket.set_nodelay(true))
            .and_then(|_| socket.set_keepalive(true))
            .map_err(|e| NetworkError::ConnectionFailed(e.to_string()))?;

        tracing::debug!("Connecting to {}", addr);
        let pending = Self {
            socket,
            addr,
            started: Instant::now(),
            timeout,
        };

        match pending.socket.connect(&SockAddr::from(addr)) {
            Ok(()) => pending.finish(),
            Err(e) if in_progress(&e) => Ok(ConnectProgress::Pending(pending)),
            Err(e) => Err(NetworkError::ConnectionFailed(format!("{}: {}", addr, e))),
        }
    }

    /// Check whether the connect has completed, failed, or timed out
    pub fn poll(self) -> Result<ConnectProgress, NetworkError> {
        if let Some(e) = self
            .socket
            .take_error()
            .map_err(|e| NetworkError::ConnectionFailed(e.to_string()))?
        {
            return Err(NetworkError::ConnectionFailed(format!("{}: {}", self.addr, e)));
        }

        match self.socket.peer_addr() {
            Ok(_) => self.finish(),
            Err(e) if e.kind() == io::ErrorKind::NotConnected || in_progress(&e) => {
                if self.started.elapsed() >= self.timeout {
                    Err(NetworkError::ConnectTimeout)
                } else {
                    Ok(ConnectProgress::Pending(self))
                }
            }
            Err(e) => Err(NetworkError::ConnectionFailed(format!("{}: {}", self.addr, e))),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn finish(self) -> Result<ConnectProgress, NetworkError> {
        let stream: TcpStream = self.socket.into();
        let wire = TcpWire::new(stream).map_err(|e| NetworkError::ConnectionFailed(e.to_string()))?;
        Ok(ConnectProgress::Connected(wire))
    }
}

/// In-memory [`Wire`] pair; what one end writes the other end reads
#[cfg(test)]
pub struct MemoryWire {
    inbound: std::sync::Arc<parking_lot::Mutex<std::collections::VecDeque<u8>>>,
    outbound: std::sync::Arc<parking_lot::Mutex<std::collections::VecDeque<u8>>>,
    write_limit: std::sync::Arc<parking_lot::Mutex<Option<usize>>>,
    hung_up: std::sync::Arc<parking_lot::Mutex<bool>>,
    pub closed: std::sync::Arc<parking_lot::Mutex<bool>>,
}

#[cfg(test)]
impl MemoryWire {
    pub fn pair() -> (MemoryWire, MemoryWire) {
        let a_to_b = std::sync::Arc::default();
        let b_to_a = std::sync::Arc::default();
        let a = MemoryWire {
            inbound: std::sync::Arc::clone(&b_to_a),
            outbound: std::sync::Arc::clone(&a_to_b),
            write_limit: Default::default(),
            hung_up: Default::default(),
            closed: Default::default(),
        };
        let b = MemoryWire {
            inbound: a_to_b,
            outbound: b_to_a,
            write_limit: Default::default(),
            hung_up: Default::default(),
            closed: Default::default(),
        };
        (a, b)
    }

    /// A handle sharing this end's queues, for the test to inspect
    pub fn handle(&self) -> MemoryWire {
        MemoryWire {
            inbound: self.inbound.clone(),
            outbound: self.outbound.clone(),
            write_limit: self.write_limit.clone(),
            hung_up: self.hung_up.clone(),
            closed: self.closed.clone(),
        }
    }

    /// Deliver bytes as if the peer had sent them
    pub fn feed(&self, data: &[u8]) {
        self.inbound.lock().extend(data);
    }

    /// Everything this end has written so far
    pub fn sent(&self) -> Vec<u8> {
        self.outbound.lock().iter().copied().collect()
    }

    /// Accept at most `limit` more bytes in total from `write_some`
    pub fn limit_writes(&self, limit: Option<usize>) {
        *self.write_limit.lock() = limit;
    }

    /// Make the peer look closed; pending bytes can still be read
    pub fn hang_up(&self) {
        *self.hung_up.lock() = true;
    }
}

#[cfg(test)]
impl Wire for MemoryWire {
    fn peek(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let inbound = self.inbound.lock();
        if inbound.is_empty() {
            return if *self.hung_up.lock() {
                Ok(0)
            } else {
                Err(io::ErrorKind::WouldBlock.into())
            };
        }
        let n = inbound.len().min(buf.len());
        for (dst, src) in buf.iter_mut().zip(inbound.iter()) {
            *dst = *src;
        }
        Ok(n)
    }

    fn consume(&mut self, buf: &mut [u8]) -> io::Result<()> {
        let mut inbound = self.inbound.lock();
        if inbound.len() < buf.len() {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        let n = buf.len();
        for (dst, src) in buf.iter_mut().zip(inbound.drain(..n)) {
            *dst = src;
        }
        Ok(())
    }

    fn write_some(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut limit = self.write_limit.lock();
        let n = match *limit {
            Some(remaining) => {
                let n = remaining.min(data.len());
                *limit = Some(remaining - n);
                n
            }
            None => data.len(),
        };
        self.outbound.lock().extend(&data[..n]);
        Ok(n)
    }

    fn peer_closed(&self) -> bool {
        *self.hung_up.lock()
    }

    fn close(&mut self) {
        *self.closed.lock() = true;
    }
}
