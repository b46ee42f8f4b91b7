//! Serial to TCP relay.
//!
//! Bridges the GPS receiver to a single TCP client. Bytes are chunked by
//! [`LineBuffer`]: each NMEA sentence goes out as soon as its `\n` arrives,
//! and anything longer than [`LINE_BUFFER_CAPACITY`] goes out in pieces.
//!
//! # Polling Model
//!
//! The relay never blocks. [`SerialRelay::poll`] checks for a pending
//! connection, then drains whatever the serial source holds, and returns.
//! The device loop calls it after servicing the provisioning page and
//! yields briefly when it reports no serial traffic.
//!
//! # Sessions
//!
//! At most one client is served. A connection that arrives while a session
//! is active is accepted and closed at once, so the client sees the refusal
//! instead of hanging in the listen backlog. Serial data that arrives while
//! no client is connected is dropped.

mod buffer;
mod source;
#[cfg(feature = "esp32")]
mod uart;

pub use buffer::{LineBuffer, LINE_BUFFER_CAPACITY, LINE_TERMINATOR};
pub use source::{ChannelSource, SerialFeed, SerialSource};
#[cfg(feature = "esp32")]
pub use uart::{UartSource, GPS_BAUD_RATE};

use log::{debug, info, warn};
use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::time::{Duration, Instant};

/// Bytes drained from the serial source per poll.
const SERIAL_READ_SIZE: usize = 256;

/// How long a client may refuse writes before it is dropped.
const WRITE_STALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Unsent bytes held for a client that is not keeping up. A client further
/// behind than this is dropped.
const MAX_PENDING_BYTES: usize = 8 * LINE_BUFFER_CAPACITY;

/// Traffic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Clients that got a session.
    pub sessions_accepted: u64,
    /// Clients turned away because a session was active.
    pub sessions_rejected: u64,
    /// Bytes handed to clients.
    pub bytes_forwarded: u64,
    /// Chunks handed to clients.
    pub chunks_forwarded: u64,
    /// Serial bytes discarded because no client was connected.
    pub bytes_dropped: u64,
}

/// The connected client.
///
/// A session exists only while its connection is open; any failure ends it.
#[derive(Debug)]
pub struct RelaySession {
    stream: TcpStream,
    peer: SocketAddr,
    /// Chunk bytes the socket has not taken yet.
    pending: Vec<u8>,
    /// When the socket last refused a write with bytes still pending.
    stalled_since: Option<Instant>,
}

impl RelaySession {
    fn open(stream: TcpStream, peer: SocketAddr) -> Self {
        // Neither hang-up checks nor writes may block the device loop
        if let Err(e) = stream.set_nonblocking(true) {
            warn!("Failed to make client socket non-blocking: {}", e);
        }

        // Disable Nagle's algorithm for lower latency
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to disable Nagle's algorithm: {}", e);
        }

        Self {
            stream,
            peer,
            pending: Vec::with_capacity(LINE_BUFFER_CAPACITY),
            stalled_since: None,
        }
    }

    /// Address of the client.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Bytes queued for the client but not yet written.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Detect a hang-up without blocking. Anything the client sends is
    /// discarded.
    fn check_alive(&mut self) -> Result<(), RelayError> {
        let mut scratch = [0u8; 64];
        loop {
            match self.stream.read(&mut scratch) {
                Ok(0) => {
                    return Err(RelayError::ConnectionLost(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "client disconnected",
                    )));
                }
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(RelayError::ConnectionLost(e)),
            }
        }
    }

    /// Queue a chunk and write as much as the socket takes right now.
    fn send_chunk(&mut self, chunk: &[u8]) -> Result<(), RelayError> {
        if self.pending.len() + chunk.len() > MAX_PENDING_BYTES {
            return Err(RelayError::ConnectionLost(io::Error::new(
                io::ErrorKind::WouldBlock,
                "client is not reading",
            )));
        }
        self.pending.extend_from_slice(chunk);
        self.flush_pending()
    }

    /// Write pending bytes until done or the socket would block.
    fn flush_pending(&mut self) -> Result<(), RelayError> {
        while !self.pending.is_empty() {
            match self.stream.write(&self.pending) {
                Ok(0) => {
                    return Err(RelayError::ConnectionLost(io::ErrorKind::WriteZero.into()));
                }
                Ok(n) => {
                    self.pending.drain(..n);
                    self.stalled_since = None;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    let since = *self.stalled_since.get_or_insert_with(Instant::now);
                    if since.elapsed() > WRITE_STALL_TIMEOUT {
                        return Err(RelayError::ConnectionLost(io::ErrorKind::TimedOut.into()));
                    }
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(RelayError::ConnectionLost(e)),
            }
        }
        Ok(())
    }

    fn close(self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

/// Serial-to-TCP bridge owning the listener and the serial source.
pub struct SerialRelay<'a, S: SerialSource> {
    listener: TcpListener,
    local_addr: SocketAddr,
    source: &'a mut S,
    session: Option<RelaySession>,
    buffer: LineBuffer,
    stats: RelayStats,
}

impl<'a, S: SerialSource> SerialRelay<'a, S> {
    /// Bind the relay listener.
    pub fn bind(addr: SocketAddr, source: &'a mut S) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(addr).map_err(RelayError::Bind)?;
        listener.set_nonblocking(true).map_err(RelayError::Bind)?;
        let local_addr = listener.local_addr().map_err(RelayError::Bind)?;

        info!("TCP relay listening on {}", local_addr);

        Ok(Self {
            listener,
            local_addr,
            source,
            session: None,
            buffer: LineBuffer::new(),
            stats: RelayStats::default(),
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Current traffic counters.
    pub fn stats(&self) -> RelayStats {
        self.stats
    }

    /// The active session, if any.
    pub fn session(&self) -> Option<&RelaySession> {
        self.session.as_ref()
    }

    /// Run one accept step and one forward step.
    ///
    /// Returns true if serial bytes were processed, false if the source was
    /// empty and the caller should yield.
    pub fn poll(&mut self) -> bool {
        self.poll_accept();
        self.poll_forward()
    }

    /// Accept pending connections without blocking.
    pub fn poll_accept(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if self.session.is_some() {
                        self.reject(stream, peer);
                        continue;
                    }
                    info!("Client connected: {}", peer);
                    // Whatever arrived before the client belongs to nobody
                    self.discard_backlog();
                    self.buffer.clear();
                    self.session = Some(RelaySession::open(stream, peer));
                    self.stats.sessions_accepted += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("Accept failed: {}", e);
                    break;
                }
            }
        }
    }

    /// Forward whatever the serial source holds.
    ///
    /// Returns true if serial bytes were processed.
    pub fn poll_forward(&mut self) -> bool {
        if let Some(session) = self.session.as_mut() {
            let health = session.check_alive().and_then(|()| session.flush_pending());
            if let Err(e) = health {
                self.end_session(e);
            }
        }

        let mut scratch = [0u8; SERIAL_READ_SIZE];
        let n = self.source.read_available(&mut scratch);
        if n == 0 {
            return false;
        }

        let Some(session) = self.session.as_mut() else {
            self.stats.bytes_dropped += n as u64;
            return true;
        };

        let stats = &mut self.stats;
        let result = self.buffer.feed(&scratch[..n], |chunk| {
            session.send_chunk(chunk)?;
            stats.bytes_forwarded += chunk.len() as u64;
            stats.chunks_forwarded += 1;
            Ok(())
        });

        if let Err(e) = result {
            self.end_session(e);
        }
        true
    }

    /// Drop everything the source has queued.
    fn discard_backlog(&mut self) {
        let mut scratch = [0u8; SERIAL_READ_SIZE];
        let mut discarded = 0u64;
        loop {
            let n = self.source.read_available(&mut scratch);
            if n == 0 {
                break;
            }
            discarded += n as u64;
        }
        if discarded > 0 {
            debug!("Discarded {} serial bytes queued before the client", discarded);
            self.stats.bytes_dropped += discarded;
        }
    }

    fn reject(&mut self, stream: TcpStream, peer: SocketAddr) {
        let active = self.session.as_ref().map(RelaySession::peer);
        info!(
            "Rejecting client {}: session with {:?} is active",
            peer, active
        );
        let _ = stream.shutdown(Shutdown::Both);
        self.stats.sessions_rejected += 1;
    }

    fn end_session(&mut self, reason: RelayError) {
        if let Some(session) = self.session.take() {
            info!("Client {} disconnected: {}", session.peer(), reason);
            session.close();
        }
        // Partial lines never carry over to the next client
        self.buffer.clear();
    }
}

/// Relay failures.
#[derive(Debug)]
pub enum RelayError {
    /// Could not open the listening socket.
    Bind(io::Error),
    /// The client hung up or stopped accepting data.
    ConnectionLost(io::Error),
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bind(e) => write!(f, "failed to bind relay listener: {}", e),
            Self::ConnectionLost(e) => write!(f, "connection lost: {}", e),
        }
    }
}

impl std::error::Error for RelayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Bind(e) | Self::ConnectionLost(e) => Some(e),
        }
    }
}
