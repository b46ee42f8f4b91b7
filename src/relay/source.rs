//! Serial byte sources.

use log::{debug, info, warn};
use std::collections::VecDeque;
use std::io::Read;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;

/// Read size used by the reader thread.
const READER_CHUNK_SIZE: usize = 256;

/// A serial input that can be drained without blocking.
pub trait SerialSource {
    /// Copy bytes that have already arrived into `buf`.
    ///
    /// Returns the number of bytes copied, 0 when nothing is waiting. Must
    /// never wait for data.
    fn read_available(&mut self, buf: &mut [u8]) -> usize;
}

/// Sending half of a [`ChannelSource`].
#[derive(Debug, Clone)]
pub struct SerialFeed {
    tx: Sender<Vec<u8>>,
}

impl SerialFeed {
    /// Deliver bytes to the source. Returns false once the source is gone.
    pub fn send(&self, bytes: impl Into<Vec<u8>>) -> bool {
        self.tx.send(bytes.into()).is_ok()
    }
}

/// Serial source fed through a channel.
///
/// Stands in for the UART receive FIFO on the host: a reader thread or a
/// test pushes bytes in, the relay drains them without blocking.
#[derive(Debug)]
pub struct ChannelSource {
    rx: Receiver<Vec<u8>>,
    pending: VecDeque<u8>,
}

impl ChannelSource {
    /// Create a connected feed/source pair.
    pub fn new() -> (SerialFeed, Self) {
        let (tx, rx) = mpsc::channel();
        (
            SerialFeed { tx },
            Self {
                rx,
                pending: VecDeque::new(),
            },
        )
    }

    /// Spawn a thread copying everything from `reader` into a new source.
    ///
    /// The thread ends at end of input or on a read error; the source then
    /// simply stays empty.
    pub fn spawn_reader<R>(name: &str, mut reader: R) -> std::io::Result<Self>
    where
        R: Read + Send + 'static,
    {
        let (feed, source) = Self::new();
        let label = name.to_string();

        thread::Builder::new()
            .name(format!("serial-{}", name))
            .spawn(move || {
                let mut buf = [0u8; READER_CHUNK_SIZE];
                loop {
                    match reader.read(&mut buf) {
                        Ok(0) => {
                            info!("Serial input {} reached end of input", label);
                            break;
                        }
                        Ok(n) => {
                            if !feed.send(&buf[..n]) {
                                debug!("Serial source dropped, stopping reader");
                                break;
                            }
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            warn!("Serial input {} read failed: {}", label, e);
                            break;
                        }
                    }
                }
            })?;

        Ok(source)
    }
}

impl SerialSource for ChannelSource {
    fn read_available(&mut self, buf: &mut [u8]) -> usize {
        while self.pending.len() < buf.len() {
            match self.rx.try_recv() {
                Ok(bytes) => self.pending.extend(bytes),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }

        let n = self.pending.len().min(buf.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::{Duration, Instant};

    #[test]
    fn test_empty_source_reads_nothing() {
        let (_feed, mut source) = ChannelSource::new();
        let mut buf = [0u8; 16];
        assert_eq!(source.read_available(&mut buf), 0);
    }

    #[test]
    fn test_reads_in_order_across_sends() {
        let (feed, mut source) = ChannelSource::new();
        assert!(feed.send(b"$GP".to_vec()));
        assert!(feed.send(&b"GGA\n"[..]));

        let mut buf = [0u8; 16];
        let n = source.read_available(&mut buf);
        assert_eq!(&buf[..n], b"$GPGGA\n");
        assert_eq!(source.read_available(&mut buf), 0);
    }

    #[test]
    fn test_small_buffer_keeps_remainder() {
        let (feed, mut source) = ChannelSource::new();
        feed.send(b"abcdef".to_vec());

        let mut buf = [0u8; 4];
        assert_eq!(source.read_available(&mut buf), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(source.read_available(&mut buf), 2);
        assert_eq!(&buf[..2], b"ef");
    }

    #[test]
    fn test_dropped_feed_is_not_an_error() {
        let (feed, mut source) = ChannelSource::new();
        feed.send(b"x".to_vec());
        drop(feed);

        let mut buf = [0u8; 4];
        assert_eq!(source.read_available(&mut buf), 1);
        assert_eq!(source.read_available(&mut buf), 0);
    }

    #[test]
    fn test_spawn_reader_copies_input() {
        let input = b"$GPGLL,4916.45,N,12311.12,W*31\n".to_vec();
        let mut source = ChannelSource::spawn_reader("test", Cursor::new(input.clone())).unwrap();

        let mut received = Vec::new();
        let mut buf = [0u8; 64];
        let deadline = Instant::now() + Duration::from_secs(2);
        while received.len() < input.len() && Instant::now() < deadline {
            let n = source.read_available(&mut buf);
            received.extend_from_slice(&buf[..n]);
            if n == 0 {
                thread::sleep(Duration::from_millis(1));
            }
        }
        assert_eq!(received, input);
    }
}
