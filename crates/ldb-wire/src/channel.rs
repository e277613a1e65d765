//! Framed message channel over a bidirectional byte stream.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};

use parking_lot::Mutex;

use crate::error::WireError;
use crate::frame::{decode_length, encode_length, LENGTH_PREFIX_SIZE, READ_CHUNK_SIZE};

/// Upper bound on the up-front allocation for an incoming payload. Larger
/// payloads grow the buffer as chunks actually arrive.
const MAX_PREALLOC: usize = 64 * READ_CHUNK_SIZE;

/// Reliable message framing over one connection.
///
/// Reads are serialized by the read lock and writes by the write lock. The two
/// locks are independent, so one thread may block in [`read_message`] while
/// another writes.
///
/// [`read_message`]: WireChannel::read_message
#[derive(Debug)]
pub struct WireChannel<R, W> {
    reader: Mutex<R>,
    writer: Mutex<W>,
}

impl<R: Read, W: Write> WireChannel<R, W> {
    /// Create a channel from separate read and write halves.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        }
    }

    /// Write one message: the length prefix, then the payload.
    ///
    /// A failed write leaves the peer mid-frame, so the connection must be
    /// considered broken.
    pub fn write_message(&self, payload: &[u8]) -> Result<(), WireError> {
        let prefix = encode_length(payload.len())?;
        let mut writer = self.writer.lock();
        writer.write_all(&prefix)?;
        writer.write_all(payload)?;
        writer.flush()?;
        tracing::trace!(len = payload.len(), "wrote message");
        Ok(())
    }

    /// Read one complete message.
    ///
    /// End of stream before the first prefix byte is [`WireError::Closed`];
    /// end of stream anywhere later is [`WireError::ShortRead`]. A partial
    /// message is never returned.
    pub fn read_message(&self) -> Result<Vec<u8>, WireError> {
        let mut reader = self.reader.lock();

        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        match read_full(&mut *reader, &mut prefix)? {
            0 => return Err(WireError::Closed),
            n if n < LENGTH_PREFIX_SIZE => {
                return Err(WireError::ShortRead {
                    expected: LENGTH_PREFIX_SIZE,
                    got: n,
                })
            }
            _ => {}
        }
        let len = decode_length(prefix);

        let mut payload = Vec::with_capacity(len.min(MAX_PREALLOC));
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        while payload.len() < len {
            let want = (len - payload.len()).min(READ_CHUNK_SIZE);
            let got = read_full(&mut *reader, &mut chunk[..want])?;
            payload.extend_from_slice(&chunk[..got]);
            if got < want {
                return Err(WireError::ShortRead {
                    expected: len,
                    got: payload.len(),
                });
            }
        }
        tracing::trace!(len, "read message");
        Ok(payload)
    }

    /// Read one message and interpret it as UTF-8 text.
    pub fn read_string(&self) -> Result<String, WireError> {
        let bytes = self.read_message()?;
        String::from_utf8(bytes).map_err(|_| WireError::InvalidUtf8)
    }

    /// Consume the channel and return the underlying halves.
    pub fn into_parts(self) -> (R, W) {
        (self.reader.into_inner(), self.writer.into_inner())
    }
}

/// Fill `buf` from `reader` until it is full or the stream ends.
/// Returns the number of bytes read.
fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// A [`WireChannel`] over a TCP connection.
///
/// Keeps a third handle to the socket so the connection can be shut down
/// while another thread is blocked reading or writing.
#[derive(Debug)]
pub struct TcpChannel {
    channel: WireChannel<TcpStream, TcpStream>,
    control: TcpStream,
    peer: Option<SocketAddr>,
}

impl TcpChannel {
    /// Wrap an already-connected stream.
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr().ok();
        let reader = stream.try_clone()?;
        let control = stream.try_clone()?;
        Ok(Self {
            channel: WireChannel::new(reader, stream),
            control,
            peer,
        })
    }

    /// Connect to a listening debug server.
    pub fn connect(addr: impl ToSocketAddrs) -> io::Result<Self> {
        Self::new(TcpStream::connect(addr)?)
    }

    /// Address of the remote end, if known.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// See [`WireChannel::write_message`].
    pub fn write_message(&self, payload: &[u8]) -> Result<(), WireError> {
        self.channel.write_message(payload)
    }

    /// See [`WireChannel::read_message`].
    pub fn read_message(&self) -> Result<Vec<u8>, WireError> {
        self.channel.read_message()
    }

    /// See [`WireChannel::read_string`].
    pub fn read_string(&self) -> Result<String, WireError> {
        self.channel.read_string()
    }

    /// Shut down both directions; blocked readers and writers return errors.
    pub fn shutdown(&self) {
        if let Err(e) = self.control.shutdown(Shutdown::Both) {
            // Already closed by the peer.
            tracing::debug!("shutdown on closed connection: {}", e);
        }
    }
}
