//! Length-prefixed message framing.
//!
//! A frame is a big-endian `u32` byte count followed by exactly that many bytes of
//! bincode-encoded message. Both directions use the same framing.

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{self, Read, Write};
use thiserror::Error;
use tracing::trace;

/// 16 MiB.
pub const DEFAULT_MAX_FRAME: usize = 16 << 20;

const PREFIX_LEN: usize = 4;

#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer closed the channel cleanly between frames.
    #[error("Channel closed")]
    Closed,

    /// The channel ended partway through a frame.
    #[error("Channel closed mid-frame: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },

    #[error("Frame of {size} bytes exceeds the maximum of {max}")]
    Oversize { size: usize, max: usize },

    /// A whole frame was read, but its payload is not a valid message.
    #[error("Malformed message: {}", _0)]
    Decode(#[source] bincode::Error),

    #[error("Could not encode message: {}", _0)]
    Encode(#[source] bincode::Error),

    #[error("IO error: {}", _0)]
    Io(#[from] io::Error),
}

impl TransportError {
    /// After a recoverable error the channel is still at a frame boundary and can be used again.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TransportError::Decode(_))
    }
}

/// A byte stream carrying framed messages.
pub struct Channel<S> {
    stream: S,
    max_frame: usize,
}

impl<S> Channel<S> {
    pub fn new(stream: S) -> Self {
        Channel {
            stream,
            max_frame: DEFAULT_MAX_FRAME,
        }
    }

    pub fn with_max_frame(mut self, max_frame: usize) -> Self {
        self.max_frame = max_frame;
        self
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: Write> Channel<S> {
    /// Write one message as a single frame.
    pub fn send<M: Serialize>(&mut self, message: &M) -> Result<(), TransportError> {
        let payload = bincode::serialize(message).map_err(TransportError::Encode)?;
        if payload.len() > self.max_frame || payload.len() > std::u32::MAX as usize {
            return Err(TransportError::Oversize {
                size: payload.len(),
                max: self.max_frame,
            });
        }
        self.stream.write_u32::<BigEndian>(payload.len() as u32)?;
        self.stream.write_all(&payload)?;
        self.stream.flush()?;
        trace!(len = payload.len(), "sent frame");
        Ok(())
    }
}

impl<S: Read> Channel<S> {
    /// Block until one whole frame has arrived, then decode it.
    pub fn receive<M: DeserializeOwned>(&mut self) -> Result<M, TransportError> {
        let mut prefix = [0u8; PREFIX_LEN];
        match read_full(&mut self.stream, &mut prefix)? {
            0 => return Err(TransportError::Closed),
            PREFIX_LEN => (),
            got => {
                return Err(TransportError::Truncated {
                    expected: PREFIX_LEN,
                    got,
                })
            }
        }
        let len = BigEndian::read_u32(&prefix) as usize;
        if len > self.max_frame {
            return Err(TransportError::Oversize {
                size: len,
                max: self.max_frame,
            });
        }

        let mut payload = vec![0u8; len];
        let got = read_full(&mut self.stream, &mut payload)?;
        if got != len {
            return Err(TransportError::Truncated { expected: len, got });
        }
        trace!(len = len, "received frame");
        bincode::deserialize(&payload).map_err(TransportError::Decode)
    }
}

/// Fill `buf` unless the stream ends first; returns how many bytes were read.
fn read_full<R: Read>(stream: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Request;
    use std::io::Cursor;

    #[test]
    fn frame_layout() {
        let mut channel = Channel::new(Vec::new());
        channel.send(&Request::ListFunctions).expect("send");
        let bytes = channel.into_inner();
        let len = BigEndian::read_u32(&bytes[..4]) as usize;
        assert_eq!(len, bytes.len() - 4);
        assert_eq!(
            bincode::deserialize::<Request>(&bytes[4..]).expect("decodes"),
            Request::ListFunctions
        );
    }

    #[test]
    fn clean_close_and_truncation() {
        let mut channel = Channel::new(Cursor::new(Vec::new()));
        assert!(matches!(channel.receive::<Request>(), Err(TransportError::Closed)));

        let mut channel = Channel::new(Cursor::new(vec![0u8, 0]));
        assert!(matches!(
            channel.receive::<Request>(),
            Err(TransportError::Truncated {
                expected: 4,
                got: 2
            })
        ));

        let mut channel = Channel::new(Cursor::new(vec![0u8, 0, 0, 9, 1, 2, 3]));
        assert!(matches!(
            channel.receive::<Request>(),
            Err(TransportError::Truncated {
                expected: 9,
                got: 3
            })
        ));
    }

    #[test]
    fn oversize_frames() {
        let mut channel = Channel::new(Vec::new()).with_max_frame(8);
        let big = Request::Call {
            text: "x".repeat(64),
            seed: None,
        };
        assert!(matches!(
            channel.send(&big),
            Err(TransportError::Oversize { max: 8, .. })
        ));
        assert!(channel.get_ref().is_empty());

        // rejected from the prefix alone
        let mut channel =
            Channel::new(Cursor::new(vec![0xffu8, 0xff, 0xff, 0xff])).with_max_frame(8);
        assert!(matches!(
            channel.receive::<Request>(),
            Err(TransportError::Oversize { .. })
        ));
    }
}
