//! Length-prefixed frame codec over any `Read`/`Write` stream.
//!
//! Each frame is: `[16 ASCII hex digits: payload length][payload]`.
//!
//! Reads go through a fragment buffer: the underlying stream is drained in
//! [`PACKET_SIZE`] chunks and any surplus is kept for the next frame, so a
//! frame may arrive split across any number of reads.

use std::io::{self, Read, Write};

/// Width of the ASCII hex length header.
pub const HEADER_LEN: usize = 16;

/// Size of a single read from the underlying stream.
pub const PACKET_SIZE: usize = 1024;

/// Maximum allowed frame payload (256 MiB).
pub const MAX_FRAME: usize = 256 * 1024 * 1024;

/// Formats the length header for a payload of `len` bytes.
pub fn encode_header(len: usize) -> [u8; HEADER_LEN] {
    let mut header = [b'0'; HEADER_LEN];
    let digits = format!("{len:016x}");
    header.copy_from_slice(digits.as_bytes());
    header
}

/// Parses a length header.
///
/// Leading spaces are accepted because some peers right-align the length
/// with `%16x` instead of zero-padding it.
pub fn decode_header(header: &[u8]) -> io::Result<usize> {
    let text = std::str::from_utf8(header)
        .map_err(|_| invalid("frame header is not ASCII"))?
        .trim_start_matches(' ');
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(invalid("frame header is not a hex length"));
    }
    let len = usize::from_str_radix(text, 16).map_err(|_| invalid("frame length overflows"))?;
    if len > MAX_FRAME {
        return Err(invalid("frame exceeds 256 MiB limit"));
    }
    Ok(len)
}

/// Writes `payload` as one frame and flushes `w`.
pub fn write_frame<W: Write>(w: &mut W, payload: &[u8]) -> io::Result<()> {
    if payload.len() > MAX_FRAME {
        return Err(invalid("frame exceeds 256 MiB limit"));
    }
    w.write_all(&encode_header(payload.len()))?;
    w.write_all(payload)?;
    w.flush()
}

/// Frame reader that reassembles frames from arbitrarily chunked reads.
#[derive(Debug)]
pub struct FrameReader<R> {
    /// The underlying byte stream.
    inner: R,
    /// Bytes read from `inner` but not yet consumed.
    fragment: Vec<u8>,
}

impl<R: Read> FrameReader<R> {
    /// Wraps `inner` with an empty fragment buffer.
    pub const fn new(inner: R) -> Self {
        Self {
            inner,
            fragment: Vec::new(),
        }
    }

    /// Wraps `inner`, seeding the fragment buffer with bytes already read.
    pub const fn with_fragment(inner: R, fragment: Vec<u8>) -> Self {
        Self { inner, fragment }
    }

    /// Blocks until exactly `n` bytes are available and returns them.
    ///
    /// Surplus bytes stay buffered. Returns `UnexpectedEof` if the stream
    /// closes first.
    pub fn receive_exact(&mut self, n: usize) -> io::Result<Vec<u8>> {
        let mut chunk = [0u8; PACKET_SIZE];
        while self.fragment.len() < n {
            let read = match self.inner.read(&mut chunk) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "peer closed the channel",
                    ));
                }
                Ok(read) => read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            self.fragment.extend_from_slice(&chunk[..read]);
        }
        let rest = self.fragment.split_off(n);
        Ok(std::mem::replace(&mut self.fragment, rest))
    }

    /// Reads one complete frame and returns its payload.
    pub fn read_frame(&mut self) -> io::Result<Vec<u8>> {
        let header = self.receive_exact(HEADER_LEN)?;
        let len = decode_header(&header)?;
        self.receive_exact(len)
    }

    /// Number of buffered bytes not yet consumed.
    pub fn buffered(&self) -> usize {
        self.fragment.len()
    }

    /// Returns a mutable reference to the underlying stream.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }
}

/// Shorthand for an `InvalidData` error.
fn invalid(msg: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reader that hands out at most `step` bytes per call.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let end = (self.pos + self.step).min(self.data.len());
            let n = (end - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn header_is_zero_padded_hex() {
        assert_eq!(&encode_header(0x1f), b"000000000000001f");
        assert_eq!(decode_header(b"000000000000001f").unwrap(), 0x1f);
    }

    #[test]
    fn header_accepts_space_padding() {
        assert_eq!(decode_header(b"              2a").unwrap(), 42);
    }

    #[test]
    fn header_rejects_garbage() {
        assert!(decode_header(b"00000000000000zz").is_err());
        assert!(decode_header(b"                ").is_err());
    }

    #[test]
    fn rejects_oversized_frame() {
        let header = encode_header(MAX_FRAME + 1);
        let mut reader = FrameReader::new(io::Cursor::new(header.to_vec()));
        assert!(reader.read_frame().is_err());
    }

    #[test]
    fn reassembles_frames_across_chunk_boundaries() {
        let big = vec![b'x'; PACKET_SIZE * 3 + 7];
        let mut wire = Vec::new();
        write_frame(&mut wire, b"first").unwrap();
        write_frame(&mut wire, &big).unwrap();
        write_frame(&mut wire, b"").unwrap();

        for step in [1, 5, 16, 17, PACKET_SIZE, PACKET_SIZE * 8] {
            let mut reader = FrameReader::new(Trickle {
                data: wire.clone(),
                pos: 0,
                step,
            });
            assert_eq!(reader.read_frame().unwrap(), b"first");
            assert_eq!(reader.read_frame().unwrap(), big);
            assert_eq!(reader.read_frame().unwrap(), b"");
            assert_eq!(reader.buffered(), 0);
        }
    }

    #[test]
    fn receive_exact_keeps_surplus() {
        let mut reader = FrameReader::new(io::Cursor::new(b"abcdef".to_vec()));
        assert_eq!(reader.receive_exact(2).unwrap(), b"ab");
        assert_eq!(reader.buffered(), 4);
        assert_eq!(reader.receive_exact(4).unwrap(), b"cdef");
    }

    #[test]
    fn eof_mid_frame_is_unexpected_eof() {
        let mut wire = encode_header(10).to_vec();
        wire.extend_from_slice(b"abc");
        let mut reader = FrameReader::new(io::Cursor::new(wire));
        let err = reader.read_frame().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn seeded_fragment_is_consumed_first() {
        let mut reader = FrameReader::with_fragment(io::Cursor::new(b"cd".to_vec()), b"ab".to_vec());
        assert_eq!(reader.receive_exact(4).unwrap(), b"abcd");
    }
}
