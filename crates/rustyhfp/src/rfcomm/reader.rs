//! Buffered AT message reading from the RFCOMM stream
//!
//! A single socket read may deliver several concatenated AT frames. The
//! reader keeps the raw bytes around and hands them out one frame at a
//! time; the socket is only read again once every buffered frame has been
//! consumed.

use std::borrow::Cow;
use std::io;
use std::os::unix::io::RawFd;

use crate::at::{self, AtMessage};
use crate::error::{RfcommError, RfcommResult};

/// Size of the reader buffer; a single refill never returns more
pub const AT_READER_BUFFER_SIZE: usize = 256;

/// Buffered reader state for one RFCOMM stream
#[derive(Debug)]
pub struct AtReader {
    buffer: [u8; AT_READER_BUFFER_SIZE],
    len: usize,
    /// Offset of the next unparsed byte, `None` once the buffer is drained
    pos: Option<usize>,
}

impl AtReader {
    pub fn new() -> Self {
        Self {
            buffer: [0; AT_READER_BUFFER_SIZE],
            len: 0,
            pos: None,
        }
    }

    /// Whether buffered bytes are still waiting to be parsed.
    pub fn has_pending(&self) -> bool {
        self.pos.is_some()
    }

    /// The unparsed bytes, for diagnostics.
    pub fn pending(&self) -> Cow<'_, str> {
        match self.pos {
            Some(pos) => String::from_utf8_lossy(&self.buffer[pos..self.len]),
            None => Cow::Borrowed(""),
        }
    }

    /// Drop any buffered bytes, forcing the next read to hit the socket.
    ///
    /// Required after a parse failure; without it the same invalid bytes
    /// would be re-parsed indefinitely.
    pub fn clear(&mut self) {
        self.pos = None;
    }
}

impl Default for AtReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Read `buf.len()` bytes at most, transparently resuming interrupted reads.
pub(crate) fn read_retry(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        let ret = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        if ret == -1 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        return Ok(ret as usize);
    }
}

/// Read one AT message from the RFCOMM stream.
///
/// Frames already buffered are consumed without touching the socket; the
/// socket is read only when the buffer is drained. A zero-length read means
/// the peer closed the connection. On [`RfcommError::BadMessage`] the
/// cursor is left in place so the offending bytes stay visible through
/// [`AtReader::pending`]; the caller must [`AtReader::clear`] before the
/// next read.
pub fn read_at(fd: RawFd, reader: &mut AtReader) -> RfcommResult<AtMessage> {
    let pos = match reader.pos {
        Some(pos) => pos,
        None => {
            let len = read_retry(fd, &mut reader.buffer)?;
            if len == 0 {
                return Err(RfcommError::ConnectionReset);
            }
            reader.len = len;
            reader.pos = Some(0);
            0
        }
    };

    let chunk = match std::str::from_utf8(&reader.buffer[pos..reader.len]) {
        Ok(chunk) => chunk,
        Err(_) => return Err(RfcommError::BadMessage),
    };

    match at::parse(chunk) {
        Some((at, rest)) => {
            // a tail of bare CR/LF bytes carries no further frame
            reader.pos = if rest.trim_matches(['\r', '\n', ' ']).is_empty() {
                None
            } else {
                Some(reader.len - rest.len())
            };
            Ok(at)
        }
        None => Err(RfcommError::BadMessage),
    }
}
