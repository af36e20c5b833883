//! AT message writing to the RFCOMM stream

use std::io;
use std::os::unix::io::RawFd;

use log::debug;

use crate::at::{self, AtType};
use crate::error::{RfcommError, RfcommResult};

/// Write raw bytes in one go, transparently resuming interrupted writes.
///
/// AT frames are always smaller than the RFCOMM MTU, so a short write is
/// not expected and is treated as fatal.
pub(crate) fn write_raw(fd: RawFd, bytes: &[u8]) -> io::Result<()> {
    loop {
        let ret = unsafe { libc::write(fd, bytes.as_ptr() as *const libc::c_void, bytes.len()) };
        if ret == -1 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        if ret as usize != bytes.len() {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "short RFCOMM write"));
        }
        return Ok(());
    }
}

/// Format and send one AT message.
pub fn write_at(fd: RawFd, ty: AtType, command: &str, value: &str) -> RfcommResult<()> {
    debug!("Sending AT message: {}: command:{}, value:{}", ty, command, value);
    let msg = at::build(ty, command, value);
    write_raw(fd, msg.as_bytes()).map_err(RfcommError::Io)
}
