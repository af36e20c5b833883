//! RFCOMM socket wrapper
//!
//! This module provides a thin wrapper around the Linux Bluetooth RFCOMM
//! socket interface used to reach the HFP control channel of a peer.

use std::fmt;
use std::mem;
use std::os::unix::io::{AsRawFd, RawFd};
use std::str::FromStr;

use crate::error::{Error, RfcommError};

// Bluetooth socket constants
const AF_BLUETOOTH: i32 = 31;
const BTPROTO_RFCOMM: i32 = 3;

/// Bluetooth device address, most significant byte first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BdAddr {
    pub bytes: [u8; 6],
}

impl BdAddr {
    /// The any-device wildcard address
    pub const ANY: BdAddr = BdAddr { bytes: [0; 6] };

    pub fn new(bytes: [u8; 6]) -> Self {
        Self { bytes }
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.bytes;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl FromStr for BdAddr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for byte in bytes.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| Error::InvalidAddress(s.to_string()))?;
            *byte = u8::from_str_radix(part, 16)
                .map_err(|_| Error::InvalidAddress(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(Error::InvalidAddress(s.to_string()));
        }
        Ok(BdAddr { bytes })
    }
}

// Define the sockaddr_rc structure
#[repr(C)]
struct SockaddrRc {
    rc_family: libc::sa_family_t,
    rc_bdaddr: [u8; 6],
    rc_channel: u8,
}

impl SockaddrRc {
    fn new(addr: &BdAddr, channel: u8) -> Self {
        // socket addresses carry the device address least significant
        // byte first
        let mut bdaddr = addr.bytes;
        bdaddr.reverse();
        Self {
            rc_family: AF_BLUETOOTH as libc::sa_family_t,
            rc_bdaddr: bdaddr,
            rc_channel: channel,
        }
    }
}

/// Represents a connected or listening RFCOMM socket
#[derive(Debug)]
pub struct RfcommSocket {
    fd: RawFd,
}

impl RfcommSocket {
    fn open() -> Result<RawFd, RfcommError> {
        let fd = unsafe { libc::socket(AF_BLUETOOTH, libc::SOCK_STREAM, BTPROTO_RFCOMM) };
        if fd < 0 {
            return Err(RfcommError::SocketError(std::io::Error::last_os_error()));
        }
        Ok(fd)
    }

    /// Connect to an RFCOMM channel on a remote device.
    pub fn connect(addr: &BdAddr, channel: u8) -> Result<Self, RfcommError> {
        let fd = Self::open()?;
        let sockaddr = SockaddrRc::new(addr, channel);

        let result = unsafe {
            libc::connect(
                fd,
                &sockaddr as *const _ as *const libc::sockaddr,
                mem::size_of::<SockaddrRc>() as libc::socklen_t,
            )
        };

        if result < 0 {
            let err = std::io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(RfcommError::ConnectError(err));
        }

        Ok(RfcommSocket { fd })
    }

    /// Bind a listening socket on a local RFCOMM channel.
    pub fn listen(channel: u8) -> Result<Self, RfcommError> {
        let fd = Self::open()?;
        let sockaddr = SockaddrRc::new(&BdAddr::ANY, channel);

        let result = unsafe {
            libc::bind(
                fd,
                &sockaddr as *const _ as *const libc::sockaddr,
                mem::size_of::<SockaddrRc>() as libc::socklen_t,
            )
        };

        if result < 0 {
            let err = std::io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(RfcommError::BindError(err));
        }

        if unsafe { libc::listen(fd, 1) } < 0 {
            let err = std::io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(RfcommError::SocketError(err));
        }

        Ok(RfcommSocket { fd })
    }

    /// Accept one inbound connection on a listening socket.
    pub fn accept(&self) -> Result<(RfcommSocket, BdAddr), RfcommError> {
        let mut sockaddr = SockaddrRc::new(&BdAddr::ANY, 0);
        let mut addrlen = mem::size_of::<SockaddrRc>() as libc::socklen_t;

        let fd = unsafe {
            libc::accept(
                self.fd,
                &mut sockaddr as *mut _ as *mut libc::sockaddr,
                &mut addrlen,
            )
        };

        if fd < 0 {
            return Err(RfcommError::SocketError(std::io::Error::last_os_error()));
        }

        let mut bytes = sockaddr.rc_bdaddr;
        bytes.reverse();
        Ok((RfcommSocket { fd }, BdAddr::new(bytes)))
    }

    /// Release ownership of the descriptor without closing it.
    pub fn into_raw_fd(self) -> RawFd {
        let fd = self.fd;
        mem::forget(self);
        fd
    }
}

impl AsRawFd for RfcommSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for RfcommSocket {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}
