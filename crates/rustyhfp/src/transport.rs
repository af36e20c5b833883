//! Shared transport state between the RFCOMM engine and the audio side
//!
//! A [`Transport`] is created per RFCOMM session and shared (behind an
//! `Arc`) with the subsystem that serves the SCO audio stream. Fields are
//! individual atomics; each one has a single writer (the RFCOMM engine)
//! except the gains, which the audio side may also store before posting
//! [`TransportSignal::SetVolume`] on the signal channel.

use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicI32, AtomicU16, AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use crate::hfp::{HfpIndicator, HFP_CODEC_UNDEFINED};

// Property update bits passed to the update callback
pub const UPDATE_SAMPLING: u32 = 1 << 0;
pub const UPDATE_CODEC: u32 = 1 << 1;
pub const UPDATE_VOLUME: u32 = 1 << 2;
pub const UPDATE_BATTERY: u32 = 1 << 3;

/// Callback invoked with a bitmask of changed transport properties
///
/// Called synchronously from the engine thread; it must not block.
pub type PropertyCallback = Arc<Mutex<dyn FnMut(u32) + Send + 'static>>;

/// One-byte signal codes exchanged over the in-process signal channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportSignal {
    /// Nudge the audio worker to re-evaluate the SCO link state
    Ping,
    /// Gains changed on the audio side; emit +VGM/+VGS to the peer
    SetVolume,
    /// Shut the session down cleanly
    Terminate,
}

impl TransportSignal {
    fn to_byte(self) -> u8 {
        match self {
            TransportSignal::Ping => 1,
            TransportSignal::SetVolume => 2,
            TransportSignal::Terminate => 3,
        }
    }

    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(TransportSignal::Ping),
            2 => Some(TransportSignal::SetVolume),
            3 => Some(TransportSignal::Terminate),
            _ => None,
        }
    }
}

/// One-directional signal channel backed by a pipe
#[derive(Debug)]
pub struct SignalChannel {
    rx: RawFd,
    tx: RawFd,
}

impl SignalChannel {
    pub fn new() -> io::Result<Self> {
        let mut fds = [0 as libc::c_int; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(SignalChannel { rx: fds[0], tx: fds[1] })
    }

    /// File descriptor to poll for incoming signals
    pub fn read_fd(&self) -> RawFd {
        self.rx
    }

    pub fn send(&self, signal: TransportSignal) -> io::Result<()> {
        let byte = signal.to_byte();
        loop {
            let ret = unsafe { libc::write(self.tx, &byte as *const u8 as *const libc::c_void, 1) };
            if ret == -1 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            return Ok(());
        }
    }

    /// Read one signal; blocks until one is available.
    pub fn recv(&self) -> io::Result<TransportSignal> {
        let mut byte = 0u8;
        loop {
            let ret = unsafe { libc::read(self.rx, &mut byte as *mut u8 as *mut libc::c_void, 1) };
            if ret == -1 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            if ret == 0 {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof));
            }
            return TransportSignal::from_byte(byte).ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidData, format!("unknown signal: {}", byte))
            });
        }
    }
}

impl Drop for SignalChannel {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.rx);
            libc::close(self.tx);
        }
    }
}

/// Remote device state owned by the RFCOMM engine
///
/// Battery level is a percentage, -1 while unknown. The `xapl_*` fields
/// hold the Apple accessory descriptor received with `AT+XAPL`.
#[derive(Debug)]
pub struct DeviceInfo {
    battery_level: AtomicI32,
    xapl_vendor_id: AtomicU16,
    xapl_product_id: AtomicU16,
    xapl_version: AtomicU32,
    xapl_features: AtomicU32,
    xapl_accev_docked: AtomicI32,
}

impl DeviceInfo {
    fn new() -> Self {
        Self {
            battery_level: AtomicI32::new(-1),
            xapl_vendor_id: AtomicU16::new(0),
            xapl_product_id: AtomicU16::new(0),
            xapl_version: AtomicU32::new(0),
            xapl_features: AtomicU32::new(0),
            xapl_accev_docked: AtomicI32::new(0),
        }
    }

    pub fn battery_level(&self) -> i32 {
        self.battery_level.load(Ordering::Relaxed)
    }

    pub fn set_battery_level(&self, level: i32) {
        self.battery_level.store(level, Ordering::Relaxed);
    }

    pub fn xapl(&self) -> (u16, u16, u32, u32) {
        (
            self.xapl_vendor_id.load(Ordering::Relaxed),
            self.xapl_product_id.load(Ordering::Relaxed),
            self.xapl_version.load(Ordering::Relaxed),
            self.xapl_features.load(Ordering::Relaxed),
        )
    }

    pub fn set_xapl(&self, vendor_id: u16, product_id: u16, version: u32, features: u32) {
        self.xapl_vendor_id.store(vendor_id, Ordering::Relaxed);
        self.xapl_product_id.store(product_id, Ordering::Relaxed);
        self.xapl_version.store(version, Ordering::Relaxed);
        self.xapl_features.store(features, Ordering::Relaxed);
    }

    pub fn accev_docked(&self) -> i32 {
        self.xapl_accev_docked.load(Ordering::Relaxed)
    }

    pub fn set_accev_docked(&self, docked: i32) {
        self.xapl_accev_docked.store(docked, Ordering::Relaxed);
    }
}

/// Shared transport record for one RFCOMM session
pub struct Transport {
    bt_fd: RawFd,
    handler_fd: AtomicI32,
    codec: AtomicU8,
    hfp_features: AtomicU32,
    hfp_inds: [AtomicI32; HfpIndicator::COUNT],
    mic_gain: AtomicI32,
    spk_gain: AtomicI32,
    // audio side -> engine
    sig: SignalChannel,
    // engine -> audio worker
    sco_sig: SignalChannel,
    device: DeviceInfo,
    update_callback: Mutex<Option<PropertyCallback>>,
}

impl Transport {
    /// Create a transport around a connected RFCOMM socket descriptor.
    ///
    /// The transport takes ownership of the descriptor and closes it when
    /// dropped.
    pub fn new(bt_fd: RawFd) -> io::Result<Self> {
        Ok(Self {
            bt_fd,
            handler_fd: AtomicI32::new(-1),
            codec: AtomicU8::new(HFP_CODEC_UNDEFINED),
            hfp_features: AtomicU32::new(0),
            hfp_inds: Default::default(),
            mic_gain: AtomicI32::new(0),
            spk_gain: AtomicI32::new(0),
            sig: SignalChannel::new()?,
            sco_sig: SignalChannel::new()?,
            device: DeviceInfo::new(),
            update_callback: Mutex::new(None),
        })
    }

    pub fn bt_fd(&self) -> RawFd {
        self.bt_fd
    }

    /// Attach an external AT handler stream; unmatched inbound frames are
    /// forwarded to it and its bytes are injected verbatim onto RFCOMM.
    pub fn set_handler_fd(&self, fd: RawFd) {
        self.handler_fd.store(fd, Ordering::Relaxed);
    }

    pub fn handler_fd(&self) -> RawFd {
        self.handler_fd.load(Ordering::Relaxed)
    }

    pub fn codec(&self) -> u8 {
        self.codec.load(Ordering::Relaxed)
    }

    pub fn set_codec(&self, codec: u8) {
        self.codec.store(codec, Ordering::Relaxed);
    }

    pub fn hfp_features(&self) -> u32 {
        self.hfp_features.load(Ordering::Relaxed)
    }

    pub fn set_hfp_features(&self, features: u32) {
        self.hfp_features.store(features, Ordering::Relaxed);
    }

    pub fn indicator(&self, ind: HfpIndicator) -> i32 {
        self.hfp_inds[ind as usize].load(Ordering::Relaxed)
    }

    pub fn set_indicator(&self, ind: HfpIndicator, value: i32) {
        self.hfp_inds[ind as usize].store(value, Ordering::Relaxed);
    }

    pub fn mic_gain(&self) -> i32 {
        self.mic_gain.load(Ordering::Relaxed)
    }

    pub fn set_mic_gain(&self, gain: i32) {
        self.mic_gain.store(gain, Ordering::Relaxed);
    }

    pub fn spk_gain(&self) -> i32 {
        self.spk_gain.load(Ordering::Relaxed)
    }

    pub fn set_spk_gain(&self, gain: i32) {
        self.spk_gain.store(gain, Ordering::Relaxed);
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    /// Post a signal to the RFCOMM engine.
    pub fn signal(&self, signal: TransportSignal) -> io::Result<()> {
        self.sig.send(signal)
    }

    pub(crate) fn signal_read_fd(&self) -> RawFd {
        self.sig.read_fd()
    }

    pub(crate) fn recv_signal(&self) -> io::Result<TransportSignal> {
        self.sig.recv()
    }

    /// Nudge the audio worker serving the SCO link.
    pub(crate) fn ping_sco(&self) -> io::Result<()> {
        self.sco_sig.send(TransportSignal::Ping)
    }

    /// File descriptor the audio worker polls for engine nudges.
    pub fn sco_signal_read_fd(&self) -> RawFd {
        self.sco_sig.read_fd()
    }

    /// Read one engine nudge; blocks until one is available.
    pub fn recv_sco_signal(&self) -> io::Result<TransportSignal> {
        self.sco_sig.recv()
    }

    /// Install the property update callback.
    pub fn set_update_callback(&self, callback: PropertyCallback) {
        *self.update_callback.lock().unwrap() = Some(callback);
    }

    /// Notify the property sink about changed transport properties.
    pub(crate) fn notify_update(&self, mask: u32) {
        let callback = self.update_callback.lock().unwrap().clone();
        if let Some(callback) = callback {
            (callback.lock().unwrap())(mask);
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        let handler_fd = self.handler_fd.load(Ordering::Relaxed);
        unsafe {
            if handler_fd >= 0 {
                libc::close(handler_fd);
            }
            libc::close(self.bt_fd);
        }
    }
}
