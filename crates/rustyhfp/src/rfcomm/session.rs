//! RFCOMM session event loop
//!
//! One session drives the AT dialogue for one HFP connection. The loop
//! multiplexes three descriptors:
//! - the in-process signal channel of the shared transport
//! - the RFCOMM socket itself
//! - an optional external AT handler stream
//!
//! Before each wait the SLC driver for the configured role runs; it may
//! emit the next handshake command, install the expected reply handler and
//! arm the retry timeout. Once the state machine reaches
//! [`HfpState::Connected`] the loop only reacts to events.

use std::io;
use std::os::unix::io::RawFd;
use std::sync::Arc;

use libc::{POLLERR, POLLHUP, POLLIN};
use log::{debug, error, warn};

use crate::at::{self, AtType};
use crate::config::Config;
use crate::error::{RfcommError, RfcommResult};
use crate::hfp::constants::*;
use crate::hfp::{HfpRole, HfpState};
use crate::transport::{Transport, TransportSignal, UPDATE_CODEC, UPDATE_SAMPLING};

use super::conn::RfcommConn;
use super::handlers;
use super::reader::{read_at, read_retry, AtReader};
use super::writer::{write_at, write_raw};

/// Route an I/O result through the session error policy.
///
/// Errors signalling a dead link terminate the session; everything else is
/// logged and the session keeps running best-effort.
fn tolerate(result: RfcommResult<()>) -> RfcommResult<()> {
    match result {
        Err(e) if e.is_fatal() => {
            debug!("RFCOMM disconnected: {}", e);
            Err(e)
        }
        Err(e) => {
            error!("RFCOMM IO error: {}", e);
            Ok(())
        }
        Ok(()) => Ok(()),
    }
}

/// A running RFCOMM control channel session
pub struct RfcommSession {
    conn: RfcommConn,
    reader: AtReader,
}

impl RfcommSession {
    pub fn new(transport: Arc<Transport>, role: HfpRole, config: Config) -> Self {
        Self {
            conn: RfcommConn::new(transport, role, config),
            reader: AtReader::new(),
        }
    }

    /// Run the session until the peer disconnects, the service level
    /// connection times out or [`TransportSignal::Terminate`] arrives.
    ///
    /// Termination requests are honored only at the poll wait, never while
    /// a frame is being processed, so no reply is ever half-written and no
    /// shared field is torn.
    pub fn run(mut self) -> RfcommResult<()> {
        let transport = self.conn.transport.clone();

        debug!("Starting RFCOMM loop: {}", self.conn.role);
        loop {
            // During normal operation the poll should block indefinitely.
            // While the service level connection is being established we
            // cannot assume the peer received our message, so a timeout is
            // armed and the pending command is re-sent when it fires.
            let mut timeout = -1;

            if self.conn.state != HfpState::Connected {
                if self.conn.state != self.conn.state_prev {
                    self.conn.state_prev = self.conn.state;
                    self.conn.retries = 0;
                }

                // Trying indefinitely would only use up resources.
                if self.conn.retries > self.conn.config.slc_retries {
                    return Err(RfcommError::TimedOut);
                }

                let driven = match self.conn.role {
                    HfpRole::HandsFree => self.drive_slc_hf(),
                    HfpRole::AudioGateway => self.drive_slc_ag(),
                };
                tolerate(driven)?;

                if self.conn.expected.is_some() {
                    timeout = self.conn.config.slc_timeout_ms;
                    self.conn.retries += 1;
                }
            }

            // skip the poll while parsed-ahead frames are still buffered
            if self.reader.has_pending() {
                tolerate(self.handle_bt_frame())?;
                continue;
            }

            let handler_fd = transport.handler_fd();
            let mut pfds = [
                libc::pollfd {
                    fd: transport.signal_read_fd(),
                    events: POLLIN,
                    revents: 0,
                },
                libc::pollfd {
                    fd: self.conn.fd,
                    events: POLLIN,
                    revents: 0,
                },
                libc::pollfd {
                    fd: handler_fd,
                    events: POLLIN,
                    revents: 0,
                },
            ];

            match unsafe { libc::poll(pfds.as_mut_ptr(), pfds.len() as libc::nfds_t, timeout) } {
                0 => {
                    debug!("RFCOMM poll timeout");
                    continue;
                }
                -1 => {
                    let err = io::Error::last_os_error();
                    if err.kind() == io::ErrorKind::Interrupted {
                        continue;
                    }
                    error!("RFCOMM poll error: {}", err);
                    return Err(RfcommError::Io(err));
                }
                _ => {}
            }

            if pfds[0].revents & POLLIN != 0 {
                match transport.recv_signal() {
                    Ok(TransportSignal::SetVolume) => tolerate(self.update_gains())?,
                    Ok(TransportSignal::Terminate) => {
                        debug!("Terminating RFCOMM loop: {}", self.conn.role);
                        return Ok(());
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Couldn't receive transport signal: {}", e),
                }
            }

            if pfds[1].revents & POLLIN != 0 {
                tolerate(self.handle_bt_frame())?;
            } else if pfds[1].revents & (POLLERR | POLLHUP) != 0 {
                debug!("RFCOMM disconnected: {}", RfcommError::ConnectionReset);
                return Err(RfcommError::ConnectionReset);
            }

            if handler_fd >= 0 {
                if pfds[2].revents & POLLIN != 0 {
                    self.handle_external(handler_fd)?;
                } else if pfds[2].revents & (POLLERR | POLLHUP) != 0 {
                    self.close_handler(handler_fd);
                }
            }
        }
    }

    /// Read one AT frame from the RFCOMM socket and dispatch it.
    fn handle_bt_frame(&mut self) -> RfcommResult<()> {
        let transport = self.conn.transport.clone();

        let at = match read_at(self.conn.fd, &mut self.reader) {
            Ok(at) => at,
            Err(RfcommError::BadMessage) => {
                warn!("Invalid AT message: {}", self.reader.pending());
                self.reader.clear();
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        // use the expected handler if it matches, otherwise the table
        let mut expected = false;
        let callback = match self.conn.expected {
            Some(handler) if handler.ty == at.ty && handler.command == at.command => {
                self.conn.expected = None;
                expected = true;
                Some(handler.callback)
            }
            _ => handlers::get_handler(&at).map(|h| h.callback),
        };

        let handler_fd = transport.handler_fd();
        if handler_fd >= 0 && !expected {
            let raw = at::build(at.ty, &at.command, &at.value);
            if let Err(e) = write_raw(handler_fd, raw.as_bytes()) {
                warn!("Couldn't forward AT message: {}", e);
            }
        }

        match callback {
            Some(callback) => callback(&mut self.conn, &at)?,
            None if handler_fd < 0 => {
                warn!(
                    "Unsupported AT message: {}: command:{}, value:{}",
                    at.ty, at.command, at.value
                );
                if at.ty != AtType::Resp {
                    write_at(self.conn.fd, AtType::Resp, "", "ERROR")?;
                }
            }
            None => {}
        }

        Ok(())
    }

    /// Inject bytes from the external AT handler verbatim onto RFCOMM.
    fn handle_external(&mut self, handler_fd: RawFd) -> RfcommResult<()> {
        let mut buf = [0u8; 256];
        match read_retry(handler_fd, &mut buf) {
            Ok(0) => {
                self.close_handler(handler_fd);
                Ok(())
            }
            Ok(len) => {
                let raw = String::from_utf8_lossy(&buf[..len]).into_owned();
                tolerate(write_at(self.conn.fd, AtType::Raw, &raw, ""))
            }
            Err(e) => {
                error!("AT handler IO error: {}", e);
                self.close_handler(handler_fd);
                Ok(())
            }
        }
    }

    /// Detach the failed external AT handler; the RFCOMM session keeps
    /// running without it.
    fn close_handler(&mut self, handler_fd: RawFd) {
        unsafe { libc::close(handler_fd) };
        self.conn.transport.set_handler_fd(-1);
    }

    /// Synchronize peer gains with the shared transport after a volume
    /// change on the audio side.
    fn update_gains(&mut self) -> RfcommResult<()> {
        let transport = self.conn.transport.clone();

        let mic_gain = transport.mic_gain();
        if self.conn.mic_gain != mic_gain {
            debug!("Setting microphone gain: {}", mic_gain);
            self.conn.mic_gain = mic_gain;
            write_at(self.conn.fd, AtType::Resp, "", &format!("+VGM={}", mic_gain))?;
        }

        let spk_gain = transport.spk_gain();
        if self.conn.spk_gain != spk_gain {
            debug!("Setting speaker gain: {}", spk_gain);
            self.conn.spk_gain = spk_gain;
            write_at(self.conn.fd, AtType::Resp, "", &format!("+VGS={}", spk_gain))?;
        }

        Ok(())
    }

    /// Drive the service level connection in the Hands-Free role.
    fn drive_slc_hf(&mut self) -> RfcommResult<()> {
        let conn = &mut self.conn;
        let fd = conn.fd;

        match conn.state {
            HfpState::Disconnected => {
                write_at(
                    fd,
                    AtType::CmdSet,
                    "+BRSF",
                    &conn.config.features_rfcomm_hf.to_string(),
                )?;
                conn.expect_reply(&handlers::HANDLER_BRSF_RESP);
            }
            HfpState::SlcBrsfSet => conn.expect_reply(&handlers::HANDLER_RESP_OK),
            HfpState::SlcBrsfSetOk
                if conn.transport.hfp_features() & HFP_AG_FEAT_CODEC != 0 =>
            {
                // advertise that we are supporting CVSD, plus mSBC when
                // compiled in
                let codecs = if cfg!(feature = "msbc") { "1,2" } else { "1" };
                write_at(fd, AtType::CmdSet, "+BAC", codecs)?;
                conn.expect_reply(&handlers::HANDLER_RESP_OK);
            }
            HfpState::SlcBrsfSetOk | HfpState::SlcBacSetOk => {
                write_at(fd, AtType::CmdTest, "+CIND", "")?;
                conn.expect_reply(&handlers::HANDLER_CIND_RESP_TEST);
            }
            HfpState::SlcCindTest => conn.expect_reply(&handlers::HANDLER_RESP_OK),
            HfpState::SlcCindTestOk => {
                write_at(fd, AtType::CmdGet, "+CIND", "")?;
                conn.expect_reply(&handlers::HANDLER_CIND_RESP_GET);
            }
            HfpState::SlcCindGet => conn.expect_reply(&handlers::HANDLER_RESP_OK),
            HfpState::SlcCindGetOk => {
                // Activate indicator events reporting. The +CMER
                // specification: AT+CMER=[<mode>[,<keyp>[,<disp>[,<ind>[,<bfr>]]]]]
                write_at(fd, AtType::CmdSet, "+CMER", "3,0,0,1,0")?;
                conn.expect_reply(&handlers::HANDLER_RESP_OK);
            }
            HfpState::SlcCmerSetOk
            | HfpState::SlcConnected
            | HfpState::CcBcsSet
            | HfpState::CcBcsSetOk
            | HfpState::CcConnected => {
                if conn.state == HfpState::SlcCmerSetOk {
                    conn.set_state(HfpState::SlcConnected);
                }
                if conn.state == HfpState::SlcConnected
                    && conn.transport.hfp_features() & HFP_AG_FEAT_CODEC != 0
                {
                    // wait for the AG to select a codec with +BCS
                    return Ok(());
                }
                conn.set_state(HfpState::Connected);
                conn.transport.notify_update(UPDATE_SAMPLING | UPDATE_CODEC);
            }
            HfpState::Connected => {}
        }

        Ok(())
    }

    /// Drive the service level connection in the Audio Gateway role.
    ///
    /// Most of the handshake is initiated by the HF; the AG only becomes
    /// active once event reporting is enabled, at which point it may start
    /// codec negotiation.
    fn drive_slc_ag(&mut self) -> RfcommResult<()> {
        let conn = &mut self.conn;
        let fd = conn.fd;

        match conn.state {
            HfpState::Disconnected
            | HfpState::SlcBrsfSet
            | HfpState::SlcBrsfSetOk
            | HfpState::SlcBacSetOk
            | HfpState::SlcCindTest
            | HfpState::SlcCindTestOk
            | HfpState::SlcCindGet
            | HfpState::SlcCindGetOk => {}
            HfpState::SlcCmerSetOk
            | HfpState::SlcConnected
            | HfpState::CcBcsSet
            | HfpState::CcBcsSetOk
            | HfpState::CcConnected => {
                if conn.state == HfpState::SlcCmerSetOk {
                    conn.set_state(HfpState::SlcConnected);
                }
                if conn.state == HfpState::SlcConnected
                    && conn.transport.hfp_features() & HFP_HF_FEAT_CODEC != 0
                {
                    let codec = if cfg!(feature = "msbc") && conn.msbc {
                        HFP_CODEC_MSBC
                    } else {
                        HFP_CODEC_CVSD
                    };
                    write_at(fd, AtType::Resp, "+BCS", &codec.to_string())?;
                    conn.transport.set_codec(codec);
                    conn.expect_reply(&handlers::HANDLER_BCS_SET);
                    return Ok(());
                }
                conn.set_state(HfpState::Connected);
                conn.transport.notify_update(UPDATE_SAMPLING | UPDATE_CODEC);
            }
            HfpState::Connected => {}
        }

        Ok(())
    }
}
