//! Per-session connection record
//!
//! Owned by the session thread; never shared. Everything that must be
//! visible to the audio side lives on the [`Transport`] instead.

use std::os::unix::io::RawFd;
use std::sync::Arc;

use log::debug;

use crate::config::Config;
use crate::hfp::{HfpRole, HfpState, IndicatorMap};
use crate::transport::Transport;

use super::handlers::AtHandler;

pub(crate) struct RfcommConn {
    pub(crate) role: HfpRole,
    /// RFCOMM socket descriptor, borrowed from the transport
    pub(crate) fd: RawFd,
    pub(crate) state: HfpState,
    /// State at the previous loop iteration, for progress detection
    pub(crate) state_prev: HfpState,
    /// Number of SLC sends without progress
    pub(crate) retries: u32,
    /// One-shot handler for the reply to the last sent command
    pub(crate) expected: Option<&'static AtHandler>,
    /// Gains last synchronized with the peer
    pub(crate) mic_gain: i32,
    pub(crate) spk_gain: i32,
    /// Whether the peer advertised mSBC in AT+BAC
    pub(crate) msbc: bool,
    /// AG indicator positions, populated from the +CIND=? response
    pub(crate) ind_map: IndicatorMap,
    pub(crate) transport: Arc<Transport>,
    pub(crate) config: Config,
}

impl RfcommConn {
    pub(crate) fn new(transport: Arc<Transport>, role: HfpRole, config: Config) -> Self {
        Self {
            role,
            fd: transport.bt_fd(),
            state: HfpState::Disconnected,
            state_prev: HfpState::Disconnected,
            retries: 0,
            expected: None,
            mic_gain: transport.mic_gain(),
            spk_gain: transport.spk_gain(),
            msbc: false,
            ind_map: IndicatorMap::default(),
            transport,
            config,
        }
    }

    pub(crate) fn set_state(&mut self, state: HfpState) {
        debug!("HFP state transition: {:?} -> {:?}", self.state, state);
        debug_assert!(state >= self.state);
        self.state = state;
    }

    /// Advance to `state` unless the session is already at or past it.
    pub(crate) fn raise_state(&mut self, state: HfpState) {
        if self.state < state {
            self.set_state(state);
        }
    }

    /// Install the one-shot handler for the reply to the command just sent.
    pub(crate) fn expect_reply(&mut self, handler: &'static AtHandler) {
        self.expected = Some(handler);
    }
}
