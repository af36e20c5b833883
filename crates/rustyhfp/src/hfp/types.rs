//! Type definitions for the HFP service level connection

use std::fmt;

use super::constants::HFP_IND_MAP_SIZE;

/// HFP role of the local side of an RFCOMM session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HfpRole {
    /// Hands-Free unit (headset side)
    HandsFree,
    /// Audio Gateway (phone side)
    AudioGateway,
}

impl fmt::Display for HfpRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HfpRole::HandsFree => f.write_str("HFP-HF"),
            HfpRole::AudioGateway => f.write_str("HFP-AG"),
        }
    }
}

/// Service level connection state progression
///
/// The declaration order is the protocol order: a session state only ever
/// moves towards [`HfpState::Connected`], never back. `Connected` is
/// terminal; once reached only indicator, volume and codec events occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HfpState {
    Disconnected,
    SlcBrsfSet,
    SlcBrsfSetOk,
    SlcBacSetOk,
    SlcCindTest,
    SlcCindTestOk,
    SlcCindGet,
    SlcCindGetOk,
    SlcCmerSetOk,
    SlcConnected,
    CcBcsSet,
    CcBcsSetOk,
    CcConnected,
    Connected,
}

impl HfpState {
    /// The next state in the protocol order.
    ///
    /// A bare `OK` from the peer confirms the command most recently
    /// emitted and advances the connection exactly one step. `Connected`
    /// is its own successor.
    pub fn successor(self) -> HfpState {
        match self {
            HfpState::Disconnected => HfpState::SlcBrsfSet,
            HfpState::SlcBrsfSet => HfpState::SlcBrsfSetOk,
            HfpState::SlcBrsfSetOk => HfpState::SlcBacSetOk,
            HfpState::SlcBacSetOk => HfpState::SlcCindTest,
            HfpState::SlcCindTest => HfpState::SlcCindTestOk,
            HfpState::SlcCindTestOk => HfpState::SlcCindGet,
            HfpState::SlcCindGet => HfpState::SlcCindGetOk,
            HfpState::SlcCindGetOk => HfpState::SlcCmerSetOk,
            HfpState::SlcCmerSetOk => HfpState::SlcConnected,
            HfpState::SlcConnected => HfpState::CcBcsSet,
            HfpState::CcBcsSet => HfpState::CcBcsSetOk,
            HfpState::CcBcsSetOk => HfpState::CcConnected,
            HfpState::CcConnected => HfpState::Connected,
            HfpState::Connected => HfpState::Connected,
        }
    }
}

/// AG indicator vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HfpIndicator {
    Call,
    CallSetup,
    Service,
    Signal,
    Roam,
    BattChg,
    CallHeld,
}

impl HfpIndicator {
    /// Number of indicators in the vocabulary
    pub const COUNT: usize = 7;

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "call" => Some(HfpIndicator::Call),
            "callsetup" => Some(HfpIndicator::CallSetup),
            "service" => Some(HfpIndicator::Service),
            "signal" => Some(HfpIndicator::Signal),
            "roam" => Some(HfpIndicator::Roam),
            "battchg" => Some(HfpIndicator::BattChg),
            "callheld" => Some(HfpIndicator::CallHeld),
            _ => None,
        }
    }
}

/// Mapping from AG-advertised indicator positions to the vocabulary
///
/// Positions are 1-based on the wire (`+CIEV: <index>,<value>`). The map is
/// populated once from the `+CIND=?` test response and stays stable for the
/// rest of the session.
#[derive(Debug, Clone, Default)]
pub struct IndicatorMap {
    slots: [Option<HfpIndicator>; HFP_IND_MAP_SIZE],
}

impl IndicatorMap {
    /// Build the map from the ordered indicator names of a test response.
    ///
    /// Names outside the vocabulary keep their position but map to nothing,
    /// so later positional lookups stay aligned.
    pub fn from_vocabulary(names: &[&str]) -> Self {
        let mut map = IndicatorMap::default();
        for (i, name) in names.iter().take(HFP_IND_MAP_SIZE).enumerate() {
            map.slots[i] = HfpIndicator::from_name(name);
        }
        map
    }

    /// Look up the indicator at a 1-based wire position.
    pub fn get(&self, index: usize) -> Option<HfpIndicator> {
        if index == 0 {
            return None;
        }
        self.slots.get(index - 1).copied().flatten()
    }

    /// Iterate the mapped positions in wire order.
    pub fn iter(&self) -> impl Iterator<Item = Option<HfpIndicator>> + '_ {
        self.slots.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|s| s.is_none())
    }
}
