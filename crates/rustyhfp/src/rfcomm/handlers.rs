//! AT message handlers
//!
//! Two independent dispatch paths select a handler for an inbound frame:
//! the static table at the bottom of this module for unsolicited peer
//! messages, and the one-shot expected handler the SLC driver installs
//! before sending a command. The expected handler takes precedence and is
//! cleared once consumed, so a handler for the same command type can behave
//! differently depending on whether the message was solicited.
//!
//! A handler returning an error aborts the session.

use log::warn;

use crate::at::{self, AtMessage, AtType};
use crate::error::{RfcommError, RfcommResult};
use crate::hfp::constants::*;
use crate::hfp::{HfpIndicator, HfpState, IndicatorMap};
use crate::transport::{UPDATE_BATTERY, UPDATE_CODEC, UPDATE_SAMPLING, UPDATE_VOLUME};

use super::conn::RfcommConn;
use super::writer::write_at;

pub(crate) type HandlerCallback = fn(&mut RfcommConn, &AtMessage) -> RfcommResult<()>;

/// An entry of the AT handler dispatch table
pub(crate) struct AtHandler {
    pub ty: AtType,
    pub command: &'static str,
    pub callback: HandlerCallback,
}

/// Handle an AT command response code.
///
/// A bare `OK` confirms the command most recently emitted and advances the
/// service level connection exactly one step; `ERROR` aborts the session.
fn resp_ok(c: &mut RfcommConn, at: &AtMessage) -> RfcommResult<()> {
    if at.value == "OK" {
        let next = c.state.successor();
        c.set_state(next);
        return Ok(());
    }
    if at.value == "ERROR" {
        return Err(RfcommError::NotSupported);
    }
    Ok(())
}

/// TEST: Standard indicator update AT command
fn cind_test(c: &mut RfcommConn, _at: &AtMessage) -> RfcommResult<()> {
    write_at(c.fd, AtType::Resp, "+CIND", HFP_IND_VOCABULARY)?;
    write_at(c.fd, AtType::Resp, "", "OK")?;
    c.raise_state(HfpState::SlcCindTestOk);
    Ok(())
}

/// GET: Standard indicator update AT command
fn cind_get(c: &mut RfcommConn, _at: &AtMessage) -> RfcommResult<()> {
    write_at(c.fd, AtType::Resp, "+CIND", "0,0,0,0,0,0,0")?;
    write_at(c.fd, AtType::Resp, "", "OK")?;
    c.raise_state(HfpState::SlcCindGetOk);
    Ok(())
}

/// RESP: +CIND test response with the AG indicator vocabulary
fn cind_resp_test(c: &mut RfcommConn, at: &AtMessage) -> RfcommResult<()> {
    match at::parse_cind(&at.value) {
        Some(names) => c.ind_map = IndicatorMap::from_vocabulary(&names),
        None => warn!("Couldn't parse AG indicators: {}", at.value),
    }
    c.raise_state(HfpState::SlcCindTest);
    Ok(())
}

/// RESP: +CIND get response with the current indicator values
fn cind_resp_get(c: &mut RfcommConn, at: &AtMessage) -> RfcommResult<()> {
    let transport = c.transport.clone();

    for (slot, value) in c.ind_map.iter().zip(at.value.split(',')) {
        let value = at::parse_number(value);
        if let Some(ind) = slot {
            transport.set_indicator(ind, value);
            if ind == HfpIndicator::BattChg {
                transport.device().set_battery_level(value * 100 / 5);
                transport.notify_update(UPDATE_BATTERY);
            }
        }
    }

    c.raise_state(HfpState::SlcCindGet);
    Ok(())
}

/// SET: Standard event reporting activation/deactivation AT command
fn cmer_set(c: &mut RfcommConn, _at: &AtMessage) -> RfcommResult<()> {
    write_at(c.fd, AtType::Resp, "", "OK")?;
    c.raise_state(HfpState::SlcCmerSetOk);
    Ok(())
}

/// RESP: Standard indicator events reporting unsolicited result code
fn ciev_resp(c: &mut RfcommConn, at: &AtMessage) -> RfcommResult<()> {
    let (index, value) = match at.value.split_once(',') {
        Some((index, value)) => (at::parse_number(index), at::parse_number(value)),
        None => return Ok(()),
    };
    if index < 1 {
        return Ok(());
    }

    let transport = c.transport.clone();
    if let Some(ind) = c.ind_map.get(index as usize) {
        transport.set_indicator(ind, value);
        match ind {
            HfpIndicator::Call | HfpIndicator::CallSetup => {
                // the audio worker may need to bring the SCO link up or down
                if let Err(e) = transport.ping_sco() {
                    warn!("Couldn't ping SCO transport: {}", e);
                }
            }
            HfpIndicator::BattChg => {
                transport.device().set_battery_level(value * 100 / 5);
                transport.notify_update(UPDATE_BATTERY);
            }
            _ => {}
        }
    }

    Ok(())
}

/// SET: Bluetooth Indicators Activation
fn bia_set(c: &mut RfcommConn, _at: &AtMessage) -> RfcommResult<()> {
    // We are not sending any indicators to the HF, however support for the
    // +BIA command is mandatory for the AG, so acknowledge the message.
    write_at(c.fd, AtType::Resp, "", "OK")
}

/// SET: Bluetooth Retrieve Supported Features
fn brsf_set(c: &mut RfcommConn, at: &AtMessage) -> RfcommResult<()> {
    let features = at::parse_number(&at.value) as u32;
    c.transport.set_hfp_features(features);

    // Codec negotiation is not supported in the HF, hence no wideband
    // audio support. AT+BAC will not be sent.
    if features & HFP_HF_FEAT_CODEC == 0 {
        c.transport.set_codec(HFP_CODEC_CVSD);
    }

    write_at(
        c.fd,
        AtType::Resp,
        "+BRSF",
        &c.config.features_rfcomm_ag.to_string(),
    )?;
    write_at(c.fd, AtType::Resp, "", "OK")?;

    c.raise_state(HfpState::SlcBrsfSetOk);
    Ok(())
}

/// RESP: Bluetooth Retrieve Supported Features
fn brsf_resp(c: &mut RfcommConn, at: &AtMessage) -> RfcommResult<()> {
    let features = at::parse_number(&at.value) as u32;
    c.transport.set_hfp_features(features);

    // codec negotiation is not supported in the AG
    if features & HFP_AG_FEAT_CODEC == 0 {
        c.transport.set_codec(HFP_CODEC_CVSD);
    }

    c.raise_state(HfpState::SlcBrsfSet);
    Ok(())
}

/// SET: Gain of Microphone
fn vgm_set(c: &mut RfcommConn, at: &AtMessage) -> RfcommResult<()> {
    let gain = at::parse_number(&at.value);

    c.mic_gain = gain;
    c.transport.set_mic_gain(gain);
    write_at(c.fd, AtType::Resp, "", "OK")?;

    c.transport.notify_update(UPDATE_VOLUME);
    Ok(())
}

/// SET: Gain of Speaker
fn vgs_set(c: &mut RfcommConn, at: &AtMessage) -> RfcommResult<()> {
    let gain = at::parse_number(&at.value);

    c.spk_gain = gain;
    c.transport.set_spk_gain(gain);
    write_at(c.fd, AtType::Resp, "", "OK")?;

    c.transport.notify_update(UPDATE_VOLUME);
    Ok(())
}

/// GET: Bluetooth Response and Hold Feature
fn btrh_get(c: &mut RfcommConn, _at: &AtMessage) -> RfcommResult<()> {
    // Respond & Hold is not supported, so acknowledge this GET request
    // without reporting +BTRH status.
    write_at(c.fd, AtType::Resp, "", "OK")
}

/// SET: Bluetooth Codec Selection
fn bcs_set(c: &mut RfcommConn, at: &AtMessage) -> RfcommResult<()> {
    let proposed = at::parse_number(&at.value) as u8;

    if c.transport.codec() != proposed {
        warn!("Codec not acknowledged: {} != {}", c.transport.codec(), at.value);
        return write_at(c.fd, AtType::Resp, "", "ERROR");
    }

    write_at(c.fd, AtType::Resp, "", "OK")?;
    c.raise_state(HfpState::CcBcsSetOk);
    Ok(())
}

/// Expected OK for our AT+BCS confirmation.
fn resp_bcs_ok(c: &mut RfcommConn, at: &AtMessage) -> RfcommResult<()> {
    resp_ok(c, at)?;
    // Codec selection is complete; notify connected clients that the
    // transport has changed. This may fire for an active transport when
    // the codec is switched mid-session.
    c.transport.notify_update(UPDATE_SAMPLING | UPDATE_CODEC);
    Ok(())
}

/// RESP: Bluetooth Codec Selection
fn bcs_resp(c: &mut RfcommConn, at: &AtMessage) -> RfcommResult<()> {
    let codec = at::parse_number(&at.value) as u8;
    c.transport.set_codec(codec);

    write_at(c.fd, AtType::CmdSet, "+BCS", &at.value)?;
    c.expect_reply(&HANDLER_RESP_BCS_OK);

    c.raise_state(HfpState::CcBcsSet);
    Ok(())
}

/// SET: Bluetooth Available Codecs
fn bac_set(c: &mut RfcommConn, at: &AtMessage) -> RfcommResult<()> {
    for id in at.value.split(',') {
        if cfg!(feature = "msbc") && at::parse_number(id) as u8 == HFP_CODEC_MSBC {
            c.msbc = true;
        }
    }

    write_at(c.fd, AtType::Resp, "", "OK")?;
    c.raise_state(HfpState::SlcBacSetOk);
    Ok(())
}

/// SET: Apple Ext: Report a headset state change
fn iphoneaccev_set(c: &mut RfcommConn, at: &AtMessage) -> RfcommResult<()> {
    let transport = c.transport.clone();

    let mut parts = at.value.split(',').map(str::trim);
    let count = parts.next().map(at::parse_number).unwrap_or(0);

    for _ in 0..count {
        let key = match parts.next() {
            Some(key) => key,
            None => break,
        };
        match key {
            "1" => {
                if let Some(value) = parts.next() {
                    transport
                        .device()
                        .set_battery_level(at::parse_number(value) * 100 / 9);
                    transport.notify_update(UPDATE_BATTERY);
                }
            }
            "2" => {
                if let Some(value) = parts.next() {
                    transport.device().set_accev_docked(at::parse_number(value));
                }
            }
            _ => {
                warn!("Unsupported IPHONEACCEV key: {}", key);
                parts.next();
            }
        }
    }

    write_at(c.fd, AtType::Resp, "", "OK")
}

/// Parse an XAPL accessory descriptor: `<vendor>-<product>-<version>,<features>`
fn parse_xapl(value: &str) -> Option<(u16, u16, u32, u32)> {
    let (head, features) = value.split_once(',')?;
    let mut parts = head.split('-');
    let vendor = u16::from_str_radix(parts.next()?, 16).ok()?;
    let product = u16::from_str_radix(parts.next()?, 16).ok()?;
    let version = parts.next()?.trim().parse::<u32>().ok()?;
    let features = features.trim().parse::<u32>().ok()?;
    Some((vendor, product, version, features))
}

/// SET: Apple Ext: Enable custom AT commands from an accessory
fn xapl_set(c: &mut RfcommConn, at: &AtMessage) -> RfcommResult<()> {
    let resp = match parse_xapl(&at.value) {
        Some((vendor, product, version, features)) => {
            c.transport
                .device()
                .set_xapl(vendor, product, version, features);
            "+XAPL=rustyhfp,0"
        }
        None => {
            warn!("Invalid XAPL value: {}", at.value);
            "ERROR"
        }
    };
    write_at(c.fd, AtType::Resp, "", resp)
}

pub(crate) static HANDLER_RESP_OK: AtHandler = AtHandler {
    ty: AtType::Resp,
    command: "",
    callback: resp_ok,
};
pub(crate) static HANDLER_RESP_BCS_OK: AtHandler = AtHandler {
    ty: AtType::Resp,
    command: "",
    callback: resp_bcs_ok,
};
pub(crate) static HANDLER_CIND_TEST: AtHandler = AtHandler {
    ty: AtType::CmdTest,
    command: "+CIND",
    callback: cind_test,
};
pub(crate) static HANDLER_CIND_GET: AtHandler = AtHandler {
    ty: AtType::CmdGet,
    command: "+CIND",
    callback: cind_get,
};
pub(crate) static HANDLER_CIND_RESP_TEST: AtHandler = AtHandler {
    ty: AtType::Resp,
    command: "+CIND",
    callback: cind_resp_test,
};
pub(crate) static HANDLER_CIND_RESP_GET: AtHandler = AtHandler {
    ty: AtType::Resp,
    command: "+CIND",
    callback: cind_resp_get,
};
pub(crate) static HANDLER_CMER_SET: AtHandler = AtHandler {
    ty: AtType::CmdSet,
    command: "+CMER",
    callback: cmer_set,
};
pub(crate) static HANDLER_CIEV_RESP: AtHandler = AtHandler {
    ty: AtType::Resp,
    command: "+CIEV",
    callback: ciev_resp,
};
pub(crate) static HANDLER_BIA_SET: AtHandler = AtHandler {
    ty: AtType::CmdSet,
    command: "+BIA",
    callback: bia_set,
};
pub(crate) static HANDLER_BRSF_SET: AtHandler = AtHandler {
    ty: AtType::CmdSet,
    command: "+BRSF",
    callback: brsf_set,
};
pub(crate) static HANDLER_BRSF_RESP: AtHandler = AtHandler {
    ty: AtType::Resp,
    command: "+BRSF",
    callback: brsf_resp,
};
pub(crate) static HANDLER_VGM_SET: AtHandler = AtHandler {
    ty: AtType::CmdSet,
    command: "+VGM",
    callback: vgm_set,
};
pub(crate) static HANDLER_VGS_SET: AtHandler = AtHandler {
    ty: AtType::CmdSet,
    command: "+VGS",
    callback: vgs_set,
};
pub(crate) static HANDLER_BTRH_GET: AtHandler = AtHandler {
    ty: AtType::CmdGet,
    command: "+BTRH",
    callback: btrh_get,
};
pub(crate) static HANDLER_BCS_SET: AtHandler = AtHandler {
    ty: AtType::CmdSet,
    command: "+BCS",
    callback: bcs_set,
};
pub(crate) static HANDLER_BCS_RESP: AtHandler = AtHandler {
    ty: AtType::Resp,
    command: "+BCS",
    callback: bcs_resp,
};
pub(crate) static HANDLER_BAC_SET: AtHandler = AtHandler {
    ty: AtType::CmdSet,
    command: "+BAC",
    callback: bac_set,
};
pub(crate) static HANDLER_IPHONEACCEV_SET: AtHandler = AtHandler {
    ty: AtType::CmdSet,
    command: "+IPHONEACCEV",
    callback: iphoneaccev_set,
};
pub(crate) static HANDLER_XAPL_SET: AtHandler = AtHandler {
    ty: AtType::CmdSet,
    command: "+XAPL",
    callback: xapl_set,
};

/// Dispatch table for unsolicited AT messages.
///
/// Response handlers that only make sense as the reply to a command we
/// sent (+BRSF and the two +CIND response forms) are reachable through the
/// expected-handler slot alone, keeping every (type, command) pair in this
/// table unambiguous.
pub(crate) static HANDLERS: [&AtHandler; 14] = [
    &HANDLER_CIND_TEST,
    &HANDLER_CIND_GET,
    &HANDLER_CMER_SET,
    &HANDLER_CIEV_RESP,
    &HANDLER_BIA_SET,
    &HANDLER_BRSF_SET,
    &HANDLER_VGM_SET,
    &HANDLER_VGS_SET,
    &HANDLER_BTRH_GET,
    &HANDLER_BCS_SET,
    &HANDLER_BCS_RESP,
    &HANDLER_BAC_SET,
    &HANDLER_IPHONEACCEV_SET,
    &HANDLER_XAPL_SET,
];

/// Get the handler (if available) for a given AT message.
pub(crate) fn get_handler(at: &AtMessage) -> Option<&'static AtHandler> {
    HANDLERS
        .iter()
        .find(|h| h.ty == at.ty && h.command == at.command)
        .copied()
}
