//! Unit and loopback tests for the RFCOMM engine
//!
//! A `UnixStream` pair stands in for the RFCOMM byte stream; the test body
//! plays the peer while the engine runs on its own thread, exactly as it
//! would against a real socket.

use std::io::{Read, Write};
use std::os::unix::io::{AsRawFd, IntoRawFd};
use std::os::unix::net::UnixStream;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::at::{AtMessage, AtType};
use crate::config::Config;
use crate::error::{RfcommError, RfcommResult};
use crate::hfp::constants::*;
use crate::hfp::{HfpIndicator, HfpRole};
use crate::transport::{
    Transport, TransportSignal, UPDATE_BATTERY, UPDATE_CODEC, UPDATE_SAMPLING, UPDATE_VOLUME,
};

use super::handlers;
use super::reader::{read_at, AtReader};
use super::session::RfcommSession;
use super::writer::write_at;

type Updates = Arc<Mutex<Vec<u32>>>;

/// Spawn a session against one end of a socket pair; the returned stream
/// is the peer side of the RFCOMM link.
fn session_pair(
    role: HfpRole,
    config: Config,
) -> (
    Arc<Transport>,
    UnixStream,
    Updates,
    thread::JoinHandle<RfcommResult<()>>,
) {
    let (engine, peer) = UnixStream::pair().unwrap();
    peer.set_read_timeout(Some(Duration::from_secs(3))).unwrap();

    let transport = Arc::new(Transport::new(engine.into_raw_fd()).unwrap());

    let updates: Updates = Arc::new(Mutex::new(Vec::new()));
    {
        let updates = updates.clone();
        transport.set_update_callback(Arc::new(Mutex::new(move |mask: u32| {
            updates.lock().unwrap().push(mask)
        })));
    }

    let session = RfcommSession::new(transport.clone(), role, config);
    let handle = thread::spawn(move || session.run());

    (transport, peer, updates, handle)
}

/// Accumulate peer-side bytes until `pattern` shows up.
fn read_until(peer: &mut UnixStream, pattern: &str) -> String {
    let mut data = String::new();
    let mut buf = [0u8; 256];
    while !data.contains(pattern) {
        let len = peer
            .read(&mut buf)
            .unwrap_or_else(|e| panic!("timed out waiting for {:?}: {}", pattern, e));
        assert!(len > 0, "engine hung up while waiting for {:?}", pattern);
        data.push_str(std::str::from_utf8(&buf[..len]).unwrap());
    }
    data
}

fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("timed out waiting for {}", what);
}

fn has_update(updates: &Updates, mask: u32) -> bool {
    updates.lock().unwrap().iter().any(|&m| m & mask == mask)
}

#[test]
fn test_read_at_drains_buffered_frames() {
    let (mut peer, engine) = UnixStream::pair().unwrap();
    let mut reader = AtReader::new();

    // two frames delivered by a single socket read
    peer.write_all(b"AT+VGS=7\rAT+VGM=5\r").unwrap();
    drop(peer);

    let first = read_at(engine.as_raw_fd(), &mut reader).unwrap();
    assert_eq!(first.ty, AtType::CmdSet);
    assert_eq!(first.command, "+VGS");
    assert_eq!(first.value, "7");
    assert!(reader.has_pending());

    // the second frame comes from the buffer, not the (closed) socket
    let second = read_at(engine.as_raw_fd(), &mut reader).unwrap();
    assert_eq!(second.command, "+VGM");
    assert_eq!(second.value, "5");
    assert!(!reader.has_pending());

    assert!(matches!(
        read_at(engine.as_raw_fd(), &mut reader),
        Err(RfcommError::ConnectionReset)
    ));
}

#[test]
fn test_read_at_bad_message_preserves_cursor() {
    let (mut peer, engine) = UnixStream::pair().unwrap();
    let mut reader = AtReader::new();

    peer.write_all(b"garbage without terminator").unwrap();

    assert!(matches!(
        read_at(engine.as_raw_fd(), &mut reader),
        Err(RfcommError::BadMessage)
    ));
    // the invalid bytes stay visible for logging until cleared
    assert!(reader.pending().contains("garbage"));

    reader.clear();
    assert!(!reader.has_pending());
}

#[test]
fn test_write_at_wire_format() {
    let (engine, mut peer) = UnixStream::pair().unwrap();

    write_at(engine.as_raw_fd(), AtType::CmdSet, "+BRSF", "575").unwrap();
    write_at(engine.as_raw_fd(), AtType::Resp, "", "OK").unwrap();
    write_at(engine.as_raw_fd(), AtType::Resp, "+BRSF", "512").unwrap();
    drop(engine);

    let mut data = String::new();
    peer.read_to_string(&mut data).unwrap();
    assert_eq!(data, "AT+BRSF=575\r\r\nOK\r\n\r\n+BRSF: 512\r\n");
}

#[test]
fn test_handler_lookup() {
    let at = AtMessage::new(AtType::CmdSet, "+BRSF", "575");
    assert!(handlers::get_handler(&at).is_some());

    let at = AtMessage::new(AtType::CmdTest, "+CIND", "");
    assert!(handlers::get_handler(&at).is_some());

    // bare result codes never match the table
    let at = AtMessage::new(AtType::Resp, "", "OK");
    assert!(handlers::get_handler(&at).is_none());

    let at = AtMessage::new(AtType::CmdSet, "+XYZZY", "1");
    assert!(handlers::get_handler(&at).is_none());
}

#[test]
fn test_handler_table_is_unambiguous() {
    for (i, first) in handlers::HANDLERS.iter().enumerate() {
        for second in &handlers::HANDLERS[i + 1..] {
            assert!(
                !(first.ty == second.ty && first.command == second.command),
                "two handlers registered for {} {}",
                first.ty,
                first.command
            );
        }
    }
}

#[cfg(feature = "msbc")]
#[test]
fn test_hf_slc_with_codec_negotiation() {
    let config = Config {
        features_rfcomm_hf: 0x23F,
        ..Config::default()
    };
    let (transport, mut peer, updates, handle) = session_pair(HfpRole::HandsFree, config);

    read_until(&mut peer, "AT+BRSF=575\r");
    peer.write_all(b"\r\n+BRSF: 512\r\n\r\nOK\r\n").unwrap();

    read_until(&mut peer, "AT+BAC=1,2\r");
    peer.write_all(b"\r\nOK\r\n").unwrap();

    read_until(&mut peer, "AT+CIND=?\r");
    peer.write_all(
        format!("\r\n+CIND: {}\r\n\r\nOK\r\n", HFP_IND_VOCABULARY).as_bytes(),
    )
    .unwrap();

    read_until(&mut peer, "AT+CIND?\r");
    peer.write_all(b"\r\n+CIND: 0,0,1,4,0,3,0\r\n\r\nOK\r\n").unwrap();

    read_until(&mut peer, "AT+CMER=3,0,0,1,0\r");

    // +CIND? values were stored by name, not by position
    assert_eq!(transport.hfp_features(), 512);
    assert_eq!(transport.indicator(HfpIndicator::Service), 1);
    assert_eq!(transport.indicator(HfpIndicator::Signal), 4);
    assert_eq!(transport.indicator(HfpIndicator::BattChg), 3);
    assert_eq!(transport.device().battery_level(), 60);

    peer.write_all(b"\r\nOK\r\n").unwrap();

    // AG-initiated codec selection
    peer.write_all(b"\r\n+BCS: 2\r\n").unwrap();
    read_until(&mut peer, "AT+BCS=2\r");
    assert_eq!(transport.codec(), HFP_CODEC_MSBC);
    peer.write_all(b"\r\nOK\r\n").unwrap();

    wait_for("codec connection notification", || {
        has_update(&updates, UPDATE_SAMPLING | UPDATE_CODEC)
    });

    // indicator events after the connection is up
    peer.write_all(b"\r\n+CIEV: 6,5\r\n").unwrap();
    wait_for("battery update", || {
        transport.device().battery_level() == 100
    });
    assert!(has_update(&updates, UPDATE_BATTERY));

    peer.write_all(b"\r\n+CIEV: 1,1\r\n").unwrap();
    wait_for("call indicator", || {
        transport.indicator(HfpIndicator::Call) == 1
    });
    // a call state change nudges the audio worker
    assert_eq!(
        transport.recv_sco_signal().unwrap(),
        TransportSignal::Ping
    );

    drop(peer);
    assert!(matches!(
        handle.join().unwrap(),
        Err(RfcommError::ConnectionReset)
    ));
}

#[test]
fn test_ag_slc_without_codec_negotiation() {
    let config = Config::default();
    let (transport, mut peer, updates, handle) = session_pair(HfpRole::AudioGateway, config);

    // 319 has no codec negotiation bit; wide-band audio is off the table
    peer.write_all(b"AT+BRSF=319\r").unwrap();
    let data = read_until(&mut peer, "OK\r\n");
    assert!(data.contains(&format!("+BRSF: {}", config.features_rfcomm_ag)));
    assert_eq!(transport.hfp_features(), 319);
    assert_eq!(transport.codec(), HFP_CODEC_CVSD);

    peer.write_all(b"AT+CIND=?\r").unwrap();
    let data = read_until(&mut peer, "OK\r\n");
    assert!(data.contains("(\"call\",(0,1))"));
    assert!(data.contains("(\"callheld\",(0-2))"));

    peer.write_all(b"AT+CIND?\r").unwrap();
    let data = read_until(&mut peer, "OK\r\n");
    assert!(data.contains("+CIND: 0,0,0,0,0,0,0"));

    peer.write_all(b"AT+CMER=3,0,0,1,0\r").unwrap();
    read_until(&mut peer, "OK\r\n");

    // the SLC completes directly, bypassing +BCS
    wait_for("connection notification", || {
        has_update(&updates, UPDATE_SAMPLING | UPDATE_CODEC)
    });

    // volume propagation: audio side to peer...
    transport.set_spk_gain(10);
    transport.signal(TransportSignal::SetVolume).unwrap();
    read_until(&mut peer, "+VGS=10");

    // ...and peer to audio side
    peer.write_all(b"AT+VGM=7\r").unwrap();
    read_until(&mut peer, "OK\r\n");
    assert_eq!(transport.mic_gain(), 7);
    assert!(has_update(&updates, UPDATE_VOLUME));

    transport.signal(TransportSignal::Terminate).unwrap();
    assert!(handle.join().unwrap().is_ok());
}

#[cfg(feature = "msbc")]
#[test]
fn test_ag_slc_with_codec_negotiation() {
    let config = Config::default();
    assert!(config.features_rfcomm_ag & HFP_AG_FEAT_CODEC != 0);
    let (transport, mut peer, updates, handle) = session_pair(HfpRole::AudioGateway, config);

    peer.write_all(b"AT+BRSF=575\r").unwrap();
    read_until(&mut peer, "OK\r\n");

    peer.write_all(b"AT+BAC=1,2\r").unwrap();
    read_until(&mut peer, "OK\r\n");

    peer.write_all(b"AT+CIND=?\r").unwrap();
    read_until(&mut peer, "OK\r\n");

    peer.write_all(b"AT+CIND?\r").unwrap();
    read_until(&mut peer, "OK\r\n");

    // after CMER the AG starts codec selection; mSBC was advertised
    peer.write_all(b"AT+CMER=3,0,0,1,0\r").unwrap();
    let data = read_until(&mut peer, "+BCS: 2");
    assert!(data.contains("OK"));
    wait_for("codec selection", || transport.codec() == HFP_CODEC_MSBC);

    peer.write_all(b"AT+BCS=2\r").unwrap();
    read_until(&mut peer, "OK\r\n");

    wait_for("codec connection notification", || {
        has_update(&updates, UPDATE_SAMPLING | UPDATE_CODEC)
    });

    transport.signal(TransportSignal::Terminate).unwrap();
    assert!(handle.join().unwrap().is_ok());
}

#[test]
fn test_ag_rejects_unexpected_codec_confirmation() {
    let config = Config::default();
    let (transport, mut peer, _updates, handle) = session_pair(HfpRole::AudioGateway, config);

    peer.write_all(b"AT+BRSF=575\r").unwrap();
    read_until(&mut peer, "OK\r\n");

    transport.set_codec(HFP_CODEC_CVSD);
    peer.write_all(b"AT+BCS=2\r").unwrap();
    read_until(&mut peer, "ERROR\r\n");

    transport.signal(TransportSignal::Terminate).unwrap();
    assert!(handle.join().unwrap().is_ok());
}

#[test]
fn test_peer_error_terminates_session() {
    let config = Config {
        features_rfcomm_hf: 0x23F,
        ..Config::default()
    };
    let (_transport, mut peer, _updates, handle) = session_pair(HfpRole::HandsFree, config);

    read_until(&mut peer, "AT+BRSF=575\r");
    peer.write_all(b"\r\n+BRSF: 512\r\n\r\nOK\r\n").unwrap();

    // rejecting the codec advertisement kills the handshake
    read_until(&mut peer, "AT+BAC=");
    peer.write_all(b"\r\nERROR\r\n").unwrap();

    assert!(matches!(
        handle.join().unwrap(),
        Err(RfcommError::NotSupported)
    ));
}

#[test]
fn test_slc_timeout_terminates_session() {
    let config = Config {
        slc_retries: 2,
        slc_timeout_ms: 30,
        ..Config::default()
    };
    let (_transport, mut peer, _updates, handle) = session_pair(HfpRole::HandsFree, config);

    // the peer stays silent; the engine re-sends until it gives up
    let mut sends = 0;
    let mut buf = [0u8; 256];
    loop {
        match peer.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(len) => {
                sends += String::from_utf8_lossy(&buf[..len]).matches("AT+BRSF=").count()
            }
        }
    }
    assert!(sends >= 2, "expected re-sends, got {}", sends);

    assert!(matches!(
        handle.join().unwrap(),
        Err(RfcommError::TimedOut)
    ));
}

#[test]
fn test_unknown_command_gets_error_reply() {
    let (transport, mut peer, _updates, handle) =
        session_pair(HfpRole::AudioGateway, Config::default());

    peer.write_all(b"AT+XYZZY=1\r").unwrap();
    read_until(&mut peer, "ERROR\r\n");

    // the session survives and keeps serving known commands
    peer.write_all(b"AT+BTRH?\r").unwrap();
    read_until(&mut peer, "OK\r\n");

    peer.write_all(b"AT+BIA=0,0,1\r").unwrap();
    read_until(&mut peer, "OK\r\n");

    transport.signal(TransportSignal::Terminate).unwrap();
    assert!(handle.join().unwrap().is_ok());
}

#[test]
fn test_apple_vendor_extensions() {
    let (transport, mut peer, updates, handle) =
        session_pair(HfpRole::AudioGateway, Config::default());

    peer.write_all(b"AT+XAPL=05AC-1234-5,6\r").unwrap();
    read_until(&mut peer, "+XAPL=rustyhfp,0");
    assert_eq!(transport.device().xapl(), (0x05AC, 0x1234, 5, 6));

    // key 1 reports battery in tenths, key 2 the docked state
    peer.write_all(b"AT+IPHONEACCEV=2,1,5,2,1\r").unwrap();
    read_until(&mut peer, "OK\r\n");
    assert_eq!(transport.device().battery_level(), 55);
    assert_eq!(transport.device().accev_docked(), 1);
    assert!(has_update(&updates, UPDATE_BATTERY));

    peer.write_all(b"AT+XAPL=nonsense\r").unwrap();
    read_until(&mut peer, "ERROR\r\n");

    transport.signal(TransportSignal::Terminate).unwrap();
    assert!(handle.join().unwrap().is_ok());
}

#[test]
fn test_external_handler_forwarding_and_injection() {
    let (transport, mut peer, _updates, handle) =
        session_pair(HfpRole::AudioGateway, Config::default());

    let (ext_engine, mut ext) = UnixStream::pair().unwrap();
    ext.set_read_timeout(Some(Duration::from_secs(3))).unwrap();
    transport.set_handler_fd(ext_engine.into_raw_fd());

    // unmatched frames are forwarded instead of answered with ERROR
    peer.write_all(b"AT+XYZZY=1\r").unwrap();
    let mut buf = [0u8; 64];
    let len = ext.read(&mut buf).unwrap();
    assert_eq!(&buf[..len], b"AT+XYZZY=1\r");

    // handler bytes are injected onto RFCOMM verbatim
    ext.write_all(b"\r\nRING\r\n").unwrap();
    read_until(&mut peer, "RING");

    // a dead handler detaches without killing the session
    drop(ext);
    wait_for("handler detach", || transport.handler_fd() == -1);
    peer.write_all(b"AT+XYZZY=2\r").unwrap();
    read_until(&mut peer, "ERROR\r\n");

    transport.signal(TransportSignal::Terminate).unwrap();
    assert!(handle.join().unwrap().is_ok());
}
