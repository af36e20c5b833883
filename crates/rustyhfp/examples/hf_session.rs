//! Example: Hands-Free session against a phone
//!
//! Connects to the HFP Audio Gateway channel of a remote device and runs
//! the service level connection in the HF role. Usage:
//!
//!     hf_session <bdaddr> [channel]

use std::sync::{Arc, Mutex};

use rustyhfp::rfcomm::{RfcommSession, RfcommSocket};
use rustyhfp::transport::{UPDATE_BATTERY, UPDATE_CODEC, UPDATE_SAMPLING, UPDATE_VOLUME};
use rustyhfp::{Config, HfpRole, Transport};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let addr = match args.next() {
        Some(addr) => addr.parse()?,
        None => {
            eprintln!("usage: hf_session <bdaddr> [channel]");
            std::process::exit(1);
        }
    };
    let channel: u8 = args.next().map(|c| c.parse()).transpose()?.unwrap_or(1);

    println!("Connecting to {} channel {}...", addr, channel);
    let socket = match RfcommSocket::connect(&addr, channel) {
        Ok(socket) => socket,
        Err(err) => {
            eprintln!("Failed to connect: {}", err);
            eprintln!("Note: this example requires a paired device and CAP_NET_RAW");
            return Err(err.into());
        }
    };

    let transport = Arc::new(Transport::new(socket.into_raw_fd())?);

    transport.set_update_callback(Arc::new(Mutex::new(|mask: u32| {
        let mut changed = Vec::new();
        if mask & UPDATE_SAMPLING != 0 {
            changed.push("sampling");
        }
        if mask & UPDATE_CODEC != 0 {
            changed.push("codec");
        }
        if mask & UPDATE_VOLUME != 0 {
            changed.push("volume");
        }
        if mask & UPDATE_BATTERY != 0 {
            changed.push("battery");
        }
        println!("Transport update: {}", changed.join("+"));
    })));

    let session = RfcommSession::new(transport.clone(), HfpRole::HandsFree, Config::default());
    println!("Running HF session; press Ctrl-C to quit");
    session.run()?;

    Ok(())
}
