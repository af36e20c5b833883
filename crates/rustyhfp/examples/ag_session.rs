//! Example: Audio Gateway session for a headset
//!
//! Listens on a local RFCOMM channel and serves the HFP Audio Gateway role
//! to the first headset that connects. Usage:
//!
//!     ag_session [channel]

use std::sync::Arc;

use rustyhfp::rfcomm::{RfcommSession, RfcommSocket};
use rustyhfp::{Config, HfpRole, Transport};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let channel: u8 = std::env::args()
        .nth(1)
        .map(|c| c.parse())
        .transpose()?
        .unwrap_or(13);

    let listener = match RfcommSocket::listen(channel) {
        Ok(listener) => listener,
        Err(err) => {
            eprintln!("Failed to listen on channel {}: {}", channel, err);
            return Err(err.into());
        }
    };

    println!("Waiting for a headset on RFCOMM channel {}...", channel);
    let (socket, addr) = listener.accept()?;
    println!("Accepted connection from {}", addr);

    let transport = Arc::new(Transport::new(socket.into_raw_fd())?);
    let session = RfcommSession::new(transport, HfpRole::AudioGateway, Config::default());

    session.run()?;
    Ok(())
}
