//! RFCOMM control channel engine
//!
//! This module implements the AT dialogue over the RFCOMM byte stream:
//! - buffered reading and splitting of concatenated AT frames
//! - formatting and sending of single frames
//! - the per-command handler dispatch table
//! - the service level connection state machine for both HFP roles
//! - the event loop multiplexing the socket, the in-process signal
//!   channel and the optional external AT handler

mod conn;
mod handlers;
pub mod reader;
pub mod session;
pub mod socket;
#[cfg(test)]
mod tests;
pub mod writer;

// Re-export the public API
pub use self::reader::{read_at, AtReader, AT_READER_BUFFER_SIZE};
pub use self::session::RfcommSession;
pub use self::socket::{BdAddr, RfcommSocket};
pub use self::writer::write_at;
