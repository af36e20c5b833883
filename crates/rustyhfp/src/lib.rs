//! RustyHFP - RFCOMM control channel engine for Bluetooth HFP
//!
//! This library drives the AT-command dialogue of the Hands-Free Profile
//! over an RFCOMM socket: it establishes the Service Level Connection,
//! negotiates the voice codec (CVSD or mSBC), tracks indicator state and
//! reacts to runtime events such as volume changes and codec switches.
//! Both the Hands-Free and the Audio Gateway role are supported.
//!
//! The audio data path is out of scope; the engine publishes everything
//! the audio side needs through a shared [`Transport`] record and a
//! signal channel.

pub mod at;
pub mod config;
pub mod error;
pub mod hfp;
pub mod rfcomm;
pub mod transport;

// Re-export common types for convenience
pub use config::Config;
pub use error::{Error, RfcommError};
pub use hfp::{HfpIndicator, HfpRole, HfpState};
pub use rfcomm::{BdAddr, RfcommSession, RfcommSocket};
pub use transport::{Transport, TransportSignal};
